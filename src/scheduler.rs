//! Cadence and cancellation for the long-lived loops.
//!
//! Every loop is driven by a [`Ticker`] over an injected [`Clock`] and
//! watches one shared [`StopToken`].  The clock is the only thing that
//! ever suspends a loop, so swapping [`SystemClock`] for [`ManualClock`]
//! runs the same loop code on virtual time.
//!
//! ```text
//!   ┌──────────────── one cycle ────────────────┐
//!   │ begin_cycle ─▶ work ─▶ finish_cycle        │
//!   │                          │                 │
//!   │              elapsed < period ─▶ sleep rest ─▶ OnTime / Stopped
//!   │              elapsed ≥ period ─▶ no sleep  ─▶ Overrun
//!   └───────────────────────────────────────────┘
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{error, warn};

// ═══════════════════════════════════════════════════════════════
//  Stop token
// ═══════════════════════════════════════════════════════════════

/// Why a sleep returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The full duration elapsed.
    Elapsed,
    /// The stop signal was raised before it did.
    Stopped,
}

/// Process-wide stop signal.  Cloning shares the same signal.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake every waiter.
    ///
    /// Returns `true` only for the call that actually raised it, so
    /// callers can keep shutdown side effects to a single occurrence.
    pub fn stop(&self) -> bool {
        let (flag, cvar) = &*self.inner;
        let mut stopped = lock(flag);
        if *stopped {
            return false;
        }
        *stopped = true;
        cvar.notify_all();
        true
    }

    pub fn is_stopped(&self) -> bool {
        *lock(&self.inner.0)
    }

    /// Block for up to `timeout`, returning early when the signal is raised.
    pub fn wait_timeout(&self, timeout: Duration) -> Wake {
        let (flag, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut stopped = lock(flag);
        loop {
            if *stopped {
                return Wake::Stopped;
            }
            let now = Instant::now();
            if now >= deadline {
                return Wake::Elapsed;
            }
            stopped = match cvar.wait_timeout(stopped, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Clocks
// ═══════════════════════════════════════════════════════════════

/// Time source for the loops.
pub trait Clock: Send + Sync {
    /// Monotonic time since an arbitrary origin.
    fn monotonic(&self) -> Duration;

    /// Wall-clock time as unix seconds (reading timestamps).
    fn unix_secs(&self) -> u64;

    /// Suspend for `duration` unless `stop` is raised first.
    fn sleep(&self, duration: Duration, stop: &StopToken) -> Wake;
}

/// Real time: `Instant` for cadence, `SystemTime` for timestamps.
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }

    fn unix_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    fn sleep(&self, duration: Duration, stop: &StopToken) -> Wake {
        stop.wait_timeout(duration)
    }
}

/// Virtual time.  Sleeping advances the clock instantly.
///
/// Every sleep is recorded so tests can assert on cadence without a
/// single wall-clock wait.
pub struct ManualClock {
    epoch_secs: u64,
    state: Mutex<ManualState>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    /// A clock whose wall time starts at `epoch_secs`.
    pub fn new(epoch_secs: u64) -> Self {
        Self {
            epoch_secs,
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Move time forward without recording a sleep (simulates slow work).
    pub fn advance(&self, by: Duration) {
        lock(&self.state).now += by;
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.state).sleeps.clone()
    }
}

impl Clock for ManualClock {
    fn monotonic(&self) -> Duration {
        lock(&self.state).now
    }

    fn unix_secs(&self) -> u64 {
        self.epoch_secs + self.monotonic().as_secs()
    }

    fn sleep(&self, duration: Duration, stop: &StopToken) -> Wake {
        if stop.is_stopped() {
            return Wake::Stopped;
        }
        {
            let mut state = lock(&self.state);
            state.now += duration;
            state.sleeps.push(duration);
        }
        // Give other loop threads a chance to run between virtual ticks.
        std::thread::yield_now();
        Wake::Elapsed
    }
}

// ═══════════════════════════════════════════════════════════════
//  Ticker
// ═══════════════════════════════════════════════════════════════

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The cycle finished early and the remainder of the period was slept.
    OnTime,
    /// The cycle took `elapsed` (≥ period); the next starts immediately.
    Overrun(Duration),
    /// Stop was raised; the loop must exit.
    Stopped,
}

/// Fixed-period, best-effort cadence.  Overruns are reported, never
/// caught up.
pub struct Ticker {
    clock: Arc<dyn Clock>,
    period: Duration,
    cycle_start: Duration,
}

impl Ticker {
    pub fn new(clock: Arc<dyn Clock>, period: Duration) -> Self {
        let cycle_start = clock.monotonic();
        Self {
            clock,
            period,
            cycle_start,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Mark the start of a cycle.  Returns the wall-clock timestamp for it.
    pub fn begin_cycle(&mut self) -> u64 {
        self.cycle_start = self.clock.monotonic();
        self.clock.unix_secs()
    }

    /// Sleep out the rest of the period, or report an overrun.
    pub fn finish_cycle(&mut self, stop: &StopToken) -> TickOutcome {
        let elapsed = self.clock.monotonic().saturating_sub(self.cycle_start);
        if elapsed >= self.period {
            if stop.is_stopped() {
                return TickOutcome::Stopped;
            }
            return TickOutcome::Overrun(elapsed);
        }
        match self.clock.sleep(self.period - elapsed, stop) {
            Wake::Elapsed => TickOutcome::OnTime,
            Wake::Stopped => TickOutcome::Stopped,
        }
    }
}

/// Drive `cycle` at the ticker's cadence until `stop` is raised.
///
/// `cycle` receives the wall-clock timestamp of its start.  A panic inside
/// it is logged and the loop carries on with the next period; an overrun
/// is logged and handed to `on_overrun`.
pub fn run_periodic(
    name: &str,
    ticker: &mut Ticker,
    stop: &StopToken,
    mut cycle: impl FnMut(u64),
    mut on_overrun: impl FnMut(Duration),
) {
    while !stop.is_stopped() {
        let timestamp = ticker.begin_cycle();
        if panic::catch_unwind(AssertUnwindSafe(|| cycle(timestamp))).is_err() {
            error!("{name}: cycle panicked, continuing with the next period");
        }
        match ticker.finish_cycle(stop) {
            TickOutcome::OnTime => {}
            TickOutcome::Overrun(elapsed) => {
                warn!(
                    "{name}: cycle took {} ms, period is {} ms",
                    elapsed.as_millis(),
                    ticker.period().as_millis()
                );
                on_overrun(elapsed);
            }
            TickOutcome::Stopped => break,
        }
    }
}

//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters.  All tests run on the host with no real
//! hardware required; loop cadence runs on virtual time wherever the
//! test does not need real threads.

mod mock_hw;
mod service_tests;

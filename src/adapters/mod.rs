//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements        | Connects to                       |
//! |---------------|-------------------|-----------------------------------|
//! | `hardware`    | SensorPort        | RTD, humidity, O2, serial CO2     |
//! |               | ActuatorPort      | relays (GPIO), pump (PWM)         |
//! | `sim`         | SensorPort        | first-order chamber model         |
//! |               | ActuatorPort      |                                   |
//! | `datalog`     | Persistence       | CSV file                          |
//! | `observers`   | Broadcaster       | in-process `mpsc` receivers       |
//! | `log_sink`    | EventSink         | `log` facade                      |
//! | `config_file` | ConfigPort        | JSON file                         |

pub mod config_file;
pub mod datalog;
pub mod hardware;
pub mod log_sink;
pub mod observers;
pub mod sim;

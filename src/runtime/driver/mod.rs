//! Terminal session drivers: own the mode switches around a runtime.

mod cli;

pub use cli::{DriverError, DriverResult, TerminalDriver};

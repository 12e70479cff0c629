mod types;

pub use types::{Result, RuntimeError};

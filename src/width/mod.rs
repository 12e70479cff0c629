//! Terminal display width helpers.
//!
//! ANSI-aware width calculation for rendered content, so callers can
//! measure styled frame lines without counting escape bytes.

mod utils;

pub use utils::display_width;

//! ANSI screen differ.
//!
//! Turns "previous frame + new frame" into the minimal escape sequence
//! that updates the terminal in place. Pure with respect to the
//! terminal: the caller writes the returned patch.

mod core;

pub use core::{AnsiDiffer, BufferMap};

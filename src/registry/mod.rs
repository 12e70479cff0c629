//! Per-identity local state registry.
//!
//! Gives stateless render calls persistent state across frames: each
//! `state(id)` call allocates a fresh record with lifecycle and
//! listener bookkeeping; the caller keeps the returned handle for as
//! long as the widget lives. Identity persistence is the caller's job;
//! the registry never reconciles records by call order.

mod core;

pub use core::{Engine, RecordId, StateHandle, StateRegistry};

//! Runtime engine underneath a terminal-UI component library.
//!
//! Four tightly coupled pieces form the core: the per-identity state
//! registry (persistent, reconciled state for stateless render calls),
//! the global focus manager built on it, the render scheduler that
//! drives the draw/input loop, and the ANSI screen differ that turns a
//! freshly rendered frame into a minimal terminal update. A runtime
//! façade wires them together and owns the terminal session lifecycle.
//!
//! Layout and styling are out of scope: the engine composites whatever
//! an external [`Surface`] renders.

pub mod diff;
pub mod error;
pub mod events;
pub mod geometry;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod runtime;
pub mod surface;
pub mod width;

pub use diff::{AnsiDiffer, BufferMap};
pub use error::{Result, RuntimeError};
pub use events::{DispatchTables, Event, EventKind, Listener, ListenerId};
pub use geometry::{Rect, Size};
pub use logging::{
    LogEvent, LogFields, LogLevel, LogSink, Logger, LoggingError, LoggingResult, MemorySink,
};
pub use metrics::{MetricSnapshot, RuntimeMetrics};
pub use registry::{Engine, RecordId, StateHandle, StateRegistry};
pub use runtime::driver::{DriverError, DriverResult, TerminalDriver};
pub use runtime::focus::{Direction, FocusManager};
pub use runtime::{Runtime, RuntimeConfig, Sanitizer};
pub use surface::{Surface, TextSurface, UnmountHook};
pub use width::display_width;

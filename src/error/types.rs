use thiserror::Error;

/// Unified result type for the runtime engine.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors surfaced by the runtime engine.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Startup refused before any terminal mode was touched.
    #[error("stdout is not an interactive terminal")]
    NotInteractive,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

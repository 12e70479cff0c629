use std::io::{self, Write};
use std::rc::Rc;

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::tty::IsTty;
use thiserror::Error;

use crate::error::RuntimeError;
use crate::geometry::Size;
use crate::runtime::Runtime;
use crate::surface::Surface;

pub type DriverResult<T> = std::result::Result<T, DriverError>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("terminal error: {0}")]
    Terminal(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Owns a [`Runtime`] and the terminal session around it: raw mode,
/// alternate screen, hidden cursor, and mouse capture on the way in;
/// everything restored through a runtime sanitizer on the way out.
///
/// Refuses to start when stdout is not an interactive terminal, before
/// a single mode switch is sent, so a failed startup never leaves the
/// terminal half-configured.
pub struct TerminalDriver {
    runtime: Runtime,
}

impl TerminalDriver {
    pub fn new(runtime: Runtime) -> Self {
        Self { runtime }
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.runtime
    }

    pub fn run(mut self, component: impl FnOnce() -> Rc<dyn Surface>) -> DriverResult<()> {
        let mut stdout = io::stdout();
        if !stdout.is_tty() {
            return Err(DriverError::Runtime(RuntimeError::NotInteractive));
        }

        // Teardown is a sanitizer so it runs exactly once, after the
        // loop has stopped, whichever exit path fires, and is
        // registered before any mode is entered.
        self.runtime.add_sanitizer(restore_terminal);

        if let Err(err) = enter_session(&mut stdout) {
            self.runtime.close();
            return Err(err);
        }

        let (width, height) = terminal::size()?;
        self.runtime.resize(Size::new(width, height));

        self.runtime.render(&mut stdout, component)?;
        Ok(())
    }
}

fn enter_session(stdout: &mut impl Write) -> DriverResult<()> {
    terminal::enable_raw_mode().map_err(|err| DriverError::Terminal(err.to_string()))?;
    execute!(
        stdout,
        EnterAlternateScreen,
        Hide,
        EnableMouseCapture,
        MoveTo(0, 0)
    )?;
    Ok(())
}

/// Best-effort restoration: show cursor, release the mouse, return to
/// the primary buffer, leave raw mode.
fn restore_terminal() -> io::Result<()> {
    let mut stdout = io::stdout();
    execute!(stdout, Show, DisableMouseCapture, LeaveAlternateScreen)?;
    terminal::disable_raw_mode()?;
    Ok(())
}

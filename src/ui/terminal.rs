//! Raw-mode ownership for the controlling terminal.
//!
//! Raw mode is held only while a response streams, so the keystroke watcher
//! sees single key presses without echo. A [`RawModeGuard`] restores the mode
//! that was active before acquisition, exactly once, on every exit path.

use std::fmt;
use std::io::{self, IsTerminal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ratatui::crossterm::terminal::{disable_raw_mode, enable_raw_mode, is_raw_mode_enabled};
use tracing::{debug, warn};

/// The terminal device operations raw-mode handling needs.
pub trait TerminalControl: Send + Sync {
    /// Whether standard input is attached to an interactive terminal.
    fn is_interactive(&self) -> bool;
    fn is_raw(&self) -> io::Result<bool>;
    fn enable_raw(&self) -> io::Result<()>;
    fn disable_raw(&self) -> io::Result<()>;
}

/// The process's real terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrosstermTerminal;

impl TerminalControl for CrosstermTerminal {
    fn is_interactive(&self) -> bool {
        io::stdin().is_terminal()
    }

    fn is_raw(&self) -> io::Result<bool> {
        is_raw_mode_enabled()
    }

    fn enable_raw(&self) -> io::Result<()> {
        enable_raw_mode()
    }

    fn disable_raw(&self) -> io::Result<()> {
        disable_raw_mode()
    }
}

#[derive(Debug)]
pub enum AcquireError {
    /// Input is not a terminal. Interruption is unsupported, not an error.
    NotATerminal,
    /// Another guard from this controller is still live.
    AlreadyHeld,
    /// The mode change itself failed.
    Mode(io::Error),
}

impl fmt::Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquireError::NotATerminal => write!(f, "standard input is not a terminal"),
            AcquireError::AlreadyHeld => write!(f, "raw mode is already held"),
            AcquireError::Mode(err) => write!(f, "could not enter raw mode: {err}"),
        }
    }
}

impl std::error::Error for AcquireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AcquireError::Mode(err) => Some(err),
            _ => None,
        }
    }
}

/// Hands out raw-mode guards, one at a time. Clones share the same terminal
/// and the same "held" flag.
#[derive(Clone)]
pub struct RawModeController {
    terminal: Arc<dyn TerminalControl>,
    held: Arc<AtomicBool>,
}

impl RawModeController {
    pub fn new(terminal: Arc<dyn TerminalControl>) -> Self {
        Self {
            terminal,
            held: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn crossterm() -> Self {
        Self::new(Arc::new(CrosstermTerminal))
    }

    pub fn is_interactive(&self) -> bool {
        self.terminal.is_interactive()
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    /// Captures the current mode and switches to raw mode.
    pub fn acquire(&self) -> Result<RawModeGuard, AcquireError> {
        if !self.terminal.is_interactive() {
            return Err(AcquireError::NotATerminal);
        }
        if self
            .held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AcquireError::AlreadyHeld);
        }

        let was_raw = match self.terminal.is_raw() {
            Ok(was_raw) => was_raw,
            Err(err) => {
                self.held.store(false, Ordering::SeqCst);
                return Err(AcquireError::Mode(err));
            }
        };
        if !was_raw {
            if let Err(err) = self.terminal.enable_raw() {
                self.held.store(false, Ordering::SeqCst);
                return Err(AcquireError::Mode(err));
            }
        }

        debug!(was_raw, "raw mode acquired");
        Ok(RawModeGuard {
            terminal: self.terminal.clone(),
            held: self.held.clone(),
            was_raw,
            released: false,
        })
    }
}

/// The terminal configuration captured before entering raw mode.
#[must_use = "dropping the guard restores the terminal immediately"]
pub struct RawModeGuard {
    terminal: Arc<dyn TerminalControl>,
    held: Arc<AtomicBool>,
    was_raw: bool,
    released: bool,
}

impl RawModeGuard {
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Whether output written now goes to a raw terminal.
    pub fn is_raw(&self) -> bool {
        !self.released || self.was_raw
    }

    /// Restores the captured mode. Later calls do nothing.
    pub fn release(&mut self) -> io::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let result = if self.was_raw {
            Ok(())
        } else {
            self.terminal.disable_raw()
        };
        self.held.store(false, Ordering::SeqCst);
        debug!("raw mode released");
        result
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(error = %err, "failed to restore terminal mode");
        }
    }
}

/// Leaves raw mode before the default panic output is printed.
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if is_raw_mode_enabled().unwrap_or(false) {
            let _ = disable_raw_mode();
        }
        default_hook(info);
    }));
}

use std::error::Error;
use std::fmt;
use std::io;

use crate::core::backend::BackendError;
use crate::core::providers::ResolutionError;

/// Everything the session loop recovers from. Each variant is reported to
/// the user as one line and the session continues.
#[derive(Debug)]
pub enum SessionError {
    /// Standard input is not an interactive terminal; keystroke interruption
    /// is unavailable.
    NotATerminal,
    /// No usable provider, model, or credential.
    NotConfigured(ResolutionError),
    /// The backend failed while streaming.
    Backend(BackendError),
    /// Raw mode could not be entered or left.
    TerminalMode(io::Error),
    /// Settings, credential, or transcript I/O failed.
    Persistence(String),
    /// A chat message arrived while another response is still streaming.
    StreamBusy,
}

impl SessionError {
    /// The single line shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::NotATerminal => {
                "Input is not a terminal; responses cannot be interrupted.".to_string()
            }
            SessionError::NotConfigured(reason) => format!("Configuration needed: {reason}"),
            SessionError::Backend(err) => format!("Response failed: {err}"),
            SessionError::TerminalMode(err) => {
                format!("Terminal mode unavailable ({err}); streaming without interruption.")
            }
            SessionError::Persistence(message) => format!("Could not save: {message}"),
            SessionError::StreamBusy => {
                "A response is already streaming; wait for it to finish.".to_string()
            }
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NotATerminal => write!(f, "standard input is not a terminal"),
            SessionError::NotConfigured(reason) => write!(f, "not configured: {reason}"),
            SessionError::Backend(err) => write!(f, "{err}"),
            SessionError::TerminalMode(err) => write!(f, "terminal mode error: {err}"),
            SessionError::Persistence(message) => write!(f, "persistence error: {message}"),
            SessionError::StreamBusy => write!(f, "a stream is already active"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionError::NotConfigured(reason) => Some(reason),
            SessionError::Backend(err) => Some(err),
            SessionError::TerminalMode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResolutionError> for SessionError {
    fn from(err: ResolutionError) -> Self {
        SessionError::NotConfigured(err)
    }
}

impl From<BackendError> for SessionError {
    fn from(err: BackendError) -> Self {
        SessionError::Backend(err)
    }
}

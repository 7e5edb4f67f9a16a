//! Per-run session state shared between the loop and command handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::config::Settings;
use crate::core::credentials::CredentialStore;
use crate::core::error::SessionError;
use crate::core::providers::{resolve_session, ModelSelection, ProviderSession};

pub struct Session {
    settings: Settings,
    exit_requested: AtomicBool,
    stream_active: Arc<AtomicBool>,
    pending_line: Option<String>,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            exit_requested: AtomicBool::new(false),
            stream_active: Arc::new(AtomicBool::new(false)),
            pending_line: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_model(&mut self, selection: &ModelSelection) {
        self.settings.provider = Some(selection.provider.clone());
        self.settings.model = Some(selection.model.clone());
    }

    pub fn request_exit(&self) {
        self.exit_requested.store(true, Ordering::SeqCst);
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::SeqCst)
    }

    /// Remembers a submitted line until it is dispatched.
    pub fn submit_line(&mut self, line: String) {
        self.pending_line = Some(line);
    }

    pub fn take_pending_line(&mut self) -> Option<String> {
        self.pending_line.take()
    }

    pub fn is_streaming(&self) -> bool {
        self.stream_active.load(Ordering::SeqCst)
    }

    /// Claims the single streaming slot. The slot is released when the
    /// returned guard drops.
    pub fn begin_stream(&self) -> Result<ActiveStreamGuard, SessionError> {
        self.stream_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| SessionError::StreamBusy)?;
        Ok(ActiveStreamGuard {
            slot: self.stream_active.clone(),
        })
    }

    /// Checked before any producer exists, so an unconfigured session never
    /// creates a stream.
    pub fn resolve_backend(
        &self,
        credentials: &dyn CredentialStore,
    ) -> Result<ProviderSession, SessionError> {
        resolve_session(&self.settings, credentials, |key| std::env::var(key).ok())
            .map_err(SessionError::from)
    }
}

#[must_use = "dropping the guard releases the streaming slot"]
pub struct ActiveStreamGuard {
    slot: Arc<AtomicBool>,
}

impl Drop for ActiveStreamGuard {
    fn drop(&mut self) {
        self.slot.store(false, Ordering::SeqCst);
    }
}

//! The interactive session loop.
//!
//! ```text
//! AwaitingInput -> Dispatching -> CommandExecuting -> AwaitingInput
//!                              -> Streaming        -> AwaitingInput
//! any state     -> Exited(reason)
//! ```

mod input;
mod stream;

pub use input::{is_recoverable_read_error, LineSource, StdinLineReader};

use std::io::Write;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::{is_command, process_input, CommandContext, CommandResult, SecretPrompt};
use crate::core::backend::BackendFactory;
use crate::core::config::SettingsStore;
use crate::core::credentials::CredentialStore;
use crate::core::session::Session;
use crate::core::workspace::Transcript;
use crate::ui::keystroke::KeyProbe;
use crate::ui::renderer::Renderer;
use crate::ui::terminal::RawModeController;

/// Builds a fresh keyboard probe for each streamed response.
pub type ProbeFactory = Box<dyn Fn() -> Box<dyn KeyProbe> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// `/exit`, `/quit`, or their bare forms.
    Command,
    EndOfInput,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingInput,
    Dispatching,
    CommandExecuting,
    Streaming,
    Exited(ExitReason),
}

/// Collaborators the loop drives.
pub struct ChatServices {
    pub credentials: Box<dyn CredentialStore>,
    pub backends: Arc<dyn BackendFactory>,
    pub terminal: RawModeController,
    pub probes: ProbeFactory,
    pub secrets: Box<dyn SecretPrompt>,
    pub renderer: Renderer,
    pub settings_store: SettingsStore,
    pub transcript: Option<Transcript>,
    pub dev: bool,
}

pub struct ChatLoop<L, W> {
    session: Session,
    services: ChatServices,
    lines: L,
    out: W,
    shutdown: CancellationToken,
    state: LoopState,
    warned_not_a_terminal: bool,
}

impl<L, W> ChatLoop<L, W>
where
    L: LineSource,
    W: Write,
{
    pub fn new(
        session: Session,
        services: ChatServices,
        lines: L,
        out: W,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            session,
            services,
            lines,
            out,
            shutdown,
            state: LoopState::AwaitingInput,
            warned_not_a_terminal: false,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs until an exit command, end of input, or shutdown.
    pub async fn run(&mut self) -> ExitReason {
        loop {
            if let LoopState::Exited(reason) = self.state {
                info!(reason = ?reason, "session loop exited");
                return reason;
            }
            let next = self.step().await;
            if next != self.state {
                debug!(from = ?self.state, to = ?next, "session state");
            }
            self.state = next;
        }
    }

    async fn step(&mut self) -> LoopState {
        match self.state {
            LoopState::AwaitingInput => self.await_input().await,
            LoopState::Dispatching => self.dispatch(),
            LoopState::CommandExecuting => self.execute_command(),
            LoopState::Streaming => {
                if let Some(message) = self.session.take_pending_line() {
                    self.stream_message(message).await;
                }
                self.after_stream()
            }
            LoopState::Exited(reason) => LoopState::Exited(reason),
        }
    }

    async fn await_input(&mut self) -> LoopState {
        if self.shutdown.is_cancelled() {
            return LoopState::Exited(ExitReason::Shutdown);
        }
        if self.session.exit_requested() {
            return LoopState::Exited(ExitReason::Command);
        }
        self.write_prompt();

        let line = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return LoopState::Exited(ExitReason::Shutdown),
            line = self.lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) if line.trim().is_empty() => LoopState::AwaitingInput,
            Ok(Some(line)) => {
                self.session.submit_line(line);
                LoopState::Dispatching
            }
            Ok(None) => {
                self.say("");
                LoopState::Exited(ExitReason::EndOfInput)
            }
            Err(err) if is_recoverable_read_error(&err) => {
                warn!(error = %err, "discarding unreadable input line");
                self.say(&format!("Could not read that line ({err}); please try again."));
                LoopState::AwaitingInput
            }
            Err(err) => {
                warn!(error = %err, "failed to read input");
                LoopState::Exited(ExitReason::EndOfInput)
            }
        }
    }

    fn dispatch(&mut self) -> LoopState {
        let Some(line) = self.session.take_pending_line() else {
            return LoopState::AwaitingInput;
        };
        let next = if is_command(&line) {
            LoopState::CommandExecuting
        } else {
            LoopState::Streaming
        };
        self.session.submit_line(line);
        next
    }

    fn execute_command(&mut self) -> LoopState {
        let Some(line) = self.session.take_pending_line() else {
            return LoopState::AwaitingInput;
        };
        let mut ctx = CommandContext {
            session: &mut self.session,
            credentials: self.services.credentials.as_ref(),
            secrets: self.services.secrets.as_ref(),
            settings_store: &self.services.settings_store,
            out: &mut self.out,
            dev: self.services.dev,
        };
        match process_input(&mut ctx, &line) {
            CommandResult::Exit => LoopState::Exited(ExitReason::Command),
            CommandResult::Continue => LoopState::AwaitingInput,
            CommandResult::ProcessAsMessage(message) => {
                self.session.submit_line(message);
                LoopState::Streaming
            }
        }
    }

    fn after_stream(&self) -> LoopState {
        if self.shutdown.is_cancelled() {
            LoopState::Exited(ExitReason::Shutdown)
        } else {
            LoopState::AwaitingInput
        }
    }

    fn write_prompt(&mut self) {
        let result = write!(self.out, "> ").and_then(|_| self.out.flush());
        if let Err(err) = result {
            debug!(error = %err, "failed to write prompt");
        }
    }

    fn say(&mut self, message: &str) {
        if let Err(err) = writeln!(self.out, "{message}") {
            warn!(error = %err, "failed to write to terminal");
        }
    }
}

use std::io::Write;

use tracing::{debug, warn};

use super::{ChatLoop, LineSource};
use crate::core::chat_stream::StreamProducer;
use crate::core::error::SessionError;
use crate::core::interrupt::InterruptSignal;
use crate::core::workspace::TranscriptRole;
use crate::ui::keystroke;
use crate::ui::renderer::{RenderOutcome, INTERRUPTED_MARKER};
use crate::ui::terminal::AcquireError;

impl<L, W> ChatLoop<L, W>
where
    L: LineSource,
    W: Write,
{
    /// Streams one response for `message`, racing the keystroke watcher.
    pub(super) async fn stream_message(&mut self, message: String) {
        let _slot = match self.session.begin_stream() {
            Ok(slot) => slot,
            Err(err) => {
                self.say(&err.user_message());
                return;
            }
        };
        let provider_session = match self
            .session
            .resolve_backend(self.services.credentials.as_ref())
        {
            Ok(provider_session) => provider_session,
            Err(err) => {
                debug!(error = %err, "message not sent");
                self.say(&err.user_message());
                return;
            }
        };

        self.record(TranscriptRole::User, &message);

        let producer = StreamProducer::new(self.services.backends.connect(provider_session));
        let scope = self.shutdown.child_token();
        let signal = InterruptSignal::new();

        let mut guard = match self.services.terminal.acquire() {
            Ok(guard) => Some(guard),
            Err(AcquireError::NotATerminal) => {
                if !self.warned_not_a_terminal {
                    self.warned_not_a_terminal = true;
                    self.say(&SessionError::NotATerminal.user_message());
                }
                debug!("input is not a terminal; streaming without interruption");
                None
            }
            Err(AcquireError::AlreadyHeld) => {
                warn!("raw mode already held; streaming without interruption");
                None
            }
            Err(AcquireError::Mode(err)) => {
                let err = SessionError::TerminalMode(err);
                warn!(error = %err, "streaming without interruption");
                self.say(&err.user_message());
                None
            }
        };
        let watcher = guard.as_ref().map(|_| {
            tokio::spawn(keystroke::watch(
                (self.services.probes)(),
                signal.clone(),
                scope.child_token(),
            ))
        });

        let mut handle = producer.produce(message, &scope);
        let summary = self
            .services
            .renderer
            .render(&mut self.out, &mut handle, &signal, guard.as_mut())
            .await;

        scope.cancel();
        if let Some(watcher) = watcher {
            match watcher.await {
                Ok(outcome) => debug!(outcome = ?outcome, "keystroke watcher finished"),
                Err(err) => warn!(error = %err, "keystroke watcher panicked"),
            }
        }
        if let Some(mut guard) = guard.take() {
            if let Err(err) = guard.release() {
                self.say(&SessionError::TerminalMode(err).user_message());
            }
        }

        match &summary.outcome {
            RenderOutcome::Completed => {
                self.end_line(&summary.text);
                self.record(TranscriptRole::Assistant, &summary.text);
            }
            RenderOutcome::Interrupted => {
                let partial = format!("{}\n{INTERRUPTED_MARKER}", summary.text);
                self.record(TranscriptRole::Assistant, &partial);
            }
            RenderOutcome::Failed(reason) => {
                self.end_line(&summary.text);
                self.say(reason);
                self.record(TranscriptRole::App, reason);
            }
        }
        debug!(
            stream_id = handle.id(),
            units = summary.units,
            fragments = handle.fragments_emitted(),
            "response finished"
        );
    }

    fn end_line(&mut self, rendered: &str) {
        if !rendered.is_empty() && !rendered.ends_with('\n') {
            self.say("");
        }
    }

    fn record(&self, role: TranscriptRole, content: &str) {
        if let Some(transcript) = &self.services.transcript {
            if let Err(err) = transcript.append(role, content) {
                warn!(error = %err, path = %transcript.path().display(), "failed to append to transcript");
            }
        }
    }
}

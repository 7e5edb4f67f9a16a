//! Writes a streaming response one user-perceived character at a time and
//! stops at the first unit boundary after an interrupt.

use std::io::{self, Write};
use std::time::Duration;

use tracing::{debug, warn};
use unicode_segmentation::UnicodeSegmentation;

use crate::core::backend::BackendError;
use crate::core::chat_stream::{StreamHandle, StreamState};
use crate::core::error::SessionError;
use crate::core::interrupt::InterruptSignal;
use crate::ui::terminal::RawModeGuard;

pub const DEFAULT_UNIT_DELAY: Duration = Duration::from_millis(10);
pub const INTERRUPTED_MARKER: &str = "[interrupted]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Completed,
    Interrupted,
    /// The line reported to the user.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSummary {
    pub outcome: RenderOutcome,
    /// Units written before the render stopped.
    pub units: usize,
    /// Exactly the text that reached the terminal.
    pub text: String,
}

enum Step {
    Next(Option<Result<String, BackendError>>),
    Interrupted,
}

#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    unit_delay: Duration,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(DEFAULT_UNIT_DELAY)
    }
}

impl Renderer {
    pub fn new(unit_delay: Duration) -> Self {
        Self { unit_delay }
    }

    pub fn unit_delay(&self) -> Duration {
        self.unit_delay
    }

    /// Drains `handle` into `out` until the stream ends, fails, `signal` is
    /// raised, or the handle's scope is cancelled.
    ///
    /// On interrupt the producer is cancelled and `guard` (when given) is
    /// released before the marker is written. On the other outcomes the
    /// guard is left to the caller. No trailing newline is written after a
    /// completed or failed response.
    pub async fn render<W: Write>(
        &self,
        out: &mut W,
        handle: &mut StreamHandle,
        signal: &InterruptSignal,
        mut guard: Option<&mut RawModeGuard>,
    ) -> RenderSummary {
        let mut units = 0usize;
        let mut text = String::new();

        let outcome = 'stream: loop {
            if signal.is_raised() {
                break RenderOutcome::Interrupted;
            }

            let step = tokio::select! {
                biased;
                _ = signal.raised() => Step::Interrupted,
                next = handle.next_fragment() => Step::Next(next),
            };

            let fragment = match step {
                Step::Interrupted => break RenderOutcome::Interrupted,
                // The scope was cancelled from outside (shutdown).
                Step::Next(None) if handle.state() == StreamState::Cancelled => {
                    break RenderOutcome::Interrupted
                }
                Step::Next(None) => break RenderOutcome::Completed,
                Step::Next(Some(Err(err))) => {
                    break RenderOutcome::Failed(SessionError::from(err).user_message())
                }
                Step::Next(Some(Ok(fragment))) => fragment,
            };

            let raw = guard.as_deref().is_some_and(RawModeGuard::is_raw);
            for unit in fragment.graphemes(true) {
                if let Err(err) = write_unit(out, unit, raw) {
                    handle.cancel();
                    break 'stream RenderOutcome::Failed(format!("Terminal write failed: {err}"));
                }
                units += 1;
                text.push_str(unit);

                if signal.is_raised() || handle.is_cancelled() {
                    break 'stream RenderOutcome::Interrupted;
                }
                if !self.unit_delay.is_zero() {
                    tokio::select! {
                        biased;
                        _ = signal.raised() => break 'stream RenderOutcome::Interrupted,
                        _ = handle.cancelled() => break 'stream RenderOutcome::Interrupted,
                        _ = tokio::time::sleep(self.unit_delay) => {}
                    }
                }
            }
        };

        if outcome == RenderOutcome::Interrupted {
            handle.cancel();
            if let Some(guard) = guard.as_deref_mut() {
                if let Err(err) = guard.release() {
                    warn!(error = %err, "failed to restore terminal after interrupt");
                }
            }
            let raw = guard.as_deref().is_some_and(RawModeGuard::is_raw);
            if let Err(err) = write_marker(out, &text, raw) {
                debug!(error = %err, "could not write interrupt marker");
            }
        }

        debug!(units, outcome = ?outcome, stream_id = handle.id(), "render finished");
        RenderSummary {
            outcome,
            units,
            text,
        }
    }
}

fn write_unit<W: Write>(out: &mut W, unit: &str, raw: bool) -> io::Result<()> {
    if raw && unit.contains('\n') && !unit.contains('\r') {
        out.write_all(unit.replace('\n', "\r\n").as_bytes())?;
    } else {
        out.write_all(unit.as_bytes())?;
    }
    out.flush()
}

fn write_marker<W: Write>(out: &mut W, rendered: &str, raw: bool) -> io::Result<()> {
    let newline = if raw { "\r\n" } else { "\n" };
    if !rendered.is_empty() && !rendered.ends_with('\n') {
        out.write_all(newline.as_bytes())?;
    }
    write!(out, "{INTERRUPTED_MARKER}{newline}")?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chat_stream::StreamProducer;
    use crate::ui::terminal::tests::FakeTerminal;
    use crate::ui::terminal::RawModeController;
    use crate::utils::test_utils::{ScriptedBackend, SharedBuffer};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    /// Raises the signal once the given number of writes have gone through.
    struct RaisingWriter {
        inner: SharedBuffer,
        signal: InterruptSignal,
        after_writes: usize,
        writes: usize,
    }

    impl Write for RaisingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let written = self.inner.write(buf)?;
            self.writes += 1;
            if self.writes == self.after_writes {
                self.signal.raise();
            }
            Ok(written)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn handle_for(backend: ScriptedBackend) -> StreamHandle {
        StreamProducer::new(Arc::new(backend)).produce("prompt", &CancellationToken::new())
    }

    #[tokio::test]
    async fn completed_stream_writes_exact_text() {
        let mut handle = handle_for(ScriptedBackend::fragments(&["Hel", "lo"]));
        let mut out = SharedBuffer::new();

        let summary = Renderer::new(Duration::ZERO)
            .render(&mut out, &mut handle, &InterruptSignal::new(), None)
            .await;

        assert_eq!(summary.outcome, RenderOutcome::Completed);
        assert_eq!(summary.units, 5);
        assert_eq!(out.contents(), "Hello");
        assert_eq!(handle.state(), StreamState::Completed);
    }

    #[tokio::test]
    async fn interrupt_after_second_unit_stops_there() {
        let a = "A".repeat(64);
        let b = "B".repeat(64);
        let backend = ScriptedBackend::fragments(&[a.as_str(), b.as_str()]);
        let mut handle = handle_for(backend);
        let signal = InterruptSignal::new();
        let buffer = SharedBuffer::new();
        let mut out = RaisingWriter {
            inner: buffer.clone(),
            signal: signal.clone(),
            after_writes: 2,
            writes: 0,
        };

        let summary = Renderer::new(Duration::ZERO)
            .render(&mut out, &mut handle, &signal, None)
            .await;

        assert_eq!(summary.outcome, RenderOutcome::Interrupted);
        assert_eq!(summary.units, 2);
        assert_eq!(summary.text, "AA");
        assert_eq!(buffer.contents(), format!("AA\n{INTERRUPTED_MARKER}\n"));
        assert_eq!(handle.state(), StreamState::Cancelled);
    }

    #[tokio::test]
    async fn interruption_renders_fewer_units_than_total() {
        let fragments = ["one ", "two ", "three ", "four"];
        let total: usize = fragments.iter().map(|f| f.graphemes(true).count()).sum();

        for after in 1..total {
            let mut handle = handle_for(ScriptedBackend::fragments(&fragments));
            let signal = InterruptSignal::new();
            let mut out = RaisingWriter {
                inner: SharedBuffer::new(),
                signal: signal.clone(),
                after_writes: after,
                writes: 0,
            };
            let summary = Renderer::new(Duration::ZERO)
                .render(&mut out, &mut handle, &signal, None)
                .await;
            assert_eq!(summary.outcome, RenderOutcome::Interrupted);
            assert!(summary.units < total, "after {after}: {} units", summary.units);
        }
    }

    #[tokio::test]
    async fn raised_signal_during_pacing_interrupts_hanging_stream() {
        let backend = ScriptedBackend::fragments(&["x"]).hanging();
        let released = backend.released.clone();
        let mut handle = handle_for(backend);
        let signal = InterruptSignal::new();
        let raiser = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            raiser.raise();
        });

        let mut out = SharedBuffer::new();
        let summary = tokio::time::timeout(
            Duration::from_secs(1),
            Renderer::new(Duration::from_millis(1)).render(&mut out, &mut handle, &signal, None),
        )
        .await
        .expect("render returns after interrupt");

        assert_eq!(summary.outcome, RenderOutcome::Interrupted);
        assert_eq!(summary.text, "x");
        handle.finished().await;
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancelled_scope_counts_as_interrupted() {
        let scope = CancellationToken::new();
        let mut handle = StreamProducer::new(Arc::new(ScriptedBackend::fragments(&["a"]).hanging()))
            .produce("prompt", &scope);
        let canceller = scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let mut out = SharedBuffer::new();
        let summary = tokio::time::timeout(
            Duration::from_secs(1),
            Renderer::new(Duration::ZERO).render(&mut out, &mut handle, &InterruptSignal::new(), None),
        )
        .await
        .expect("render returns after cancellation");

        assert_eq!(summary.outcome, RenderOutcome::Interrupted);
        assert!(out.contents().ends_with(&format!("{INTERRUPTED_MARKER}\n")));
    }

    #[tokio::test]
    async fn cancelling_scope_stops_rendering_buffered_fragments() {
        let fragments: Vec<String> = (0..20).map(|i| format!("{i:0>10}")).collect();
        let fragments: Vec<&str> = fragments.iter().map(String::as_str).collect();
        let scope = CancellationToken::new();
        let mut handle = StreamProducer::new(Arc::new(ScriptedBackend::fragments(&fragments).hanging()))
            .produce("prompt", &scope);
        let canceller = scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            canceller.cancel();
        });

        let mut out = SharedBuffer::new();
        let summary = tokio::time::timeout(
            Duration::from_secs(1),
            Renderer::new(Duration::from_millis(2)).render(
                &mut out,
                &mut handle,
                &InterruptSignal::new(),
                None,
            ),
        )
        .await
        .expect("render stops soon after cancellation");

        assert_eq!(summary.outcome, RenderOutcome::Interrupted);
        assert!(summary.units < 100, "{} of 200 units rendered", summary.units);
        assert_eq!(handle.state(), StreamState::Cancelled);
        assert!(out.contents().ends_with(&format!("{INTERRUPTED_MARKER}\n")));
    }

    #[tokio::test]
    async fn backend_failure_is_reported() {
        let backend = ScriptedBackend::with_results(vec![
            Ok("par".to_string()),
            Err(BackendError::Stream("connection reset".into())),
        ]);
        let mut handle = handle_for(backend);
        let mut out = SharedBuffer::new();

        let summary = Renderer::new(Duration::ZERO)
            .render(&mut out, &mut handle, &InterruptSignal::new(), None)
            .await;

        match summary.outcome {
            RenderOutcome::Failed(reason) => {
                assert!(reason.starts_with("Response failed"), "{reason}");
                assert!(reason.contains("connection reset"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(out.contents(), "par");
    }

    #[tokio::test]
    async fn terminal_mode_is_restored_for_every_outcome() {
        let scripts = [
            (ScriptedBackend::fragments(&["done"]), false),
            (
                ScriptedBackend::with_results(vec![Err(BackendError::Request("refused".into()))]),
                false,
            ),
            (ScriptedBackend::fragments(&["abc"]).hanging(), true),
        ];

        for (backend, interrupt) in scripts {
            let terminal = FakeTerminal::interactive();
            let controller = RawModeController::new(terminal.clone());
            let before = terminal.is_raw_now();

            let mut guard = controller.acquire().expect("acquire");
            let mut handle = handle_for(backend);
            let signal = InterruptSignal::new();
            if interrupt {
                signal.raise();
            }
            let mut out = SharedBuffer::new();
            Renderer::new(Duration::ZERO)
                .render(&mut out, &mut handle, &signal, Some(&mut guard))
                .await;
            guard.release().expect("release");

            assert_eq!(terminal.is_raw_now(), before);
            assert!(!controller.is_held());
        }
    }

    #[tokio::test]
    async fn raw_mode_output_uses_carriage_returns() {
        let terminal = FakeTerminal::interactive();
        let controller = RawModeController::new(terminal);
        let mut guard = controller.acquire().expect("acquire");
        let mut handle = handle_for(ScriptedBackend::fragments(&["a\nb"]));
        let mut out = SharedBuffer::new();

        let summary = Renderer::new(Duration::ZERO)
            .render(&mut out, &mut handle, &InterruptSignal::new(), Some(&mut guard))
            .await;

        assert_eq!(summary.text, "a\nb");
        assert_eq!(out.contents(), "a\r\nb");
    }
}

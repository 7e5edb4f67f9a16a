//! Watches for a key press while a response streams.

use std::io;
use std::time::Duration;

use ratatui::crossterm::event::{self, Event, KeyEventKind};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::interrupt::InterruptSignal;

/// Upper bound on the time between two readiness checks.
pub const POLL_QUANTUM: Duration = Duration::from_millis(10);

/// Non-blocking view of pending keyboard input.
pub trait KeyProbe: Send {
    /// Whether a key press is waiting. Must never block.
    fn key_available(&mut self) -> io::Result<bool>;
    /// Discards everything still buffered.
    fn drain(&mut self) -> io::Result<()>;
}

/// Reads crossterm's event queue with a zero timeout. Only valid while the
/// terminal is in raw mode.
#[derive(Debug, Default)]
pub struct CrosstermKeyProbe;

impl KeyProbe for CrosstermKeyProbe {
    fn key_available(&mut self) -> io::Result<bool> {
        while event::poll(Duration::ZERO)? {
            match event::read()? {
                Event::Key(key) if key.kind != KeyEventKind::Release => return Ok(true),
                // resize, focus, mouse, paste
                _ => continue,
            }
        }
        Ok(false)
    }

    fn drain(&mut self) -> io::Result<()> {
        while event::poll(Duration::ZERO)? {
            let _ = event::read()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// A key was pressed and the signal raised.
    Interrupted,
    /// The scope was cancelled first.
    Stopped,
    /// The probe failed; interruption is off for this stream.
    Disabled,
}

/// Polls `probe` until a key arrives or `stop` is cancelled. Raises `signal`
/// at most once.
pub async fn watch(
    mut probe: Box<dyn KeyProbe>,
    signal: InterruptSignal,
    stop: CancellationToken,
) -> WatchOutcome {
    let mut ticker = tokio::time::interval(POLL_QUANTUM);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => return WatchOutcome::Stopped,
            _ = ticker.tick() => {}
        }

        match probe.key_available() {
            Ok(false) => {}
            Ok(true) => {
                if let Err(err) = probe.drain() {
                    debug!(error = %err, "could not drain pending input");
                }
                signal.raise();
                debug!("keystroke detected; interrupt raised");
                return WatchOutcome::Interrupted;
            }
            Err(err) => {
                warn!(error = %err, "keyboard probe failed; interruption disabled");
                return WatchOutcome::Disabled;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Reports a key press after a given number of empty polls.
    pub(crate) struct ScriptedProbe {
        pub key_after: Option<usize>,
        pub fail: bool,
        pub polls: Arc<AtomicUsize>,
        pub drains: Arc<AtomicUsize>,
    }

    impl ScriptedProbe {
        pub(crate) fn never() -> Self {
            Self {
                key_after: None,
                fail: false,
                polls: Arc::default(),
                drains: Arc::default(),
            }
        }

        pub(crate) fn key_after(polls: usize) -> Self {
            Self {
                key_after: Some(polls),
                ..Self::never()
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::never()
            }
        }
    }

    impl KeyProbe for ScriptedProbe {
        fn key_available(&mut self) -> io::Result<bool> {
            if self.fail {
                return Err(io::Error::other("poll failed"));
            }
            let seen = self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(self.key_after.is_some_and(|after| seen >= after))
        }

        fn drain(&mut self) -> io::Result<()> {
            self.drains.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn key_press_raises_signal_and_drains() {
        let probe = ScriptedProbe::key_after(2);
        let drains = probe.drains.clone();
        let signal = InterruptSignal::new();

        let outcome = watch(Box::new(probe), signal.clone(), CancellationToken::new()).await;

        assert_eq!(outcome, WatchOutcome::Interrupted);
        assert!(signal.is_raised());
        assert_eq!(drains.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_without_raising() {
        let probe = ScriptedProbe::never();
        let polls = probe.polls.clone();
        let signal = InterruptSignal::new();
        let stop = CancellationToken::new();

        let task = tokio::spawn(watch(Box::new(probe), signal.clone(), stop.clone()));
        tokio::time::sleep(Duration::from_millis(35)).await;
        stop.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("watcher stops promptly")
            .expect("watcher task");
        assert_eq!(outcome, WatchOutcome::Stopped);
        assert!(!signal.is_raised());
        assert!(polls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn probe_failure_disables_interruption() {
        let signal = InterruptSignal::new();
        let outcome = watch(
            Box::new(ScriptedProbe::failing()),
            signal.clone(),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(outcome, WatchOutcome::Disabled);
        assert!(!signal.is_raised());
    }

    #[tokio::test]
    async fn already_cancelled_scope_never_polls() {
        let probe = ScriptedProbe::key_after(0);
        let polls = probe.polls.clone();
        let stop = CancellationToken::new();
        stop.cancel();

        let outcome = watch(Box::new(probe), InterruptSignal::new(), stop).await;
        assert_eq!(outcome, WatchOutcome::Stopped);
        assert_eq!(polls.load(Ordering::SeqCst), 0);
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::backend::{BackendError, CompletionBackend};

/// Fragments buffered between the backend task and the renderer. Once full,
/// the task stops pulling from the backend until the renderer catches up.
const FRAGMENT_BUFFER: usize = 32;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Debug)]
enum StreamMessage {
    Chunk(String),
    Error(BackendError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Pending,
    Completed,
    Cancelled,
    Failed,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        self != StreamState::Pending
    }
}

/// Wraps a backend so each prompt becomes one cancellable [`StreamHandle`].
#[derive(Clone)]
pub struct StreamProducer {
    backend: Arc<dyn CompletionBackend>,
}

impl StreamProducer {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Starts producing a response. The returned handle is cancelled when
    /// `scope` is, so one token can stop the producer together with the
    /// renderer and watcher sharing it.
    pub fn produce(&self, prompt: impl Into<String>, scope: &CancellationToken) -> StreamHandle {
        let prompt = prompt.into();
        let stream_id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        let cancel_token = scope.child_token();
        let (tx, rx) = mpsc::channel(FRAGMENT_BUFFER);
        let backend = self.backend.clone();
        let task_token = cancel_token.clone();

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = forward_fragments(backend, prompt, tx, stream_id) => {}
                _ = task_token.cancelled() => {
                    debug!(stream_id, "stream cancelled; backend stream released");
                }
            }
        });

        StreamHandle {
            stream_id,
            rx,
            cancel_token,
            emitted: 0,
            state: StreamState::Pending,
            task,
        }
    }
}

async fn forward_fragments(
    backend: Arc<dyn CompletionBackend>,
    prompt: String,
    tx: mpsc::Sender<StreamMessage>,
    stream_id: u64,
) {
    let mut stream = match backend.stream_completion(&prompt).await {
        Ok(stream) => stream,
        Err(err) => {
            debug!(stream_id, error = %err, "backend refused stream");
            let _ = tx.send(StreamMessage::Error(err)).await;
            return;
        }
    };

    while let Some(item) = stream.next().await {
        let message = match item {
            Ok(chunk) => StreamMessage::Chunk(chunk),
            Err(err) => {
                let _ = tx.send(StreamMessage::Error(err)).await;
                return;
            }
        };
        if tx.send(message).await.is_err() {
            // Receiver gone: nobody is rendering this stream any more.
            return;
        }
    }
    debug!(stream_id, "backend stream finished");
}

/// One in-flight response.
///
/// Owned by the renderer. Fragments come out in backend order; after the
/// handle reaches a terminal state it yields nothing more.
pub struct StreamHandle {
    stream_id: u64,
    rx: mpsc::Receiver<StreamMessage>,
    cancel_token: CancellationToken,
    emitted: usize,
    state: StreamState,
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub fn id(&self) -> u64 {
        self.stream_id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Number of fragments handed out so far.
    pub fn fragments_emitted(&self) -> usize {
        self.emitted
    }

    /// Whether the handle's scope has been cancelled, from here or from a
    /// parent token.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Resolves once the handle's scope is cancelled.
    pub async fn cancelled(&self) {
        self.cancel_token.cancelled().await
    }

    /// Next fragment, `Some(Err)` once on backend failure, `None` at the end.
    ///
    /// Fragments still buffered when the scope is cancelled are discarded.
    pub async fn next_fragment(&mut self) -> Option<Result<String, BackendError>> {
        if self.state.is_terminal() {
            return None;
        }
        if self.cancel_token.is_cancelled() {
            self.discard_buffered();
            return None;
        }

        let received = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => None,
            message = self.rx.recv() => Some(message),
        };
        let Some(message) = received else {
            self.discard_buffered();
            return None;
        };

        match message {
            Some(StreamMessage::Chunk(chunk)) => {
                self.emitted += 1;
                Some(Ok(chunk))
            }
            Some(StreamMessage::Error(err)) => {
                self.state = StreamState::Failed;
                self.cancel_token.cancel();
                Some(Err(err))
            }
            None => {
                self.state = if self.cancel_token.is_cancelled() {
                    StreamState::Cancelled
                } else {
                    StreamState::Completed
                };
                None
            }
        }
    }

    /// Stops the producer. Buffered fragments are discarded. No-op once the
    /// handle is terminal.
    pub fn cancel(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = StreamState::Cancelled;
        self.cancel_token.cancel();
        self.rx.close();
        debug!(stream_id = self.stream_id, emitted = self.emitted, "stream cancel requested");
    }

    fn discard_buffered(&mut self) {
        self.state = StreamState::Cancelled;
        self.rx.close();
        debug!(stream_id = self.stream_id, emitted = self.emitted, "stream scope cancelled");
    }

    /// Waits until the producer task has exited.
    pub async fn finished(&mut self) {
        let _ = (&mut self.task).await;
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

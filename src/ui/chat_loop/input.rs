//! Line input for the session loop.

use std::io::{self, BufRead};
use std::sync::mpsc as std_mpsc;
use std::thread;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

/// Where submitted lines come from.
#[async_trait]
pub trait LineSource: Send {
    /// The next line without its terminator, `None` at end of input.
    async fn next_line(&mut self) -> io::Result<Option<String>>;
}

/// Reads standard input on a dedicated thread.
///
/// The thread only reads when a line is requested, so it never consumes
/// keystrokes meant for the interrupt watcher while a response streams. A
/// blocked read cannot be cancelled; at shutdown the thread is abandoned.
pub struct StdinLineReader {
    requests: std_mpsc::Sender<()>,
    replies: mpsc::Receiver<io::Result<Option<String>>>,
    in_flight: bool,
}

impl StdinLineReader {
    pub fn spawn() -> io::Result<Self> {
        let (request_tx, request_rx) = std_mpsc::channel::<()>();
        let (reply_tx, reply_rx) = mpsc::channel(1);

        thread::Builder::new()
            .name("stdin-lines".to_string())
            .spawn(move || {
                let stdin = io::stdin();
                while request_rx.recv().is_ok() {
                    let mut line = String::new();
                    let reply = match stdin.lock().read_line(&mut line) {
                        Ok(0) => Ok(None),
                        Ok(_) => Ok(Some(strip_line_ending(line))),
                        Err(err) => Err(err),
                    };
                    let finished = match &reply {
                        Ok(Some(_)) => false,
                        Ok(None) => true,
                        Err(err) => !is_recoverable_read_error(err),
                    };
                    if reply_tx.blocking_send(reply).is_err() || finished {
                        break;
                    }
                }
                debug!("stdin reader exiting");
            })?;

        Ok(Self {
            requests: request_tx,
            replies: reply_rx,
            in_flight: false,
        })
    }
}

#[async_trait]
impl LineSource for StdinLineReader {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        // A request abandoned by a cancelled caller is still answered; reuse it.
        if !self.in_flight {
            if self.requests.send(()).is_err() {
                return Ok(None);
            }
            self.in_flight = true;
        }
        let reply = self.replies.recv().await;
        self.in_flight = false;
        reply.unwrap_or(Ok(None))
    }
}

/// Read failures that only spoil the current line, such as input that is
/// not valid UTF-8. The reader keeps serving requests after these.
pub fn is_recoverable_read_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::InvalidData | io::ErrorKind::Interrupted
    )
}

fn strip_line_ending(mut line: String) -> String {
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    line
}

#[cfg(test)]
#[async_trait]
impl LineSource for std::collections::VecDeque<String> {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.pop_front())
    }
}

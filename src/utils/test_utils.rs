//! Scripted collaborators shared by unit tests.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use crate::core::backend::{
    BackendError, BackendFactory, CompletionBackend, FragmentStream,
};
use crate::commands::SecretPrompt;
use crate::core::providers::ProviderSession;

/// Sets a flag when dropped; lets tests observe that a stream was released.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct ScriptedBackend {
    fragments: Vec<Result<String, BackendError>>,
    open_error: Option<BackendError>,
    delay: Duration,
    hang_after_script: bool,
    pub opened: Arc<AtomicUsize>,
    pub released: Arc<AtomicBool>,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBackend {
    pub fn fragments(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| Ok(f.to_string())).collect(),
            ..Self::default()
        }
    }

    pub fn with_results(fragments: Vec<Result<String, BackendError>>) -> Self {
        Self {
            fragments,
            ..Self::default()
        }
    }

    pub fn failing_open(error: BackendError) -> Self {
        Self {
            open_error: Some(error),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Keep the stream open (never ending) once the script is exhausted.
    pub fn hanging(mut self) -> Self {
        self.hang_after_script = true;
        self
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn stream_completion(&self, prompt: &str) -> Result<FragmentStream, BackendError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(prompt.to_string());
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }

        let guard = Arc::new(DropFlag(self.released.clone()));
        let delay = self.delay;
        let scripted = stream::iter(self.fragments.clone()).then(move |item| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            item
        });
        let tail: FragmentStream = if self.hang_after_script {
            stream::pending().boxed()
        } else {
            stream::empty().boxed()
        };
        Ok(scripted
            .chain(tail)
            .map(move |item| {
                let _keep = &guard;
                item
            })
            .boxed())
    }
}

pub struct ScriptedBackendFactory {
    pub backend: ScriptedBackend,
    pub connects: AtomicUsize,
}

impl ScriptedBackendFactory {
    pub fn new(backend: ScriptedBackend) -> Self {
        Self {
            backend,
            connects: AtomicUsize::new(0),
        }
    }
}

impl BackendFactory for ScriptedBackendFactory {
    fn connect(&self, _session: ProviderSession) -> Arc<dyn CompletionBackend> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Arc::new(self.backend.clone())
    }
}

/// A cloneable in-memory writer.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Answers secret prompts from a script and remembers what was asked.
#[derive(Default)]
pub struct ScriptedSecrets {
    answers: Mutex<VecDeque<io::Result<Option<String>>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedSecrets {
    pub fn answering(answers: Vec<io::Result<Option<String>>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            prompts: Mutex::default(),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl SecretPrompt for ScriptedSecrets {
    fn read_secret(&self, prompt: &str) -> io::Result<Option<String>> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(prompt.to_string());
        self.answers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or(Ok(None))
    }
}

/// Lines handed out in order; running out simulates end of input.
pub fn scripted_lines(lines: &[&str]) -> VecDeque<String> {
    lines.iter().map(|line| line.to_string()).collect()
}

//! Long-lived background process that runs beside (or without) the
//! interactive session.

use std::error::Error;
use std::fs;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::config::{path_display, Settings};
use crate::core::workspace::{Workspace, WorkspaceStore};

pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

pub type EngineError = Box<dyn Error + Send + Sync>;

/// Creates whatever persisted state is missing. Running it again is a no-op.
pub fn initialize(settings: &Settings) -> Result<Workspace, EngineError> {
    fs::create_dir_all(&settings.data_dir)?;
    fs::create_dir_all(settings.logs_dir())?;
    let store = WorkspaceStore::new(settings);
    store.ensure(&settings.default_workspace, &settings.installation_id)
}

pub struct Engine {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    workspace: Workspace,
    persisted: bool,
}

impl Engine {
    /// Initializes persisted state, then spawns the engine task. Returns
    /// only after initialization finished, so callers can accept input
    /// right away.
    ///
    /// If the state cannot be created the engine still starts, with an
    /// in-memory workspace.
    pub async fn start(
        settings: &Settings,
        parent: &CancellationToken,
        heartbeat: Duration,
    ) -> Self {
        let init_settings = settings.clone();
        let init = tokio::task::spawn_blocking(move || initialize(&init_settings));
        let initialized: Result<Workspace, EngineError> = match init.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        };
        let (workspace, persisted) = match initialized {
            Ok(workspace) => (workspace, true),
            Err(err) => {
                warn!(
                    error = %err,
                    data_dir = %path_display(&settings.data_dir),
                    "could not initialize data directory; continuing without persistence"
                );
                let workspace =
                    Workspace::in_memory(&settings.default_workspace, &settings.installation_id);
                (workspace, false)
            }
        };

        let cancel = parent.child_token();
        let task = tokio::spawn(run(cancel.clone(), heartbeat, workspace.name.clone()));

        Self {
            cancel,
            task,
            workspace,
            persisted,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Whether the workspace is backed by files on disk.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancels the engine and waits up to `grace` for it to stop. Returns
    /// whether it acknowledged in time.
    pub async fn shutdown(self, grace: Duration) -> bool {
        self.cancel.cancel();
        let mut task = self.task;
        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(error = %err, "engine task ended abnormally");
                true
            }
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "engine did not stop in time; aborting");
                task.abort();
                false
            }
        }
    }
}

async fn run(cancel: CancellationToken, heartbeat: Duration, workspace: String) {
    info!(workspace = %workspace, "engine started");
    let mut ticker = tokio::time::interval(heartbeat);
    ticker.tick().await;
    let mut beats: u64 = 0;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                beats += 1;
                debug!(beats, "engine heartbeat");
            }
        }
    }
    info!("engine stopping");
}

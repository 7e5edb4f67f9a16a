//! Minimal on-disk workspace and transcript store.
//!
//! Layout under the data directory:
//!
//! ```text
//! workspaces/<name>/workspace.toml
//! workspaces/<name>/threads/<timestamp>-<id>.log
//! ```

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::config::data::{path_display, Settings};

const WORKSPACE_FILE: &str = "workspace.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub name: String,
    pub id: String,
    pub installation_id: String,
    pub created_at: DateTime<Utc>,
}

impl Workspace {
    /// A workspace that exists only for this process; nothing is written.
    pub fn in_memory(name: &str, installation_id: &str) -> Self {
        Self {
            name: name.to_string(),
            id: Uuid::new_v4().to_string(),
            installation_id: installation_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptRole {
    User,
    Assistant,
    App,
}

impl TranscriptRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TranscriptRole::User => "user",
            TranscriptRole::Assistant => "assistant",
            TranscriptRole::App => "app",
        }
    }
}

pub struct WorkspaceStore {
    root: PathBuf,
}

impl WorkspaceStore {
    pub fn new(settings: &Settings) -> Self {
        Self {
            root: settings.workspaces_dir(),
        }
    }

    pub fn workspace_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn load(&self, name: &str) -> Result<Option<Workspace>, Box<dyn std::error::Error + Send + Sync>> {
        let path = self.workspace_dir(name).join(WORKSPACE_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        Ok(Some(toml::from_str(&contents)?))
    }

    /// Returns the named workspace, creating it only when it does not exist.
    pub fn ensure(
        &self,
        name: &str,
        installation_id: &str,
    ) -> Result<Workspace, Box<dyn std::error::Error + Send + Sync>> {
        if let Some(existing) = self.load(name)? {
            debug!(workspace = %name, "workspace already initialized");
            return Ok(existing);
        }

        let dir = self.workspace_dir(name);
        fs::create_dir_all(dir.join("threads"))?;

        let workspace = Workspace::in_memory(name, installation_id);

        let mut temp_file = NamedTempFile::new_in(&dir)?;
        temp_file.write_all(toml::to_string_pretty(&workspace)?.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file.persist(dir.join(WORKSPACE_FILE)).map_err(|err| err.error)?;

        info!(workspace = %name, path = %path_display(&dir), "workspace created");
        Ok(workspace)
    }

    /// Starts a new thread transcript in the workspace. The file appears with
    /// the first appended message.
    pub fn open_transcript(
        &self,
        workspace: &Workspace,
    ) -> Result<Transcript, Box<dyn std::error::Error + Send + Sync>> {
        let threads = self.workspace_dir(&workspace.name).join("threads");
        fs::create_dir_all(&threads)?;
        let stamp = Utc::now().format("%Y%m%dT%H%M%S");
        let short_id = Uuid::new_v4().simple().to_string();
        let path = threads.join(format!("{stamp}-{}.log", &short_id[..8]));
        Ok(Transcript { path })
    }
}

/// Append-only log of one conversation thread.
pub struct Transcript {
    path: PathBuf,
}

impl Transcript {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, role: TranscriptRole, content: &str) -> std::io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "## {} {}", role.as_str(), Utc::now().to_rfc3339())?;
        for line in content.lines() {
            writeln!(writer, "{line}")?;
        }
        writeln!(writer)?;
        writer.flush()
    }
}

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const DEFAULT_WORKSPACE: &str = "default";

/// Persisted session settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Root for workspaces, transcripts, and logs
    pub data_dir: PathBuf,
    /// Active provider id (e.g., "openai")
    pub provider: Option<String>,
    /// Active model id within the provider (e.g., "gpt-4o")
    pub model: Option<String>,
    /// Stable identifier generated once per installation
    pub installation_id: String,
    #[serde(default = "default_workspace_name")]
    pub default_workspace: String,
}

fn default_workspace_name() -> String {
    DEFAULT_WORKSPACE.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(false),
            provider: None,
            model: None,
            installation_id: Uuid::new_v4().to_string(),
            default_workspace: default_workspace_name(),
        }
    }
}

impl Settings {
    /// Defaults for a fresh installation; dev mode keeps its data apart.
    pub fn fresh(dev: bool) -> Self {
        Self {
            data_dir: default_data_dir(dev),
            ..Self::default()
        }
    }

    pub fn model_label(&self) -> Option<String> {
        match (&self.provider, &self.model) {
            (Some(provider), Some(model)) => Some(format!("{provider}:{model}")),
            _ => None,
        }
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn workspaces_dir(&self) -> PathBuf {
        self.data_dir.join("workspaces")
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "subconscious", "subconscious")
}

pub fn default_data_dir(dev: bool) -> PathBuf {
    let base = project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".subconscious"));
    if dev {
        base.join("dev")
    } else {
        base
    }
}

pub fn default_config_path(dev: bool) -> PathBuf {
    let file = if dev { "config.dev.toml" } else { "config.toml" };
    project_dirs()
        .map(|dirs| dirs.config_dir().join(file))
        .unwrap_or_else(|| PathBuf::from(file))
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

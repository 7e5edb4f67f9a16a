use crate::core::config::data::{path_display, Settings};
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Errors that can occur when reading or writing the settings file.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the settings file from disk.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The settings file is not valid TOML or misses required fields.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Failed to write the settings file.
    Write {
        path: PathBuf,
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read settings at {}: {}", path_display(path), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse settings at {}: {}", path_display(path), source)
            }
            ConfigError::Write { path, source } => {
                write!(f, "Failed to write settings at {}: {}", path_display(path), source)
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Write { source, .. } => Some(source.as_ref()),
        }
    }
}

/// The settings file at a fixed path.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn load(&self) -> Result<Settings, ConfigError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Writes through a temp file in the same directory, then renames it over
    /// the target.
    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        self.write_atomic(settings).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn write_atomic(&self, settings: &Settings) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let parent = self.path.parent().filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir)?;
        }

        let contents = toml::to_string_pretty(settings)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new_in(".")?,
        };

        temp_file.write_all(contents.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }

    /// Loads existing settings or creates and saves fresh ones.
    ///
    /// An unreadable or corrupt file is returned as an error; the caller
    /// treats that as fatal. A failed first save only costs persistence, so
    /// the fresh settings are still returned.
    pub fn load_or_init(&self, dev: bool) -> Result<(Settings, Option<ConfigError>), ConfigError> {
        if self.exists() {
            return self.load().map(|settings| (settings, None));
        }

        let settings = Settings::fresh(dev);
        let save_error = self.save(&settings).err();
        Ok((settings, save_error))
    }
}

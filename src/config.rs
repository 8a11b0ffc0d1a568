//! Persisted user configuration
//!
//! One `[Configuration]` section holding the registration details. An
//! absent file means "not registered yet"; a file that does not parse is
//! distinguished from a file whose password the directory later rejects,
//! so the GUI can phrase the re-registration prompt correctly.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CONFIGURATION_FILENAME: &str = "configuration.toml";

/// The stored registration details
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredUser {
    pub nickname: String,
    pub password: String,
    pub tcp_port: u16,
    pub udp_port: u16,
    /// Register with the LAN address instead of the public one
    pub private_ip: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigDocument {
    #[serde(rename = "Configuration")]
    configuration: StoredUser,
}

/// Where the user stands after reading the file and probing the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStatus {
    Loaded,
    WrongPassword,
    WrongFile,
    NoFile,
}

#[derive(Debug)]
pub struct Configuration {
    pub status: ConfigStatus,
    pub stored: Option<StoredUser>,
    path: PathBuf,
}

impl Configuration {
    /// Read the configuration at `path`. The registration probe against
    /// the directory happens later; a `Loaded` status here only means the
    /// file was well-formed.
    pub fn read(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => {
                tracing::info!("no configuration file found");
                return Self {
                    status: ConfigStatus::NoFile,
                    stored: None,
                    path,
                };
            }
        };
        match toml::from_str::<ConfigDocument>(&content) {
            Ok(document) => {
                tracing::debug!("configuration file read");
                Self {
                    status: ConfigStatus::Loaded,
                    stored: Some(document.configuration),
                    path,
                }
            }
            Err(e) => {
                tracing::warn!("error reading configuration file: {e}");
                Self {
                    status: ConfigStatus::WrongFile,
                    stored: None,
                    path,
                }
            }
        }
    }

    /// Preferred location: the platform config dir, falling back to the
    /// working directory for portable setups
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("net", "videolink", "videolink")
            .map(|dirs| dirs.config_dir().join(CONFIGURATION_FILENAME))
            .unwrap_or_else(|| PathBuf::from(CONFIGURATION_FILENAME))
    }

    /// The directory rejected the stored password
    pub fn mark_wrong_password(&mut self) {
        tracing::warn!("couldn't sign in; the stored password is probably not correct");
        self.status = ConfigStatus::WrongPassword;
    }

    /// Persist new registration details ("remember me")
    pub fn save(&mut self, user: StoredUser) -> Result<(), ConfigError> {
        let document = ConfigDocument {
            configuration: user.clone(),
        };
        let content = toml::to_string_pretty(&document)
            .map_err(|e| ConfigError::WrongFile(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WrongFile(e.to_string()))?;
            }
        }
        std::fs::write(&self.path, content).map_err(|e| ConfigError::WrongFile(e.to_string()))?;
        tracing::debug!("user information saved into the configuration file");
        self.stored = Some(user);
        self.status = ConfigStatus::Loaded;
        Ok(())
    }

    /// Delete the persisted file (sign-out). Missing file is fine.
    pub fn delete(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!("could not delete configuration file: {e}");
                return;
            }
            tracing::info!("configuration file deleted");
        } else {
            tracing::info!("no configuration file to be deleted");
        }
        self.status = ConfigStatus::NoFile;
        self.stored = None;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

//! Configuration management
//!
//! TOML-based configuration for the camera uploads folders, the local data
//! directory and the upload target.

use anyhow::{Context, Result};
use camup_db::{CameraUploadFolderType, CameraUploadsRecordType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cipher::FieldCipher;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default = "default_primary")]
    pub primary: FolderConfig,

    #[serde(default)]
    pub secondary: FolderConfig,

    #[serde(default)]
    pub upload: UploadConfig,
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Data directory for the database and temp files (defaults to <local data>/Camup)
    pub data_dir: Option<String>,

    /// Seconds between scans in watch mode
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// Track videos as well as photos
    #[serde(default = "default_true")]
    pub upload_videos: bool,

    /// Base64 AES-256 key used to encrypt names, paths and fingerprints at rest
    pub encryption_key: Option<String>,
}

/// One local folder mapped to a remote target folder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FolderConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Local folder scanned for media
    pub local_path: Option<String>,
}

/// Upload target settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Directory uploads are copied into (one sub-folder per folder type)
    pub target_dir: Option<String>,
}

// Default value functions
fn default_scan_interval() -> u64 { 60 }
fn default_true() -> bool { true }
fn default_primary() -> FolderConfig {
    FolderConfig {
        enabled: true,
        local_path: None,
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            scan_interval_secs: 60,
            upload_videos: true,
            encryption_key: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            primary: default_primary(),
            secondary: FolderConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

impl FolderConfig {
    pub fn local_path(&self) -> Option<PathBuf> {
        self.local_path.as_ref().map(PathBuf::from)
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config file {:?}", path.as_ref()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse config TOML")
    }

    /// Default config file location: <local data>/Camup/camup.toml
    pub fn default_path() -> PathBuf {
        default_data_dir().join("camup.toml")
    }

    /// Resolve data directory with fallback to default
    pub fn resolve_data_dir(&self) -> PathBuf {
        match self.general.data_dir {
            Some(ref dir) => PathBuf::from(dir),
            None => default_data_dir(),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolve_data_dir().join("camup.db")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.resolve_data_dir().join("temp")
    }

    /// Prefix for staging file names, ending in a path separator
    pub fn temp_root(&self) -> String {
        format!("{}{}", self.temp_dir().display(), std::path::MAIN_SEPARATOR)
    }

    pub fn upload_target(&self) -> Option<PathBuf> {
        self.upload.target_dir.as_ref().map(PathBuf::from)
    }

    pub fn folder(&self, folder_type: CameraUploadFolderType) -> &FolderConfig {
        match folder_type {
            CameraUploadFolderType::Primary => &self.primary,
            CameraUploadFolderType::Secondary => &self.secondary,
        }
    }

    pub fn enabled_folder_types(&self) -> Vec<CameraUploadFolderType> {
        CameraUploadFolderType::ALL
            .into_iter()
            .filter(|ft| self.folder(*ft).enabled)
            .collect()
    }

    pub fn disabled_folder_types(&self) -> Vec<CameraUploadFolderType> {
        CameraUploadFolderType::ALL
            .into_iter()
            .filter(|ft| !self.folder(*ft).enabled)
            .collect()
    }

    pub fn enabled_file_types(&self) -> Vec<CameraUploadsRecordType> {
        if self.general.upload_videos {
            CameraUploadsRecordType::ALL.to_vec()
        } else {
            vec![CameraUploadsRecordType::Photo]
        }
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.general.scan_interval_secs.max(1))
    }

    /// Build the field cipher if an encryption key is configured
    pub fn cipher(&self) -> Result<Option<FieldCipher>> {
        self.general
            .encryption_key
            .as_deref()
            .map(FieldCipher::from_base64_key)
            .transpose()
            .context("invalid encryption_key")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Camup")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.enabled_folder_types(), vec![CameraUploadFolderType::Primary]);
        assert_eq!(config.disabled_folder_types(), vec![CameraUploadFolderType::Secondary]);
        assert_eq!(config.enabled_file_types(), CameraUploadsRecordType::ALL.to_vec());
        assert_eq!(config.scan_interval(), Duration::from_secs(60));
        assert!(config.cipher().unwrap().is_none());
    }

    #[test]
    fn test_empty_toml_matches_defaults() {
        let config = Config::from_toml("").unwrap();
        assert!(config.primary.enabled);
        assert!(!config.secondary.enabled);
        assert!(config.general.upload_videos);
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml(
            r#"
            [general]
            data_dir = "/tmp/camup"
            scan_interval_secs = 5
            upload_videos = false

            [primary]
            enabled = true
            local_path = "/media/DCIM"

            [secondary]
            enabled = true
            local_path = "/media/Other"

            [upload]
            target_dir = "/backup"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path(), PathBuf::from("/tmp/camup").join("camup.db"));
        assert_eq!(config.enabled_folder_types(), CameraUploadFolderType::ALL.to_vec());
        assert!(config.disabled_folder_types().is_empty());
        assert_eq!(config.enabled_file_types(), vec![CameraUploadsRecordType::Photo]);
        assert_eq!(
            config.folder(CameraUploadFolderType::Secondary).local_path(),
            Some(PathBuf::from("/media/Other"))
        );
        assert_eq!(config.upload_target(), Some(PathBuf::from("/backup")));
        assert!(config.temp_root().ends_with(std::path::MAIN_SEPARATOR));
    }

    #[test]
    fn test_bad_encryption_key_is_rejected() {
        let mut config = Config::default();
        config.general.encryption_key = Some("not-a-key".into());
        assert!(config.cipher().is_err());
    }
}

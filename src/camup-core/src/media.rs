//! Local media index
//!
//! Lists the photos and videos under a camera folder the way a platform
//! media store would: a stable numeric id, name, path, dates and size.

use anyhow::{anyhow, Result};
use camup_db::CameraUploadsRecordType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use walkdir::WalkDir;

const PHOTO_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "heic", "heif", "gif", "webp", "bmp", "tif", "tiff", "dng", "cr2",
    "nef", "arw",
];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "3gp", "mkv", "webm", "avi"];

/// One media item as reported by the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraUploadsMedia {
    pub media_id: i64,
    pub display_name: String,
    pub file_path: String,
    /// Seconds since epoch
    pub date_added: i64,
    /// Modification time in milliseconds (second granularity)
    pub timestamp: i64,
    pub file_size: i64,
}

/// Source of local media items
pub trait MediaIndex: Send + Sync {
    /// Every media item of `file_type` located under `folder`
    fn get_media_list(
        &self,
        folder: &Path,
        file_type: CameraUploadsRecordType,
    ) -> Result<Vec<CameraUploadsMedia>>;

    fn file_exists(&self, path: &str) -> bool;
}

/// Classify a file by extension
pub fn media_type_for(path: &Path) -> Option<CameraUploadsRecordType> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
        Some(CameraUploadsRecordType::Photo)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(CameraUploadsRecordType::Video)
    } else {
        None
    }
}

/// Stable positive id derived from the file path
pub fn media_id_for(path: &Path) -> i64 {
    let hash = blake3::hash(path.to_string_lossy().as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    (u64::from_le_bytes(bytes) >> 1) as i64
}

fn epoch_secs(time: std::io::Result<SystemTime>) -> i64 {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Media index backed by a directory walk
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryMediaIndex;

impl MediaIndex for DirectoryMediaIndex {
    fn get_media_list(
        &self,
        folder: &Path,
        file_type: CameraUploadsRecordType,
    ) -> Result<Vec<CameraUploadsMedia>> {
        if !folder.is_dir() {
            return Err(anyhow!("media folder unavailable: {:?}", folder));
        }

        let mut media = Vec::new();

        for entry in WalkDir::new(folder)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if media_type_for(path) != Some(file_type) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    debug!("skipping {:?}: {}", path, e);
                    continue;
                }
            };

            media.push(CameraUploadsMedia {
                media_id: media_id_for(path),
                display_name: entry.file_name().to_string_lossy().into_owned(),
                file_path: path.to_string_lossy().into_owned(),
                date_added: epoch_secs(metadata.created()),
                timestamp: epoch_secs(metadata.modified()) * 1000,
                file_size: metadata.len() as i64,
            });
        }

        debug!("found {} {} item(s) in {:?}", media.len(), file_type, folder);
        Ok(media)
    }

    fn file_exists(&self, path: &str) -> bool {
        Path::new(path).is_file()
    }
}

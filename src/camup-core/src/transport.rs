//! Upload transports
//!
//! A transport moves one record's file to remote storage and reports the
//! fingerprint of what arrived there.

use anyhow::{anyhow, Context, Result};
use camup_db::{CameraUploadFolderType, CameraUploadsRecord};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::fingerprint::Fingerprinter;

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Fingerprint of the uploaded content
    pub fingerprint: String,
}

pub trait UploadTransport: Send + Sync {
    fn upload(&self, record: &CameraUploadsRecord) -> Result<UploadReceipt>;
}

/// Copies uploads into `<target>/<Primary|Secondary>/<file name>`
///
/// The file is staged at the record's temp path first so a partial copy
/// never shows up in the target folder. A name already taken by different
/// content gets a ` (n)` suffix; identical content is not copied again.
pub struct LocalFolderTransport {
    target_dir: PathBuf,
    fingerprinter: Arc<dyn Fingerprinter>,
}

impl LocalFolderTransport {
    pub fn new(target_dir: impl Into<PathBuf>, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        Self {
            target_dir: target_dir.into(),
            fingerprinter,
        }
    }

    /// Preferred location for a record, before any collision suffix
    pub fn destination(&self, record: &CameraUploadsRecord) -> PathBuf {
        let folder = match record.folder_type {
            CameraUploadFolderType::Primary => "Primary",
            CameraUploadFolderType::Secondary => "Secondary",
        };
        self.target_dir.join(folder).join(&record.file_name)
    }

    /// First free slot for the record, or `Placement::Existing` if a slot
    /// already holds the same content
    fn place(&self, record: &CameraUploadsRecord) -> Result<Placement> {
        let preferred = self.destination(record);
        let parent = preferred
            .parent()
            .ok_or_else(|| anyhow!("destination {:?} has no parent", preferred))?
            .to_path_buf();
        let name = Path::new(&record.file_name);
        let stem = name
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| record.file_name.clone());
        let extension = name.extension().map(|e| e.to_string_lossy().into_owned());

        let mut candidate = preferred;
        for n in 1..=MAX_NAME_SUFFIX {
            if !candidate.exists() {
                return Ok(Placement::Free(candidate));
            }
            if self.fingerprinter.fingerprint(&candidate).as_deref() == Some(record.original_fingerprint.as_str()) {
                return Ok(Placement::Existing(candidate));
            }
            let file_name = match extension {
                Some(ref ext) => format!("{} ({}).{}", stem, n, ext),
                None => format!("{} ({})", stem, n),
            };
            candidate = parent.join(file_name);
        }

        Err(anyhow!("no free name for {} in {:?}", record.file_name, parent))
    }
}

const MAX_NAME_SUFFIX: u32 = 10_000;

enum Placement {
    Free(PathBuf),
    Existing(PathBuf),
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {:?}", parent))?;
    }
    Ok(())
}

impl UploadTransport for LocalFolderTransport {
    fn upload(&self, record: &CameraUploadsRecord) -> Result<UploadReceipt> {
        let source = Path::new(&record.file_path);
        if !source.is_file() {
            return Err(anyhow!("source {:?} is not a file", source));
        }

        let destination = match self.place(record)? {
            Placement::Existing(path) => {
                debug!("{:?} already present at {:?}", source, path);
                path
            }
            Placement::Free(destination) => {
                let staged = Path::new(&record.temp_file_path);
                ensure_parent(staged)?;
                ensure_parent(&destination)?;

                fs::copy(source, staged).with_context(|| format!("failed to stage {:?}", source))?;

                // rename fails across file systems, fall back to copy
                if fs::rename(staged, &destination).is_err() {
                    let copied = fs::copy(staged, &destination);
                    if let Err(e) = fs::remove_file(staged) {
                        debug!("could not remove staged file {:?}: {}", staged, e);
                    }
                    copied.with_context(|| format!("failed to write {:?}", destination))?;
                }

                debug!("uploaded {:?} to {:?}", source, destination);
                destination
            }
        };

        let fingerprint = self
            .fingerprinter
            .fingerprint(&destination)
            .ok_or_else(|| anyhow!("uploaded file {:?} could not be fingerprinted", destination))?;

        Ok(UploadReceipt { fingerprint })
    }
}

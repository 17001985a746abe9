//! Maps a discovered media item to a new pending record

use camup_db::{CameraUploadFolderType, CameraUploadsRecord, CameraUploadsRecordType, UploadStatus};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::fingerprint::Fingerprinter;
use crate::media::CameraUploadsMedia;

type Clock = Arc<dyn Fn() -> u128 + Send + Sync>;

fn system_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct RecordMapper {
    fingerprinter: Arc<dyn Fingerprinter>,
    clock: Clock,
}

impl RecordMapper {
    pub fn new(fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        Self {
            fingerprinter,
            clock: Arc::new(system_nanos),
        }
    }

    /// Replace the nanosecond clock used to name staging files
    pub fn with_clock(mut self, clock: impl Fn() -> u128 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// `None` when the media file cannot be fingerprinted
    pub fn map(
        &self,
        media: &CameraUploadsMedia,
        folder_type: CameraUploadFolderType,
        file_type: CameraUploadsRecordType,
        temp_root: &str,
    ) -> Option<CameraUploadsRecord> {
        let original_fingerprint = self.fingerprinter.fingerprint(Path::new(&media.file_path))?;

        let extension = Path::new(&media.display_name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        Some(CameraUploadsRecord {
            media_id: media.media_id,
            timestamp: media.timestamp,
            folder_type,
            file_name: media.display_name.clone(),
            file_path: media.file_path.clone(),
            file_type,
            upload_status: UploadStatus::Pending,
            original_fingerprint,
            generated_fingerprint: None,
            temp_file_path: format!("{}{}{}", temp_root, (self.clock)(), extension),
            file_size: media.file_size,
        })
    }
}

//! Database schema types
//!
//! Enumerations are persisted as stable text codes, never as ordinals, so
//! variants can be added or reordered without rewriting existing rows.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DatabaseError;

/// Remote target folder an upload belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CameraUploadFolderType {
    Primary,
    Secondary,
}

/// Kind of media file being uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CameraUploadsRecordType {
    Photo,
    Video,
}

/// Upload lifecycle of a record
///
/// `Pending` is the only non-terminal state. It may move to any of the
/// three terminal states; nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UploadStatus {
    Pending,
    Uploaded,
    Failed,
    LocalFileNotExist,
}

impl CameraUploadFolderType {
    pub const ALL: [CameraUploadFolderType; 2] = [Self::Primary, Self::Secondary];

    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Primary => "PRIMARY",
            Self::Secondary => "SECONDARY",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "PRIMARY" => Some(Self::Primary),
            "SECONDARY" => Some(Self::Secondary),
            _ => None,
        }
    }
}

impl CameraUploadsRecordType {
    pub const ALL: [CameraUploadsRecordType; 2] = [Self::Photo, Self::Video];

    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Photo => "PHOTO",
            Self::Video => "VIDEO",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "PHOTO" => Some(Self::Photo),
            "VIDEO" => Some(Self::Video),
            _ => None,
        }
    }
}

impl UploadStatus {
    pub const ALL: [UploadStatus; 4] = [
        Self::Pending,
        Self::Uploaded,
        Self::Failed,
        Self::LocalFileNotExist,
    ];

    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Uploaded => "UPLOADED",
            Self::Failed => "FAILED",
            Self::LocalFileNotExist => "LOCAL_FILE_NOT_EXIST",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "PENDING" => Some(Self::Pending),
            "UPLOADED" => Some(Self::Uploaded),
            "FAILED" => Some(Self::Failed),
            "LOCAL_FILE_NOT_EXIST" => Some(Self::LocalFileNotExist),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        matches!(self, Self::Pending) && next.is_terminal()
    }
}

macro_rules! impl_code_traits {
    ($ty:ty, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_code())
            }
        }

        impl FromStr for $ty {
            type Err = DatabaseError;

            /// Accepts the stored code in any case, with `-` or `_` separators
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
                Self::from_code(&normalized)
                    .ok_or_else(|| DatabaseError::InvalidData(format!("unknown {}: {}", $what, s)))
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_code()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let code = value.as_str()?;
                Self::from_code(code).ok_or(FromSqlError::InvalidType)
            }
        }
    };
}

impl_code_traits!(CameraUploadFolderType, "folder type");
impl_code_traits!(CameraUploadsRecordType, "file type");
impl_code_traits!(UploadStatus, "upload status");

/// Composite identity of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub media_id: i64,
    pub timestamp: i64,
    pub folder_type: CameraUploadFolderType,
}

impl RecordKey {
    pub fn new(media_id: i64, timestamp: i64, folder_type: CameraUploadFolderType) -> Self {
        Self {
            media_id,
            timestamp,
            folder_type,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.media_id, self.timestamp, self.folder_type)
    }
}

/// Upload lifecycle of one local media file
///
/// String fields are opaque to the store; callers may encrypt them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraUploadsRecord {
    pub media_id: i64,
    pub timestamp: i64,
    pub folder_type: CameraUploadFolderType,
    pub file_name: String,
    pub file_path: String,
    pub file_type: CameraUploadsRecordType,
    pub upload_status: UploadStatus,
    pub original_fingerprint: String,
    pub generated_fingerprint: Option<String>,
    pub temp_file_path: String,
    pub file_size: i64,
}

impl CameraUploadsRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.media_id, self.timestamp, self.folder_type)
    }
}

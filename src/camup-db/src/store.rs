//! Shared, thread-safe handle to the record store

use rusqlite::Connection;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{DatabaseError, Result};
use crate::queries;
use crate::schema::*;
use crate::Database;

/// Cloneable handle over the single store connection
///
/// Every operation holds the connection lock for its full duration, so a
/// batch upsert is never observed half-applied by another caller.
#[derive(Clone)]
pub struct RecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl RecordStore {
    pub fn new(db: Database) -> Self {
        Self {
            conn: Arc::new(Mutex::new(db.into_connection())),
        }
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    pub fn upsert_records(&self, records: &[CameraUploadsRecord]) -> Result<()> {
        queries::upsert_records(&*self.lock()?, records)
    }

    pub fn get_records(
        &self,
        statuses: &[UploadStatus],
        file_types: &[CameraUploadsRecordType],
        folder_types: &[CameraUploadFolderType],
    ) -> Result<Vec<CameraUploadsRecord>> {
        queries::get_records(&*self.lock()?, statuses, file_types, folder_types)
    }

    pub fn get_record(&self, key: &RecordKey) -> Result<Option<CameraUploadsRecord>> {
        queries::get_record(&*self.lock()?, key)
    }

    pub fn get_all_records(&self) -> Result<Vec<CameraUploadsRecord>> {
        queries::get_all_records(&*self.lock()?)
    }

    /// Returns `false` when no record has this key
    pub fn update_upload_status(&self, key: &RecordKey, status: UploadStatus) -> Result<bool> {
        Ok(queries::update_upload_status(&*self.lock()?, key, status)? > 0)
    }

    /// Returns `false` when the record is missing or not in `from`
    pub fn transition_upload_status(
        &self,
        key: &RecordKey,
        from: UploadStatus,
        to: UploadStatus,
    ) -> Result<bool> {
        queries::transition_upload_status(&*self.lock()?, key, from, to)
    }

    /// Returns `false` when no record has this key
    pub fn update_generated_fingerprint(&self, key: &RecordKey, fingerprint: &str) -> Result<bool> {
        Ok(queries::update_generated_fingerprint(&*self.lock()?, key, fingerprint)? > 0)
    }

    pub fn delete_records_by_folder_type(&self, folder_types: &[CameraUploadFolderType]) -> Result<usize> {
        queries::delete_records_by_folder_type(&*self.lock()?, folder_types)
    }

    pub fn count_by_status(&self) -> Result<BTreeMap<(CameraUploadFolderType, UploadStatus), i64>> {
        queries::count_by_status(&*self.lock()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::tests::fixture;
    use std::thread;

    #[test]
    fn test_store_round_trip() {
        let store = RecordStore::open_in_memory().unwrap();
        let records = fixture();
        store.upsert_records(&records).unwrap();

        assert_eq!(store.get_all_records().unwrap(), records);
        assert!(store.update_upload_status(&records[2].key(), UploadStatus::Uploaded).unwrap());
        assert_eq!(
            store.get_record(&records[2].key()).unwrap().unwrap().upload_status,
            UploadStatus::Uploaded
        );
    }

    #[test]
    fn test_every_operation_through_handle() {
        let store = RecordStore::open_in_memory().unwrap();
        let records = fixture();
        store.upsert_records(&records).unwrap();

        let photos_pending = store
            .get_records(
                &[UploadStatus::Pending],
                &[CameraUploadsRecordType::Photo],
                &CameraUploadFolderType::ALL,
            )
            .unwrap();
        assert_eq!(photos_pending.iter().map(|r| r.media_id).collect::<Vec<_>>(), vec![3, 4, 5]);

        let key = records[3].key();
        assert!(store.transition_upload_status(&key, UploadStatus::Pending, UploadStatus::Uploaded).unwrap());
        assert!(!store.transition_upload_status(&key, UploadStatus::Pending, UploadStatus::Failed).unwrap());
        assert!(store.update_generated_fingerprint(&key, "generated").unwrap());
        assert_eq!(
            store.get_record(&key).unwrap().unwrap().generated_fingerprint.as_deref(),
            Some("generated")
        );

        let counts = store.count_by_status().unwrap();
        assert_eq!(counts.get(&(CameraUploadFolderType::Primary, UploadStatus::Uploaded)), Some(&2));

        assert_eq!(store.delete_records_by_folder_type(&[CameraUploadFolderType::Secondary]).unwrap(), 5);
        assert_eq!(store.get_all_records().unwrap().len(), 5);
    }

    #[test]
    fn test_missing_key_reports_false() {
        let store = RecordStore::open_in_memory().unwrap();
        let key = RecordKey::new(42, 42, CameraUploadFolderType::Primary);
        assert!(!store.update_upload_status(&key, UploadStatus::Failed).unwrap());
        assert!(!store.update_generated_fingerprint(&key, "fp").unwrap());
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let store = RecordStore::open_in_memory().unwrap();
        let base = fixture();

        let handles: Vec<_> = (0..8i64)
            .map(|worker| {
                let store = store.clone();
                let batch: Vec<_> = base
                    .iter()
                    .map(|r| CameraUploadsRecord {
                        media_id: r.media_id + worker * 100,
                        ..r.clone()
                    })
                    .collect();
                thread::spawn(move || {
                    store.upsert_records(&batch).unwrap();
                    // a reader only ever sees whole batches
                    let seen = store.get_all_records().unwrap().len();
                    assert_eq!(seen % batch.len(), 0);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get_all_records().unwrap().len(), 80);
    }
}

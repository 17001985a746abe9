//! Record repository: the record store plus at-rest encryption of
//! names, paths and fingerprints

use anyhow::Result;
use camup_db::{
    CameraUploadFolderType, CameraUploadsRecord, CameraUploadsRecordType, RecordKey, RecordStore,
    UploadStatus,
};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cipher::FieldCipher;

#[derive(Clone)]
pub struct RecordRepository {
    store: RecordStore,
    cipher: Option<Arc<FieldCipher>>,
}

impl RecordRepository {
    pub fn new(store: RecordStore, cipher: Option<FieldCipher>) -> Self {
        Self {
            store,
            cipher: cipher.map(Arc::new),
        }
    }

    fn seal(&self, value: &str) -> Result<String> {
        match self.cipher {
            Some(ref cipher) => cipher.encrypt(value),
            None => Ok(value.to_string()),
        }
    }

    fn open(&self, value: &str) -> Result<String> {
        match self.cipher {
            Some(ref cipher) => cipher.decrypt(value),
            None => Ok(value.to_string()),
        }
    }

    fn encrypt_record(&self, record: &CameraUploadsRecord) -> Result<CameraUploadsRecord> {
        Ok(CameraUploadsRecord {
            file_name: self.seal(&record.file_name)?,
            file_path: self.seal(&record.file_path)?,
            original_fingerprint: self.seal(&record.original_fingerprint)?,
            generated_fingerprint: record
                .generated_fingerprint
                .as_deref()
                .map(|fp| self.seal(fp))
                .transpose()?,
            temp_file_path: self.seal(&record.temp_file_path)?,
            ..record.clone()
        })
    }

    fn decrypt_record(&self, record: CameraUploadsRecord) -> Result<CameraUploadsRecord> {
        Ok(CameraUploadsRecord {
            file_name: self.open(&record.file_name)?,
            file_path: self.open(&record.file_path)?,
            original_fingerprint: self.open(&record.original_fingerprint)?,
            generated_fingerprint: record
                .generated_fingerprint
                .as_deref()
                .map(|fp| self.open(fp))
                .transpose()?,
            temp_file_path: self.open(&record.temp_file_path)?,
            ..record
        })
    }

    fn decrypt_all(&self, records: Vec<CameraUploadsRecord>) -> Result<Vec<CameraUploadsRecord>> {
        records.into_iter().map(|r| self.decrypt_record(r)).collect()
    }

    pub fn upsert_records(&self, records: &[CameraUploadsRecord]) -> Result<()> {
        let sealed = records
            .iter()
            .map(|r| self.encrypt_record(r))
            .collect::<Result<Vec<_>>>()?;
        self.store.upsert_records(&sealed)?;
        Ok(())
    }

    pub fn get_records(
        &self,
        statuses: &[UploadStatus],
        file_types: &[CameraUploadsRecordType],
        folder_types: &[CameraUploadFolderType],
    ) -> Result<Vec<CameraUploadsRecord>> {
        self.decrypt_all(self.store.get_records(statuses, file_types, folder_types)?)
    }

    pub fn get_record(&self, key: &RecordKey) -> Result<Option<CameraUploadsRecord>> {
        self.store
            .get_record(key)?
            .map(|r| self.decrypt_record(r))
            .transpose()
    }

    pub fn get_all_records(&self) -> Result<Vec<CameraUploadsRecord>> {
        self.decrypt_all(self.store.get_all_records()?)
    }

    pub fn update_upload_status(&self, key: &RecordKey, status: UploadStatus) -> Result<bool> {
        Ok(self.store.update_upload_status(key, status)?)
    }

    pub fn transition_upload_status(
        &self,
        key: &RecordKey,
        from: UploadStatus,
        to: UploadStatus,
    ) -> Result<bool> {
        Ok(self.store.transition_upload_status(key, from, to)?)
    }

    pub fn update_generated_fingerprint(&self, key: &RecordKey, fingerprint: &str) -> Result<bool> {
        let sealed = self.seal(fingerprint)?;
        Ok(self.store.update_generated_fingerprint(key, &sealed)?)
    }

    pub fn delete_records_by_folder_type(&self, folder_types: &[CameraUploadFolderType]) -> Result<usize> {
        Ok(self.store.delete_records_by_folder_type(folder_types)?)
    }

    pub fn count_by_status(&self) -> Result<BTreeMap<(CameraUploadFolderType, UploadStatus), i64>> {
        Ok(self.store.count_by_status()?)
    }
}

//! Reconciles the local media index against the record store
//!
//! Each pass discovers new media as pending records, retires records of
//! disabled folder types and marks pending records whose file vanished.
//! Upload outcomes only ever move a record out of `Pending`.

use anyhow::Result;
use camup_db::{CameraUploadFolderType, CameraUploadsRecord, RecordKey, UploadStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::mapper::RecordMapper;
use crate::media::MediaIndex;
use crate::repository::RecordRepository;
use crate::transport::UploadTransport;

/// Counters for one reconciliation pass
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileSummary {
    /// Media items reported by the index
    pub discovered: usize,
    /// Items already represented by a record
    pub already_tracked: usize,
    /// New pending records written
    pub inserted: usize,
    /// Items that could not be fingerprinted
    pub skipped: usize,
    /// Pending records whose local file is gone
    pub missing: usize,
    /// Records removed because their folder type is disabled
    pub removed: usize,
    pub finished_at: DateTime<Utc>,
}

impl Default for ReconcileSummary {
    fn default() -> Self {
        Self {
            discovered: 0,
            already_tracked: 0,
            inserted: 0,
            skipped: 0,
            missing: 0,
            removed: 0,
            finished_at: Utc::now(),
        }
    }
}

/// Counters for one upload pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub failed: usize,
    pub missing: usize,
}

/// Final outcome of an upload reported by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded,
    Failed,
    LocalFileNotExist,
}

impl UploadOutcome {
    pub fn status(&self) -> UploadStatus {
        match self {
            UploadOutcome::Uploaded => UploadStatus::Uploaded,
            UploadOutcome::Failed => UploadStatus::Failed,
            UploadOutcome::LocalFileNotExist => UploadStatus::LocalFileNotExist,
        }
    }
}

pub struct Reconciler {
    repo: RecordRepository,
    index: Arc<dyn MediaIndex>,
    mapper: RecordMapper,
    config: Config,
}

impl Reconciler {
    pub fn new(
        repo: RecordRepository,
        index: Arc<dyn MediaIndex>,
        mapper: RecordMapper,
        config: Config,
    ) -> Self {
        Self {
            repo,
            index,
            mapper,
            config,
        }
    }

    pub fn repository(&self) -> &RecordRepository {
        &self.repo
    }

    /// Run one reconciliation pass
    pub fn reconcile_once(&self) -> Result<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();

        let disabled = self.config.disabled_folder_types();
        summary.removed = self.repo.delete_records_by_folder_type(&disabled)?;
        if summary.removed > 0 {
            info!("removed {} record(s) of disabled folders {:?}", summary.removed, disabled);
        }

        let mut known: HashSet<RecordKey> = self
            .repo
            .get_all_records()?
            .iter()
            .map(CameraUploadsRecord::key)
            .collect();

        let file_types = self.config.enabled_file_types();
        let temp_root = self.config.temp_root();
        let mut new_records = Vec::new();
        let mut listed_folders = Vec::new();

        for folder_type in self.config.enabled_folder_types() {
            let Some(folder) = self.config.folder(folder_type).local_path() else {
                warn!("{} folder enabled without a local path, skipping", folder_type);
                continue;
            };

            let mut available = true;

            for &file_type in &file_types {
                let media = match self.index.get_media_list(&folder, file_type) {
                    Ok(media) => media,
                    Err(e) => {
                        warn!("cannot list {} folder: {}", folder_type, e);
                        available = false;
                        break;
                    }
                };

                for item in media {
                    summary.discovered += 1;

                    let key = RecordKey::new(item.media_id, item.timestamp, folder_type);
                    if !known.insert(key) {
                        summary.already_tracked += 1;
                        continue;
                    }

                    match self.mapper.map(&item, folder_type, file_type, &temp_root) {
                        Some(record) => new_records.push(record),
                        None => {
                            warn!("skipping {}: no fingerprint", item.file_path);
                            summary.skipped += 1;
                        }
                    }
                }
            }

            // an unavailable folder says nothing about whether its files exist
            if available {
                listed_folders.push(folder_type);
            }
        }

        self.repo.upsert_records(&new_records)?;
        summary.inserted = new_records.len();

        summary.missing = self.mark_missing(&listed_folders)?;
        summary.finished_at = Utc::now();

        info!(
            "reconciled: {} discovered, {} new, {} tracked, {} skipped, {} missing",
            summary.discovered,
            summary.inserted,
            summary.already_tracked,
            summary.skipped,
            summary.missing
        );

        Ok(summary)
    }

    fn mark_missing(&self, folder_types: &[CameraUploadFolderType]) -> Result<usize> {
        let pending = self.repo.get_records(
            &[UploadStatus::Pending],
            &self.config.enabled_file_types(),
            folder_types,
        )?;

        let mut missing = 0;
        for record in pending {
            if self.index.file_exists(&record.file_path) {
                continue;
            }
            debug!("local file gone for {}", record.key());
            if self.repo.transition_upload_status(
                &record.key(),
                UploadStatus::Pending,
                UploadStatus::LocalFileNotExist,
            )? {
                missing += 1;
            }
        }

        Ok(missing)
    }

    /// Pending records for the enabled folders and file types
    pub fn pending_records(&self) -> Result<Vec<CameraUploadsRecord>> {
        self.repo.get_records(
            &[UploadStatus::Pending],
            &self.config.enabled_file_types(),
            &self.config.enabled_folder_types(),
        )
    }

    /// Apply a transport outcome. Returns `false` if the record is missing
    /// or no longer pending.
    pub fn record_upload_outcome(&self, key: &RecordKey, outcome: UploadOutcome) -> Result<bool> {
        let applied = self
            .repo
            .transition_upload_status(key, UploadStatus::Pending, outcome.status())?;

        if !applied {
            warn!("ignoring {:?} for {}: record missing or not pending", outcome, key);
        }
        Ok(applied)
    }

    /// Returns `false` if no record has this key
    pub fn record_generated_fingerprint(&self, key: &RecordKey, fingerprint: &str) -> Result<bool> {
        self.repo.update_generated_fingerprint(key, fingerprint)
    }

    /// Push every pending record through `transport`
    pub fn upload_pending(&self, transport: &dyn UploadTransport) -> Result<UploadSummary> {
        let mut summary = UploadSummary::default();

        for record in self.pending_records()? {
            let key = record.key();

            if !self.index.file_exists(&record.file_path) {
                if self.record_upload_outcome(&key, UploadOutcome::LocalFileNotExist)? {
                    summary.missing += 1;
                }
                continue;
            }

            match transport.upload(&record) {
                Ok(receipt) => {
                    self.record_generated_fingerprint(&key, &receipt.fingerprint)?;
                    if receipt.fingerprint != record.original_fingerprint {
                        warn!("{} changed while uploading", record.file_name);
                    }
                    if self.record_upload_outcome(&key, UploadOutcome::Uploaded)? {
                        summary.uploaded += 1;
                    }
                }
                Err(e) => {
                    error!("upload of {} failed: {:#}", record.file_name, e);
                    if self.record_upload_outcome(&key, UploadOutcome::Failed)? {
                        summary.failed += 1;
                    }
                }
            }
        }

        info!(
            "upload pass: {} uploaded, {} failed, {} missing",
            summary.uploaded, summary.failed, summary.missing
        );
        Ok(summary)
    }

    /// Reconcile on the configured interval until `running` is cleared
    ///
    /// Each pass blocks on SQLite and the file system, so this needs the
    /// multi-threaded runtime.
    pub async fn run(&self, running: Arc<AtomicBool>) -> Result<()> {
        let interval = self.config.scan_interval();
        info!("starting camera uploads scan every {:?}", interval);

        while running.load(Ordering::Relaxed) {
            if let Err(e) = tokio::task::block_in_place(|| self.reconcile_once()) {
                error!("reconciliation error: {:#}", e);
            }

            let started = Instant::now();
            while running.load(Ordering::Relaxed) && started.elapsed() < interval {
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        }

        info!("camera uploads scan stopped");
        Ok(())
    }
}

//! Database query functions

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::Result;
use crate::schema::*;

const RECORD_COLUMNS: &str = "media_id, timestamp, folder_type, file_name, file_path, file_type, \
     upload_status, original_fingerprint, generated_fingerprint, temp_file_path, file_size";

/// Insert records, replacing every non-key column of rows whose key exists
///
/// The whole batch runs in one transaction: if any row is rejected, none
/// of them are applied.
pub fn upsert_records(conn: &Connection, records: &[CameraUploadsRecord]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let tx = conn.unchecked_transaction()?;

    {
        let mut stmt = tx.prepare_cached(
            r#"INSERT INTO camera_uploads_records
               (media_id, timestamp, folder_type, file_name, file_path, file_type,
                upload_status, original_fingerprint, generated_fingerprint, temp_file_path, file_size)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
               ON CONFLICT(media_id, timestamp, folder_type) DO UPDATE SET
                   file_name = excluded.file_name,
                   file_path = excluded.file_path,
                   file_type = excluded.file_type,
                   upload_status = excluded.upload_status,
                   original_fingerprint = excluded.original_fingerprint,
                   generated_fingerprint = excluded.generated_fingerprint,
                   temp_file_path = excluded.temp_file_path,
                   file_size = excluded.file_size"#,
        )?;

        for record in records {
            stmt.execute(params![
                record.media_id,
                record.timestamp,
                record.folder_type,
                record.file_name,
                record.file_path,
                record.file_type,
                record.upload_status,
                record.original_fingerprint,
                record.generated_fingerprint,
                record.temp_file_path,
                record.file_size,
            ])?;
        }
    }

    tx.commit()?;
    debug!("upserted {} records", records.len());
    Ok(())
}

/// Get records matching all three filters
///
/// An empty list for any filter matches nothing.
pub fn get_records(
    conn: &Connection,
    statuses: &[UploadStatus],
    file_types: &[CameraUploadsRecordType],
    folder_types: &[CameraUploadFolderType],
) -> Result<Vec<CameraUploadsRecord>> {
    if statuses.is_empty() || file_types.is_empty() || folder_types.is_empty() {
        return Ok(vec![]);
    }

    let sql = format!(
        "SELECT {} FROM camera_uploads_records \
         WHERE upload_status IN ({}) AND file_type IN ({}) AND folder_type IN ({}) \
         ORDER BY rowid",
        RECORD_COLUMNS,
        placeholders(statuses.len()),
        placeholders(file_types.len()),
        placeholders(folder_types.len()),
    );

    let codes = statuses
        .iter()
        .map(UploadStatus::as_code)
        .chain(file_types.iter().map(CameraUploadsRecordType::as_code))
        .chain(folder_types.iter().map(CameraUploadFolderType::as_code));

    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params_from_iter(codes), row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(records)
}

/// Get a single record by its composite key
pub fn get_record(conn: &Connection, key: &RecordKey) -> Result<Option<CameraUploadsRecord>> {
    let sql = format!(
        "SELECT {} FROM camera_uploads_records \
         WHERE media_id = ?1 AND timestamp = ?2 AND folder_type = ?3",
        RECORD_COLUMNS
    );

    let record = conn
        .query_row(&sql, params![key.media_id, key.timestamp, key.folder_type], row_to_record)
        .optional()?;

    Ok(record)
}

/// Get every record in insertion order
pub fn get_all_records(conn: &Connection) -> Result<Vec<CameraUploadsRecord>> {
    let sql = format!("SELECT {} FROM camera_uploads_records ORDER BY rowid", RECORD_COLUMNS);

    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map([], row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(records)
}

/// Set the upload status of one record. Returns the number of rows changed (0 or 1).
pub fn update_upload_status(conn: &Connection, key: &RecordKey, status: UploadStatus) -> Result<usize> {
    let changed = conn.execute(
        r#"UPDATE camera_uploads_records SET upload_status = ?4
           WHERE media_id = ?1 AND timestamp = ?2 AND folder_type = ?3"#,
        params![key.media_id, key.timestamp, key.folder_type, status],
    )?;

    if changed == 0 {
        debug!("no record {} to set status {}", key, status);
    }
    Ok(changed)
}

/// Move one record from `from` to `to` in a single statement
///
/// Returns `false` when the record is missing or no longer in `from`.
pub fn transition_upload_status(
    conn: &Connection,
    key: &RecordKey,
    from: UploadStatus,
    to: UploadStatus,
) -> Result<bool> {
    let changed = conn.execute(
        r#"UPDATE camera_uploads_records SET upload_status = ?5
           WHERE media_id = ?1 AND timestamp = ?2 AND folder_type = ?3 AND upload_status = ?4"#,
        params![key.media_id, key.timestamp, key.folder_type, from, to],
    )?;
    Ok(changed > 0)
}

/// Set the generated fingerprint of one record. Returns the number of rows changed (0 or 1).
pub fn update_generated_fingerprint(
    conn: &Connection,
    key: &RecordKey,
    fingerprint: &str,
) -> Result<usize> {
    let changed = conn.execute(
        r#"UPDATE camera_uploads_records SET generated_fingerprint = ?4
           WHERE media_id = ?1 AND timestamp = ?2 AND folder_type = ?3"#,
        params![key.media_id, key.timestamp, key.folder_type, fingerprint],
    )?;

    if changed == 0 {
        debug!("no record {} to set generated fingerprint", key);
    }
    Ok(changed)
}

/// Delete every record belonging to one of the given folder types
pub fn delete_records_by_folder_type(
    conn: &Connection,
    folder_types: &[CameraUploadFolderType],
) -> Result<usize> {
    if folder_types.is_empty() {
        return Ok(0);
    }

    let sql = format!(
        "DELETE FROM camera_uploads_records WHERE folder_type IN ({})",
        placeholders(folder_types.len())
    );
    let deleted = conn.execute(
        &sql,
        params_from_iter(folder_types.iter().map(CameraUploadFolderType::as_code)),
    )?;

    debug!("deleted {} records for {:?}", deleted, folder_types);
    Ok(deleted)
}

/// Count records per folder type and upload status
pub fn count_by_status(
    conn: &Connection,
) -> Result<BTreeMap<(CameraUploadFolderType, UploadStatus), i64>> {
    let mut stmt = conn.prepare(
        r#"SELECT folder_type, upload_status, COUNT(*)
           FROM camera_uploads_records
           GROUP BY folder_type, upload_status"#,
    )?;

    let counts: BTreeMap<(CameraUploadFolderType, UploadStatus), i64> = stmt
        .query_map([], |row| {
            let folder_type: CameraUploadFolderType = row.get(0)?;
            let status: UploadStatus = row.get(1)?;
            let count: i64 = row.get(2)?;
            Ok(((folder_type, status), count))
        })?
        .collect::<rusqlite::Result<_>>()?;

    Ok(counts)
}

// Helper functions

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn row_to_record(row: &Row) -> rusqlite::Result<CameraUploadsRecord> {
    Ok(CameraUploadsRecord {
        media_id: row.get(0)?,
        timestamp: row.get(1)?,
        folder_type: row.get(2)?,
        file_name: row.get(3)?,
        file_path: row.get(4)?,
        file_type: row.get(5)?,
        upload_status: row.get(6)?,
        original_fingerprint: row.get(7)?,
        generated_fingerprint: row.get(8)?,
        temp_file_path: row.get(9)?,
        file_size: row.get(10)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::migrations;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrations::run_all(&conn).unwrap();
        conn
    }

    /// Ten records: even ids Primary, ids 1-5 photos, 1-2 uploaded, 3-6 pending, 7-10 failed
    pub(crate) fn fixture() -> Vec<CameraUploadsRecord> {
        (1..=10)
            .map(|i: i64| CameraUploadsRecord {
                media_id: i,
                timestamp: i,
                folder_type: if i % 2 == 0 {
                    CameraUploadFolderType::Primary
                } else {
                    CameraUploadFolderType::Secondary
                },
                file_name: format!("encryptedFileName{}", i),
                file_path: format!("encryptedFilePath{}", i),
                file_type: if i < 6 {
                    CameraUploadsRecordType::Photo
                } else {
                    CameraUploadsRecordType::Video
                },
                upload_status: match i {
                    1..=2 => UploadStatus::Uploaded,
                    3..=6 => UploadStatus::Pending,
                    _ => UploadStatus::Failed,
                },
                original_fingerprint: format!("encryptedOriginalFingerprint{}", i),
                generated_fingerprint: Some(format!("encryptedGeneratedFingerprint{}", i)),
                temp_file_path: format!("encryptedTempFilePath{}", i),
                file_size: i,
            })
            .collect()
    }

    #[test]
    fn test_upsert_inserts_all_records() {
        let conn = open();
        let records = fixture();
        upsert_records(&conn, &records).unwrap();
        assert_eq!(get_all_records(&conn).unwrap(), records);
    }

    #[test]
    fn test_upsert_twice_is_idempotent() {
        let conn = open();
        let records = fixture();
        upsert_records(&conn, &records).unwrap();
        upsert_records(&conn, &records).unwrap();
        assert_eq!(get_all_records(&conn).unwrap(), records);
    }

    #[test]
    fn test_upsert_replaces_whole_row() {
        let conn = open();
        let records = fixture();
        upsert_records(&conn, &records).unwrap();

        let replacement = CameraUploadsRecord {
            file_name: "renamed".into(),
            file_path: "moved".into(),
            file_type: CameraUploadsRecordType::Video,
            upload_status: UploadStatus::Pending,
            original_fingerprint: "other".into(),
            generated_fingerprint: None,
            temp_file_path: "tmp".into(),
            file_size: 999,
            ..records[0].clone()
        };
        upsert_records(&conn, &[replacement.clone()]).unwrap();

        let all = get_all_records(&conn).unwrap();
        assert_eq!(all.len(), records.len());
        assert_eq!(all[0], replacement);
        assert_eq!(get_record(&conn, &replacement.key()).unwrap(), Some(replacement));
    }

    #[test]
    fn test_failed_batch_applies_nothing() {
        let conn = open();
        let mut records = fixture();
        records[7].file_size = -1;

        assert!(upsert_records(&conn, &records).is_err());
        assert!(get_all_records(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_get_records_filters_by_all_three_sets() {
        let conn = open();
        upsert_records(&conn, &fixture()).unwrap();

        let found = get_records(
            &conn,
            &[UploadStatus::Pending, UploadStatus::Failed],
            &[CameraUploadsRecordType::Photo],
            &[CameraUploadFolderType::Primary],
        )
        .unwrap();

        let ids: Vec<i64> = found.iter().map(|r| r.media_id).collect();
        assert_eq!(ids, vec![4]);
    }

    #[test]
    fn test_get_records_matches_manual_filter() {
        let conn = open();
        let records = fixture();
        upsert_records(&conn, &records).unwrap();

        let statuses = [UploadStatus::Uploaded, UploadStatus::Failed];
        let types = CameraUploadsRecordType::ALL;
        let folders = [CameraUploadFolderType::Secondary];

        let expected: Vec<_> = records
            .iter()
            .filter(|r| {
                statuses.contains(&r.upload_status)
                    && types.contains(&r.file_type)
                    && folders.contains(&r.folder_type)
            })
            .cloned()
            .collect();

        assert_eq!(get_records(&conn, &statuses, &types, &folders).unwrap(), expected);
    }

    #[test]
    fn test_get_records_with_empty_filter_matches_nothing() {
        let conn = open();
        upsert_records(&conn, &fixture()).unwrap();

        let all_types = CameraUploadsRecordType::ALL;
        let all_folders = CameraUploadFolderType::ALL;
        assert!(get_records(&conn, &[], &all_types, &all_folders).unwrap().is_empty());
        assert!(get_records(&conn, &UploadStatus::ALL, &[], &all_folders).unwrap().is_empty());
        assert!(get_records(&conn, &UploadStatus::ALL, &all_types, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_update_status_touches_only_status() {
        let conn = open();
        let records = fixture();
        upsert_records(&conn, &records).unwrap();

        let target = records[0].key();
        let changed = update_upload_status(&conn, &target, UploadStatus::LocalFileNotExist).unwrap();
        assert_eq!(changed, 1);

        let all = get_all_records(&conn).unwrap();
        let expected = CameraUploadsRecord {
            upload_status: UploadStatus::LocalFileNotExist,
            ..records[0].clone()
        };
        assert_eq!(all[0], expected);
        assert_eq!(&all[1..], &records[1..]);
    }

    #[test]
    fn test_update_generated_fingerprint_touches_only_fingerprint() {
        let conn = open();
        let records = fixture();
        upsert_records(&conn, &records).unwrap();

        let target = records[3].key();
        update_generated_fingerprint(&conn, &target, "generatedFingerprint").unwrap();

        let updated = get_record(&conn, &target).unwrap().unwrap();
        assert_eq!(
            updated,
            CameraUploadsRecord {
                generated_fingerprint: Some("generatedFingerprint".into()),
                ..records[3].clone()
            }
        );
    }

    #[test]
    fn test_updates_on_missing_key_are_noops() {
        let conn = open();
        let records = fixture();
        upsert_records(&conn, &records).unwrap();

        // same media id and timestamp as record 1, other folder type
        let missing = RecordKey::new(1, 1, CameraUploadFolderType::Primary);
        assert_eq!(update_upload_status(&conn, &missing, UploadStatus::Uploaded).unwrap(), 0);
        assert_eq!(update_generated_fingerprint(&conn, &missing, "x").unwrap(), 0);
        assert_eq!(get_record(&conn, &missing).unwrap(), None);

        assert_eq!(get_all_records(&conn).unwrap(), records);
    }

    #[test]
    fn test_transition_requires_expected_status() {
        let conn = open();
        let records = fixture();
        upsert_records(&conn, &records).unwrap();

        // record 1 is uploaded, record 3 is pending
        let uploaded = records[0].key();
        let pending = records[2].key();

        assert!(!transition_upload_status(&conn, &uploaded, UploadStatus::Pending, UploadStatus::Failed).unwrap());
        assert!(transition_upload_status(&conn, &pending, UploadStatus::Pending, UploadStatus::Failed).unwrap());
        assert!(!transition_upload_status(&conn, &pending, UploadStatus::Pending, UploadStatus::Uploaded).unwrap());

        assert_eq!(get_record(&conn, &uploaded).unwrap().unwrap().upload_status, UploadStatus::Uploaded);
        assert_eq!(get_record(&conn, &pending).unwrap().unwrap().upload_status, UploadStatus::Failed);
    }

    #[test]
    fn test_delete_by_folder_type_keeps_other_folders() {
        let conn = open();
        let records = fixture();
        upsert_records(&conn, &records).unwrap();

        let deleted = delete_records_by_folder_type(&conn, &[CameraUploadFolderType::Primary]).unwrap();
        assert_eq!(deleted, 5);

        let secondary: Vec<_> = records
            .into_iter()
            .filter(|r| r.folder_type == CameraUploadFolderType::Secondary)
            .collect();
        assert_eq!(get_all_records(&conn).unwrap(), secondary);
    }

    #[test]
    fn test_delete_with_no_folder_types_deletes_nothing() {
        let conn = open();
        upsert_records(&conn, &fixture()).unwrap();
        assert_eq!(delete_records_by_folder_type(&conn, &[]).unwrap(), 0);
        assert_eq!(get_all_records(&conn).unwrap().len(), 10);
    }

    #[test]
    fn test_same_media_id_in_other_time_window_is_a_new_record() {
        let conn = open();
        let first = fixture().remove(0);
        let later = CameraUploadsRecord {
            timestamp: first.timestamp + 60_000,
            ..first.clone()
        };
        upsert_records(&conn, &[first, later]).unwrap();
        assert_eq!(get_all_records(&conn).unwrap().len(), 2);
    }

    #[test]
    fn test_count_by_status() {
        let conn = open();
        upsert_records(&conn, &fixture()).unwrap();

        let counts = count_by_status(&conn).unwrap();
        use CameraUploadFolderType::*;
        assert_eq!(counts.get(&(Primary, UploadStatus::Uploaded)), Some(&1));
        assert_eq!(counts.get(&(Secondary, UploadStatus::Uploaded)), Some(&1));
        assert_eq!(counts.get(&(Primary, UploadStatus::Pending)), Some(&2));
        assert_eq!(counts.get(&(Secondary, UploadStatus::Pending)), Some(&2));
        assert_eq!(counts.get(&(Primary, UploadStatus::Failed)), Some(&2));
        assert_eq!(counts.get(&(Secondary, UploadStatus::Failed)), Some(&2));
        assert_eq!(counts.values().sum::<i64>(), 10);
    }
}

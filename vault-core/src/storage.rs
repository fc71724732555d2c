//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `records` - Append-only record versions (key: linear_id || version)
//! - `heads` - Latest version per linear id (key: linear_id)
//! - `applied` - Transaction ids already applied (key: tx_id)
//! - `checkpoints` - Workflow checkpoints (key: flow_id)

use crate::{
    error::{Error, Result},
    types::{LinearId, RecordEntry, RecordRef},
    Config,
};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_RECORDS: &str = "records";
const CF_HEADS: &str = "heads";
const CF_APPLIED: &str = "applied";
const CF_CHECKPOINTS: &str = "checkpoints";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_RECORDS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_HEADS, Options::default()),
            ColumnFamilyDescriptor::new(CF_APPLIED, Options::default()),
            ColumnFamilyDescriptor::new(CF_CHECKPOINTS, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened record store at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Key encodings

    fn record_key(reference: &RecordRef) -> [u8; 24] {
        let mut key = [0u8; 24];
        key[..16].copy_from_slice(reference.linear_id.as_uuid().as_bytes());
        key[16..].copy_from_slice(&reference.version.to_be_bytes());
        key
    }

    // Record operations

    /// Write one record version
    pub fn put_entry(&self, entry: &RecordEntry) -> Result<()> {
        let cf = self.cf_handle(CF_RECORDS)?;
        let key = Self::record_key(&entry.reference);
        let value = bincode::serialize(entry)?;
        self.db.put_cf(cf, key, value)?;

        self.bump_head(&entry.reference)?;

        tracing::debug!(
            reference = %entry.reference,
            kind = entry.state.payload.kind(),
            "Record version stored"
        );

        Ok(())
    }

    /// Get one record version
    pub fn get_entry(&self, reference: &RecordRef) -> Result<RecordEntry> {
        let cf = self.cf_handle(CF_RECORDS)?;
        let key = Self::record_key(reference);

        let value = self
            .db
            .get_cf(cf, key)?
            .ok_or_else(|| Error::RecordNotFound(reference.to_string()))?;

        let entry: RecordEntry = bincode::deserialize(&value)?;
        Ok(entry)
    }

    /// Latest version for a linear id, if any
    pub fn head_version(&self, linear_id: &LinearId) -> Result<Option<u64>> {
        let cf = self.cf_handle(CF_HEADS)?;
        let value = self.db.get_cf(cf, linear_id.as_uuid().as_bytes())?;

        Ok(value.map(|bytes| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[..8]);
            u64::from_be_bytes(buf)
        }))
    }

    fn bump_head(&self, reference: &RecordRef) -> Result<()> {
        let current = self.head_version(&reference.linear_id)?;
        if current.map_or(true, |v| reference.version > v) {
            let cf = self.cf_handle(CF_HEADS)?;
            self.db.put_cf(
                cf,
                reference.linear_id.as_uuid().as_bytes(),
                reference.version.to_be_bytes(),
            )?;
        }
        Ok(())
    }

    /// Load the head (latest) version of every lineage
    ///
    /// Only a head can be UNCONSUMED, so current-state queries walk this
    /// index instead of every stored version.
    pub fn scan_heads(&self) -> Result<Vec<RecordEntry>> {
        let cf_heads = self.cf_handle(CF_HEADS)?;
        let cf_records = self.cf_handle(CF_RECORDS)?;
        let iter = self.db.iterator_cf(cf_heads, IteratorMode::Start);

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            let uuid = Uuid::from_slice(&key)
                .map_err(|e| Error::Storage(format!("Malformed head key: {}", e)))?;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&value[..8]);
            let reference =
                RecordRef::new(LinearId::from_uuid(uuid), u64::from_be_bytes(buf));

            let raw = self
                .db
                .get_cf(cf_records, Self::record_key(&reference))?
                .ok_or_else(|| {
                    Error::Storage(format!("Head points at missing record {}", reference))
                })?;
            entries.push(bincode::deserialize(&raw)?);
        }
        Ok(entries)
    }

    /// Atomically write a finalized transaction's record updates
    ///
    /// `entries` carries both the consumed predecessor versions (status
    /// flipped, consuming tx pinned) and the newly produced versions. The
    /// applied marker makes replay a no-op.
    pub fn write_transaction(&self, tx_id: Uuid, entries: &[RecordEntry]) -> Result<()> {
        let cf_records = self.cf_handle(CF_RECORDS)?;
        let cf_heads = self.cf_handle(CF_HEADS)?;
        let cf_applied = self.cf_handle(CF_APPLIED)?;

        let mut batch = WriteBatch::default();
        for entry in entries {
            let key = Self::record_key(&entry.reference);
            batch.put_cf(cf_records, key, bincode::serialize(entry)?);

            let current = self.head_version(&entry.reference.linear_id)?;
            if current.map_or(true, |v| entry.reference.version > v) {
                batch.put_cf(
                    cf_heads,
                    entry.reference.linear_id.as_uuid().as_bytes(),
                    entry.reference.version.to_be_bytes(),
                );
            }
        }
        batch.put_cf(cf_applied, tx_id.as_bytes(), b"");

        self.db.write(batch)?;

        tracing::debug!(tx_id = %tx_id, updates = entries.len(), "Transaction applied");
        Ok(())
    }

    /// Whether a transaction id has already been applied
    pub fn is_applied(&self, tx_id: Uuid) -> Result<bool> {
        let cf = self.cf_handle(CF_APPLIED)?;
        Ok(self.db.get_cf(cf, tx_id.as_bytes())?.is_some())
    }

    // Checkpoint operations (opaque bytes; phases belong to the protocol layer)

    /// Persist a workflow checkpoint
    pub fn put_checkpoint(&self, flow_id: Uuid, bytes: &[u8]) -> Result<()> {
        let cf = self.cf_handle(CF_CHECKPOINTS)?;
        self.db.put_cf(cf, flow_id.as_bytes(), bytes)?;
        Ok(())
    }

    /// Load a workflow checkpoint
    pub fn get_checkpoint(&self, flow_id: Uuid) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(CF_CHECKPOINTS)?;
        Ok(self.db.get_cf(cf, flow_id.as_bytes())?)
    }

    /// Remove a completed workflow checkpoint
    pub fn delete_checkpoint(&self, flow_id: Uuid) -> Result<()> {
        let cf = self.cf_handle(CF_CHECKPOINTS)?;
        self.db.delete_cf(cf, flow_id.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Amount, CashRecord, Currency, PartyId, RecordPayload, RecordState, RecordStatus,
    };
    use chrono::Utc;

    fn test_entry(version: u64) -> RecordEntry {
        RecordEntry {
            reference: RecordRef::new(LinearId::fresh(), version),
            state: RecordState::new(
                RecordPayload::Cash(CashRecord {
                    owner: PartyId::new("PartyA"),
                    amount: Amount::new(10_000, Currency::GBP),
                    issuer: PartyId::new("Issuer"),
                }),
                vec![PartyId::new("PartyA")],
            ),
            status: RecordStatus::Unconsumed,
            predecessor: None,
            consumed_by: None,
            recorded_at: Utc::now(),
        }
    }

    fn open_storage() -> (Storage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::at(dir.path());
        (Storage::open(&config).unwrap(), dir)
    }

    #[test]
    fn test_put_and_get_entry() {
        let (storage, _dir) = open_storage();
        let entry = test_entry(0);

        storage.put_entry(&entry).unwrap();
        let loaded = storage.get_entry(&entry.reference).unwrap();
        assert_eq!(loaded, entry);
    }

    #[test]
    fn test_missing_entry_is_not_found() {
        let (storage, _dir) = open_storage();
        let reference = RecordRef::new(LinearId::fresh(), 0);

        let err = storage.get_entry(&reference).unwrap_err();
        assert!(matches!(err, Error::RecordNotFound(_)));
    }

    #[test]
    fn test_head_tracks_latest_version() {
        let (storage, _dir) = open_storage();
        let mut entry = test_entry(0);
        let linear_id = entry.reference.linear_id;

        storage.put_entry(&entry).unwrap();
        assert_eq!(storage.head_version(&linear_id).unwrap(), Some(0));

        entry.reference.version = 3;
        storage.put_entry(&entry).unwrap();
        assert_eq!(storage.head_version(&linear_id).unwrap(), Some(3));
    }

    #[test]
    fn test_scan_heads_returns_latest_versions_only() {
        let (storage, _dir) = open_storage();
        let mut entry = test_entry(0);
        let other = test_entry(0);

        storage.put_entry(&entry).unwrap();
        storage.put_entry(&other).unwrap();
        entry.reference.version = 1;
        storage.put_entry(&entry).unwrap();

        let heads = storage.scan_heads().unwrap();
        assert_eq!(heads.len(), 2);
        assert!(heads.iter().any(|e| e.reference == entry.reference));
        assert!(heads.iter().any(|e| e.reference == other.reference));
        assert!(!heads
            .iter()
            .any(|e| e.reference == RecordRef::new(entry.reference.linear_id, 0)));
    }

    #[test]
    fn test_write_transaction_is_marked_applied() {
        let (storage, _dir) = open_storage();
        let entry = test_entry(0);
        let tx_id = Uuid::now_v7();

        assert!(!storage.is_applied(tx_id).unwrap());
        storage.write_transaction(tx_id, &[entry.clone()]).unwrap();
        assert!(storage.is_applied(tx_id).unwrap());

        let loaded = storage.get_entry(&entry.reference).unwrap();
        assert_eq!(loaded, entry);
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let (storage, _dir) = open_storage();
        let flow_id = Uuid::now_v7();

        assert!(storage.get_checkpoint(flow_id).unwrap().is_none());

        storage.put_checkpoint(flow_id, b"phase-bytes").unwrap();
        assert_eq!(
            storage.get_checkpoint(flow_id).unwrap().as_deref(),
            Some(&b"phase-bytes"[..])
        );

        storage.delete_checkpoint(flow_id).unwrap();
        assert!(storage.get_checkpoint(flow_id).unwrap().is_none());
    }
}

// Keyvault — Record Store Repository
//
// Reads and writes vault metadata and key records. Listing and lookup return
// metadata only; the sealed key is reachable solely through `fetch_record`,
// which hands back the `Envelope` alongside the record.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension};

use crate::crypto::{generate_salt, Envelope, SALT_LEN};
use crate::ec::KeyFormat;

use super::db::Database;
use super::models::{RecordStatus, VaultPolicy, VaultRecord};
use super::StoreError;

const RECORD_COLUMNS: &str = "id, label, fmt, tags, created_at, last_used_at, use_count, \
     entropy_hint, policy, status, expires_at, last_rotated_at, rotation_count";

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over vault record storage.
pub trait RecordStore {
    /// The vault-wide KDF salt, generated and persisted on first call.
    fn salt(&self) -> Result<[u8; SALT_LEN], StoreError>;

    /// Raw meta value, or `None` when the key is absent.
    fn read_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Insert or replace a meta value.
    fn write_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Persist a new record with its sealed key.
    fn insert_record(&self, record: &VaultRecord, envelope: &Envelope) -> Result<(), StoreError>;

    /// All records, metadata only, oldest first.
    fn list_records(&self) -> Result<Vec<VaultRecord>, StoreError>;

    /// A record together with its sealed key.
    fn fetch_record(&self, id: &str) -> Result<(VaultRecord, Envelope), StoreError>;

    /// A record's metadata.
    fn get_record(&self, id: &str) -> Result<VaultRecord, StoreError>;

    /// Record a signature. `entropy_hint` replaces the stored hint when given.
    fn update_usage(
        &self,
        id: &str,
        use_count: u64,
        last_used_at: DateTime<Utc>,
        entropy_hint: Option<&str>,
    ) -> Result<VaultRecord, StoreError>;

    /// Replace a record's policy.
    fn update_policy(&self, id: &str, policy: &VaultPolicy) -> Result<VaultRecord, StoreError>;

    /// Swap in a re-sealed key and reset usage, in one statement.
    fn rotate_record(
        &self,
        id: &str,
        envelope: &Envelope,
        rotated_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
        entropy_hint: &str,
        rotation_count: u64,
    ) -> Result<VaultRecord, StoreError>;

    /// Change a record's lifecycle status and expiry.
    fn mark_status(
        &self,
        id: &str,
        status: RecordStatus,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<VaultRecord, StoreError>;
}

// ─── SQLite Implementation ──────────────────────────────────────────────────

pub struct SqliteRecordStore<'a> {
    db: &'a Database,
}

/// One `records` row as SQLite hands it back, before validation.
struct RawRecord {
    id: String,
    label: String,
    fmt: String,
    tags: String,
    created_at: f64,
    last_used_at: Option<f64>,
    use_count: i64,
    entropy_hint: String,
    policy: String,
    status: String,
    expires_at: Option<f64>,
    last_rotated_at: Option<f64>,
    rotation_count: i64,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            label: row.get(1)?,
            fmt: row.get(2)?,
            tags: row.get(3)?,
            created_at: row.get(4)?,
            last_used_at: row.get(5)?,
            use_count: row.get(6)?,
            entropy_hint: row.get(7)?,
            policy: row.get(8)?,
            status: row.get(9)?,
            expires_at: row.get(10)?,
            last_rotated_at: row.get(11)?,
            rotation_count: row.get(12)?,
        })
    }

    fn into_record(self) -> Result<VaultRecord, StoreError> {
        let fmt: KeyFormat = self
            .fmt
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("record {} has format '{}'", self.id, self.fmt)))?;

        let tags: BTreeSet<String> = if self.tags.trim().is_empty() {
            BTreeSet::new()
        } else {
            serde_json::from_str(&self.tags)?
        };
        let policy: VaultPolicy = serde_json::from_str(&self.policy)?;

        let created_at = from_epoch(self.created_at)?;
        let last_rotated_at = match self.last_rotated_at {
            Some(ts) => from_epoch(ts)?,
            None => created_at,
        };

        Ok(VaultRecord {
            fmt,
            tags,
            policy,
            created_at,
            last_used_at: self.last_used_at.map(from_epoch).transpose()?,
            use_count: to_count(self.use_count, "use_count")?,
            entropy_hint: self.entropy_hint,
            status: self.status.parse()?,
            expires_at: self.expires_at.map(from_epoch).transpose()?,
            last_rotated_at,
            rotation_count: to_count(self.rotation_count, "rotation_count")?,
            id: self.id,
            label: self.label,
        })
    }
}

impl<'a> SqliteRecordStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn meta_value(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let value = self
            .db
            .conn()
            .query_row("SELECT value FROM meta WHERE key=?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Turn a zero-row UPDATE into `RecordNotFound`, otherwise re-read.
    fn reload_if_changed(&self, id: &str, changed: usize) -> Result<VaultRecord, StoreError> {
        if changed == 0 {
            return Err(StoreError::RecordNotFound(id.to_string()));
        }
        self.get_record(id)
    }
}

impl<'a> RecordStore for SqliteRecordStore<'a> {
    fn salt(&self) -> Result<[u8; SALT_LEN], StoreError> {
        let bytes = match self.meta_value("salt")? {
            None => {
                let salt = generate_salt();
                self.write_meta("salt", &salt)?;
                tracing::debug!("Generated new vault salt");
                return Ok(salt);
            }
            Some(Value::Null) => return Err(StoreError::MissingSalt),
            Some(value) => value_bytes(value)
                .ok_or_else(|| StoreError::Corrupt("salt has an unexpected type".to_string()))?,
        };

        bytes.as_slice().try_into().map_err(|_| {
            StoreError::Corrupt(format!(
                "salt is {} bytes, expected {}",
                bytes.len(),
                SALT_LEN
            ))
        })
    }

    fn read_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.meta_value(key)?.and_then(value_bytes))
    }

    fn write_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.db.conn().execute(
            "INSERT OR REPLACE INTO meta(key, value) VALUES(?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn insert_record(&self, record: &VaultRecord, envelope: &Envelope) -> Result<(), StoreError> {
        let tags_json = serde_json::to_string(&record.tags)?;
        let policy_json = serde_json::to_string(&record.policy)?;

        self.db.conn().execute(
            "INSERT INTO records (id, label, fmt, tags, created_at, last_used_at, use_count,
                entropy_hint, policy, enc_priv, nonce, status, expires_at, last_rotated_at,
                rotation_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                record.id,
                record.label,
                record.fmt.as_str(),
                tags_json,
                to_epoch(record.created_at),
                record.last_used_at.map(to_epoch),
                from_count(record.use_count)?,
                record.entropy_hint,
                policy_json,
                envelope.ciphertext,
                envelope.nonce,
                record.status.as_str(),
                record.expires_at.map(to_epoch),
                to_epoch(record.last_rotated_at),
                from_count(record.rotation_count)?,
            ],
        )?;

        tracing::debug!(record_id = %record.id, "Inserted record");
        Ok(())
    }

    fn list_records(&self) -> Result<Vec<VaultRecord>, StoreError> {
        let mut stmt = self.db.conn().prepare(&format!(
            "SELECT {} FROM records ORDER BY created_at ASC, rowid ASC",
            RECORD_COLUMNS
        ))?;

        let raw = stmt
            .query_map([], RawRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter().map(RawRecord::into_record).collect()
    }

    fn fetch_record(&self, id: &str) -> Result<(VaultRecord, Envelope), StoreError> {
        let row = self
            .db
            .conn()
            .query_row(
                &format!("SELECT {}, enc_priv, nonce FROM records WHERE id=?1", RECORD_COLUMNS),
                params![id],
                |row| {
                    let raw = RawRecord::from_row(row)?;
                    let envelope = Envelope {
                        ciphertext: row.get(13)?,
                        nonce: row.get(14)?,
                    };
                    Ok((raw, envelope))
                },
            )
            .optional()?;

        match row {
            Some((raw, envelope)) => Ok((raw.into_record()?, envelope)),
            None => Err(StoreError::RecordNotFound(id.to_string())),
        }
    }

    fn get_record(&self, id: &str) -> Result<VaultRecord, StoreError> {
        let raw = self
            .db
            .conn()
            .query_row(
                &format!("SELECT {} FROM records WHERE id=?1", RECORD_COLUMNS),
                params![id],
                RawRecord::from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::RecordNotFound(id.to_string()))?;

        raw.into_record()
    }

    fn update_usage(
        &self,
        id: &str,
        use_count: u64,
        last_used_at: DateTime<Utc>,
        entropy_hint: Option<&str>,
    ) -> Result<VaultRecord, StoreError> {
        let changed = match entropy_hint {
            Some(hint) => self.db.conn().execute(
                "UPDATE records SET use_count=?1, last_used_at=?2, entropy_hint=?3 WHERE id=?4",
                params![from_count(use_count)?, to_epoch(last_used_at), hint, id],
            )?,
            None => self.db.conn().execute(
                "UPDATE records SET use_count=?1, last_used_at=?2 WHERE id=?3",
                params![from_count(use_count)?, to_epoch(last_used_at), id],
            )?,
        };
        self.reload_if_changed(id, changed)
    }

    fn update_policy(&self, id: &str, policy: &VaultPolicy) -> Result<VaultRecord, StoreError> {
        let policy_json = serde_json::to_string(policy)?;
        let changed = self.db.conn().execute(
            "UPDATE records SET policy=?1 WHERE id=?2",
            params![policy_json, id],
        )?;
        self.reload_if_changed(id, changed)
    }

    fn rotate_record(
        &self,
        id: &str,
        envelope: &Envelope,
        rotated_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
        entropy_hint: &str,
        rotation_count: u64,
    ) -> Result<VaultRecord, StoreError> {
        let changed = self.db.conn().execute(
            "UPDATE records SET enc_priv=?1, nonce=?2, last_rotated_at=?3, expires_at=?4,
                entropy_hint=?5, rotation_count=?6, use_count=0, last_used_at=NULL,
                status='active'
             WHERE id=?7",
            params![
                envelope.ciphertext,
                envelope.nonce,
                to_epoch(rotated_at),
                expires_at.map(to_epoch),
                entropy_hint,
                from_count(rotation_count)?,
                id,
            ],
        )?;
        self.reload_if_changed(id, changed)
    }

    fn mark_status(
        &self,
        id: &str,
        status: RecordStatus,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<VaultRecord, StoreError> {
        let changed = self.db.conn().execute(
            "UPDATE records SET status=?1, expires_at=?2 WHERE id=?3",
            params![status.as_str(), expires_at.map(to_epoch), id],
        )?;
        self.reload_if_changed(id, changed)
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn value_bytes(value: Value) -> Option<Vec<u8>> {
    match value {
        Value::Blob(bytes) => Some(bytes),
        Value::Text(text) => Some(text.into_bytes()),
        _ => None,
    }
}

/// Unix seconds with microsecond precision, the on-disk timestamp form.
fn to_epoch(ts: DateTime<Utc>) -> f64 {
    ts.timestamp_micros() as f64 / 1_000_000.0
}

fn from_epoch(secs: f64) -> Result<DateTime<Utc>, StoreError> {
    if !secs.is_finite() {
        return Err(StoreError::Corrupt(format!("timestamp {} is not finite", secs)));
    }
    let micros = (secs * 1_000_000.0).round() as i64;
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(micros.div_euclid(1_000_000), nanos)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {} is out of range", secs)))
}

fn to_count(value: i64, column: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} is negative", column)))
}

fn from_count(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("counter {} overflows", value)))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

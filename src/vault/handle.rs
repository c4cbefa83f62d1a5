// Keyvault — Vault handle
//
// The `Vault` owns the open database and the derived master key behind one
// mutex. Every public operation holds the lock for its whole duration, so
// fetch, lifecycle check, rotation, policy enforcement, decryption, signing
// and the usage update happen as one step with respect to other callers.
// Closing the vault drops the state, which wipes the master key.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::{decrypt, derive_key, encrypt, Envelope, KdfParams, KEY_LEN, NONCE_LEN};
use crate::ec::{sign_payload, validate_private_key, KeyFormat, Signature, ALGORITHM};
use crate::error::{Result, VaultError};
use crate::store::{
    Database, RecordStatus, RecordStore, SqliteRecordStore, StoreError, VaultPolicy, VaultRecord,
};

use super::audit::{RotationAuditLog, RotationEvent, RotationReason};
use super::clock::{Clock, SystemClock};
use super::config::VaultConfig;
use super::policy::{check_lifecycle, enforce_policy, expiry_from, Lifecycle};

// ─── Constants ───────────────────────────────────────────────────────────────

const META_KDF: &str = "kdf";
const META_VERIFIER: &str = "verifier";

/// Sealed under the master key at creation; opening it proves the passphrase.
const VERIFIER_PLAINTEXT: &[u8] = b"keyvault passphrase verifier v1";

/// Length in hex characters of the hint written after the first signature.
const FIRST_USE_HINT_LEN: usize = 12;

// ─── Types ───────────────────────────────────────────────────────────────────

/// Result of a successful `sign` call.
#[derive(Debug, Clone, Serialize)]
pub struct SignOutcome {
    pub signature: Signature,
    pub algorithm: &'static str,
    /// The record after its usage counters were updated.
    pub record: VaultRecord,
    pub timestamp: DateTime<Utc>,
}

struct VaultState {
    db: Database,
    master_key: Zeroizing<[u8; KEY_LEN]>,
}

impl VaultState {
    fn store(&self) -> SqliteRecordStore<'_> {
        SqliteRecordStore::new(&self.db)
    }
}

/// An open vault.
pub struct Vault {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    audit: RotationAuditLog,
    state: Mutex<Option<VaultState>>,
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("path", &self.path)
            .field("audit_log", &self.audit.path())
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}

impl Vault {
    /// Open (or create) the vault at `path` with default settings.
    pub fn open(path: impl AsRef<Path>, passphrase: &str) -> Result<Self> {
        Self::open_with(path, passphrase, VaultConfig::default(), Arc::new(SystemClock))
    }

    /// Open (or create) the vault at `path`.
    ///
    /// A new vault records its salt, KDF parameters and a passphrase
    /// verifier. Reopening derives the key with the recorded parameters and
    /// fails with `InvalidPassphrase` if the verifier does not open.
    pub fn open_with(
        path: impl AsRef<Path>,
        passphrase: &str,
        config: VaultConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = Database::open(&path)?;

        let master_key = {
            let store = SqliteRecordStore::new(&db);
            let salt = store.salt()?;
            let kdf = load_or_store_kdf(&store, &config.kdf)?;
            let master_key = derive_key(passphrase, &salt, &kdf)?;
            check_or_create_verifier(&store, &master_key)?;
            master_key
        };

        let audit = RotationAuditLog::new(config.resolve_audit_path(&path));
        tracing::info!(path = %path.display(), "Vault opened");

        Ok(Self {
            path,
            clock,
            audit,
            state: Mutex::new(Some(VaultState { db, master_key })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn audit_log(&self) -> &RotationAuditLog {
        &self.audit
    }

    /// Run `f` with the locked, open state.
    fn with_state<T>(&self, f: impl FnOnce(&VaultState) -> Result<T>) -> Result<T> {
        let guard = self
            .state
            .lock()
            .map_err(|_| VaultError::Internal("vault lock poisoned".to_string()))?;
        let state = guard.as_ref().ok_or(VaultError::Closed)?;
        f(state)
    }

    // ─── Records ─────────────────────────────────────────────────────────────

    /// Decode, validate, encrypt and persist a private key.
    pub fn import_key(
        &self,
        label: &str,
        key: &str,
        fmt: KeyFormat,
        tags: &[&str],
        policy: VaultPolicy,
    ) -> Result<VaultRecord> {
        if !policy.allows(fmt) {
            return Err(VaultError::PolicyViolation(format!(
                "policy does not allow {} keys",
                fmt
            )));
        }

        let secret = fmt.decode(key)?;
        validate_private_key(&secret[..])?;

        self.with_state(|state| {
            let envelope = encrypt(&state.master_key, &secret[..], None)?;
            let now = self.clock.now();

            let record = VaultRecord {
                id: Uuid::new_v4().to_string(),
                label: label.to_string(),
                fmt,
                created_at: now,
                entropy_hint: random_hint(),
                expires_at: expiry_from(&policy, now),
                policy,
                last_used_at: None,
                use_count: 0,
                tags: normalize_tags(tags),
                status: RecordStatus::Active,
                last_rotated_at: now,
                rotation_count: 0,
            };
            state.store().insert_record(&record, &envelope)?;

            tracing::info!(record_id = %record.id, label = %record.label, fmt = %fmt, "Imported key");
            Ok(record)
        })
    }

    /// Records matching `query` (case-insensitive substring of id, label or
    /// any tag) that carry every tag in `tags`, oldest first.
    pub fn find(&self, query: Option<&str>, tags: &[&str]) -> Result<Vec<VaultRecord>> {
        let needle = query
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());
        let wanted: BTreeSet<String> = tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let mut records = self.with_state(|state| Ok(state.store().list_records()?))?;

        records.retain(|record| {
            let have: BTreeSet<String> = record.tags.iter().map(|t| t.to_lowercase()).collect();
            let query_hit = needle.as_deref().map_or(true, |q| {
                record.id.to_lowercase().contains(q)
                    || record.label.to_lowercase().contains(q)
                    || have.iter().any(|t| t.contains(q))
            });
            query_hit && wanted.is_subset(&have)
        });
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }

    pub fn get(&self, id: &str) -> Result<VaultRecord> {
        self.with_state(|state| Ok(state.store().get_record(id)?))
    }

    /// Metadata for every record. Never includes ciphertext.
    pub fn export_metadata(&self) -> Result<Vec<VaultRecord>> {
        self.with_state(|state| Ok(state.store().list_records()?))
    }

    /// Replace a record's policy. The new policy must still allow the
    /// record's own format.
    pub fn set_policy(&self, id: &str, policy: VaultPolicy) -> Result<VaultRecord> {
        self.with_state(|state| {
            let store = state.store();
            let record = store.get_record(id)?;
            if !policy.allows(record.fmt) {
                return Err(VaultError::PolicyViolation(format!(
                    "policy would exclude the record's own {} format",
                    record.fmt
                )));
            }
            let updated = store.update_policy(id, &policy)?;
            tracing::info!(record_id = %id, "Updated policy");
            Ok(updated)
        })
    }

    // ─── Signing ─────────────────────────────────────────────────────────────

    /// Sign `payload` with the key stored under `id`.
    ///
    /// Lifecycle and policy are checked before the key is decrypted. A
    /// record that is due for rotation is rotated first when its policy sets
    /// `auto_rotate`; otherwise it is marked expired and the call fails with
    /// `ManualRotationRequired`.
    pub fn sign(&self, id: &str, payload: &[u8], rand_nonce: bool) -> Result<SignOutcome> {
        self.with_state(|state| {
            let store = state.store();
            let now = self.clock.now();
            let (mut record, mut envelope) = store.fetch_record(id)?;

            match check_lifecycle(&record, now)? {
                Lifecycle::Current => {}
                Lifecycle::RotationDue(reason) if record.policy.auto_rotate => {
                    (record, envelope) = self.rotate_locked(state, &record, &envelope, now, reason)?;
                }
                Lifecycle::RotationDue(reason) => {
                    let expires_at = record.expires_at.unwrap_or(now);
                    store.mark_status(id, RecordStatus::Expired, Some(expires_at))?;
                    tracing::warn!(record_id = %id, reason = ?reason, "Key requires manual rotation");
                    return Err(VaultError::ManualRotationRequired(id.to_string()));
                }
            }

            enforce_policy(&record, now)?;

            let signature = {
                let secret = decrypt(&state.master_key, &envelope.ciphertext, &envelope.nonce)?;
                sign_payload(&secret, payload, rand_nonce)?
            };

            let hint = (record.use_count == 0).then(|| {
                let mut digest = hex::encode(Sha256::digest(signature.as_bytes()));
                digest.truncate(FIRST_USE_HINT_LEN);
                digest
            });
            let record = store.update_usage(id, record.use_count + 1, now, hint.as_deref())?;

            tracing::debug!(record_id = %id, use_count = record.use_count, "Signed payload");
            Ok(SignOutcome {
                signature,
                algorithm: ALGORITHM,
                record,
                timestamp: now,
            })
        })
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Re-encrypt a record's key under a fresh nonce. Brings an expired
    /// record back to active; retired records cannot be rotated.
    pub fn rotate(&self, id: &str) -> Result<VaultRecord> {
        self.with_state(|state| {
            let (record, envelope) = state.store().fetch_record(id)?;
            if record.status == RecordStatus::Retired {
                return Err(VaultError::RecordNotAvailable {
                    id: record.id,
                    status: record.status,
                });
            }
            let now = self.clock.now();
            let (rotated, _) =
                self.rotate_locked(state, &record, &envelope, now, RotationReason::Manual)?;
            Ok(rotated)
        })
    }

    /// Permanently withdraw a record from use. Retiring twice is a no-op.
    pub fn retire(&self, id: &str) -> Result<VaultRecord> {
        self.with_state(|state| {
            let store = state.store();
            let record = store.get_record(id)?;
            if record.status == RecordStatus::Retired {
                return Ok(record);
            }
            let retired = store.mark_status(id, RecordStatus::Retired, record.expires_at)?;
            tracing::info!(record_id = %id, "Retired key");
            Ok(retired)
        })
    }

    fn rotate_locked(
        &self,
        state: &VaultState,
        record: &VaultRecord,
        envelope: &Envelope,
        now: DateTime<Utc>,
        reason: RotationReason,
    ) -> Result<(VaultRecord, Envelope)> {
        let fresh = {
            let secret = decrypt(&state.master_key, &envelope.ciphertext, &envelope.nonce)?;
            encrypt(&state.master_key, &secret, None)?
        };

        let rotated = state.store().rotate_record(
            &record.id,
            &fresh,
            now,
            expiry_from(&record.policy, now),
            &random_hint(),
            record.rotation_count + 1,
        )?;

        self.audit.record(&RotationEvent::new(&rotated, now, reason));
        tracing::info!(
            record_id = %rotated.id,
            reason = ?reason,
            rotation_count = rotated.rotation_count,
            "Rotated key"
        );
        Ok((rotated, fresh))
    }

    // ─── Teardown ────────────────────────────────────────────────────────────

    /// Wipe the master key and close the database. Later calls fail with
    /// `Closed`; closing again is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| VaultError::Internal("vault lock poisoned".to_string()))?;
        if guard.take().is_some() {
            tracing::info!(path = %self.path.display(), "Vault closed");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().map(|guard| guard.is_none()).unwrap_or(true)
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn load_or_store_kdf(store: &SqliteRecordStore<'_>, requested: &KdfParams) -> Result<KdfParams> {
    match store.read_meta(META_KDF)? {
        Some(bytes) => Ok(serde_json::from_slice(&bytes).map_err(StoreError::from)?),
        None => {
            let encoded = serde_json::to_vec(requested).map_err(StoreError::from)?;
            store.write_meta(META_KDF, &encoded)?;
            Ok(*requested)
        }
    }
}

/// Open the stored verifier, or create one. A vault written before
/// verifiers existed is checked against its oldest record instead.
fn check_or_create_verifier(
    store: &SqliteRecordStore<'_>,
    master_key: &[u8; KEY_LEN],
) -> Result<()> {
    if let Some(sealed) = store.read_meta(META_VERIFIER)? {
        if sealed.len() < NONCE_LEN {
            return Err(StoreError::Corrupt("passphrase verifier is truncated".to_string()).into());
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext =
            decrypt(master_key, ciphertext, nonce).map_err(|_| VaultError::InvalidPassphrase)?;
        if plaintext.as_slice() != VERIFIER_PLAINTEXT {
            return Err(VaultError::InvalidPassphrase);
        }
        return Ok(());
    }

    if let Some(oldest) = store.list_records()?.first() {
        let (_, envelope) = store.fetch_record(&oldest.id)?;
        decrypt(master_key, &envelope.ciphertext, &envelope.nonce)
            .map_err(|_| VaultError::InvalidPassphrase)?;
    }

    let envelope = encrypt(master_key, VERIFIER_PLAINTEXT, None)?;
    let mut sealed = envelope.nonce;
    sealed.extend_from_slice(&envelope.ciphertext);
    store.write_meta(META_VERIFIER, &sealed)?;
    tracing::debug!("Stored passphrase verifier");
    Ok(())
}

fn normalize_tags(tags: &[&str]) -> BTreeSet<String> {
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Eight random hex characters. Unrelated to the key.
fn random_hint() -> String {
    let mut bytes = [0u8; 4];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

// Keyvault — Record data models
//
// `VaultRecord` is pure metadata: it never carries key material or
// ciphertext, so it is safe to Debug-print, serialize and export.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ec::KeyFormat;

use super::StoreError;

/// Usage guardrails attached to a record.
///
/// Every field has a serde default so policy JSON written by older versions
/// (which lacked the rotation fields) still parses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultPolicy {
    /// Maximum signatures before the key is locked. 0 = unlimited.
    pub max_sign_uses: u64,
    /// Minimum seconds between two signatures.
    pub cooldown_s: u64,
    /// Key formats this record may be imported or used under.
    pub allow_formats: Vec<KeyFormat>,
    /// Seconds between rotations. 0 = no periodic rotation.
    pub rotation_interval_s: u64,
    /// Maximum age in seconds since the last rotation. 0 = never expires.
    pub max_age_s: u64,
    /// Rotate transparently when due instead of requiring an operator.
    pub auto_rotate: bool,
}

impl Default for VaultPolicy {
    fn default() -> Self {
        Self {
            max_sign_uses: 0,
            cooldown_s: 0,
            allow_formats: KeyFormat::ALL.to_vec(),
            rotation_interval_s: 0,
            max_age_s: 0,
            auto_rotate: false,
        }
    }
}

impl VaultPolicy {
    pub fn allows(&self, fmt: KeyFormat) -> bool {
        self.allow_formats.contains(&fmt)
    }
}

/// Lifecycle state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Active,
    /// Due for rotation but not rotated automatically. Refuses to sign until
    /// an operator calls `rotate`.
    Expired,
    /// Permanently withdrawn from use.
    Retired,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Expired => "expired",
            RecordStatus::Retired => "retired",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RecordStatus::Active),
            "expired" => Ok(RecordStatus::Expired),
            "retired" => Ok(RecordStatus::Retired),
            other => Err(StoreError::Corrupt(format!("unknown record status '{}'", other))),
        }
    }
}

/// Metadata row for one stored private key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultRecord {
    pub id: String,
    pub label: String,
    pub fmt: KeyFormat,
    pub created_at: DateTime<Utc>,
    /// Short non-secret fingerprint for operators. Never derived from the key.
    pub entropy_hint: String,
    pub policy: VaultPolicy,
    pub last_used_at: Option<DateTime<Utc>>,
    pub use_count: u64,
    pub tags: BTreeSet<String>,
    pub status: RecordStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_rotated_at: DateTime<Utc>,
    pub rotation_count: u64,
}

impl fmt::Display for VaultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}, {}) uses={} hint={}",
            self.id, self.label, self.fmt, self.status, self.use_count, self.entropy_hint
        )
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_default_allows_everything() {
        let policy = VaultPolicy::default();
        assert_eq!(policy.max_sign_uses, 0);
        assert_eq!(policy.cooldown_s, 0);
        assert!(policy.allows(KeyFormat::Hex));
        assert!(policy.allows(KeyFormat::Wif));
        assert!(!policy.auto_rotate);
    }

    #[test]
    fn test_legacy_policy_json_parses_with_defaults() {
        let json = r#"{"max_sign_uses":2,"cooldown_s":0,"allow_formats":["hex"]}"#;
        let policy: VaultPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.max_sign_uses, 2);
        assert_eq!(policy.allow_formats, vec![KeyFormat::Hex]);
        assert_eq!(policy.rotation_interval_s, 0);
        assert_eq!(policy.max_age_s, 0);
        assert!(!policy.auto_rotate);
    }

    #[test]
    fn test_status_roundtrip_and_unknown() {
        for status in [RecordStatus::Active, RecordStatus::Expired, RecordStatus::Retired] {
            assert_eq!(status.as_str().parse::<RecordStatus>().unwrap(), status);
        }
        assert!(matches!(
            "deleted".parse::<RecordStatus>(),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_record_json_has_no_key_material() {
        let now = Utc::now();
        let record = VaultRecord {
            id: "id-1".to_string(),
            label: "alpha".to_string(),
            fmt: KeyFormat::Hex,
            created_at: now,
            entropy_hint: "abcd1234".to_string(),
            policy: VaultPolicy::default(),
            last_used_at: None,
            use_count: 0,
            tags: BTreeSet::new(),
            status: RecordStatus::Active,
            expires_at: None,
            last_rotated_at: now,
            rotation_count: 0,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("enc_priv"));
        assert!(!json.contains("nonce"));
        assert!(json.contains("\"status\":\"active\""));
    }
}

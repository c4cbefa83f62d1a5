// Keyvault — Rotation audit log
//
// Appends one JSON object per line for every key rotation. The log is an
// operator aid: a write failure is reported through tracing and never fails
// the rotation that triggered it.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::store::VaultRecord;

/// Why a record was rotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationReason {
    /// `expires_at` passed.
    Expiry,
    /// `rotation_interval_s` elapsed since the last rotation.
    Interval,
    /// An operator called `rotate`.
    Manual,
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationEvent {
    pub timestamp: String,
    pub record_id: String,
    pub label: String,
    pub reason: RotationReason,
    pub automatic: bool,
    pub rotation_count: u64,
    pub entropy_hint: String,
    pub expires_at: Option<String>,
}

impl RotationEvent {
    /// Build the event for a record that has just been rotated.
    pub fn new(record: &VaultRecord, rotated_at: DateTime<Utc>, reason: RotationReason) -> Self {
        Self {
            timestamp: iso(rotated_at),
            record_id: record.id.clone(),
            label: record.label.clone(),
            reason,
            automatic: reason != RotationReason::Manual,
            rotation_count: record.rotation_count,
            entropy_hint: record.entropy_hint.clone(),
            expires_at: record.expires_at.map(iso),
        }
    }
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Append-only JSONL file of rotation events.
#[derive(Debug, Clone)]
pub struct RotationAuditLog {
    path: PathBuf,
}

impl RotationAuditLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `event`. Failures are logged and swallowed.
    pub fn record(&self, event: &RotationEvent) {
        if let Err(e) = self.append(event) {
            tracing::warn!(
                record_id = %event.record_id,
                path = %self.path.display(),
                "Failed to write rotation audit entry: {}",
                e
            );
        }
    }

    fn append(&self, event: &RotationEvent) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read back every event in the log; an absent file is an empty log.
    pub fn read_all(&self) -> std::io::Result<Vec<RotationEvent>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(std::io::Error::from))
            .collect()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

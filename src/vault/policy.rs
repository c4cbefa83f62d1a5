// Keyvault — Lifecycle and policy checks
//
// Pure decisions over a record's metadata and the current time. Nothing here
// touches ciphertext, so every refusal happens before a key is decrypted.

use chrono::{DateTime, Duration, Utc};

use crate::error::VaultError;
use crate::store::{RecordStatus, VaultPolicy, VaultRecord};

use super::audit::RotationReason;

/// Outcome of the lifecycle check for an active record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Current,
    RotationDue(RotationReason),
}

/// Status gate plus expiry / interval evaluation.
pub fn check_lifecycle(record: &VaultRecord, now: DateTime<Utc>) -> Result<Lifecycle, VaultError> {
    if record.status != RecordStatus::Active {
        return Err(VaultError::RecordNotAvailable {
            id: record.id.clone(),
            status: record.status,
        });
    }

    if record.expires_at.is_some_and(|expires_at| now >= expires_at) {
        return Ok(Lifecycle::RotationDue(RotationReason::Expiry));
    }

    let interval = record.policy.rotation_interval_s;
    if interval > 0 && seconds_between(record.last_rotated_at, now) >= interval as f64 {
        return Ok(Lifecycle::RotationDue(RotationReason::Interval));
    }

    Ok(Lifecycle::Current)
}

/// Format, usage-cap and cooldown rules, in that order.
pub fn enforce_policy(record: &VaultRecord, now: DateTime<Utc>) -> Result<(), VaultError> {
    let policy = &record.policy;

    if !policy.allows(record.fmt) {
        return Err(VaultError::PolicyViolation(format!(
            "policy disallows signing with {} keys",
            record.fmt
        )));
    }

    if policy.max_sign_uses > 0 && record.use_count >= policy.max_sign_uses {
        return Err(VaultError::UsageLimitExceeded {
            used: record.use_count,
            max: policy.max_sign_uses,
        });
    }

    if let (true, Some(last_used)) = (policy.cooldown_s > 0, record.last_used_at) {
        let elapsed = seconds_between(last_used, now);
        let cooldown = policy.cooldown_s as f64;
        if elapsed < cooldown {
            return Err(VaultError::CooldownActive {
                remaining_s: cooldown - elapsed,
            });
        }
    }

    Ok(())
}

/// `from + max_age_s`, or `None` when the policy sets no maximum age.
pub fn expiry_from(policy: &VaultPolicy, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if policy.max_age_s == 0 {
        return None;
    }
    i64::try_from(policy.max_age_s)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|age| from.checked_add_signed(age))
}

/// Fractional seconds from `earlier` to `later`; negative if the clock ran
/// backwards.
fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let delta = later - earlier;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_seconds() as f64,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

// Keyvault — End-to-end vault behaviour
//
// Each test opens a vault in a temporary directory with cheap Argon2
// parameters and a manual clock, then drives it through the public API.

use std::sync::Arc;
use std::thread;

use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection};
use tempfile::TempDir;

use keyvault::crypto::KdfParams;
use keyvault::ec::{decode_private_key, derive_public_key, verify_signature};
use keyvault::vault::RotationReason;
use keyvault::{
    KeyFormat, ManualClock, RecordStatus, Vault, VaultConfig, VaultError, VaultPolicy,
};

const ALPHA_KEY: &str = "f8f8a2b43c9d0e7a1b5f6284c0d93e7a2b1f4c6d8e0a3b5c7d9f1e2a4b6c8c51";
const WIKI_HEX: &str = "0C28FCA386C7A227600B2FE50B7CAE11EC86D3BF1FBE471BE89827E19D72AA1D";
const WIKI_WIF: &str = "5HueCGU8rMjxEXxiPuD5BDku4MkFqeZyd4dZ1jvhTVqvbTLvyTJ";

fn fast_config() -> VaultConfig {
    VaultConfig::default().with_kdf(KdfParams {
        time_cost: 1,
        memory_cost: 64,
        parallelism: 1,
    })
}

struct Harness {
    dir: TempDir,
    clock: Arc<ManualClock>,
    vault: Vault,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
        let vault = Vault::open_with(db_path(&dir), "correct horse", fast_config(), clock.clone())
            .unwrap();
        Self { dir, clock, vault }
    }

    fn raw(&self) -> Connection {
        Connection::open(db_path(&self.dir)).unwrap()
    }

    fn sealed(&self, id: &str) -> (Vec<u8>, Vec<u8>) {
        self.raw()
            .query_row(
                "SELECT enc_priv, nonce FROM records WHERE id=?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap()
    }
}

fn db_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("vault.db")
}

fn hex_only(max_sign_uses: u64) -> VaultPolicy {
    VaultPolicy {
        max_sign_uses,
        cooldown_s: 0,
        allow_formats: vec![KeyFormat::Hex],
        ..VaultPolicy::default()
    }
}

#[test]
fn test_alpha_scenario() {
    let h = Harness::new();
    let record = h
        .vault
        .import_key("alpha", ALPHA_KEY, KeyFormat::Hex, &["ops"], hex_only(2))
        .unwrap();

    for expected_uses in 1..=2 {
        let outcome = h.vault.sign(&record.id, &[0xde, 0xad, 0xbe, 0xef], true).unwrap();
        assert_eq!(outcome.signature.to_hex().len(), 128);
        assert_eq!(outcome.record.use_count, expected_uses);
    }

    match h.vault.sign(&record.id, &[0xde, 0xad, 0xbe, 0xef], true) {
        Err(VaultError::UsageLimitExceeded { used, max }) => {
            assert_eq!((used, max), (2, 2));
        }
        other => panic!("Expected UsageLimitExceeded, got {:?}", other),
    }

    assert!(h.vault.find(None, &["nonexistent"]).unwrap().is_empty());
    let found = h.vault.find(Some("alpha"), &[]).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, record.id);
}

#[test]
fn test_hex_and_wif_import_sign_and_verify() {
    let h = Harness::new();
    let secret = decode_private_key(KeyFormat::Hex, WIKI_HEX).unwrap();
    let public_key = derive_public_key(&secret[..]).unwrap();

    let from_hex = h
        .vault
        .import_key("hex", &format!("0x{}", WIKI_HEX), KeyFormat::Hex, &[], VaultPolicy::default())
        .unwrap();
    let from_wif = h
        .vault
        .import_key("wif", WIKI_WIF, KeyFormat::Wif, &[], VaultPolicy::default())
        .unwrap();

    let payload = b"round trip payload";
    let a = h.vault.sign(&from_hex.id, payload, false).unwrap();
    let b = h.vault.sign(&from_wif.id, payload, false).unwrap();

    assert!(verify_signature(&public_key, payload, &a.signature));
    assert_eq!(a.signature, b.signature, "Same key, payload and deterministic nonce");
    assert_eq!(b.record.fmt, KeyFormat::Wif);
}

#[test]
fn test_invalid_encodings_are_rejected() {
    let h = Harness::new();

    let short = h
        .vault
        .import_key("short", "abcd", KeyFormat::Hex, &[], VaultPolicy::default())
        .unwrap_err();
    assert!(matches!(short, VaultError::Signing(_)));

    let mut bad_checksum = WIKI_WIF.to_string();
    bad_checksum.pop();
    bad_checksum.push('K');
    let err = h
        .vault
        .import_key("wif", &bad_checksum, KeyFormat::Wif, &[], VaultPolicy::default())
        .unwrap_err();
    assert!(matches!(err, VaultError::Signing(_)));

    assert!(h.vault.export_metadata().unwrap().is_empty());
}

#[test]
fn test_deterministic_and_random_nonces() {
    let h = Harness::new();
    let record = h
        .vault
        .import_key("det", ALPHA_KEY, KeyFormat::Hex, &[], VaultPolicy::default())
        .unwrap();
    let secret = decode_private_key(KeyFormat::Hex, ALPHA_KEY).unwrap();
    let public_key = derive_public_key(&secret[..]).unwrap();

    let d1 = h.vault.sign(&record.id, b"same", false).unwrap();
    let d2 = h.vault.sign(&record.id, b"same", false).unwrap();
    assert_eq!(d1.signature, d2.signature);

    let r1 = h.vault.sign(&record.id, b"same", true).unwrap();
    let r2 = h.vault.sign(&record.id, b"same", true).unwrap();
    assert_ne!(r1.signature, r2.signature);
    assert!(verify_signature(&public_key, b"same", &r1.signature));
    assert!(verify_signature(&public_key, b"same", &r2.signature));
}

#[test]
fn test_cooldown_with_simulated_time() {
    let h = Harness::new();
    let policy = VaultPolicy {
        cooldown_s: 5,
        ..VaultPolicy::default()
    };
    let record = h.vault.import_key("cool", ALPHA_KEY, KeyFormat::Hex, &[], policy).unwrap();

    h.vault.sign(&record.id, b"a", false).unwrap();
    h.clock.advance(4.0);
    match h.vault.sign(&record.id, b"b", false) {
        Err(err @ VaultError::CooldownActive { .. }) => assert!(err.is_retryable()),
        other => panic!("Expected CooldownActive, got {:?}", other),
    }

    h.clock.advance(1.0);
    let outcome = h.vault.sign(&record.id, b"b", false).unwrap();
    assert_eq!(outcome.record.use_count, 2);
}

#[test]
fn test_automatic_rotation_on_interval() {
    let h = Harness::new();
    let policy = VaultPolicy {
        rotation_interval_s: 60,
        auto_rotate: true,
        ..VaultPolicy::default()
    };
    let record = h.vault.import_key("auto", ALPHA_KEY, KeyFormat::Hex, &[], policy).unwrap();
    h.vault.sign(&record.id, b"before", false).unwrap();
    let before = h.sealed(&record.id);

    h.clock.advance(60.0);
    let outcome = h.vault.sign(&record.id, b"after", false).unwrap();
    let after = h.sealed(&record.id);

    assert_ne!(before.0, after.0, "Ciphertext must change on rotation");
    assert_ne!(before.1, after.1, "Nonce must change on rotation");
    assert_eq!(outcome.record.use_count, 1, "Usage resets, then counts this signature");
    assert_eq!(outcome.record.rotation_count, 1);
    assert_eq!(outcome.record.last_rotated_at, h.clock_now());

    let events = h.vault.audit_log().read_all().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, RotationReason::Interval);
    assert!(events[0].automatic);
    assert_eq!(events[0].record_id, record.id);
}

impl Harness {
    fn clock_now(&self) -> chrono::DateTime<Utc> {
        use keyvault::Clock;
        self.clock.now()
    }
}

#[test]
fn test_manual_rotation_required_until_rotated() {
    let h = Harness::new();
    let policy = VaultPolicy {
        rotation_interval_s: 60,
        auto_rotate: false,
        ..VaultPolicy::default()
    };
    let record = h.vault.import_key("manual", ALPHA_KEY, KeyFormat::Hex, &[], policy).unwrap();

    h.clock.advance(61.0);
    assert!(matches!(
        h.vault.sign(&record.id, b"x", false),
        Err(VaultError::ManualRotationRequired(_))
    ));
    assert_eq!(h.vault.get(&record.id).unwrap().status, RecordStatus::Expired);
    assert!(h.vault.sign(&record.id, b"x", false).is_err(), "Still refused");

    let rotated = h.vault.rotate(&record.id).unwrap();
    assert_eq!(rotated.status, RecordStatus::Active);
    assert_eq!(rotated.rotation_count, 1);

    let outcome = h.vault.sign(&record.id, b"x", false).unwrap();
    assert_eq!(outcome.record.use_count, 1);

    let events = h.vault.audit_log().read_all().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, RotationReason::Manual);
    assert!(!events[0].automatic);
}

#[test]
fn test_expiry_rotation_recomputes_expiry() {
    let h = Harness::new();
    let policy = VaultPolicy {
        max_age_s: 100,
        auto_rotate: true,
        ..VaultPolicy::default()
    };
    let record = h.vault.import_key("aging", ALPHA_KEY, KeyFormat::Hex, &[], policy).unwrap();
    let first_expiry = record.expires_at.unwrap();

    h.clock.advance(100.0);
    let outcome = h.vault.sign(&record.id, b"x", false).unwrap();
    let new_expiry = outcome.record.expires_at.unwrap();
    assert_eq!((new_expiry - first_expiry).num_seconds(), 100);

    let events = h.vault.audit_log().read_all().unwrap();
    assert_eq!(events[0].reason, RotationReason::Expiry);
}

#[test]
fn test_tampered_ciphertext_and_nonce_fail_decryption() {
    let h = Harness::new();
    let record = h
        .vault
        .import_key("tamper", ALPHA_KEY, KeyFormat::Hex, &[], VaultPolicy::default())
        .unwrap();
    let (ciphertext, nonce) = h.sealed(&record.id);
    let raw = h.raw();

    for (column, original) in [("enc_priv", &ciphertext), ("nonce", &nonce)] {
        for bit in 0..original.len() * 8 {
            let mut flipped = original.clone();
            flipped[bit / 8] ^= 1 << (bit % 8);
            raw.execute(
                &format!("UPDATE records SET {}=?1 WHERE id=?2", column),
                params![flipped, record.id],
            )
            .unwrap();

            let err = h.vault.sign(&record.id, b"x", false).unwrap_err();
            assert!(err.is_decryption_failure(), "{} bit {} not detected", column, bit);
        }
        raw.execute(
            &format!("UPDATE records SET {}=?1 WHERE id=?2", column),
            params![original, record.id],
        )
        .unwrap();
    }

    let restored = h.vault.sign(&record.id, b"x", false).unwrap();
    assert_eq!(restored.record.use_count, 1, "Failed attempts are not counted");
}

#[test]
fn test_wrong_passphrase_is_rejected() {
    let h = Harness::new();
    h.vault
        .import_key("a", ALPHA_KEY, KeyFormat::Hex, &[], VaultPolicy::default())
        .unwrap();
    h.vault.close().unwrap();

    let clock = Arc::new(ManualClock::default());
    let err = Vault::open_with(db_path(&h.dir), "wrong", fast_config(), clock.clone()).unwrap_err();
    assert!(matches!(err, VaultError::InvalidPassphrase));

    let reopened = Vault::open_with(db_path(&h.dir), "correct horse", fast_config(), clock).unwrap();
    assert_eq!(reopened.export_metadata().unwrap().len(), 1);
}

#[test]
fn test_vault_without_verifier_checks_oldest_record() {
    let h = Harness::new();
    let record = h
        .vault
        .import_key("a", ALPHA_KEY, KeyFormat::Hex, &[], VaultPolicy::default())
        .unwrap();
    h.vault.close().unwrap();

    // Files written before verifiers existed only have sealed records.
    h.raw().execute("DELETE FROM meta WHERE key='verifier'", []).unwrap();

    let clock = Arc::new(ManualClock::default());
    let err = Vault::open_with(db_path(&h.dir), "wrong", fast_config(), clock.clone()).unwrap_err();
    assert!(matches!(err, VaultError::InvalidPassphrase), "got {:?}", err);

    let verifiers: i64 = h
        .raw()
        .query_row("SELECT count(*) FROM meta WHERE key='verifier'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(verifiers, 0, "A rejected passphrase must not store a verifier");

    let reopened =
        Vault::open_with(db_path(&h.dir), "correct horse", fast_config(), clock.clone()).unwrap();
    assert!(reopened.sign(&record.id, b"x", false).is_ok());
    reopened.close().unwrap();

    // The verifier written on that open now guards the vault.
    let err = Vault::open_with(db_path(&h.dir), "wrong", fast_config(), clock).unwrap_err();
    assert!(matches!(err, VaultError::InvalidPassphrase));
}

#[test]
fn test_reopen_keeps_recorded_kdf_params() {
    let h = Harness::new();
    let record = h
        .vault
        .import_key("a", ALPHA_KEY, KeyFormat::Hex, &[], VaultPolicy::default())
        .unwrap();
    h.vault.close().unwrap();

    // Different requested params must not change the key of an existing vault.
    let other = VaultConfig::default().with_kdf(KdfParams {
        time_cost: 2,
        memory_cost: 128,
        parallelism: 1,
    });
    let reopened =
        Vault::open_with(db_path(&h.dir), "correct horse", other, Arc::new(ManualClock::default()))
            .unwrap();
    assert!(reopened.sign(&record.id, b"x", false).is_ok());
}

#[test]
fn test_close_semantics() {
    let h = Harness::new();
    let record = h
        .vault
        .import_key("a", ALPHA_KEY, KeyFormat::Hex, &[], VaultPolicy::default())
        .unwrap();
    h.vault.close().unwrap();

    assert!(matches!(h.vault.sign(&record.id, b"x", false), Err(VaultError::Closed)));
    assert!(matches!(
        h.vault.import_key("b", ALPHA_KEY, KeyFormat::Hex, &[], VaultPolicy::default()),
        Err(VaultError::Closed)
    ));
    assert!(matches!(h.vault.find(None, &[]), Err(VaultError::Closed)));
}

#[test]
fn test_unknown_record_is_not_found() {
    let h = Harness::new();
    let err = h.vault.sign("does-not-exist", b"x", true).unwrap_err();
    assert!(err.is_record_not_found());
    assert!(h.vault.rotate("does-not-exist").unwrap_err().is_record_not_found());
    assert!(h.vault.retire("does-not-exist").unwrap_err().is_record_not_found());
}

#[test]
fn test_find_filters_and_orders() {
    let h = Harness::new();
    let first = h
        .vault
        .import_key("Treasury Hot", ALPHA_KEY, KeyFormat::Hex, &["Ops", "prod"], VaultPolicy::default())
        .unwrap();
    h.clock.advance(1.0);
    let second = h
        .vault
        .import_key("staging", ALPHA_KEY, KeyFormat::Hex, &["ops"], VaultPolicy::default())
        .unwrap();

    let by_tag = h.vault.find(None, &["OPS"]).unwrap();
    let ids: Vec<&str> = by_tag.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);

    let both_tags = h.vault.find(None, &["ops", "prod"]).unwrap();
    assert_eq!(both_tags.len(), 1);
    assert_eq!(both_tags[0].id, first.id);

    assert_eq!(h.vault.find(Some("treasury"), &[]).unwrap().len(), 1);
    assert_eq!(h.vault.find(Some("PROD"), &[]).unwrap().len(), 1, "Query matches tags");
    assert_eq!(h.vault.find(Some(&second.id[..8]), &[]).unwrap().len(), 1);
}

#[test]
fn test_export_never_contains_key_material() {
    let h = Harness::new();
    h.vault
        .import_key("a", ALPHA_KEY, KeyFormat::Hex, &[], VaultPolicy::default())
        .unwrap();

    let json = serde_json::to_string(&h.vault.export_metadata().unwrap()).unwrap();
    assert!(!json.to_lowercase().contains(&ALPHA_KEY[..16]));
    assert!(!json.contains("enc_priv"));
}

#[test]
fn test_concurrent_signing_respects_usage_cap() {
    let h = Harness::new();
    let record = h
        .vault
        .import_key("shared", ALPHA_KEY, KeyFormat::Hex, &[], hex_only(3))
        .unwrap();
    let vault = Arc::new(h.vault);

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let vault = Arc::clone(&vault);
            let id = record.id.clone();
            thread::spawn(move || vault.sign(&id, format!("payload {}", i).as_bytes(), false))
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|t| t.join().unwrap()).collect();
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let capped = results
        .iter()
        .filter(|r| matches!(r, Err(VaultError::UsageLimitExceeded { .. })))
        .count();

    assert_eq!(successes, 3, "Exactly max_sign_uses signatures may succeed");
    assert_eq!(capped, 3);
    assert_eq!(vault.get(&record.id).unwrap().use_count, 3);
}

// Keyvault — Vault configuration

use std::path::{Path, PathBuf};

use crate::crypto::KdfParams;

/// Options fixed when a vault handle is opened.
#[derive(Debug, Clone, Default)]
pub struct VaultConfig {
    /// Argon2id parameters for a newly created vault. An existing vault
    /// keeps the parameters recorded in its meta table.
    pub kdf: KdfParams,
    /// Where rotation events are appended. A directory receives
    /// `vault_rotation_audit.jsonl`; any other path is used as the base
    /// name. Defaults to a file next to the vault database.
    pub audit_log_path: Option<PathBuf>,
}

impl VaultConfig {
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn with_audit_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_log_path = Some(path.into());
        self
    }

    /// Resolve the rotation audit file for a vault stored at `db_path`.
    pub fn resolve_audit_path(&self, db_path: &Path) -> PathBuf {
        let base = self.audit_log_path.as_deref().unwrap_or(db_path);
        if base.is_dir() {
            return base.join("vault_rotation_audit.jsonl");
        }
        let stem = base
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "vault".to_string());
        base.with_file_name(format!("{}_rotation_audit.jsonl", stem))
    }
}

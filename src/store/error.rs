// Keyvault — Store error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Vault salt is missing from the meta table")]
    MissingSalt,

    #[error("Vault schema version {0} is newer than this build supports")]
    UnsupportedVersion(u32),

    #[error("Corrupt vault data: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

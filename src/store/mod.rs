// Keyvault — Store Module
//
// SQLite persistence for vault metadata (salt, schema version, KDF params,
// passphrase verifier) and for encrypted key records. Ciphertext lives in
// the same row as the searchable metadata but is only ever returned by
// `fetch_record`; listings carry metadata alone.

mod db;
mod error;
mod models;
mod repository;

pub use db::{Database, SCHEMA_VERSION};
pub use error::StoreError;
pub use models::{RecordStatus, VaultPolicy, VaultRecord};
pub use repository::{RecordStore, SqliteRecordStore};

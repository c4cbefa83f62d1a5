// Keyvault — Library root
//
// Re-exports the crypto, ec, store, vault and CLI modules.

pub mod cli;
pub mod crypto;
pub mod ec;
pub mod error;
pub mod store;
pub mod vault;

pub use ec::{KeyFormat, Signature};
pub use error::{Result, VaultError};
pub use store::{RecordStatus, VaultPolicy, VaultRecord};
pub use vault::{Clock, ManualClock, SignOutcome, SystemClock, Vault, VaultConfig};

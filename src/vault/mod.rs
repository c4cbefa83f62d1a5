// Keyvault — Vault Module
//
// The orchestrator over crypto, signing and storage: importing keys,
// policy-enforced signing, rotation and retirement, search and metadata
// export. Policy and lifecycle decisions live in `policy`, the time source
// in `clock`, and the rotation trail in `audit`.

mod audit;
mod clock;
mod config;
mod handle;
mod policy;

pub use audit::{RotationAuditLog, RotationEvent, RotationReason};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::VaultConfig;
pub use handle::{SignOutcome, Vault};

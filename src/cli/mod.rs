// Keyvault — CLI Module
//
// Command-line interface using clap derive macros.
// Subcommands: init, import, find, policy, sign, rotate, retire, export.

mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::ec::KeyFormat;

pub use commands::execute;

/// Keyvault — an encrypted store for secp256k1 signing keys.
#[derive(Parser, Debug)]
#[command(name = "keyvault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the vault database (default: <data dir>/keyvault/vault.db).
    #[arg(long, global = true, env = "KEYVAULT_PATH")]
    pub path: Option<PathBuf>,

    /// Vault passphrase. When absent, one line is read from stdin, and
    /// `init` of a new vault reads a second line to confirm it.
    /// Stdin input is not hidden when typed at a terminal.
    #[arg(long, global = true, env = "KEYVAULT_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Policy fields shared by `import` and `policy`.
#[derive(Args, Debug, Default, Clone)]
pub struct PolicyArgs {
    /// Maximum number of signatures allowed (0 = unlimited).
    #[arg(long)]
    pub max_sign_uses: Option<u64>,

    /// Cooldown in seconds between signatures.
    #[arg(long)]
    pub cooldown: Option<u64>,

    /// Formats the key may be used under (e.g. "hex,wif").
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub allow_formats: Option<Vec<KeyFormat>>,

    /// Seconds between automatic or required rotations (0 = none).
    #[arg(long)]
    pub rotation_interval: Option<u64>,

    /// Maximum key age in seconds since the last rotation (0 = no expiry).
    #[arg(long)]
    pub max_age: Option<u64>,

    /// Rotate transparently when due instead of requiring `keyvault rotate`.
    #[arg(long)]
    pub auto_rotate: Option<bool>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new vault (or check the passphrase of an existing one).
    Init,

    /// Import a private key.
    Import {
        /// Human-readable label for the key.
        #[arg(long)]
        label: String,

        /// Encoding of the key material.
        #[arg(long)]
        fmt: KeyFormat,

        /// Inline key material (hex or WIF).
        /// Prefer --from-stdin to keep keys out of shell history.
        #[arg(long, conflicts_with = "from_stdin", required_unless_present = "from_stdin")]
        key: Option<String>,

        /// Read key material from stdin (after the passphrase line, if any).
        #[arg(long)]
        from_stdin: bool,

        /// Comma-separated tags.
        #[arg(long, default_value = "")]
        tags: String,

        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Search records by id, label or tag.
    Find {
        /// Free-text query (case-insensitive substring).
        #[arg(long)]
        q: Option<String>,

        /// Comma-separated tags that must all be present.
        #[arg(long, default_value = "")]
        tags: String,

        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Update the policy of a record. Omitted fields keep their value.
    Policy {
        /// The record ID.
        record_id: String,

        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Sign a payload.
    Sign {
        /// The record ID.
        record_id: String,

        /// Hex-encoded payload.
        #[arg(long = "hex")]
        payload_hex: String,

        /// Number of signatures to create.
        #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
        repeat: u32,

        /// Use deterministic nonces instead of random ones.
        #[arg(long)]
        deterministic: bool,
    },

    /// Force a rotation of a record's encrypted key.
    Rotate {
        /// The record ID.
        record_id: String,
    },

    /// Permanently withdraw a record from use.
    Retire {
        /// The record ID.
        record_id: String,
    },

    /// Export all record metadata as JSON (never key material).
    Export,
}

// Keyvault — CLI Command Handlers
//
// Each function handles one CLI subcommand. They open the vault with the
// passphrase from the flag, the environment or stdin, run one vault
// operation, close the vault and print the result. Key material is never
// printed.

use std::io::{self, BufRead, Read};
use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use crate::error::VaultError;
use crate::store::{VaultPolicy, VaultRecord};
use crate::vault::Vault;

use super::{Cli, Commands, PolicyArgs};

/// Default directory for Keyvault data files.
fn data_dir() -> PathBuf {
    let base = dirs_next::data_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("keyvault")
}

/// Default path to the vault database.
fn default_db_path() -> PathBuf {
    data_dir().join("vault.db")
}

/// Execute the parsed CLI invocation.
pub fn execute(cli: Cli) -> Result<(), VaultError> {
    let path = cli.path.unwrap_or_else(default_db_path);
    let passphrase = cli.passphrase;

    match cli.command {
        Commands::Init => cmd_init(path, passphrase),
        Commands::Import {
            label,
            fmt,
            key,
            from_stdin,
            tags,
            policy,
        } => {
            let passphrase = resolve_passphrase(passphrase)?;
            let material = match (key, from_stdin) {
                (Some(key), _) => Zeroizing::new(key),
                (None, true) => read_stdin_rest()?,
                (None, false) => {
                    return Err(VaultError::InvalidInput(
                        "--from-stdin or --key must be provided".to_string(),
                    ))
                }
            };
            let vault = Vault::open(&path, &passphrase)?;
            let tags = split_list(&tags);
            let result = vault.import_key(
                &label,
                material.trim(),
                fmt,
                &tags,
                apply_policy_args(VaultPolicy::default(), &policy),
            );
            vault.close()?;
            let record = result?;
            println!("✓ Imported key {} ({})", record.id, record.label);
            Ok(())
        }
        Commands::Find { q, tags, json } => cmd_find(path, passphrase, q, tags, json),
        Commands::Policy { record_id, policy } => cmd_policy(path, passphrase, record_id, policy),
        Commands::Sign {
            record_id,
            payload_hex,
            repeat,
            deterministic,
        } => cmd_sign(path, passphrase, record_id, payload_hex, repeat, deterministic),
        Commands::Rotate { record_id } => {
            let record = with_vault(&path, passphrase, |vault| vault.rotate(&record_id))?;
            println!(
                "✓ Rotated {} (rotation #{}, hint {})",
                record.id, record.rotation_count, record.entropy_hint
            );
            Ok(())
        }
        Commands::Retire { record_id } => {
            let record = with_vault(&path, passphrase, |vault| vault.retire(&record_id))?;
            println!("✓ Retired {} ({})", record.id, record.label);
            Ok(())
        }
        Commands::Export => {
            let records = with_vault(&path, passphrase, |vault| vault.export_metadata())?;
            print_json(&records)
        }
    }
}

// ─── Init ────────────────────────────────────────────────────────────────────

fn cmd_init(path: PathBuf, passphrase: Option<String>) -> Result<(), VaultError> {
    let existed = init_vault(&path, passphrase, &mut io::stdin().lock())?;

    if existed {
        println!("✓ Vault at {} opened; passphrase verified", path.display());
    } else {
        println!("✓ Vault initialised at {}", path.display());
        println!();
        println!("Next: import a key with `keyvault import --label <name> --fmt hex --from-stdin`");
    }
    Ok(())
}

/// Create or check the vault at `path` and report whether it already existed.
/// A new vault's passphrase read from `input` must be typed twice.
fn init_vault(
    path: &Path,
    given: Option<String>,
    input: &mut impl BufRead,
) -> Result<bool, VaultError> {
    let existed = path.exists();
    let confirm = !existed && given.is_none();
    let passphrase = match given {
        Some(p) => Zeroizing::new(p),
        None => read_passphrase(input, confirm)?,
    };
    if passphrase.is_empty() {
        return Err(VaultError::InvalidInput("passphrase must be non-empty".to_string()));
    }

    Vault::open(path, &passphrase)?.close()?;
    Ok(existed)
}

// ─── Find ────────────────────────────────────────────────────────────────────

fn cmd_find(
    path: PathBuf,
    passphrase: Option<String>,
    query: Option<String>,
    tags: String,
    json: bool,
) -> Result<(), VaultError> {
    let tags = split_list(&tags);
    let records = with_vault(&path, passphrase, |vault| vault.find(query.as_deref(), &tags))?;

    if json {
        return print_json(&records);
    }
    print_records(&records);
    Ok(())
}

// ─── Policy ──────────────────────────────────────────────────────────────────

fn cmd_policy(
    path: PathBuf,
    passphrase: Option<String>,
    record_id: String,
    args: PolicyArgs,
) -> Result<(), VaultError> {
    let record = with_vault(&path, passphrase, |vault| {
        let current = vault.get(&record_id)?;
        vault.set_policy(&record_id, apply_policy_args(current.policy, &args))
    })?;

    println!("✓ Updated policy for {}", record.id);
    println!("  {}", serde_json::to_string(&record.policy).map_err(crate::store::StoreError::from)?);
    Ok(())
}

// ─── Sign ────────────────────────────────────────────────────────────────────

fn cmd_sign(
    path: PathBuf,
    passphrase: Option<String>,
    record_id: String,
    payload_hex: String,
    repeat: u32,
    deterministic: bool,
) -> Result<(), VaultError> {
    let payload = hex::decode(payload_hex.trim())
        .map_err(|e| VaultError::InvalidInput(format!("invalid hex payload: {}", e)))?;

    let outcomes = with_vault(&path, passphrase, |vault| {
        (0..repeat)
            .map(|_| vault.sign(&record_id, &payload, !deterministic))
            .collect::<Result<Vec<_>, _>>()
    })?;

    for outcome in outcomes {
        println!(
            "Signature {} algo={} uses={} ts={}",
            outcome.signature,
            outcome.algorithm,
            outcome.record.use_count,
            outcome.timestamp.timestamp()
        );
    }
    Ok(())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Open the vault, run `f`, and close the vault whatever `f` returned.
fn with_vault<T>(
    path: &Path,
    passphrase: Option<String>,
    f: impl FnOnce(&Vault) -> Result<T, VaultError>,
) -> Result<T, VaultError> {
    let passphrase = resolve_passphrase(passphrase)?;
    let vault = Vault::open(path, &passphrase)?;
    let result = f(&vault);
    vault.close()?;
    result
}

/// The passphrase from `--passphrase` / `KEYVAULT_PASSPHRASE`, or the first
/// line of stdin.
fn resolve_passphrase(given: Option<String>) -> Result<Zeroizing<String>, VaultError> {
    let passphrase = match given {
        Some(p) => Zeroizing::new(p),
        None => read_passphrase(&mut io::stdin().lock(), false)?,
    };
    if passphrase.is_empty() {
        return Err(VaultError::InvalidInput("passphrase must be non-empty".to_string()));
    }
    Ok(passphrase)
}

/// One passphrase line, or two identical lines when `confirm` is set.
/// Terminal echo is not suppressed.
fn read_passphrase(
    input: &mut impl BufRead,
    confirm: bool,
) -> Result<Zeroizing<String>, VaultError> {
    let first = read_secret_line(input)?;
    if confirm {
        let second = read_secret_line(input)?;
        if *first != *second {
            return Err(VaultError::InvalidInput("passphrases do not match".to_string()));
        }
    }
    Ok(first)
}

fn read_secret_line(input: &mut impl BufRead) -> Result<Zeroizing<String>, VaultError> {
    let mut line = Zeroizing::new(String::new());
    input.read_line(&mut line)?;
    let len = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(len);
    Ok(line)
}

fn read_stdin_rest() -> Result<Zeroizing<String>, VaultError> {
    let mut material = Zeroizing::new(String::new());
    io::stdin().lock().read_to_string(&mut material)?;
    if material.trim().is_empty() {
        return Err(VaultError::InvalidInput("no key material on stdin".to_string()));
    }
    Ok(material)
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
}

/// Overlay the flags that were given onto `base`.
fn apply_policy_args(mut base: VaultPolicy, args: &PolicyArgs) -> VaultPolicy {
    if let Some(uses) = args.max_sign_uses {
        base.max_sign_uses = uses;
    }
    if let Some(cooldown) = args.cooldown {
        base.cooldown_s = cooldown;
    }
    if let Some(formats) = &args.allow_formats {
        let mut formats = formats.clone();
        formats.sort();
        formats.dedup();
        base.allow_formats = formats;
    }
    if let Some(interval) = args.rotation_interval {
        base.rotation_interval_s = interval;
    }
    if let Some(age) = args.max_age {
        base.max_age_s = age;
    }
    if let Some(auto) = args.auto_rotate {
        base.auto_rotate = auto;
    }
    base
}

fn print_json(records: &[VaultRecord]) -> Result<(), VaultError> {
    let json = serde_json::to_string_pretty(records).map_err(crate::store::StoreError::from)?;
    println!("{}", json);
    Ok(())
}

fn print_records(records: &[VaultRecord]) {
    if records.is_empty() {
        println!("No matching records.");
        return;
    }

    println!("Vault records ({}):\n", records.len());
    for record in records {
        let tags: Vec<&str> = record.tags.iter().map(String::as_str).collect();
        println!(
            "  {} │ {:16} │ {:3} │ {:7} │ uses {:>4} │ {:12} │ {}",
            record.id,
            record.label,
            record.fmt.as_str(),
            record.status.as_str(),
            record.use_count,
            record.entropy_hint,
            tags.join(","),
        );
        if let Some(last_used) = record.last_used_at {
            println!("    last used {}", last_used.format("%Y-%m-%d %H:%M:%S UTC"));
        }
    }
}

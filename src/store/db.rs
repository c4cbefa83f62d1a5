// Keyvault — SQLite Database Management
//
// Opens the vault file and brings its schema up to date. Migrations are an
// ordered list; each step runs once inside its own transaction and records
// its number in `meta.version`. Files written by the first schema carry
// version "1" and upgrade in place.

use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use super::StoreError;

// ─── Migrations ──────────────────────────────────────────────────────────────

struct Migration {
    version: u32,
    description: &'static str,
    apply: fn(&Transaction<'_>) -> Result<(), StoreError>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "base schema",
        apply: migrate_base_schema,
    },
    Migration {
        version: 2,
        description: "record lifecycle columns",
        apply: migrate_lifecycle_columns,
    },
];

/// Schema version produced by the last migration this build knows about.
pub const SCHEMA_VERSION: u32 = 2;

fn migrate_base_schema(tx: &Transaction<'_>) -> Result<(), StoreError> {
    tx.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS meta (
            key     TEXT PRIMARY KEY,
            value   BLOB
        );

        CREATE TABLE IF NOT EXISTS records (
            id              TEXT PRIMARY KEY,
            label           TEXT NOT NULL,
            fmt             TEXT NOT NULL,
            tags            TEXT NOT NULL,
            created_at      REAL NOT NULL,
            last_used_at    REAL,
            use_count       INTEGER NOT NULL,
            entropy_hint    TEXT NOT NULL,
            policy          TEXT NOT NULL,
            enc_priv        BLOB NOT NULL,
            nonce           BLOB NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_records_label ON records(label);
        CREATE INDEX IF NOT EXISTS idx_records_tags ON records(tags);
        CREATE INDEX IF NOT EXISTS idx_records_created ON records(created_at);
        ",
    )?;
    Ok(())
}

fn migrate_lifecycle_columns(tx: &Transaction<'_>) -> Result<(), StoreError> {
    let existing = column_names(tx, "records")?;
    let wanted = [
        ("status", "TEXT NOT NULL DEFAULT 'active'"),
        ("expires_at", "REAL"),
        ("last_rotated_at", "REAL"),
        ("rotation_count", "INTEGER NOT NULL DEFAULT 0"),
    ];

    for (name, decl) in wanted {
        if !existing.iter().any(|c| c == name) {
            tx.execute_batch(&format!("ALTER TABLE records ADD COLUMN {} {};", name, decl))?;
        }
    }

    tx.execute(
        "UPDATE records SET last_rotated_at = created_at WHERE last_rotated_at IS NULL",
        [],
    )?;
    Ok(())
}

fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

// ─── Database ────────────────────────────────────────────────────────────────

/// Wrapper around the SQLite connection backing one vault file.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the vault database at `path`, creating parent
    /// directories as needed, and apply pending migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.run_migrations()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing only).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.run_migrations()?;
        Ok(db)
    }

    /// Get a reference to the underlying connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Last migration applied to this file; 0 for a brand-new file.
    pub fn schema_version(&self) -> Result<u32, StoreError> {
        read_version(&self.conn)
    }

    fn run_migrations(&self) -> Result<(), StoreError> {
        let current = read_version(&self.conn)?;
        if current > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedVersion(current));
        }

        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            let tx = self.conn.unchecked_transaction()?;
            (migration.apply)(&tx)?;
            tx.execute(
                "INSERT OR REPLACE INTO meta(key, value) VALUES('version', ?1)",
                params![migration.version.to_string()],
            )?;
            tx.commit()?;

            tracing::debug!(
                version = migration.version,
                "Applied migration: {}",
                migration.description
            );
        }

        tracing::debug!("Database migrations completed successfully");
        Ok(())
    }
}

/// Read `meta.version`, accepting the TEXT form older files wrote as well
/// as an INTEGER.
fn read_version(conn: &Connection) -> Result<u32, StoreError> {
    let has_meta: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='meta'",
        [],
        |row| row.get(0),
    )?;
    if has_meta == 0 {
        return Ok(0);
    }

    let value: Option<Value> = conn
        .query_row("SELECT value FROM meta WHERE key='version'", [], |row| {
            row.get(0)
        })
        .optional()?;

    let parsed = match value {
        None | Some(Value::Null) => return Ok(0),
        Some(Value::Integer(v)) => u32::try_from(v).ok(),
        Some(Value::Text(text)) => text.trim().parse::<u32>().ok(),
        Some(Value::Blob(bytes)) => std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok()),
        Some(Value::Real(_)) => None,
    };

    parsed.ok_or_else(|| StoreError::Corrupt("unreadable schema version in meta".to_string()))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

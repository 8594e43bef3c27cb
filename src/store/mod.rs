//! Relational persistence for apps, crash groups, crashes, alert rules,
//! and settings.
//!
//! A thin wrapper around a single `rusqlite::Connection`, opened once and
//! schema-migrated at open time.
//! Callers are expected to serialize access (e.g. behind a
//! `tokio::sync::Mutex`) since a single writer is assumed.

mod alerts;
mod apps;
mod crashes;
mod groups;
mod settings;
mod stats;

pub use apps::*;
pub use crashes::{CrashFilter, CrashPage};
pub use groups::{GroupFilter, GroupPage, GroupSort, SortDirection};
pub use stats::AppStats;

use rusqlite::Connection;
use std::path::Path;

use crate::error::StoreError;

/// The default page size for `list` operations.
pub const DEFAULT_PAGE_LIMIT: i64 = 50;

/// SQLite-backed implementation of the Indexed Store contract.
pub struct IndexedStore {
    conn: Connection,
}

impl IndexedStore {
    /// Opens or creates the index database at `path`, applying the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA case_sensitive_like = ON;

            CREATE TABLE IF NOT EXISTS apps (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                api_key_hash TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                retention_days INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS crash_groups (
                id TEXT PRIMARY KEY,
                app_id TEXT NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
                fingerprint TEXT NOT NULL,
                error_type TEXT NOT NULL,
                error_message TEXT NOT NULL,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                occurrence_count INTEGER NOT NULL,
                status TEXT NOT NULL,
                assigned_to TEXT,
                notes TEXT,
                UNIQUE(app_id, fingerprint)
            );

            CREATE TABLE IF NOT EXISTS crashes (
                id TEXT PRIMARY KEY,
                app_id TEXT NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
                group_id TEXT NOT NULL REFERENCES crash_groups(id) ON DELETE CASCADE,
                fingerprint TEXT NOT NULL,
                app_version TEXT NOT NULL,
                platform TEXT NOT NULL,
                os_version TEXT,
                device_model TEXT,
                error_type TEXT NOT NULL,
                error_message TEXT NOT NULL,
                stack_trace TEXT NOT NULL,
                user_id TEXT,
                environment TEXT NOT NULL,
                metadata TEXT NOT NULL,
                breadcrumbs TEXT NOT NULL,
                blob_path TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                app_id TEXT NOT NULL,
                channel TEXT NOT NULL,
                config TEXT NOT NULL,
                enabled INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_crashes_app_id ON crashes(app_id);
            CREATE INDEX IF NOT EXISTS idx_crashes_group_id ON crashes(group_id);
            CREATE INDEX IF NOT EXISTS idx_crashes_created_at ON crashes(created_at);
            CREATE INDEX IF NOT EXISTS idx_crashes_fingerprint ON crashes(fingerprint);
            CREATE INDEX IF NOT EXISTS idx_groups_app_id ON crash_groups(app_id);
            CREATE INDEX IF NOT EXISTS idx_groups_app_fingerprint ON crash_groups(app_id, fingerprint);
            CREATE INDEX IF NOT EXISTS idx_groups_status ON crash_groups(status);
            CREATE INDEX IF NOT EXISTS idx_alerts_app_id ON alerts(app_id);
            ",
        )?;
        Ok(())
    }
}

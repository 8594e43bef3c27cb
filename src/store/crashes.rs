use chrono::{DateTime, Utc};
use rusqlite::params;

use super::apps::parse_rfc3339;
use super::IndexedStore;
use crate::error::StoreError;
use crate::models::Crash;

/// Filters accepted by [`IndexedStore::list_crashes`]. Missing filters are
/// wildcards; date bounds are inclusive.
#[derive(Debug, Default, Clone)]
pub struct CrashFilter {
    pub app_id: Option<String>,
    pub group_id: Option<String>,
    pub platform: Option<String>,
    pub environment: Option<String>,
    pub error_type: Option<String>,
    pub user_id: Option<String>,
    pub search: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

pub struct CrashPage {
    pub crashes: Vec<Crash>,
    pub total: i64,
}

impl IndexedStore {
    pub fn insert_crash(&self, crash: &Crash) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO crashes (
                id, app_id, group_id, fingerprint, app_version, platform,
                os_version, device_model, error_type, error_message,
                stack_trace, user_id, environment, metadata, breadcrumbs,
                blob_path, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                crash.id,
                crash.app_id,
                crash.group_id,
                crash.fingerprint,
                crash.app_version,
                crash.platform,
                crash.os_version,
                crash.device_model,
                crash.error_type,
                crash.error_message,
                serde_json::to_string(&crash.stack_trace)?,
                crash.user_id,
                crash.environment,
                serde_json::to_string(&crash.metadata)?,
                serde_json::to_string(&crash.breadcrumbs)?,
                crash.blob_path,
                crash.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_crash(&self, id: &str) -> Result<Option<Crash>, StoreError> {
        let mut stmt = self.conn.prepare(SELECT_CRASH_COLUMNS)?;
        let mut rows = stmt.query_map([id], row_to_crash)?;
        match rows.next() {
            Some(r) => Ok(Some(r?.map_err(StoreError::from)?)),
            None => Ok(None),
        }
    }

    pub fn list_crashes(
        &self,
        filter: &CrashFilter,
        offset: i64,
        limit: i64,
    ) -> Result<CrashPage, StoreError> {
        let mut where_clauses = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(v) = &filter.app_id {
            where_clauses.push("app_id = ?".to_string());
            args.push(Box::new(v.clone()));
        }
        if let Some(v) = &filter.group_id {
            where_clauses.push("group_id = ?".to_string());
            args.push(Box::new(v.clone()));
        }
        if let Some(v) = &filter.platform {
            where_clauses.push("platform = ?".to_string());
            args.push(Box::new(v.clone()));
        }
        if let Some(v) = &filter.environment {
            where_clauses.push("environment = ?".to_string());
            args.push(Box::new(v.clone()));
        }
        if let Some(v) = &filter.error_type {
            where_clauses.push("error_type = ?".to_string());
            args.push(Box::new(v.clone()));
        }
        if let Some(v) = &filter.user_id {
            where_clauses.push("user_id = ?".to_string());
            args.push(Box::new(v.clone()));
        }
        if let Some(v) = &filter.search {
            where_clauses.push("(error_type || error_message) LIKE ?".to_string());
            args.push(Box::new(format!("%{}%", v)));
        }
        if let Some(v) = &filter.created_after {
            where_clauses.push("created_at >= ?".to_string());
            args.push(Box::new(v.to_rfc3339()));
        }
        if let Some(v) = &filter.created_before {
            where_clauses.push("created_at <= ?".to_string());
            args.push(Box::new(v.to_rfc3339()));
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM crashes {}", where_sql);
        let total: i64 = self.conn.query_row(
            &count_sql,
            rusqlite::params_from_iter(args.iter().map(|b| b.as_ref())),
            |row| row.get(0),
        )?;

        let sql = format!(
            "{} {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            SELECT_CRASH_COLUMNS, where_sql
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut all_args = args;
        all_args.push(Box::new(limit));
        all_args.push(Box::new(offset));

        let rows = stmt.query_map(
            rusqlite::params_from_iter(all_args.iter().map(|b| b.as_ref())),
            row_to_crash,
        )?;
        let crashes = rows
            .collect::<Result<Vec<_>, rusqlite::Error>>()?
            .into_iter()
            .collect::<Result<Vec<_>, serde_json::Error>>()?;

        Ok(CrashPage { crashes, total })
    }

    pub fn delete_crash(&self, id: &str) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM crashes WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Bulk-deletes crashes older than `created_before` for one app,
    /// returning the number of rows removed. Used by the retention
    /// sweeper; does not decrement group occurrence counts.
    pub fn delete_crashes_before(
        &self,
        app_id: &str,
        created_before: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let count = self.conn.execute(
            "DELETE FROM crashes WHERE app_id = ?1 AND created_at < ?2",
            params![app_id, created_before.to_rfc3339()],
        )?;
        Ok(count)
    }
}

const SELECT_CRASH_COLUMNS: &str = "SELECT id, app_id, group_id, fingerprint, app_version, platform,
    os_version, device_model, error_type, error_message, stack_trace,
    user_id, environment, metadata, breadcrumbs, blob_path, created_at FROM crashes";

fn row_to_crash(row: &rusqlite::Row) -> rusqlite::Result<Result<Crash, serde_json::Error>> {
    let id: String = row.get(0)?;
    let app_id: String = row.get(1)?;
    let group_id: String = row.get(2)?;
    let fingerprint: String = row.get(3)?;
    let app_version: String = row.get(4)?;
    let platform: String = row.get(5)?;
    let os_version: Option<String> = row.get(6)?;
    let device_model: Option<String> = row.get(7)?;
    let error_type: String = row.get(8)?;
    let error_message: String = row.get(9)?;
    let stack_trace_raw: String = row.get(10)?;
    let user_id: Option<String> = row.get(11)?;
    let environment: String = row.get(12)?;
    let metadata_raw: String = row.get(13)?;
    let breadcrumbs_raw: String = row.get(14)?;
    let blob_path: String = row.get(15)?;
    let created_at: String = row.get(16)?;

    let parse = || -> Result<Crash, serde_json::Error> {
        Ok(Crash {
            id,
            app_id,
            group_id,
            fingerprint,
            app_version,
            platform,
            os_version,
            device_model,
            error_type,
            error_message,
            stack_trace: serde_json::from_str(&stack_trace_raw)?,
            user_id,
            environment,
            metadata: serde_json::from_str(&metadata_raw)?,
            breadcrumbs: serde_json::from_str(&breadcrumbs_raw)?,
            blob_path,
            created_at: parse_rfc3339(&created_at),
        })
    };
    Ok(parse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_crash(app_id: &str, group_id: &str) -> Crash {
        Crash {
            id: uuid::Uuid::new_v4().to_string(),
            app_id: app_id.to_string(),
            fingerprint: "fp".into(),
            group_id: group_id.to_string(),
            app_version: "1.0.0".into(),
            platform: "ios".into(),
            os_version: Some("17.0".into()),
            device_model: Some("iPhone15".into()),
            error_type: "FormatException".into(),
            error_message: "bad input".into(),
            stack_trace: vec![],
            user_id: Some("u1".into()),
            environment: "production".into(),
            metadata: HashMap::new(),
            breadcrumbs: vec![],
            blob_path: "app1/2024-01-01/x.json".into(),
            created_at: Utc::now(),
        }
    }

    fn seeded_store() -> (IndexedStore, String) {
        let mut store = IndexedStore::open_in_memory().unwrap();
        store.create_app("app1", "A", "h", 30).unwrap();
        let group_seed = sample_crash("app1", "__seed__");
        let (group, _) = store.get_or_create_group(&group_seed).unwrap();
        (store, group.id)
    }

    #[test]
    fn insert_and_round_trip() {
        let (store, group_id) = seeded_store();
        let crash = sample_crash("app1", &group_id);
        store.insert_crash(&crash).unwrap();

        let fetched = store.get_crash(&crash.id).unwrap().unwrap();
        assert_eq!(fetched.error_type, crash.error_type);
        assert_eq!(fetched.error_message, crash.error_message);
        assert_eq!(fetched.blob_path, crash.blob_path);
    }

    #[test]
    fn list_with_filters_and_pagination() {
        let (store, group_id) = seeded_store();
        for i in 0..3 {
            let mut c = sample_crash("app1", &group_id);
            c.platform = if i == 0 { "android".into() } else { "ios".into() };
            store.insert_crash(&c).unwrap();
        }

        let page = store
            .list_crashes(&CrashFilter::default(), 0, 50)
            .unwrap();
        assert_eq!(page.total, 3);

        let filtered = store
            .list_crashes(
                &CrashFilter {
                    platform: Some("android".into()),
                    ..Default::default()
                },
                0,
                50,
            )
            .unwrap();
        assert_eq!(filtered.total, 1);
    }

    #[test]
    fn search_is_case_sensitive() {
        let (store, group_id) = seeded_store();
        store.insert_crash(&sample_crash("app1", &group_id)).unwrap();

        let matches = store
            .list_crashes(
                &CrashFilter {
                    search: Some("FormatException".into()),
                    ..Default::default()
                },
                0,
                50,
            )
            .unwrap();
        assert_eq!(matches.total, 1);

        let no_matches = store
            .list_crashes(
                &CrashFilter {
                    search: Some("formatexception".into()),
                    ..Default::default()
                },
                0,
                50,
            )
            .unwrap();
        assert_eq!(no_matches.total, 0);
    }

    #[test]
    fn delete_before_cutoff() {
        let (store, group_id) = seeded_store();
        let mut old = sample_crash("app1", &group_id);
        old.created_at = Utc::now() - chrono::Duration::days(40);
        store.insert_crash(&old).unwrap();

        let recent = sample_crash("app1", &group_id);
        store.insert_crash(&recent).unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(30);
        let deleted = store.delete_crashes_before("app1", cutoff).unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_crash(&old.id).unwrap().is_none());
        assert!(store.get_crash(&recent.id).unwrap().is_some());
    }
}

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::IndexedStore;
use crate::error::StoreError;
use crate::models::Application;

impl IndexedStore {
    /// Inserts a new application row.
    pub fn create_app(
        &self,
        id: &str,
        name: &str,
        api_key_hash: &str,
        retention_days: i64,
    ) -> Result<Application, StoreError> {
        let created_at = Utc::now();
        self.conn.execute(
            "INSERT INTO apps (id, name, api_key_hash, created_at, retention_days)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, name, api_key_hash, created_at.to_rfc3339(), retention_days],
        )?;
        Ok(Application {
            id: id.to_string(),
            name: name.to_string(),
            api_key_hash: api_key_hash.to_string(),
            created_at,
            retention_days,
        })
    }

    pub fn get_app(&self, id: &str) -> Result<Option<Application>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, api_key_hash, created_at, retention_days FROM apps WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map([id], row_to_app)?;
        rows.next().transpose().map_err(StoreError::from)
    }

    /// Looks an app up by its hashed ingestion credential, used by the
    /// ingestion endpoint's auth check.
    pub fn get_app_by_key_hash(&self, api_key_hash: &str) -> Result<Option<Application>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, api_key_hash, created_at, retention_days FROM apps WHERE api_key_hash = ?1",
        )?;
        let mut rows = stmt.query_map([api_key_hash], row_to_app)?;
        rows.next().transpose().map_err(StoreError::from)
    }

    /// Lists all apps, newest first.
    pub fn list_apps(&self) -> Result<Vec<Application>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, api_key_hash, created_at, retention_days FROM apps ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_app)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Updates the mutable fields of an app (name, retention window).
    pub fn update_app(
        &self,
        id: &str,
        name: Option<&str>,
        retention_days: Option<i64>,
    ) -> Result<(), StoreError> {
        if let Some(name) = name {
            self.conn
                .execute("UPDATE apps SET name = ?1 WHERE id = ?2", params![name, id])?;
        }
        if let Some(days) = retention_days {
            self.conn.execute(
                "UPDATE apps SET retention_days = ?1 WHERE id = ?2",
                params![days, id],
            )?;
        }
        Ok(())
    }

    /// Deletes an app and all of its crashes, groups, and alert rules in a
    /// single transaction.
    pub fn delete_app(&mut self, id: &str) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM crashes WHERE app_id = ?1", [id])?;
        tx.execute("DELETE FROM crash_groups WHERE app_id = ?1", [id])?;
        tx.execute("DELETE FROM alerts WHERE app_id = ?1", [id])?;
        tx.execute("DELETE FROM apps WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(())
    }
}

fn row_to_app(row: &rusqlite::Row) -> rusqlite::Result<Application> {
    let created_at: String = row.get(3)?;
    Ok(Application {
        id: row.get(0)?,
        name: row.get(1)?,
        api_key_hash: row.get(2)?,
        created_at: parse_rfc3339(&created_at),
        retention_days: row.get(4)?,
    })
}

pub(super) fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_get_list_update_delete() {
        let mut store = IndexedStore::open_in_memory().unwrap();
        let app = store.create_app("app1", "My App", "hash123", 30).unwrap();
        assert_eq!(app.retention_days, 30);

        let fetched = store.get_app("app1").unwrap().unwrap();
        assert_eq!(fetched.name, "My App");

        let by_hash = store.get_app_by_key_hash("hash123").unwrap().unwrap();
        assert_eq!(by_hash.id, "app1");

        store.update_app("app1", Some("Renamed"), Some(14)).unwrap();
        let updated = store.get_app("app1").unwrap().unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.retention_days, 14);

        let list = store.list_apps().unwrap();
        assert_eq!(list.len(), 1);

        store.delete_app("app1").unwrap();
        assert!(store.get_app("app1").unwrap().is_none());
    }
}

use rusqlite::params;

use super::IndexedStore;
use crate::error::StoreError;

impl IndexedStore {
    /// Opaque key/value bag for collaborators outside the core (e.g. the
    /// dashboard's own stored credential hash). Not interpreted here.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM settings WHERE key = ?1")?;
        let mut rows = stmt.query_map([key], |row| row.get::<_, String>(0))?;
        rows.next().transpose().map_err(StoreError::from)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete_setting(&self, key: &str) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM settings WHERE key = ?1", [key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_overwrite_delete() {
        let store = IndexedStore::open_in_memory().unwrap();
        assert!(store.get_setting("dashboard_key_hash").unwrap().is_none());

        store.set_setting("dashboard_key_hash", "abc").unwrap();
        assert_eq!(store.get_setting("dashboard_key_hash").unwrap().unwrap(), "abc");

        store.set_setting("dashboard_key_hash", "def").unwrap();
        assert_eq!(store.get_setting("dashboard_key_hash").unwrap().unwrap(), "def");

        store.delete_setting("dashboard_key_hash").unwrap();
        assert!(store.get_setting("dashboard_key_hash").unwrap().is_none());
    }
}

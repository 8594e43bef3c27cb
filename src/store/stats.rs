use chrono::{Duration, Utc};
use serde::Serialize;

use super::IndexedStore;
use crate::error::StoreError;

/// Aggregate snapshot for one app.
#[derive(Debug, Serialize)]
pub struct AppStats {
    pub total_crashes: i64,
    pub total_groups: i64,
    pub open_groups: i64,
    pub crashes_last_24h: i64,
    pub crashes_last_7d: i64,
    pub crashes_last_30d: i64,
    pub top_groups: Vec<TopGroup>,
    pub daily_trend: Vec<DailyCount>,
}

#[derive(Debug, Serialize)]
pub struct TopGroup {
    pub group_id: String,
    pub error_type: String,
    pub occurrence_count: i64,
}

#[derive(Debug, Serialize)]
pub struct DailyCount {
    pub day: String,
    pub count: i64,
}

impl IndexedStore {
    /// Builds the aggregate crash/group snapshot for `app_id`.
    pub fn app_stats(&self, app_id: &str) -> Result<AppStats, StoreError> {
        let total_crashes: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crashes WHERE app_id = ?1",
            [app_id],
            |row| row.get(0),
        )?;
        let total_groups: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crash_groups WHERE app_id = ?1",
            [app_id],
            |row| row.get(0),
        )?;
        let open_groups: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crash_groups WHERE app_id = ?1 AND status = 'open'",
            [app_id],
            |row| row.get(0),
        )?;

        let now = Utc::now();
        let crashes_last_24h = self.count_crashes_since(app_id, now - Duration::hours(24))?;
        let crashes_last_7d = self.count_crashes_since(app_id, now - Duration::days(7))?;
        let crashes_last_30d = self.count_crashes_since(app_id, now - Duration::days(30))?;

        let mut top_stmt = self.conn.prepare(
            "SELECT id, error_type, occurrence_count FROM crash_groups
             WHERE app_id = ?1
             ORDER BY occurrence_count DESC, last_seen DESC
             LIMIT 5",
        )?;
        let top_groups = top_stmt
            .query_map([app_id], |row| {
                Ok(TopGroup {
                    group_id: row.get(0)?,
                    error_type: row.get(1)?,
                    occurrence_count: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let cutoff = now - Duration::days(30);
        let mut trend_stmt = self.conn.prepare(
            "SELECT substr(created_at, 1, 10) as day, COUNT(*) FROM crashes
             WHERE app_id = ?1 AND created_at >= ?2
             GROUP BY day ORDER BY day ASC",
        )?;
        let daily_trend = trend_stmt
            .query_map(rusqlite::params![app_id, cutoff.to_rfc3339()], |row| {
                Ok(DailyCount {
                    day: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AppStats {
            total_crashes,
            total_groups,
            open_groups,
            crashes_last_24h,
            crashes_last_7d,
            crashes_last_30d,
            top_groups,
            daily_trend,
        })
    }

    fn count_crashes_since(
        &self,
        app_id: &str,
        since: chrono::DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM crashes WHERE app_id = ?1 AND created_at >= ?2",
                rusqlite::params![app_id, since.to_rfc3339()],
                |row| row.get(0),
            )
            .map_err(StoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Crash;
    use std::collections::HashMap;

    fn sample_crash(app_id: &str, group_id: &str, error_type: &str) -> Crash {
        Crash {
            id: uuid::Uuid::new_v4().to_string(),
            app_id: app_id.to_string(),
            fingerprint: "fp".into(),
            group_id: group_id.to_string(),
            app_version: "1.0.0".into(),
            platform: "android".into(),
            os_version: None,
            device_model: None,
            error_type: error_type.to_string(),
            error_message: "boom".into(),
            stack_trace: vec![],
            user_id: None,
            environment: "production".into(),
            metadata: HashMap::new(),
            breadcrumbs: vec![],
            blob_path: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn aggregates_totals_and_top_groups() {
        let mut store = IndexedStore::open_in_memory().unwrap();
        store.create_app("app1", "A", "h", 30).unwrap();

        let crash = sample_crash("app1", "", "NullPointerException");
        let (group, _) = store.get_or_create_group(&crash).unwrap();
        let mut c1 = crash.clone();
        c1.group_id = group.id.clone();
        store.insert_crash(&c1).unwrap();

        let stats = store.app_stats("app1").unwrap();
        assert_eq!(stats.total_crashes, 1);
        assert_eq!(stats.total_groups, 1);
        assert_eq!(stats.open_groups, 1);
        assert_eq!(stats.crashes_last_24h, 1);
        assert_eq!(stats.top_groups.len(), 1);
        assert_eq!(stats.top_groups[0].error_type, "NullPointerException");
    }
}

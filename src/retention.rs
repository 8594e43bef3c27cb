//! Background retention sweeper: purges crash rows and blobs past each
//! app's configured retention window.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::blob::BlobStore;
use crate::error::SweepError;
use crate::models::Application;
use crate::store::IndexedStore;

/// Upper bound on a single sweep across every app: one slow or
/// wedged app must not block the others indefinitely.
pub const SWEEP_DEADLINE: Duration = Duration::from_secs(30 * 60);

/// Runs `cleanup_app` for every registered app on a fixed interval.
pub struct RetentionSweeper {
    store: Arc<Mutex<IndexedStore>>,
    blobs: Arc<BlobStore>,
    interval: Duration,
    default_days: i64,
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<Mutex<IndexedStore>>,
        blobs: Arc<BlobStore>,
        interval: Duration,
        default_days: i64,
    ) -> Self {
        Self { store, blobs, interval, default_days }
    }

    /// Spawns the periodic sweep loop. The first sweep runs immediately;
    /// subsequent ones follow `interval`.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                match tokio::time::timeout(SWEEP_DEADLINE, self.run_now()).await {
                    Ok(Ok(removed)) => {
                        tracing::info!(crashes_removed = removed, "retention sweep complete");
                    }
                    Ok(Err(e)) => tracing::warn!(error = %e, "retention sweep failed"),
                    Err(_) => tracing::warn!("retention sweep exceeded its deadline, skipping to next tick"),
                }
            }
        })
    }

    /// Runs one sweep over every app, isolating per-app failures so one bad
    /// app doesn't stop the rest. Returns the total crash rows removed.
    pub async fn run_now(&self) -> Result<usize, SweepError> {
        let apps = {
            let store = self.store.lock().await;
            store.list_apps()?
        };

        let mut total_removed = 0;
        for app in apps {
            match self.cleanup_app(&app).await {
                Ok(removed) => total_removed += removed,
                Err(e) => tracing::warn!(app_id = %app.id, error = %e, "retention cleanup failed for app"),
            }
        }
        Ok(total_removed)
    }

    /// Deletes crash rows and blobs older than `app.retention_days` for one
    /// app, falling back to `default_days` when the app has no retention
    /// window of its own. Group rows and their occurrence counts are left
    /// untouched.
    pub async fn cleanup_app(&self, app: &Application) -> Result<usize, SweepError> {
        let retention_days = if app.retention_days > 0 {
            app.retention_days
        } else {
            self.default_days
        };
        let cutoff = Utc::now() - ChronoDuration::days(retention_days);
        let removed = {
            let store = self.store.lock().await;
            store.delete_crashes_before(&app.id, cutoff)?
        };
        self.blobs
            .delete_app_before(&app.id, &cutoff.format("%Y-%m-%d").to_string())?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Crash;
    use std::collections::HashMap;

    fn sample_crash(app_id: &str, created_at: chrono::DateTime<Utc>) -> Crash {
        Crash {
            id: uuid::Uuid::new_v4().to_string(),
            app_id: app_id.to_string(),
            fingerprint: "fp".into(),
            group_id: "g1".into(),
            app_version: "1.0.0".into(),
            platform: "ios".into(),
            os_version: None,
            device_model: None,
            error_type: "E".into(),
            error_message: "boom".into(),
            stack_trace: vec![],
            user_id: None,
            environment: "production".into(),
            metadata: HashMap::new(),
            breadcrumbs: vec![],
            blob_path: String::new(),
            created_at,
        }
    }

    #[tokio::test]
    async fn cleanup_app_removes_only_rows_past_retention() {
        let mut store = IndexedStore::open_in_memory().unwrap();
        let app = store.create_app("app1", "A", "h", 7).unwrap();
        let (group, _) = store
            .get_or_create_group(&sample_crash("app1", Utc::now()))
            .unwrap();

        let mut old = sample_crash("app1", Utc::now() - ChronoDuration::days(10));
        old.group_id = group.id.clone();
        let mut recent = sample_crash("app1", Utc::now());
        recent.group_id = group.id.clone();
        store.insert_crash(&old).unwrap();
        store.insert_crash(&recent).unwrap();

        let blobs = BlobStore::new(tempfile::tempdir().unwrap().keep()).unwrap();
        let sweeper = RetentionSweeper::new(
            Arc::new(Mutex::new(store)),
            Arc::new(blobs),
            Duration::from_secs(3600),
            30,
        );

        let removed = sweeper.cleanup_app(&app).await.unwrap();
        assert_eq!(removed, 1);

        let store = sweeper.store.lock().await;
        assert!(store.get_crash(&old.id).unwrap().is_none());
        assert!(store.get_crash(&recent.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn zero_retention_days_falls_back_to_default() {
        let mut store = IndexedStore::open_in_memory().unwrap();
        let app = store.create_app("app1", "A", "h", 0).unwrap();
        let (group, _) = store
            .get_or_create_group(&sample_crash("app1", Utc::now()))
            .unwrap();

        let mut old = sample_crash("app1", Utc::now() - ChronoDuration::days(10));
        old.group_id = group.id.clone();
        store.insert_crash(&old).unwrap();

        let blobs = BlobStore::new(tempfile::tempdir().unwrap().keep()).unwrap();
        let sweeper = RetentionSweeper::new(
            Arc::new(Mutex::new(store)),
            Arc::new(blobs),
            Duration::from_secs(3600),
            30,
        );

        // default_days is 30, so a crash 10 days old must survive even
        // though the app itself has no retention window configured.
        let removed = sweeper.cleanup_app(&app).await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn run_now_isolates_per_app_failures() {
        let mut store = IndexedStore::open_in_memory().unwrap();
        store.create_app("app1", "A", "h", 30).unwrap();
        store.create_app("app2", "B", "h", 30).unwrap();

        let blobs = BlobStore::new(tempfile::tempdir().unwrap().keep()).unwrap();
        let sweeper = RetentionSweeper::new(
            Arc::new(Mutex::new(store)),
            Arc::new(blobs),
            Duration::from_secs(3600),
            30,
        );

        let removed = sweeper.run_now().await.unwrap();
        assert_eq!(removed, 0);
    }
}

//! Crash submission pipeline: validate, fingerprint, group, persist, alert.

use uuid::Uuid;

use crate::alert::{Alerter, Event};
use crate::blob::BlobStore;
use crate::error::IngestError;
use crate::fingerprint;
use crate::models::{Application, Crash, CrashSubmission, DEFAULT_ENVIRONMENT};
use crate::store::IndexedStore;

/// Outcome of a successful submission.
#[derive(Debug, Clone)]
pub struct IngestResult {
    pub crash_id: String,
    pub group_id: String,
    pub fingerprint: String,
    pub is_new_group: bool,
}

/// Orchestrates one crash submission end to end. Holds borrowed references
/// to its collaborators rather than owning them, so callers can share a
/// single store/blob-store/alerter across many ingestors.
pub struct Ingestor<'a> {
    store: &'a mut IndexedStore,
    blobs: &'a BlobStore,
    alerter: &'a Alerter,
}

impl<'a> Ingestor<'a> {
    pub fn new(store: &'a mut IndexedStore, blobs: &'a BlobStore, alerter: &'a Alerter) -> Self {
        Self { store, blobs, alerter }
    }

    /// Validates, groups, persists, and notifies for one submission.
    pub fn submit(&mut self, app: &Application, submission: CrashSubmission) -> Result<IngestResult, IngestError> {
        validate(&submission)?;

        let crash = materialize(app, submission);
        let fingerprint = fingerprint::fingerprint(&crash);
        let mut crash = crash;
        crash.fingerprint = fingerprint.clone();

        let (group, is_new_group) = self.store.get_or_create_group(&crash)?;
        crash.group_id = group.id.clone();

        crash.blob_path = match self.blobs.write(&crash) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, crash_id = %crash.id, "failed to write blob, continuing without it");
                String::new()
            }
        };

        self.store.insert_crash(&crash)?;

        self.alerter
            .notify(Event::for_submission(&app.id, &crash, &group, is_new_group));

        Ok(IngestResult {
            crash_id: crash.id,
            group_id: group.id,
            fingerprint: crash.fingerprint,
            is_new_group,
        })
    }
}

fn validate(submission: &CrashSubmission) -> Result<(), IngestError> {
    if submission.app_version.trim().is_empty() {
        return Err(IngestError::Validation("app_version is required".into()));
    }
    if submission.platform.trim().is_empty() {
        return Err(IngestError::Validation("platform is required".into()));
    }
    if submission.error_type.trim().is_empty() {
        return Err(IngestError::Validation("error_type is required".into()));
    }
    if submission.error_message.trim().is_empty() {
        return Err(IngestError::Validation("error_message is required".into()));
    }
    if submission.stack_trace.is_empty() {
        return Err(IngestError::Validation("stack_trace is required".into()));
    }
    Ok(())
}

fn materialize(app: &Application, submission: CrashSubmission) -> Crash {
    Crash {
        id: Uuid::new_v4().to_string(),
        app_id: app.id.clone(),
        fingerprint: String::new(),
        group_id: String::new(),
        app_version: submission.app_version,
        platform: submission.platform,
        os_version: submission.os_version,
        device_model: submission.device_model,
        error_type: submission.error_type,
        error_message: submission.error_message,
        stack_trace: submission.stack_trace,
        user_id: submission.user_id,
        environment: submission
            .environment
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
        metadata: submission.metadata,
        breadcrumbs: submission.breadcrumbs,
        blob_path: String::new(),
        created_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlerterConfig;
    use crate::models::StackFrame;

    fn sample_app() -> Application {
        Application {
            id: "app1".into(),
            name: "Test App".into(),
            api_key_hash: "hash".into(),
            created_at: chrono::Utc::now(),
            retention_days: 30,
        }
    }

    fn sample_submission() -> CrashSubmission {
        CrashSubmission {
            app_version: "1.0.0".into(),
            platform: "android".into(),
            os_version: None,
            device_model: None,
            error_type: "NullPointerException".into(),
            error_message: "boom".into(),
            stack_trace: vec![StackFrame {
                file_name: "Main.java".into(),
                line_number: 42,
                column_number: None,
                method_name: "onCreate".into(),
                class_name: Some("MainActivity".into()),
                native: false,
            }],
            user_id: None,
            environment: None,
            metadata: Default::default(),
            breadcrumbs: vec![],
        }
    }

    #[test]
    fn rejects_missing_required_fields() {
        let mut submission = sample_submission();
        submission.error_message = String::new();
        assert!(validate(&submission).is_err());
    }

    #[test]
    fn missing_environment_defaults_to_production() {
        let app = sample_app();
        let crash = materialize(&app, sample_submission());
        assert_eq!(crash.environment, DEFAULT_ENVIRONMENT);
    }

    #[tokio::test]
    async fn submit_creates_group_on_first_crash_and_reuses_on_second() {
        let mut store = IndexedStore::open_in_memory().unwrap();
        let app = sample_app();
        store
            .create_app(&app.id, &app.name, &app.api_key_hash, app.retention_days)
            .unwrap();
        let blobs = BlobStore::new(tempfile::tempdir().unwrap().keep()).unwrap();
        let alerter = Alerter::new(AlerterConfig::default());

        let result1 = {
            let mut ingestor = Ingestor::new(&mut store, &blobs, &alerter);
            ingestor.submit(&app, sample_submission()).unwrap()
        };
        assert!(result1.is_new_group);

        let result2 = {
            let mut ingestor = Ingestor::new(&mut store, &blobs, &alerter);
            ingestor.submit(&app, sample_submission()).unwrap()
        };
        assert!(!result2.is_new_group);
        assert_eq!(result1.group_id, result2.group_id);
        assert_eq!(result1.fingerprint, result2.fingerprint);

        let group = store.get_group(&result2.group_id).unwrap().unwrap();
        assert_eq!(group.occurrence_count, 2);
    }
}

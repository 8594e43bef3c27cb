//! Crash report ingestion and aggregation.
//!
//! Accepts crash submissions from registered applications, groups them by a
//! stable fingerprint derived from their error kind and stack trace, and
//! fans out alerts on new groups or repeat occurrences.

pub mod alert;
pub mod blob;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod models;
pub mod retention;
pub mod store;
pub mod web;

pub use alert::{Alerter, AlerterConfig, Event, EventKind};
pub use blob::BlobStore;
pub use config::Config;
pub use error::{AlertError, BlobError, IngestError, ServiceError, StoreError, SweepError};
pub use fingerprint::fingerprint;
pub use ingest::{IngestResult, Ingestor};
pub use models::{
    AlertChannelKind, AlertRule, Application, Breadcrumb, BreadcrumbLevel, Crash, CrashGroup,
    CrashSubmission, GroupStatus, StackFrame,
};
pub use retention::RetentionSweeper;
pub use store::IndexedStore;
pub use web::{create_router, AppState};

//! Core data model shared across the ingestion, storage, and alerting layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A registered application that submits crash reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub name: String,
    /// Hex-encoded SHA-256 of the ingestion credential. Never serialized to clients.
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    pub created_at: DateTime<Utc>,
    pub retention_days: i64,
}

/// A single stack frame as submitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackFrame {
    pub file_name: String,
    #[serde(default)]
    pub line_number: u32,
    #[serde(default)]
    pub column_number: Option<u32>,
    pub method_name: String,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub native: bool,
}

/// Severity of a breadcrumb event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreadcrumbLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// A client-recorded event leading up to the crash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub category: String,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    pub level: BreadcrumbLevel,
}

/// The raw submission envelope as posted by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashSubmission {
    pub app_version: String,
    pub platform: String,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default)]
    pub device_model: Option<String>,
    pub error_type: String,
    pub error_message: String,
    #[serde(default)]
    pub stack_trace: Vec<StackFrame>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub breadcrumbs: Vec<Breadcrumb>,
}

/// The default environment tag when a submission omits one.
pub const DEFAULT_ENVIRONMENT: &str = "production";

/// A persisted crash, combining the submission with server-assigned identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crash {
    pub id: String,
    pub app_id: String,
    pub fingerprint: String,
    pub group_id: String,
    pub app_version: String,
    pub platform: String,
    pub os_version: Option<String>,
    pub device_model: Option<String>,
    pub error_type: String,
    pub error_message: String,
    pub stack_trace: Vec<StackFrame>,
    pub user_id: Option<String>,
    pub environment: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub breadcrumbs: Vec<Breadcrumb>,
    /// Relative path under the blob store root, empty if the write failed.
    pub blob_path: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of a crash group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Open,
    Resolved,
    Ignored,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupStatus::Open => "open",
            GroupStatus::Resolved => "resolved",
            GroupStatus::Ignored => "ignored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(GroupStatus::Open),
            "resolved" => Some(GroupStatus::Resolved),
            "ignored" => Some(GroupStatus::Ignored),
            _ => None,
        }
    }
}

/// A group aggregating all crashes that share a fingerprint within one app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashGroup {
    pub id: String,
    pub app_id: String,
    pub fingerprint: String,
    pub error_type: String,
    pub error_message: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub occurrence_count: i64,
    pub status: GroupStatus,
    pub assigned_to: Option<String>,
    pub notes: Option<String>,
}

/// The channel an alert rule dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertChannelKind {
    Webhook,
    Email,
    Chat,
}

impl AlertChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertChannelKind::Webhook => "webhook",
            AlertChannelKind::Email => "email",
            AlertChannelKind::Chat => "chat",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "webhook" => Some(AlertChannelKind::Webhook),
            "email" => Some(AlertChannelKind::Email),
            "chat" => Some(AlertChannelKind::Chat),
            _ => None,
        }
    }
}

/// A configured alert rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    /// Empty string matches all apps.
    pub app_id: String,
    pub channel: AlertChannelKind,
    pub config: HashMap<String, serde_json::Value>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl AlertRule {
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }

    pub fn on_new_group(&self) -> bool {
        self.config
            .get("on_new_group")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn on_every_crash(&self) -> bool {
        self.config
            .get("on_every_crash")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn error_types(&self) -> Option<Vec<String>> {
        self.config.get("error_types").and_then(|v| {
            v.as_array().map(|arr| {
                arr.iter()
                    .filter_map(|x| x.as_str().map(String::from))
                    .collect()
            })
        })
    }
}

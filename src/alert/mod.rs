//! Asynchronous alerting: a bounded queue, a single worker, and per-rule
//! fan-out to webhook / email / chat sinks.

mod sink;

pub use sink::{ChatConfig, SmtpConfig};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::models::{AlertRule, Crash, CrashGroup};

/// The default bound on the Alerter's event queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Webhook sink request timeout.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// What kind of thing happened, driving rule matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NewCrash,
    NewGroup,
    /// No producer exists in this implementation;
    /// kept so a future threshold-detector can drive it.
    Threshold,
}

/// An event handed from the Ingestor to the Alerter.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub app_id: String,
    pub crash: Crash,
    pub group: CrashGroup,
    pub is_new_group: bool,
}

impl Event {
    pub fn for_submission(app_id: &str, crash: &Crash, group: &CrashGroup, is_new_group: bool) -> Self {
        Self {
            kind: if is_new_group {
                EventKind::NewGroup
            } else {
                EventKind::NewCrash
            },
            app_id: app_id.to_string(),
            crash: crash.clone(),
            group: group.clone(),
            is_new_group,
        }
    }
}

/// Whether `rule` should fire for `event`.
fn rule_matches(rule: &AlertRule, event: &Event) -> bool {
    if !rule.enabled {
        return false;
    }
    if !rule.app_id.is_empty() && rule.app_id != event.app_id {
        return false;
    }

    let kind_matches = match event.kind {
        EventKind::NewGroup => rule.on_new_group(),
        EventKind::NewCrash => rule.on_every_crash(),
        EventKind::Threshold => true,
    };
    if !kind_matches {
        return false;
    }

    if let Some(types) = rule.error_types() {
        if !types.is_empty() && !types.contains(&event.crash.error_type) {
            return false;
        }
    }

    true
}

/// The JSON shape posted to webhook and chat sinks.
#[derive(Debug, serde::Serialize)]
pub struct EventEnvelope<'a> {
    pub event_type: &'a str,
    pub app_id: &'a str,
    pub timestamp: DateTime<Utc>,
    pub is_new_group: bool,
    pub crash: CrashSummary<'a>,
    pub group: GroupSummary<'a>,
}

#[derive(Debug, serde::Serialize)]
pub struct CrashSummary<'a> {
    pub id: &'a str,
    pub error_type: &'a str,
    pub error_message: &'a str,
    pub platform: &'a str,
    pub app_version: &'a str,
    pub environment: &'a str,
}

#[derive(Debug, serde::Serialize)]
pub struct GroupSummary<'a> {
    pub id: &'a str,
    pub fingerprint: &'a str,
    pub occurrence_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Event {
    pub fn envelope(&self) -> EventEnvelope<'_> {
        EventEnvelope {
            event_type: match self.kind {
                EventKind::NewGroup => "new_group",
                EventKind::NewCrash => "new_crash",
                EventKind::Threshold => "threshold",
            },
            app_id: &self.app_id,
            timestamp: Utc::now(),
            is_new_group: self.is_new_group,
            crash: CrashSummary {
                id: &self.crash.id,
                error_type: &self.crash.error_type,
                error_message: &self.crash.error_message,
                platform: &self.crash.platform,
                app_version: &self.crash.app_version,
                environment: &self.crash.environment,
            },
            group: GroupSummary {
                id: &self.group.id,
                fingerprint: &self.group.fingerprint,
                occurrence_count: self.group.occurrence_count,
                first_seen: self.group.first_seen,
                last_seen: self.group.last_seen,
            },
        }
    }
}

/// Process-wide configuration the Alerter's sinks draw on: constructor parameters, never singletons.
#[derive(Debug, Clone, Default)]
pub struct AlerterConfig {
    pub queue_capacity: usize,
    pub smtp: Option<SmtpConfig>,
    pub chat: Option<ChatConfig>,
}

/// Long-running alert dispatcher: a bounded queue, a single worker task,
/// and a shared, lock-protected rule list.
pub struct Alerter {
    tx: mpsc::Sender<Event>,
    rules: Arc<RwLock<Vec<AlertRule>>>,
    worker: Option<JoinHandle<()>>,
}

impl Alerter {
    /// Spawns the worker task and returns a handle to it.
    pub fn new(config: AlerterConfig) -> Self {
        let capacity = if config.queue_capacity == 0 {
            DEFAULT_QUEUE_CAPACITY
        } else {
            config.queue_capacity
        };
        let (tx, rx) = mpsc::channel(capacity);
        let rules = Arc::new(RwLock::new(Vec::new()));

        let worker_rules = rules.clone();
        let http = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        let smtp = config.smtp.clone();
        let chat = config.chat.clone();

        let worker = tokio::spawn(Self::run_worker(rx, worker_rules, http, smtp, chat));

        Self {
            tx,
            rules,
            worker: Some(worker),
        }
    }

    /// Replaces the active rule set wholesale.
    pub async fn set_rules(&self, rules: Vec<AlertRule>) {
        *self.rules.write().await = rules;
    }

    /// Appends one rule to the active set.
    pub async fn add_rule(&self, rule: AlertRule) {
        self.rules.write().await.push(rule);
    }

    /// Attempts to enqueue `event`. Never blocks: on a full queue the
    /// event is dropped and a warning logged.
    pub fn notify(&self, event: Event) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("alert queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("alert worker closed, dropping event");
            }
        }
    }

    /// Stops the worker and waits for in-flight dispatch to wind down.
    pub async fn close(&mut self) {
        // Dropping the sender lets the worker's recv() loop end once the
        // queue drains; the worker is not aborted mid-dispatch.
        if let Some(handle) = self.worker.take() {
            drop(std::mem::replace(&mut self.tx, mpsc::channel(1).0));
            let _ = handle.await;
        }
    }

    async fn run_worker(
        mut rx: mpsc::Receiver<Event>,
        rules: Arc<RwLock<Vec<AlertRule>>>,
        http: reqwest::Client,
        smtp: Option<SmtpConfig>,
        chat: Option<ChatConfig>,
    ) {
        while let Some(event) = rx.recv().await {
            let snapshot = rules.read().await.clone();
            let matching: Vec<AlertRule> = snapshot.into_iter().filter(|r| rule_matches(r, &event)).collect();

            let mut tasks = Vec::with_capacity(matching.len());
            for rule in matching {
                let http = http.clone();
                let smtp = smtp.clone();
                let chat = chat.clone();
                let event = event.clone();
                tasks.push(tokio::spawn(async move {
                    if let Err(e) = sink::dispatch(&rule, &event, &http, smtp.as_ref(), chat.as_ref()).await {
                        tracing::warn!(rule_id = %rule.id, error = %e, "alert dispatch failed");
                    }
                }));
            }
            for task in tasks {
                let _ = task.await;
            }
        }
    }
}

use chrono::Utc;
use rusqlite::params;

use super::apps::parse_rfc3339;
use super::IndexedStore;
use crate::error::StoreError;
use crate::models::{AlertChannelKind, AlertRule};

impl IndexedStore {
    pub fn create_alert_rule(&self, rule: &AlertRule) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO alerts (id, app_id, channel, config, enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                rule.id,
                rule.app_id,
                rule.channel.as_str(),
                serde_json::to_string(&rule.config)?,
                rule.enabled,
                rule.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_alert_rule(&self, id: &str) -> Result<Option<AlertRule>, StoreError> {
        let mut stmt = self.conn.prepare(SELECT_ALERT_COLUMNS)?;
        let mut rows = stmt.query_map([id], row_to_rule)?;
        match rows.next() {
            Some(r) => Ok(Some(r?.map_err(StoreError::from)?)),
            None => Ok(None),
        }
    }

    /// Lists alert rules scoped to one app, plus every wildcard rule.
    pub fn list_alert_rules(&self, app_id: &str) -> Result<Vec<AlertRule>, StoreError> {
        let sql = format!("{} WHERE app_id = ?1 OR app_id = ''", SELECT_ALERT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([app_id], row_to_rule)?;
        rows.collect::<Result<Vec<_>, rusqlite::Error>>()?
            .into_iter()
            .collect::<Result<Vec<_>, serde_json::Error>>()
            .map_err(StoreError::from)
    }

    /// Lists every rule, used by the Alerter at startup to prime its
    /// in-memory rule set.
    pub fn list_all_alert_rules(&self) -> Result<Vec<AlertRule>, StoreError> {
        let mut stmt = self.conn.prepare(SELECT_ALERT_COLUMNS)?;
        let rows = stmt.query_map([], row_to_rule)?;
        rows.collect::<Result<Vec<_>, rusqlite::Error>>()?
            .into_iter()
            .collect::<Result<Vec<_>, serde_json::Error>>()
            .map_err(StoreError::from)
    }

    pub fn update_alert_rule_enabled(&self, id: &str, enabled: bool) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE alerts SET enabled = ?1 WHERE id = ?2",
            params![enabled, id],
        )?;
        Ok(())
    }

    pub fn delete_alert_rule(&self, id: &str) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM alerts WHERE id = ?1", [id])?;
        Ok(())
    }
}

const SELECT_ALERT_COLUMNS: &str =
    "SELECT id, app_id, channel, config, enabled, created_at FROM alerts";

fn row_to_rule(row: &rusqlite::Row) -> rusqlite::Result<Result<AlertRule, serde_json::Error>> {
    let channel: String = row.get(2)?;
    let config_raw: String = row.get(3)?;
    let created_at: String = row.get(5)?;
    let enabled: bool = row.get(4)?;
    let id: String = row.get(0)?;
    let app_id: String = row.get(1)?;

    let parse = move || -> Result<AlertRule, serde_json::Error> {
        Ok(AlertRule {
            id,
            app_id,
            channel: AlertChannelKind::parse(&channel).unwrap_or(AlertChannelKind::Webhook),
            config: serde_json::from_str(&config_raw)?,
            enabled,
            created_at: parse_rfc3339(&created_at),
        })
    };
    Ok(parse())
}

/// Builds a fresh, unsaved rule with a generated id and current timestamp.
pub fn new_rule(
    app_id: impl Into<String>,
    channel: AlertChannelKind,
    config: serde_json::Map<String, serde_json::Value>,
) -> AlertRule {
    AlertRule {
        id: uuid::Uuid::new_v4().to_string(),
        app_id: app_id.into(),
        channel,
        config: config.into_iter().collect(),
        enabled: true,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_list_update_delete() {
        let store = IndexedStore::open_in_memory().unwrap();
        let mut config = serde_json::Map::new();
        config.insert("url".into(), json!("https://example.com/hook"));
        config.insert("on_new_group".into(), json!(true));
        let rule = new_rule("app1", AlertChannelKind::Webhook, config);
        store.create_alert_rule(&rule).unwrap();

        let fetched = store.get_alert_rule(&rule.id).unwrap().unwrap();
        assert_eq!(fetched.app_id, "app1");
        assert!(fetched.on_new_group());

        let for_app = store.list_alert_rules("app1").unwrap();
        assert_eq!(for_app.len(), 1);

        store.update_alert_rule_enabled(&rule.id, false).unwrap();
        let disabled = store.get_alert_rule(&rule.id).unwrap().unwrap();
        assert!(!disabled.enabled);

        store.delete_alert_rule(&rule.id).unwrap();
        assert!(store.get_alert_rule(&rule.id).unwrap().is_none());
    }

    #[test]
    fn wildcard_rule_matches_every_app() {
        let store = IndexedStore::open_in_memory().unwrap();
        let rule = new_rule("", AlertChannelKind::Chat, serde_json::Map::new());
        store.create_alert_rule(&rule).unwrap();

        let for_any_app = store.list_alert_rules("some-other-app").unwrap();
        assert_eq!(for_any_app.len(), 1);
    }
}

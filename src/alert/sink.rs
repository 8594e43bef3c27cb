//! Per-channel dispatch: webhook, email, chat.

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::Event;
use crate::error::AlertError;
use crate::models::{AlertChannelKind, AlertRule};

/// SMTP settings shared by every `email` rule.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// A default chat webhook URL rules may omit their own `url` in favor of.
#[derive(Debug, Clone, Default)]
pub struct ChatConfig {
    pub default_webhook_url: Option<String>,
}

pub async fn dispatch(
    rule: &AlertRule,
    event: &Event,
    http: &reqwest::Client,
    smtp: Option<&SmtpConfig>,
    chat: Option<&ChatConfig>,
) -> Result<(), AlertError> {
    match rule.channel {
        AlertChannelKind::Webhook => dispatch_webhook(rule, event, http).await,
        AlertChannelKind::Email => dispatch_email(rule, event, smtp).await,
        AlertChannelKind::Chat => dispatch_chat(rule, event, http, chat).await,
    }
}

async fn dispatch_webhook(rule: &AlertRule, event: &Event, http: &reqwest::Client) -> Result<(), AlertError> {
    let url = rule
        .config_str("url")
        .ok_or_else(|| AlertError::MissingConfig("url".to_string()))?;

    let mut request = http.post(url).json(&event.envelope());
    if let Some(serde_json::Value::Object(headers)) = rule.config.get("headers") {
        for (key, value) in headers {
            if let Some(value) = value.as_str() {
                request = request.header(key.as_str(), value);
            }
        }
    }

    let response = request
        .send()
        .await
        .map_err(|e| if e.is_timeout() { AlertError::Timeout } else { AlertError::Webhook(e) })?;

    if !response.status().is_success() {
        tracing::warn!(status = %response.status(), rule_id = %rule.id, "webhook sink returned non-2xx");
    }
    Ok(())
}

async fn dispatch_email(rule: &AlertRule, event: &Event, smtp: Option<&SmtpConfig>) -> Result<(), AlertError> {
    let smtp = smtp.ok_or(AlertError::MissingConfig("smtp".to_string()))?;
    let to = rule
        .config_str("to")
        .ok_or_else(|| AlertError::MissingConfig("to".to_string()))?;

    let subject = format!(
        "[{}] {} in {}",
        event.app_id, event.crash.error_type, event.group.fingerprint
    );
    let body = format!(
        "{}\n\noccurrences: {}\nfirst seen: {}\nlast seen: {}\nenvironment: {}\n",
        event.crash.error_message,
        event.group.occurrence_count,
        event.group.first_seen.to_rfc3339(),
        event.group.last_seen.to_rfc3339(),
        event.crash.environment,
    );

    let message = Message::builder()
        .from(smtp.from.parse().map_err(|_| AlertError::MissingConfig("from".to_string()))?)
        .to(to.parse().map_err(|_| AlertError::MissingConfig("to".to_string()))?)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body)
        .map_err(|_| AlertError::MissingConfig("body".to_string()))?;

    let creds = Credentials::new(smtp.username.clone(), smtp.password.clone());
    let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
        .map_err(|e| AlertError::Smtp(e.to_string()))?
        .port(smtp.port)
        .credentials(creds)
        .build();

    transport
        .send(message)
        .await
        .map_err(|e| AlertError::Smtp(e.to_string()))?;
    Ok(())
}

async fn dispatch_chat(
    rule: &AlertRule,
    event: &Event,
    http: &reqwest::Client,
    chat: Option<&ChatConfig>,
) -> Result<(), AlertError> {
    let url = rule
        .config_str("webhook_url")
        .map(str::to_string)
        .or_else(|| chat.and_then(|c| c.default_webhook_url.clone()))
        .ok_or_else(|| AlertError::MissingConfig("webhook_url".to_string()))?;

    let color = if event.is_new_group { "#fd7e14" } else { "#dc3545" };
    let payload = serde_json::json!({
        "text": format!("{}: {}", event.crash.error_type, event.crash.error_message),
        "attachments": [{
            "color": color,
            "title": format!("{}: {}", event.crash.error_type, event.crash.error_message),
            "fields": [
                { "title": "kind", "value": event.crash.error_type, "short": true },
                { "title": "platform", "value": event.crash.platform, "short": true },
                { "title": "version", "value": event.crash.app_version, "short": true },
                { "title": "environment", "value": event.crash.environment, "short": true },
                { "title": "occurrences", "value": event.group.occurrence_count.to_string(), "short": true },
            ],
            "footer": "crashhub",
        }]
    });

    let response = http
        .post(&url)
        .json(&payload)
        .send()
        .await
        .map_err(|e| if e.is_timeout() { AlertError::Timeout } else { AlertError::Webhook(e) })?;

    if !response.status().is_success() {
        tracing::warn!(status = %response.status(), rule_id = %rule.id, "chat sink returned non-2xx");
    }
    Ok(())
}

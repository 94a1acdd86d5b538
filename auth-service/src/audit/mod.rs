//! Security audit-event logging
//!
//! Every security-relevant decision produces an append-only event. Severity
//! is a pure function of the event type; HIGH and CRITICAL events
//! additionally fan out to the alert channel. Logging never fails the
//! request path: sink and alert errors are swallowed and reported through
//! `tracing` only.

pub mod sink;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub use sink::{
    AlertPublisher, AuditSink, MemoryAlertPublisher, MemoryAuditSink, RedisAlertPublisher,
    RedisAuditSink,
};

/// Four-level event classification, ordered by urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Security event classes. Unknown types deserialize into `Other` and map
/// to MEDIUM severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    AuthenticationSuccess,
    AuthenticationFailed,
    AuthorizationFailed,
    DataAccess,
    DataModification,
    RateLimitCheck,
    RateLimitExceeded,
    PasswordChange,
    TokenRevoked,
    SuspiciousActivity,
    AccountLocked,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::AuthenticationSuccess => "AUTHENTICATION_SUCCESS",
            EventType::AuthenticationFailed => "AUTHENTICATION_FAILED",
            EventType::AuthorizationFailed => "AUTHORIZATION_FAILED",
            EventType::DataAccess => "DATA_ACCESS",
            EventType::DataModification => "DATA_MODIFICATION",
            EventType::RateLimitCheck => "RATE_LIMIT_CHECK",
            EventType::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            EventType::PasswordChange => "PASSWORD_CHANGE",
            EventType::TokenRevoked => "TOKEN_REVOKED",
            EventType::SuspiciousActivity => "SUSPICIOUS_ACTIVITY",
            EventType::AccountLocked => "ACCOUNT_LOCKED",
            EventType::Other(name) => name.as_str(),
        }
    }

    /// Fixed severity lookup table.
    pub fn severity(&self) -> Severity {
        match self {
            EventType::AuthenticationSuccess
            | EventType::DataAccess
            | EventType::RateLimitCheck => Severity::Low,
            EventType::AuthenticationFailed | EventType::DataModification => Severity::Medium,
            EventType::AuthorizationFailed
            | EventType::RateLimitExceeded
            | EventType::PasswordChange
            | EventType::TokenRevoked => Severity::High,
            EventType::SuspiciousActivity | EventType::AccountLocked => Severity::Critical,
            EventType::Other(_) => Severity::Medium,
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "AUTHENTICATION_SUCCESS" => EventType::AuthenticationSuccess,
            "AUTHENTICATION_FAILED" => EventType::AuthenticationFailed,
            "AUTHORIZATION_FAILED" => EventType::AuthorizationFailed,
            "DATA_ACCESS" => EventType::DataAccess,
            "DATA_MODIFICATION" => EventType::DataModification,
            "RATE_LIMIT_CHECK" => EventType::RateLimitCheck,
            "RATE_LIMIT_EXCEEDED" => EventType::RateLimitExceeded,
            "PASSWORD_CHANGE" => EventType::PasswordChange,
            "TOKEN_REVOKED" => EventType::TokenRevoked,
            "SUSPICIOUS_ACTIVITY" => EventType::SuspiciousActivity,
            "ACCOUNT_LOCKED" => EventType::AccountLocked,
            other => EventType::Other(other.to_string()),
        }
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.as_str().to_string()
    }
}

/// Append-only audit record. Never mutated after logging; retention is the
/// sink's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl SecurityEvent {
    pub fn new(event_type: EventType) -> Self {
        let severity = event_type.severity();
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            severity,
            user_id: None,
            source_ip: None,
            user_agent: None,
            path: None,
            method: None,
            reason: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn source_ip(mut self, ip: impl Into<String>) -> Self {
        self.source_ip = Some(ip.into());
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Data-access audit input: which resource, which action.
#[derive(Debug, Clone)]
pub struct DataAccessEvent {
    pub user_id: String,
    pub resource: String,
    pub action: String,
    pub source_ip: Option<String>,
}

/// Suspicious-activity report. `risk_score` is 0-10; 8 and above triggers
/// the immediate alert path on top of the normal critical alert.
#[derive(Debug, Clone)]
pub struct SuspiciousActivity {
    pub user_id: Option<String>,
    pub source_ip: Option<String>,
    pub description: String,
    pub risk_score: u8,
}

pub const HIGH_RISK_THRESHOLD: u8 = 8;

/// Outbound alert for the notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub event_id: String,
    pub event_type: EventType,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Side-effecting audit logger. Infallible by contract: a broken sink or
/// alert channel never changes an authentication or authorization outcome.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    alerts: Arc<dyn AlertPublisher>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>, alerts: Arc<dyn AlertPublisher>) -> Self {
        Self { sink, alerts }
    }

    /// Persist the event; alert when HIGH or CRITICAL.
    pub async fn log_security_event(&self, event: SecurityEvent) {
        if let Err(e) = self.sink.append(&event).await {
            tracing::error!(
                event_type = event.event_type.as_str(),
                error = %e,
                "audit sink rejected event"
            );
        }

        if event.severity >= Severity::High {
            self.publish_alert(&event, format!(
                "{} event for user {}",
                event.event_type.as_str(),
                event.user_id.as_deref().unwrap_or("<anonymous>"),
            ))
            .await;
        }
    }

    /// Data-access trail: DELETE actions are HIGH, everything else MEDIUM.
    pub async fn log_data_access(&self, access: DataAccessEvent) {
        let severity = if access.action.eq_ignore_ascii_case("DELETE") {
            Severity::High
        } else {
            Severity::Medium
        };

        let mut event = SecurityEvent::new(EventType::DataAccess)
            .user_id(access.user_id)
            .reason(format!("{} {}", access.action, access.resource));
        event.severity = severity;
        if let Some(ip) = access.source_ip {
            event = event.source_ip(ip);
        }

        if let Err(e) = self.sink.append(&event).await {
            tracing::error!(error = %e, "audit sink rejected data-access event");
        }
        if severity >= Severity::High {
            self.publish_alert(&event, format!("high-severity data access: {}", event.reason.as_deref().unwrap_or("")))
                .await;
        }
    }

    /// Suspicious-activity wrapper: normal CRITICAL logging plus an
    /// immediate alert when the risk score crosses the threshold.
    pub async fn log_suspicious_activity(&self, details: SuspiciousActivity) {
        let mut event = SecurityEvent::new(EventType::SuspiciousActivity)
            .reason(details.description.clone())
            .metadata(serde_json::json!({ "riskScore": details.risk_score }));
        if let Some(user_id) = details.user_id {
            event = event.user_id(user_id);
        }
        if let Some(ip) = details.source_ip {
            event = event.source_ip(ip);
        }

        let high_risk = details.risk_score >= HIGH_RISK_THRESHOLD;
        let event_for_alert = event.clone();

        self.log_security_event(event).await;

        if high_risk {
            self.publish_alert(
                &event_for_alert,
                format!(
                    "HIGH RISK ({}/10): {}",
                    details.risk_score, details.description
                ),
            )
            .await;
        }
    }

    /// Advisory: the sink's own retention (TTL) expires old records.
    pub async fn cleanup_old_logs(&self) {
        if let Err(e) = self.sink.cleanup().await {
            tracing::error!(error = %e, "audit log cleanup failed");
        }
    }

    async fn publish_alert(&self, event: &SecurityEvent, message: String) {
        let alert = Alert {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            severity: event.severity,
            message,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.alerts.publish(&alert).await {
            tracing::error!(error = %e, "alert publish failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct RejectingSink;

    #[async_trait]
    impl AuditSink for RejectingSink {
        async fn append(&self, _event: &SecurityEvent) -> anyhow::Result<()> {
            anyhow::bail!("sink unavailable")
        }

        async fn cleanup(&self) -> anyhow::Result<()> {
            anyhow::bail!("sink unavailable")
        }
    }

    fn logger_with_memory() -> (AuditLogger, Arc<MemoryAuditSink>, Arc<MemoryAlertPublisher>) {
        let sink = Arc::new(MemoryAuditSink::new());
        let alerts = Arc::new(MemoryAlertPublisher::new());
        (
            AuditLogger::new(sink.clone(), alerts.clone()),
            sink,
            alerts,
        )
    }

    #[test]
    fn severity_table_is_exact() {
        use EventType::*;
        assert_eq!(AuthenticationSuccess.severity(), Severity::Low);
        assert_eq!(DataAccess.severity(), Severity::Low);
        assert_eq!(RateLimitCheck.severity(), Severity::Low);
        assert_eq!(AuthenticationFailed.severity(), Severity::Medium);
        assert_eq!(DataModification.severity(), Severity::Medium);
        assert_eq!(AuthorizationFailed.severity(), Severity::High);
        assert_eq!(RateLimitExceeded.severity(), Severity::High);
        assert_eq!(PasswordChange.severity(), Severity::High);
        assert_eq!(TokenRevoked.severity(), Severity::High);
        assert_eq!(SuspiciousActivity.severity(), Severity::Critical);
        assert_eq!(AccountLocked.severity(), Severity::Critical);
        assert_eq!(
            Other("SOMETHING_NEW".to_string()).severity(),
            Severity::Medium
        );
    }

    #[test]
    fn event_type_string_round_trip() {
        let parsed = EventType::from("TOKEN_REVOKED".to_string());
        assert_eq!(parsed, EventType::TokenRevoked);

        let unknown = EventType::from("FUTURE_EVENT".to_string());
        assert_eq!(unknown, EventType::Other("FUTURE_EVENT".to_string()));
        assert_eq!(unknown.as_str(), "FUTURE_EVENT");
    }

    #[tokio::test]
    async fn low_severity_events_do_not_alert() {
        let (logger, sink, alerts) = logger_with_memory();
        logger
            .log_security_event(SecurityEvent::new(EventType::AuthenticationSuccess))
            .await;

        assert_eq!(sink.events().await.len(), 1);
        assert!(alerts.alerts().await.is_empty());
    }

    #[tokio::test]
    async fn high_severity_events_alert() {
        let (logger, sink, alerts) = logger_with_memory();
        logger
            .log_security_event(SecurityEvent::new(EventType::TokenRevoked).user_id("u1"))
            .await;

        assert_eq!(sink.events().await.len(), 1);
        let alerts = alerts.alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn logging_never_fails_even_with_broken_sink() {
        let logger = AuditLogger::new(
            Arc::new(RejectingSink),
            Arc::new(MemoryAlertPublisher::new()),
        );

        // Must not panic or propagate anything.
        logger
            .log_security_event(SecurityEvent::new(EventType::AuthenticationFailed))
            .await;
        logger
            .log_data_access(DataAccessEvent {
                user_id: "u1".to_string(),
                resource: "posts/42".to_string(),
                action: "DELETE".to_string(),
                source_ip: None,
            })
            .await;
        logger.cleanup_old_logs().await;
    }

    #[tokio::test]
    async fn data_access_delete_is_high_otherwise_medium() {
        let (logger, sink, _) = logger_with_memory();
        logger
            .log_data_access(DataAccessEvent {
                user_id: "u1".to_string(),
                resource: "posts/1".to_string(),
                action: "DELETE".to_string(),
                source_ip: None,
            })
            .await;
        logger
            .log_data_access(DataAccessEvent {
                user_id: "u1".to_string(),
                resource: "posts/1".to_string(),
                action: "READ".to_string(),
                source_ip: None,
            })
            .await;

        let events = sink.events().await;
        assert_eq!(events[0].severity, Severity::High);
        assert_eq!(events[1].severity, Severity::Medium);
    }

    #[tokio::test]
    async fn high_risk_suspicious_activity_fires_both_alert_paths() {
        let (logger, sink, alerts) = logger_with_memory();
        logger
            .log_suspicious_activity(SuspiciousActivity {
                user_id: Some("u1".to_string()),
                source_ip: Some("203.0.113.9".to_string()),
                description: "credential stuffing pattern".to_string(),
                risk_score: 9,
            })
            .await;

        // One CRITICAL persist...
        let events = sink.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, Severity::Critical);

        // ...and two alerts: the standard critical one plus the immediate
        // high-risk one.
        let alerts = alerts.alerts().await;
        assert_eq!(alerts.len(), 2);
        assert!(alerts[1].message.contains("HIGH RISK"));
    }

    #[tokio::test]
    async fn moderate_risk_suspicious_activity_alerts_once() {
        let (logger, _, alerts) = logger_with_memory();
        logger
            .log_suspicious_activity(SuspiciousActivity {
                user_id: None,
                source_ip: None,
                description: "odd access pattern".to_string(),
                risk_score: 5,
            })
            .await;

        // Critical severity still alerts, but no high-risk duplicate.
        assert_eq!(alerts.alerts().await.len(), 1);
    }
}

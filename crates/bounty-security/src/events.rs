use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecuritySeverity {
    Info,
    Warning,
    Critical,
}

/// A gate decision worth keeping for operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub severity: SecuritySeverity,
    pub subject: String,
    pub details: String,
}

impl SecurityEvent {
    pub fn new(
        event_type: impl Into<String>,
        severity: SecuritySeverity,
        subject: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type: event_type.into(),
            severity,
            subject: subject.into(),
            details: details.into(),
        }
    }

    fn log(&self) {
        match self.severity {
            SecuritySeverity::Info => tracing::info!(
                event_type = %self.event_type,
                subject = %self.subject,
                "🔒 Security event: {}",
                self.details
            ),
            SecuritySeverity::Warning => tracing::warn!(
                event_type = %self.event_type,
                subject = %self.subject,
                "⚠️ Security event: {}",
                self.details
            ),
            SecuritySeverity::Critical => tracing::error!(
                event_type = %self.event_type,
                subject = %self.subject,
                "🚨 Security event: {}",
                self.details
            ),
        }
    }
}

/// Bounded in-memory ring of recent security events.
pub struct SecurityEventLog {
    events: RwLock<Vec<SecurityEvent>>,
    max_events: usize,
}

impl SecurityEventLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            max_events,
        }
    }

    pub async fn record(&self, event: SecurityEvent) {
        event.log();

        let mut events = self.events.write().await;
        events.push(event);
        if events.len() > self.max_events {
            let drain_count = events.len() - self.max_events;
            events.drain(0..drain_count);
        }
    }

    pub async fn recent(&self) -> Vec<SecurityEvent> {
        self.events.read().await.clone()
    }

    pub async fn by_type(&self, event_type: &str) -> Vec<SecurityEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }
}

impl Default for SecurityEventLog {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_is_bounded() {
        let log = SecurityEventLog::new(3);
        for i in 0..5 {
            log.record(SecurityEvent::new(
                "rate_limited",
                SecuritySeverity::Warning,
                format!("claimant-{i}"),
                "too many submissions",
            ))
            .await;
        }
        let events = log.recent().await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].subject, "claimant-2");
        assert_eq!(log.by_type("rate_limited").await.len(), 3);
    }
}

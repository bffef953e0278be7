//! Audit record model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subject recorded when a request carried no identity
pub const ANONYMOUS: &str = "anonymous";

/// Outcome recorded for 2xx responses
pub const OUTCOME_SUCCESS: &str = "success";

/// One inbound request and how it ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub subject: String,
    pub client_addr: String,
    pub method: String,
    pub endpoint: String,
    pub status: u16,
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub latency_ms: u64,
}

impl AuditRecord {
    pub fn new(method: &str, endpoint: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            subject: ANONYMOUS.to_string(),
            client_addr: "unknown".to_string(),
            method: method.to_string(),
            endpoint: endpoint.to_string(),
            status: 0,
            outcome: OUTCOME_SUCCESS.to_string(),
            detail: None,
            latency_ms: 0,
        }
    }

    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    pub fn with_client(mut self, client_addr: &str) -> Self {
        self.client_addr = client_addr.to_string();
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_outcome(mut self, outcome: &str) -> Self {
        self.outcome = outcome.to_string();
        self
    }

    pub fn with_detail(mut self, detail: &str) -> Self {
        self.detail = Some(detail.to_string());
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == OUTCOME_SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let record = AuditRecord::new("POST", "/login")
            .with_subject("admin")
            .with_client("10.0.0.7")
            .with_status(401)
            .with_outcome("invalid_credentials");

        assert_eq!(record.subject, "admin");
        assert_eq!(record.client_addr, "10.0.0.7");
        assert_eq!(record.status, 401);
        assert!(!record.is_success());
        assert!(record.detail.is_none());
    }

    #[test]
    fn test_defaults_to_anonymous() {
        let record = AuditRecord::new("GET", "/fraud-insights");
        assert_eq!(record.subject, ANONYMOUS);
        assert!(record.is_success());
    }
}

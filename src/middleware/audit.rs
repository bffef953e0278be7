//! Audit middleware
//!
//! Wraps the whole router so every request, whichever branch it took,
//! produces exactly one audit record. Inner layers and handlers describe the
//! request through response extensions.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::FailureCode;
use crate::models::{AuditRecord, ANONYMOUS, OUTCOME_SUCCESS};
use crate::AppState;

/// Identity the request acted as (authenticated subject or attempted login)
#[derive(Debug, Clone)]
pub struct AuditSubject(pub String);

/// Free-form note for the audit record, e.g. where a prediction came from
#[derive(Debug, Clone)]
pub struct AuditDetail(pub String);

pub async fn audit_requests(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let client = client_address(&req);
    let method = req.method().to_string();
    let endpoint = req.uri().path().to_string();

    let response = next.run(req).await;

    let status = response.status();
    let extensions = response.extensions();

    let subject = extensions
        .get::<AuditSubject>()
        .map(|s| s.0.as_str())
        .unwrap_or(ANONYMOUS);

    let outcome = match extensions.get::<FailureCode>() {
        Some(FailureCode(code)) => code.to_string(),
        None if status.is_success() => OUTCOME_SUCCESS.to_string(),
        None => format!("http_{}", status.as_u16()),
    };

    let mut record = AuditRecord::new(&method, &endpoint)
        .with_subject(subject)
        .with_client(&client)
        .with_status(status.as_u16())
        .with_outcome(&outcome)
        .with_latency_ms(started.elapsed().as_millis() as u64);

    if let Some(AuditDetail(detail)) = extensions.get::<AuditDetail>() {
        record = record.with_detail(detail);
    }

    state.audit.record(record);
    response
}

/// Peer address, falling back to the first `X-Forwarded-For` hop
fn client_address(req: &Request) -> String {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    req.headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_client_address_prefers_peer() {
        let mut req = axum::http::Request::builder()
            .uri("/login")
            .header("X-Forwarded-For", "203.0.113.9")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_address(&req), "203.0.113.9");

        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 20], 50000))));
        assert_eq!(client_address(&req), "192.168.1.20");
    }

    #[test]
    fn test_client_address_unknown() {
        let req = axum::http::Request::builder()
            .uri("/login")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_address(&req), "unknown");
    }
}

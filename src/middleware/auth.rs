//! Authentication middleware

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::middleware::audit::AuditSubject;
use crate::{AppError, AppState};

/// Middleware: Require a valid bearer token
pub async fn require_bearer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(&req)?;

    let subject = state.verifier.verify_token(&token)?;

    // Insert into request extensions
    req.extensions_mut().insert(subject.clone());

    let mut response = next.run(req).await;
    response.extensions_mut().insert(AuditSubject(subject.0));
    Ok(response)
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(req: &Request) -> Result<String, AppError> {
    let auth_header = req.headers()
        .get(AUTHORIZATION)
        .ok_or(AppError::Unauthorized)?
        .to_str()
        .map_err(|_| AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized)?;

    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with(header: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/predict");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token(&request_with(Some("Bearer abc.def"))).unwrap(), "abc.def");
        assert!(matches!(extract_bearer_token(&request_with(None)), Err(AppError::Unauthorized)));
        assert!(matches!(
            extract_bearer_token(&request_with(Some("Basic YWRtaW46YWRtaW4="))),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(extract_bearer_token(&request_with(Some("Bearer "))), Err(AppError::Unauthorized)));
    }
}

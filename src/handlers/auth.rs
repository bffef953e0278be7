//! Authentication handlers

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;
use crate::middleware::audit::AuditSubject;
use crate::{AppError, AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Login endpoint (HTTP Basic credentials)
pub async fn login(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some((username, password)) = basic_credentials(&headers) else {
        return AppError::Auth(AuthError::MissingCredentials).into_response();
    };

    // Argon2 verification is CPU-bound
    let verifier = state.verifier.clone();
    let user = username.clone();
    let result = tokio::task::spawn_blocking(move || verifier.issue_token(&user, &password)).await;

    let mut response = match result {
        Ok(Ok(token)) => {
            tracing::info!("Login succeeded for {}", username);
            Json(LoginResponse {
                expires_in: token.expires_in_secs(),
                access_token: token.token,
                token_type: "Bearer".to_string(),
            })
            .into_response()
        }
        Ok(Err(e)) => {
            tracing::warn!("Login rejected for {}: {}", username, e);
            AppError::Auth(e).into_response()
        }
        Err(e) => AppError::InternalError(format!("login task failed: {}", e)).into_response(),
    };

    response.extensions_mut().insert(AuditSubject(username));
    response
}

/// Decode `Authorization: Basic base64(username:password)`
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?.trim();
    let decoded = BASE64.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_basic_credentials() {
        let encoded = BASE64.encode("admin:pa:ss");
        assert_eq!(
            basic_credentials(&headers(&format!("Basic {}", encoded))),
            Some(("admin".to_string(), "pa:ss".to_string()))
        );
    }

    #[test]
    fn test_basic_credentials_rejects_malformed() {
        assert_eq!(basic_credentials(&HeaderMap::new()), None);
        assert_eq!(basic_credentials(&headers("Bearer abc")), None);
        assert_eq!(basic_credentials(&headers("Basic !!!")), None);
        let no_colon = BASE64.encode("admin");
        assert_eq!(basic_credentials(&headers(&format!("Basic {}", no_colon))), None);
    }
}

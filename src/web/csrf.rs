//! CSRF protection
//!
//! The token for a session is `base64url(HMAC-SHA256(secret, session_token))`.
//! It needs no storage of its own and changes whenever the session token is
//! renewed. State-changing requests must echo it back in the `csrf_token`
//! form field or the `X-CSRF-Token` header.

use argon2::password_hash::rand_core::{OsRng, RngCore};
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use data_encoding::BASE64URL_NOPAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::web::error::{client_error, AppError};
use crate::web::session::Session;
use crate::web::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const FORM_FIELD: &str = "csrf_token";
pub const HEADER_NAME: &str = "x-csrf-token";

/// The token to embed in forms rendered for this request
#[derive(Debug, Clone)]
pub struct CsrfToken(pub String);

/// Issues and verifies session-bound CSRF tokens
pub struct CsrfProtection {
    keyed: HmacSha256,
}

impl CsrfProtection {
    pub fn new(secret: &[u8]) -> anyhow::Result<Self> {
        let keyed = HmacSha256::new_from_slice(secret)
            .map_err(|e| anyhow::anyhow!("Invalid CSRF secret: {}", e))?;
        Ok(Self { keyed })
    }

    /// Use the configured secret, or a random one that lasts as long as the
    /// process.
    pub fn from_secret(secret: Option<&str>) -> anyhow::Result<Self> {
        match secret {
            Some(s) if !s.is_empty() => Self::new(s.as_bytes()),
            _ => {
                tracing::info!("No CSRF secret configured, generating a per-process secret");
                let mut key = [0u8; 32];
                OsRng.fill_bytes(&mut key);
                Self::new(&key)
            }
        }
    }

    fn mac(&self, session_token: &str) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(session_token.as_bytes());
        mac
    }

    pub fn token_for(&self, session_token: &str) -> String {
        BASE64URL_NOPAD.encode(&self.mac(session_token).finalize().into_bytes())
    }

    /// Constant-time check of a presented token against the session.
    pub fn verify(&self, session_token: &str, presented: &str) -> bool {
        match BASE64URL_NOPAD.decode(presented.as_bytes()) {
            Ok(tag) => self.mac(session_token).verify_slice(&tag).is_ok(),
            Err(_) => false,
        }
    }
}

fn is_state_changing(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

fn is_form(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

fn token_from_form(body: &[u8]) -> Option<String> {
    serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)
        .ok()?
        .into_iter()
        .find(|(key, _)| key == FORM_FIELD)
        .map(|(_, value)| value)
}

/// CSRF stage of the dynamic chain; must run inside the session stage.
pub async fn protect(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let Some(session) = request.extensions().get::<Session>().cloned() else {
        return AppError::defect("CSRF stage mounted outside the session stage").into_response();
    };
    let session_token = session.token().await;
    request
        .extensions_mut()
        .insert(CsrfToken(state.csrf.token_for(&session_token)));

    if !is_state_changing(request.method()) {
        return next.run(request).await;
    }

    let header_token = request
        .headers()
        .get(HEADER_NAME)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let (request, presented) = match header_token {
        Some(token) => (request, Some(token)),
        None if is_form(&request) => {
            let (parts, body) = request.into_parts();
            let bytes = match to_bytes(body, state.max_body_bytes).await {
                Ok(bytes) => bytes,
                Err(_) => return client_error(StatusCode::PAYLOAD_TOO_LARGE),
            };
            let token = token_from_form(&bytes);
            (Request::from_parts(parts, Body::from(bytes)), token)
        }
        None => (request, None),
    };

    match presented {
        Some(token) if state.csrf.verify(&session_token, &token) => next.run(request).await,
        _ => {
            tracing::warn!(
                method = %request.method(),
                uri = %request.uri(),
                "Rejected request with missing or invalid CSRF token"
            );
            client_error(StatusCode::FORBIDDEN)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_bound_to_session() {
        let csrf = CsrfProtection::new(b"secret").unwrap();
        let token = csrf.token_for("session-a");

        assert!(csrf.verify("session-a", &token));
        assert!(!csrf.verify("session-b", &token));
        assert_eq!(token, csrf.token_for("session-a"));
    }

    #[test]
    fn test_token_depends_on_secret() {
        let a = CsrfProtection::new(b"secret-one").unwrap();
        let b = CsrfProtection::new(b"secret-two").unwrap();
        assert!(!b.verify("session", &a.token_for("session")));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let csrf = CsrfProtection::new(b"secret").unwrap();
        assert!(!csrf.verify("session", ""));
        assert!(!csrf.verify("session", "not base64 !!"));
        assert!(!csrf.verify("session", "AAAA"));
    }

    #[test]
    fn test_random_secret_when_unset() {
        let a = CsrfProtection::from_secret(None).unwrap();
        let b = CsrfProtection::from_secret(Some("")).unwrap();
        assert_ne!(a.token_for("s"), b.token_for("s"));
    }

    #[test]
    fn test_token_from_form() {
        assert_eq!(
            token_from_form(b"title=x&csrf_token=abc-123&content=y"),
            Some("abc-123".to_string())
        );
        assert_eq!(token_from_form(b"title=x"), None);
    }

    #[test]
    fn test_state_changing_methods() {
        assert!(is_state_changing(&Method::POST));
        assert!(is_state_changing(&Method::DELETE));
        assert!(!is_state_changing(&Method::GET));
        assert!(!is_state_changing(&Method::HEAD));
    }
}

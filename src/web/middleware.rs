//! Request middleware
//!
//! Standard stages (every route):
//! - panic recovery
//! - request logging
//! - security headers
//!
//! Dynamic stages (everything but `/static` and `/ping`) live in
//! `session`, `csrf` and `authenticate` here; `require_authentication`
//! additionally guards the protected routes.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::any::Any;
use std::backtrace::Backtrace;
use std::net::SocketAddr;

use crate::web::error::AppError;
use crate::web::session::Session;
use crate::web::AppState;

/// Session key holding the logged-in user's id
pub const AUTHENTICATED_USER_ID: &str = "authenticatedUserID";

/// Present in request extensions when the session names a user that still exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub i64);

/// Log every panic with its location and a backtrace taken at the panic
/// site. `CatchPanicLayer` only sees the payload after unwinding.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        tracing::error!("{}\nstack backtrace:\n{}", info, Backtrace::force_capture());
    }));
}

/// Response for a panic caught by `CatchPanicLayer`
///
/// Closes the connection rather than reusing it after a half-finished
/// request. Security headers are applied here too, since the panic skipped
/// the stage that normally sets them.
pub fn recover_panic(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    tracing::error!("recovered from panic while handling request: {}", detail);

    let mut response = (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal Server Error",
    )
        .into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    apply_secure_headers(headers);
    response
}

pub async fn log_request(request: Request, next: Next) -> Response {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());

    tracing::info!(
        remote_addr = %remote_addr,
        proto = ?request.version(),
        method = %request.method(),
        uri = %request.uri(),
        "received request"
    );

    next.run(request).await
}

pub async fn secure_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    apply_secure_headers(response.headers_mut());
    response
}

fn apply_secure_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com",
        ),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("origin-when-cross-origin"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("deny"));
    headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("0"));
}

/// Marks the request authenticated when the session's user id still exists.
///
/// A missing or deleted user leaves the request anonymous; only a storage
/// failure turns into an error.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let session = request
        .extensions()
        .get::<Session>()
        .cloned()
        .ok_or_else(|| AppError::defect("authenticate mounted outside the session stage"))?;

    if let Some(id) = session.get::<i64>(AUTHENTICATED_USER_ID).await {
        if state.users.exists(id).await? {
            request.extensions_mut().insert(AuthenticatedUser(id));
        } else {
            tracing::debug!(user_id = id, "Session names a user that no longer exists");
        }
    }

    Ok(next.run(request).await)
}

/// Login gate for the protected routes.
pub async fn require_authentication(request: Request, next: Next) -> Response {
    if request.extensions().get::<AuthenticatedUser>().is_none() {
        return Redirect::to("/user/login").into_response();
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

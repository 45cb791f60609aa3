//! HTTP layer - routing, handlers and middleware
//!
//! Route groups:
//! - standard: `/ping`, `/static/*` (outer stages only)
//! - dynamic: pages that need a session, CSRF token and auth context
//! - protected: dynamic plus the login gate

pub mod context;
pub mod csrf;
pub mod error;
pub mod forms;
pub mod middleware;
pub mod session;
pub mod snippets;
pub mod static_files;
pub mod users;

#[cfg(test)]
mod tests;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware as axum_middleware,
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer};

use crate::config::Config;
use crate::db::repositories::{SqlxSessionRepository, SqlxSnippetRepository, SqlxUserRepository};
use crate::db::DynDatabasePool;
use crate::services::{SnippetService, UserService};
use crate::templates::TemplateCache;
use csrf::CsrfProtection;
use session::SessionManager;

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub snippets: Arc<SnippetService>,
    pub users: Arc<UserService>,
    pub templates: Arc<TemplateCache>,
    pub sessions: Arc<SessionManager>,
    pub csrf: Arc<CsrfProtection>,
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
}

impl AppState {
    /// Wire services, sessions and CSRF protection over one database pool.
    pub fn new(config: &Config, pool: DynDatabasePool, templates: TemplateCache) -> anyhow::Result<Self> {
        let sessions = SessionManager::new(SqlxSessionRepository::boxed(pool.clone()), &config.session);
        let csrf = CsrfProtection::from_secret(config.security.csrf_secret.as_deref())?;

        Ok(Self {
            snippets: Arc::new(SnippetService::new(SqlxSnippetRepository::boxed(pool.clone()))),
            users: Arc::new(UserService::new(SqlxUserRepository::boxed(pool))),
            templates: Arc::new(templates),
            sessions: Arc::new(sessions),
            csrf: Arc::new(csrf),
            max_body_bytes: config.server.max_body_bytes,
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
        })
    }
}

/// `GET /ping`
pub async fn ping() -> &'static str {
    "OK"
}

async fn not_found() -> Response {
    error::client_error(StatusCode::NOT_FOUND)
}

/// Requests that run past `timeout` are answered with 408.
fn request_timeout(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/snippet/create",
            get(snippets::snippet_create).post(snippets::snippet_create_post),
        )
        .route("/user/logout", post(users::user_logout_post))
        .route_layer(axum_middleware::from_fn(middleware::require_authentication));

    let dynamic = Router::new()
        .route("/", get(snippets::home))
        .route("/snippet/view/{id}", get(snippets::snippet_view))
        .route(
            "/user/signup",
            get(users::user_signup).post(users::user_signup_post),
        )
        .route(
            "/user/login",
            get(users::user_login).post(users::user_login_post),
        )
        .merge(protected)
        .route_layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    session::load_and_save,
                ))
                .layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    csrf::protect,
                ))
                .layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    middleware::authenticate,
                )),
        );

    let standard = ServiceBuilder::new()
        .layer(CatchPanicLayer::custom(middleware::recover_panic))
        .layer(axum_middleware::from_fn(middleware::log_request))
        .layer(axum_middleware::from_fn(middleware::secure_headers))
        .layer(request_timeout(state.request_timeout))
        .layer(DefaultBodyLimit::max(state.max_body_bytes));

    Router::new()
        .route("/ping", get(ping))
        .route("/static/{*filepath}", get(static_files::serve_static))
        .merge(dynamic)
        .fallback(not_found)
        .layer(standard)
        .with_state(state)
}

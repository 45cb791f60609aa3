//! Per-request template data

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{Html, IntoResponse, Response},
};
use chrono::{Datelike, Utc};
use serde::Serialize;
use tera::Context as TeraContext;

use crate::models::Snippet;
use crate::web::csrf::CsrfToken;
use crate::web::error::AppError;
use crate::web::middleware::AuthenticatedUser;
use crate::web::session::Session;
use crate::web::AppState;

/// Session key for one-shot status messages
pub const FLASH: &str = "flash";

/// Everything a page template can read
#[derive(Debug, Default, Serialize)]
pub struct TemplateData {
    pub current_year: i32,
    pub flash: Option<String>,
    pub is_authenticated: bool,
    pub csrf_token: String,
    pub snippet: Option<Snippet>,
    pub snippets: Vec<Snippet>,
    pub form: Option<serde_json::Value>,
}

impl TemplateData {
    pub fn with_form<F: Serialize>(mut self, form: &F) -> Result<Self, AppError> {
        let value = serde_json::to_value(form)
            .map_err(|e| AppError::Server(anyhow::Error::new(e).context("Failed to encode form")))?;
        self.form = Some(value);
        Ok(self)
    }
}

/// What the dynamic middleware stages left in the request
///
/// Only valid on routes behind the session, CSRF and authenticate stages.
/// Elsewhere extraction fails as a programming defect.
pub struct RequestContext {
    pub session: Session,
    pub csrf_token: String,
    pub user_id: Option<i64>,
}

impl RequestContext {
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Template data for this request. Consumes any pending flash message.
    pub async fn template_data(&self) -> TemplateData {
        TemplateData {
            current_year: Utc::now().year(),
            flash: self.session.pop_string(FLASH).await,
            is_authenticated: self.is_authenticated(),
            csrf_token: self.csrf_token.clone(),
            ..TemplateData::default()
        }
    }
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::defect("no session in request; route is outside the dynamic chain"))?;
        let CsrfToken(csrf_token) = parts
            .extensions
            .get::<CsrfToken>()
            .cloned()
            .ok_or_else(|| AppError::defect("no CSRF token in request; route is outside the dynamic chain"))?;
        let user_id = parts
            .extensions
            .get::<AuthenticatedUser>()
            .map(|AuthenticatedUser(id)| *id);

        Ok(Self {
            session,
            csrf_token,
            user_id,
        })
    }
}

/// Render `page` completely before choosing the status, so a failing template
/// yields a clean 500 instead of a truncated page.
pub fn render(
    state: &AppState,
    status: StatusCode,
    page: &str,
    data: &TemplateData,
) -> Result<Response, AppError> {
    let context = TeraContext::from_serialize(data)
        .map_err(|e| AppError::Server(anyhow::Error::new(e).context("Failed to build template context")))?;
    let html = state.templates.render(page, &context)?;
    Ok((status, Html(html)).into_response())
}

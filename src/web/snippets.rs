//! Snippet pages

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};

use crate::web::context::{render, RequestContext, FLASH};
use crate::web::error::AppError;
use crate::web::forms::{PostForm, SnippetCreateForm};
use crate::web::AppState;

/// `GET /`
pub async fn home(State(state): State<AppState>, ctx: RequestContext) -> Result<Response, AppError> {
    let snippets = state.snippets.latest().await?;

    let mut data = ctx.template_data().await;
    data.snippets = snippets;
    render(&state, StatusCode::OK, "home.html", &data)
}

/// `GET /snippet/view/{id}`
///
/// Ids that are not positive integers are a 404, same as unknown or expired ones.
pub async fn snippet_view(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = match id.parse::<i64>() {
        Ok(id) if id >= 1 => id,
        _ => return Err(AppError::NotFound),
    };

    let snippet = state.snippets.get(id).await?;

    let mut data = ctx.template_data().await;
    data.snippet = Some(snippet);
    render(&state, StatusCode::OK, "view.html", &data)
}

/// `GET /snippet/create`
pub async fn snippet_create(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Response, AppError> {
    let data = ctx
        .template_data()
        .await
        .with_form(&SnippetCreateForm::blank())?;
    render(&state, StatusCode::OK, "create.html", &data)
}

/// `POST /snippet/create`
pub async fn snippet_create_post(
    State(state): State<AppState>,
    ctx: RequestContext,
    PostForm(mut form): PostForm<SnippetCreateForm>,
) -> Result<Response, AppError> {
    if !form.validate() {
        let data = ctx.template_data().await.with_form(&form)?;
        return render(&state, StatusCode::UNPROCESSABLE_ENTITY, "create.html", &data);
    }

    let id = state
        .snippets
        .insert(&form.title, &form.content, form.expires)
        .await?;

    ctx.session.insert(FLASH, "Snippet successfully created!").await;

    Ok(Redirect::to(&format!("/snippet/view/{}", id)).into_response())
}

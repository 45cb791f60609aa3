//! Signup, login and logout

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};

use crate::services::UserServiceError;
use crate::web::context::{render, RequestContext, FLASH};
use crate::web::error::AppError;
use crate::web::forms::{PostForm, UserLoginForm, UserSignupForm};
use crate::web::middleware::AUTHENTICATED_USER_ID;
use crate::web::AppState;

/// `GET /user/signup`
pub async fn user_signup(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Response, AppError> {
    let data = ctx
        .template_data()
        .await
        .with_form(&UserSignupForm::default())?;
    render(&state, StatusCode::OK, "signup.html", &data)
}

/// `POST /user/signup`
pub async fn user_signup_post(
    State(state): State<AppState>,
    ctx: RequestContext,
    PostForm(mut form): PostForm<UserSignupForm>,
) -> Result<Response, AppError> {
    if form.validate() {
        match state
            .users
            .insert(&form.name, &form.email, &form.password)
            .await
        {
            Ok(_) => {
                ctx.session
                    .insert(FLASH, "Your signup was successful. Please log in.")
                    .await;
                return Ok(Redirect::to("/user/login").into_response());
            }
            Err(UserServiceError::DuplicateEmail) => {
                form.validator
                    .add_field_error("email", "Email address is already in use");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let data = ctx.template_data().await.with_form(&form)?;
    render(&state, StatusCode::UNPROCESSABLE_ENTITY, "signup.html", &data)
}

/// `GET /user/login`
pub async fn user_login(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Response, AppError> {
    let data = ctx
        .template_data()
        .await
        .with_form(&UserLoginForm::default())?;
    render(&state, StatusCode::OK, "login.html", &data)
}

/// `POST /user/login`
///
/// The session token is renewed before the user id is stored, so a token
/// planted before login is worthless afterwards.
pub async fn user_login_post(
    State(state): State<AppState>,
    ctx: RequestContext,
    PostForm(mut form): PostForm<UserLoginForm>,
) -> Result<Response, AppError> {
    if form.validate() {
        match state.users.authenticate(&form.email, &form.password).await {
            Ok(id) => {
                ctx.session.renew_token().await?;
                ctx.session.insert(AUTHENTICATED_USER_ID, id).await;
                return Ok(Redirect::to("/snippet/create").into_response());
            }
            Err(UserServiceError::InvalidCredentials) => {
                form.validator
                    .add_non_field_error("Email or password is incorrect");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let data = ctx.template_data().await.with_form(&form)?;
    render(&state, StatusCode::UNPROCESSABLE_ENTITY, "login.html", &data)
}

/// `POST /user/logout`
///
/// A failure to renew the token aborts with a 500; no flash is set.
pub async fn user_logout_post(ctx: RequestContext) -> Result<Response, AppError> {
    ctx.session.renew_token().await?;
    ctx.session.remove(AUTHENTICATED_USER_ID).await;
    ctx.session
        .insert(FLASH, "You've been logged out successfully!")
        .await;

    Ok(Redirect::to("/").into_response())
}

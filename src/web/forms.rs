//! Form decoding and validation
//!
//! Each form struct mirrors one HTML form. Unknown fields (such as
//! `csrf_token`) are ignored and missing ones take their default, so only a
//! malformed body or a value of the wrong type is rejected at decode time.
//! Everything else is a validation error reported back on the page.

use axum::{
    extract::{rejection::FormRejection, FromRequest, Request},
    http::StatusCode,
    Form,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::validator::{
    matches, max_chars, min_chars, not_blank, permitted_value, Validator, EMAIL_RX,
};
use crate::web::error::AppError;

pub const PERMITTED_EXPIRES: [i64; 3] = [1, 7, 365];

/// URL-encoded POST body decoded into `T`
///
/// Every decode failure becomes a plain 400 (or 413 for an oversized body)
/// before the handler runs.
pub struct PostForm<T>(pub T);

impl<T, S> FromRequest<S> for PostForm<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Form::<T>::from_request(req, state).await {
            Ok(Form(value)) => Ok(PostForm(value)),
            Err(rejection) => {
                tracing::debug!("Rejected form body: {}", rejection.body_text());
                Err(AppError::Client(rejection_status(&rejection)))
            }
        }
    }
}

fn rejection_status(rejection: &FormRejection) -> StatusCode {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        StatusCode::PAYLOAD_TOO_LARGE
    } else {
        StatusCode::BAD_REQUEST
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnippetCreateForm {
    pub title: String,
    pub content: String,
    pub expires: i64,
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl SnippetCreateForm {
    /// Blank form shown by GET, with one year pre-selected
    pub fn blank() -> Self {
        Self {
            expires: 365,
            ..Self::default()
        }
    }

    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(not_blank(&self.title), "title", "This field cannot be blank");
        v.check_field(
            max_chars(&self.title, 100),
            "title",
            "This field cannot be more than 100 characters long",
        );
        v.check_field(not_blank(&self.content), "content", "This field cannot be blank");
        v.check_field(
            permitted_value(&self.expires, &PERMITTED_EXPIRES),
            "expires",
            "This field must equal 1, 7 or 365",
        );
        v.valid()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSignupForm {
    pub name: String,
    pub email: String,
    /// Never echoed back into the page
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl UserSignupForm {
    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(not_blank(&self.name), "name", "This field cannot be blank");
        v.check_field(not_blank(&self.email), "email", "This field cannot be blank");
        v.check_field(
            matches(&self.email, &EMAIL_RX),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(not_blank(&self.password), "password", "This field cannot be blank");
        v.check_field(
            min_chars(&self.password, 8),
            "password",
            "This field must be at least 8 characters long",
        );
        v.valid()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserLoginForm {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl UserLoginForm {
    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(not_blank(&self.email), "email", "This field cannot be blank");
        v.check_field(
            matches(&self.email, &EMAIL_RX),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(not_blank(&self.password), "password", "This field cannot be blank");
        v.valid()
    }
}

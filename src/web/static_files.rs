//! Static assets compiled in from `ui/static`

use axum::{
    body::Body,
    extract::Path,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::ui::UiAssets;
use crate::web::error::client_error;

/// `GET /static/{*filepath}`
///
/// Only files are served; a directory path or anything outside `static/`
/// is a 404.
pub async fn serve_static(Path(filepath): Path<String>) -> Response {
    if filepath.is_empty() || filepath.ends_with('/') || filepath.split('/').any(|seg| seg == "..") {
        return client_error(StatusCode::NOT_FOUND);
    }

    match UiAssets::get(&format!("static/{}", filepath)) {
        Some(file) => (
            [
                (header::CONTENT_TYPE, get_content_type(&filepath)),
                (header::CACHE_CONTROL, "public, max-age=3600"),
            ],
            Body::from(file.data.into_owned()),
        )
            .into_response(),
        None => client_error(StatusCode::NOT_FOUND),
    }
}

/// Get content type from file extension
fn get_content_type(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("") {
        "html" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

//! Files under `ui/` compiled into the binary
//!
//! `html/` holds the page templates read by the template cache and `static/`
//! holds the assets served at `/static/*`.

use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "ui/"]
#[include = "html/*"]
#[include = "static/*"]
pub struct UiAssets;

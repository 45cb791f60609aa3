//! Template cache
//!
//! Every page under `html/pages/` gets its own Tera instance holding
//! `base.html`, all of `html/partials/` and that one page. The cache is built
//! once at startup and only read afterwards. Any parse or inheritance error
//! fails the whole build, so a server never starts with a partial cache.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fs;
use std::path::Path;
use tera::{Context as TeraContext, Tera};

use crate::ui::UiAssets;

mod error;

pub use error::TemplateError;

const BASE: &str = "base.html";
const PARTIALS_DIR: &str = "partials/";
const PAGES_DIR: &str = "pages/";

/// Page name to compiled template set
pub struct TemplateCache {
    pages: HashMap<String, Tera>,
}

impl TemplateCache {
    /// Build the cache from the templates compiled into the binary.
    pub fn from_embedded() -> Result<Self> {
        let mut sources = Vec::new();
        for path in UiAssets::iter() {
            let Some(name) = path.strip_prefix("html/") else {
                continue;
            };
            let file = UiAssets::get(&path)
                .with_context(|| format!("Embedded template vanished: {}", path))?;
            let content = String::from_utf8(file.data.into_owned())
                .with_context(|| format!("Template is not UTF-8: {}", path))?;
            sources.push((name.to_string(), content));
        }
        Self::build(sources)
    }

    /// Build the cache from an on-disk `html` directory laid out like `ui/html`.
    pub fn from_dir(html_dir: &Path) -> Result<Self> {
        let mut sources = Vec::new();
        collect_templates(html_dir, html_dir, &mut sources)?;
        Self::build(sources)
    }

    fn build(sources: Vec<(String, String)>) -> Result<Self> {
        let base = sources
            .iter()
            .find(|(name, _)| name == BASE)
            .ok_or_else(|| TemplateError::Load(format!("missing {}", BASE)))?;
        let partials: Vec<&(String, String)> = sources
            .iter()
            .filter(|(name, _)| name.starts_with(PARTIALS_DIR))
            .collect();

        let mut pages = HashMap::new();
        for (name, content) in sources.iter().filter(|(n, _)| n.starts_with(PAGES_DIR)) {
            let page = name.trim_start_matches(PAGES_DIR).to_string();

            let mut tera = Tera::default();
            tera.register_filter("human_date", human_date_filter);

            let mut set: Vec<(&str, &str)> = vec![(BASE, base.1.as_str())];
            set.extend(partials.iter().map(|(n, c)| (n.as_str(), c.as_str())));
            set.push((page.as_str(), content.as_str()));

            tera.add_raw_templates(set)
                .map_err(|e| TemplateError::Load(format!("{}: {}", page, error_chain(&e))))?;

            pages.insert(page, tera);
        }

        if pages.is_empty() {
            return Err(TemplateError::Load(format!("no templates under {}", PAGES_DIR)).into());
        }

        tracing::debug!("Built template cache with {} page(s)", pages.len());
        Ok(Self { pages })
    }

    /// Render `page` to a string. Nothing is written anywhere until this
    /// returns `Ok`.
    pub fn render(&self, page: &str, context: &TeraContext) -> Result<String, TemplateError> {
        let tera = self
            .pages
            .get(page)
            .ok_or_else(|| TemplateError::NotFound(page.to_string()))?;

        tera.render(page, context)
            .map_err(|e| TemplateError::Render(format!("Failed to render '{}': {}", page, error_chain(&e))))
    }

    pub fn contains(&self, page: &str) -> bool {
        self.pages.contains_key(page)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

fn collect_templates(base: &Path, dir: &Path, out: &mut Vec<(String, String)>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {:?}", dir))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_templates(base, &path, out)?;
        } else if path.extension().map_or(false, |ext| ext == "html") {
            let name = path
                .strip_prefix(base)
                .context("Template outside of template root")?
                .to_string_lossy()
                .replace('\\', "/");
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template: {:?}", path))?;
            out.push((name, content));
        }
    }
    Ok(())
}

fn error_chain(e: &tera::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        msg.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    msg
}

/// `{{ snippet.created | human_date }}` renders "17 Mar 2022 at 10:15" in UTC.
/// Null or unparsable input renders as an empty string.
fn human_date_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(value.as_str().map(human_date).unwrap_or_default()))
}

pub fn human_date(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|t| t.with_timezone(&Utc).format("%d %b %Y at %H:%M").to_string())
        .unwrap_or_default()
}

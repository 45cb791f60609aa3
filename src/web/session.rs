//! Server-side sessions
//!
//! The client only ever holds an opaque token in the session cookie; the state
//! itself lives in the `sessions` table. `load_and_save` wraps every dynamic
//! route: it loads (or starts) the session, hands the handler a [`Session`]
//! through request extensions, and writes the session back once the handler
//! has produced its response.

use argon2::password_hash::rand_core::{OsRng, RngCore};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, Utc};
use data_encoding::BASE64URL_NOPAD;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::db::repositories::SessionRepository;
use crate::models::{SessionData, SessionRecord};
use crate::web::error::AppError;
use crate::web::AppState;

/// Loads, persists and expires sessions
pub struct SessionManager {
    repo: Arc<dyn SessionRepository>,
    lifetime: Duration,
    cookie_name: String,
    cookie_secure: bool,
}

impl SessionManager {
    pub fn new(repo: Arc<dyn SessionRepository>, config: &SessionConfig) -> Self {
        Self {
            repo,
            lifetime: Duration::hours(config.lifetime_hours),
            cookie_name: config.cookie_name.clone(),
            cookie_secure: config.cookie_secure,
        }
    }

    /// Look up the session named by the request cookie, or start a new one.
    pub async fn load(&self, headers: &HeaderMap) -> anyhow::Result<Session> {
        let now = Utc::now();
        let record = match cookie_value(headers, &self.cookie_name) {
            Some(token) => self.repo.find(&token, now).await?,
            None => None,
        };

        let state = match record {
            Some(record) => SessionState {
                token: record.token,
                data: record.data,
                expiry: record.expiry,
                is_new: false,
                modified: false,
            },
            None => SessionState {
                token: generate_token(),
                data: SessionData::new(),
                expiry: now + self.lifetime,
                is_new: true,
                modified: false,
            },
        };

        Ok(Session {
            state: Arc::new(Mutex::new(state)),
            repo: self.repo.clone(),
        })
    }

    /// Persist the session if it is new or was changed, returning the
    /// `Set-Cookie` value to send.
    pub async fn commit(&self, session: &Session) -> anyhow::Result<Option<HeaderValue>> {
        let mut state = session.state.lock().await;
        if !state.is_new && !state.modified {
            return Ok(None);
        }

        let record = SessionRecord {
            token: state.token.clone(),
            data: state.data.clone(),
            expiry: state.expiry,
        };
        self.repo.commit(&record).await?;
        state.is_new = false;
        state.modified = false;

        let cookie = self.cookie(&record.token, record.expiry, Utc::now());
        Ok(Some(HeaderValue::from_str(&cookie)?))
    }

    fn cookie(&self, token: &str, expiry: DateTime<Utc>, now: DateTime<Utc>) -> String {
        let max_age = (expiry - now).num_seconds().max(0);
        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            self.cookie_name, token, max_age
        );
        if self.cookie_secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Periodically delete expired session rows.
    pub fn spawn_cleanup(self: Arc<Self>, every: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match self.repo.delete_expired(Utc::now()).await {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!("Removed {} expired session(s)", n),
                    Err(e) => tracing::warn!("Session cleanup failed: {:#}", e),
                }
            }
        })
    }
}

struct SessionState {
    token: String,
    data: SessionData,
    expiry: DateTime<Utc>,
    is_new: bool,
    modified: bool,
}

/// Request-scoped handle to the current session
///
/// Cloned out of the request extensions by extractors and middleware. All
/// clones share one state, which `load_and_save` persists after the handler.
#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    repo: Arc<dyn SessionRepository>,
}

impl Session {
    pub async fn token(&self) -> String {
        self.state.lock().await.token.clone()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let state = self.state.lock().await;
        state
            .data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub async fn insert(&self, key: &str, value: impl Into<Value>) {
        let mut state = self.state.lock().await;
        state.data.insert(key.to_string(), value.into());
        state.modified = true;
    }

    pub async fn remove(&self, key: &str) {
        let mut state = self.state.lock().await;
        if state.data.remove(key).is_some() {
            state.modified = true;
        }
    }

    /// Read a string value and delete it in the same step.
    pub async fn pop_string(&self, key: &str) -> Option<String> {
        let mut state = self.state.lock().await;
        let value = state.data.remove(key)?;
        state.modified = true;
        match value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Move the session to a fresh token, keeping its data and deadline.
    /// The old token is deleted from the store immediately.
    pub async fn renew_token(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if !state.is_new {
            self.repo.delete(&state.token).await?;
        }
        state.token = generate_token();
        state.modified = true;
        Ok(())
    }
}

/// Session load/save stage of the dynamic chain.
pub async fn load_and_save(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let session = match state.sessions.load(request.headers()).await {
        Ok(session) => session,
        Err(e) => return AppError::Server(e.context("Failed to load session")).into_response(),
    };
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;

    match state.sessions.commit(&session).await {
        Ok(Some(cookie)) => {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
        Ok(None) => {}
        Err(e) => return AppError::Server(e.context("Failed to save session")).into_response(),
    }
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Cookie"));
    response
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    BASE64URL_NOPAD.encode(&bytes)
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

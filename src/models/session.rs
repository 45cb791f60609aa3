//! Session model

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// Key/value state carried by one session
pub type SessionData = HashMap<String, Value>;

/// A persisted session row
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    /// Opaque token presented by the client in the session cookie
    pub token: String,
    pub data: SessionData,
    pub expiry: DateTime<Utc>,
}

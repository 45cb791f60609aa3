//! Snippetbox - share short, self-expiring text snippets
//!
//! Server-rendered pages for creating and viewing snippets, with signup,
//! login and database-backed sessions.

pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod templates;
pub mod ui;
pub mod validator;
pub mod web;

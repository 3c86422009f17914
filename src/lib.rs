//! mailforge library - email campaign dispatch service
//!
//! A campaign pairs a name with a prompt template. Uploading a CSV admits
//! one dispatch item per recipient; a single background worker generates
//! each message body through a chat-completions API, delivers it over SMTP,
//! and settles the item as SENT or FAILED.

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod services;

pub use config::Config;
pub use dispatch::Dispatcher;
pub use error::{Error, Result};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Work queue owner; handlers enqueue admitted items here
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, dispatcher: Arc<Dispatcher>) -> Self {
        Self { db, dispatcher }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::campaign_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

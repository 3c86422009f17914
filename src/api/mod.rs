//! HTTP API
//!
//! Campaign admission and status endpoints, plus the health check.

pub mod campaigns;
pub mod health;

pub use campaigns::campaign_routes;
pub use health::health_routes;

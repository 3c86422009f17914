//! Database access layer
//!
//! Provides schema initialization and queries for campaigns and
//! dispatch items.

pub mod campaigns;
pub mod init;
pub mod items;

pub use init::{create_schema, init_database};

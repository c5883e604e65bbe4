//! # Relink Common Library
//!
//! Shared code for the relink crates including:
//! - Database bootstrap (schema, default settings)
//! - Event types (LinkEvent enum)
//! - API authentication primitives
//! - Configuration loading
//! - Time helpers

pub mod api;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::LinkEvent;

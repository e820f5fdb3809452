//! # Radar Common Library
//!
//! Shared code for the live radar services:
//! - Canonical flight position model and bounding boxes
//! - Error type and result alias
//! - TOML configuration loading
//! - Database schema initialization and the latest-positions reader query
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use models::{BoundingBox, FlightPosition, LABEL_SENTINEL};

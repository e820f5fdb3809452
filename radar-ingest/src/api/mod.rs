//! HTTP API handlers

pub mod flights;
pub mod health;

pub use flights::flight_routes;
pub use health::health_routes;

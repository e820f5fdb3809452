//! Database schema and queries for the flight history store

pub mod flights;
pub mod init;

pub use flights::*;
pub use init::*;

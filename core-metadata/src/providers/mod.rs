//! External Metadata Providers
//!
//! Clients for external catalog services. Each provider implements rate
//! limiting and error handling to comply with API terms of service.

pub mod tmdb;

pub use tmdb::TmdbClient;

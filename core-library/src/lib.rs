//! # Library Management Module
//!
//! Owns the media catalog database and the repositories used to read and
//! write it.
//!
//! ## Overview
//!
//! - SQLite connection pool and embedded migrations ([`db`])
//! - domain models for libraries, movies, shows, people, files and nodes
//!   ([`models`])
//! - one repository trait per entity with a SQLite implementation
//!   ([`repositories`])
//!
//! Movies, shows and people are keyed by their catalog id. File records are
//! owned either by a local library or by a federated node, never both.

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};

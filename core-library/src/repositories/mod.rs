//! # Repository Pattern Implementation
//!
//! One trait per entity plus a SQLite implementation backed by `sqlx`.
//!
//! ## Architecture
//!
//! - traits are `Send + Sync` so services can hold them as `Arc<dyn ...>`
//! - rows map through private `FromRow` structs converted with `TryFrom`,
//!   nested structures (genres, credits, seasons) are JSON text columns
//! - `update` on a missing row returns `NotFound`, `delete` reports whether
//!   a row was removed
//!
//! ## Available Repositories
//!
//! - `LibraryRepository` - configured library roots
//! - `MovieRepository` / `TvShowRepository` - catalog entries keyed by catalog id
//! - `PersonRepository` - cast and crew members
//! - `FileRepository` - file records owned by a library or a node
//! - `NodeRepository` - federated peers

pub mod file;
pub mod library;
pub mod movie;
pub mod node;
pub mod person;
pub mod tv_show;

pub use file::{FileRepository, SqliteFileRepository};
pub use library::{LibraryRepository, SqliteLibraryRepository};
pub use movie::{MovieRepository, SqliteMovieRepository};
pub use node::{NodeRepository, SqliteNodeRepository};
pub use person::{PersonRepository, SqlitePersonRepository};
pub use tv_show::{SqliteTvShowRepository, TvShowRepository};

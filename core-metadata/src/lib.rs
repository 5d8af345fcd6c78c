//! # Catalog Metadata Module
//!
//! Talks to the external movie/TV catalog and turns file names into catalog
//! matches.
//!
//! ## Overview
//!
//! This module handles:
//! - The [`MetadataProvider`] abstraction and its TMDB client
//! - Title and episode extraction from file and directory names
//! - Matching extracted titles to a single catalog id

pub mod error;
pub mod matcher;
pub mod provider;
pub mod providers;
pub mod title_parser;

pub use error::{MetadataError, Result};
pub use matcher::CatalogMatcher;
pub use provider::{MetadataProvider, SearchResult};
pub use providers::TmdbClient;
pub use title_parser::{parse_episode_file, parse_movie_file, ParsedEpisode, ParsedTitle};

//! # Node Federation Module
//!
//! Lets independent media hub instances trust each other, share file
//! catalogs and stream files between libraries.
//!
//! ## Components
//!
//! - **Protocol** (`protocol`): wire DTOs, endpoints and URL normalization
//! - **Client** (`client`): non-retrying HTTP calls to a peer
//! - **State** (`state`): peer lifecycle transitions
//! - **Service** (`service`): validate, connect, incoming registration,
//!   catalog fetch and node management
//! - **Download** (`download`): task executor streaming a remote file

pub mod client;
pub mod download;
pub mod error;
pub mod protocol;
pub mod service;
pub mod state;

pub use client::NodeClient;
pub use download::DownloadExecutor;
pub use error::{FederationError, Result};
pub use protocol::{normalize_url, HealthResponse, RegisterNodeRequest, RemoteFileRecord};
pub use service::{CatalogSyncSummary, FederationRepositories, FederationService, ValidationReport};
pub use state::NodeState;

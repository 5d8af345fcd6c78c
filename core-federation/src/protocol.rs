//! Federation wire protocol
//!
//! Every payload is JSON with camelCase field names.
//!
//! | Endpoint                      | Purpose                                 |
//! |-------------------------------|-----------------------------------------|
//! | `GET /health`                 | liveness and identity probe             |
//! | `POST /nodes/register`        | registration handshake                  |
//! | `GET /metadata/files`         | library-owned file records of the peer  |
//! | `GET /files/stream?path=...`  | raw bytes of one file                   |

use crate::error::{FederationError, Result};
use core_library::models::{FileMetadata, MediaType};
use serde::{Deserialize, Serialize};
use url::Url;

pub const HEALTH_PATH: &str = "/health";
pub const REGISTER_PATH: &str = "/nodes/register";
pub const FILES_PATH: &str = "/metadata/files";
pub const STREAM_PATH: &str = "/files/stream";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Body of the registration handshake
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterNodeRequest {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for RegisterNodeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterNodeRequest")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// A file record as served from `GET /metadata/files`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFileRecord {
    pub media_provider_id: i64,
    pub media_type: MediaType,
    pub file_path: String,
    #[serde(default)]
    pub season_number: Option<i32>,
    #[serde(default)]
    pub episode_number: Option<i32>,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
}

impl RemoteFileRecord {
    /// Record owned by `node_id`, with no library ownership
    pub fn into_node_file(self, node_id: &str) -> FileMetadata {
        let mut file =
            FileMetadata::remote(node_id, self.media_type, self.media_provider_id, self.file_path);
        file.season_number = self.season_number;
        file.episode_number = self.episode_number;
        file.content_hash = self.content_hash;
        file.file_size = self.file_size;
        file
    }
}

impl From<&FileMetadata> for RemoteFileRecord {
    fn from(file: &FileMetadata) -> Self {
        Self {
            media_provider_id: file.media_provider_id,
            media_type: file.media_type,
            file_path: file.file_path.clone(),
            season_number: file.season_number,
            episode_number: file.episode_number,
            content_hash: file.content_hash.clone(),
            file_size: file.file_size,
        }
    }
}

/// Canonical form of a peer base URL.
///
/// Only absolute `http`/`https` URLs with a host are accepted. Scheme and
/// host are lowercased, default ports dropped and trailing slashes removed,
/// so one peer always maps to one stored URL.
pub fn normalize_url(raw: &str) -> Result<String> {
    let invalid = |reason: &str| FederationError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let parsed = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        _ => return Err(invalid("scheme must be http or https")),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(invalid("query and fragment are not allowed"));
    }
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(invalid("credentials belong in the api key, not the URL"));
    }

    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

/// `base` joined with an endpoint path
pub fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

pub fn stream_endpoint(base: &str, remote_path: &str) -> String {
    format!(
        "{}?path={}",
        endpoint(base, STREAM_PATH),
        urlencoding::encode(remote_path)
    )
}

//! Task payload snapshots
//!
//! Each task type reports its own payload shape. The engine stores and
//! returns payloads without looking inside; executors replace the whole
//! snapshot on every update.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum TaskPayload {
    #[default]
    None,
    Sync(SyncPayload),
    PersonCleanup(PersonCleanupPayload),
    Download(DownloadPayload),
}

/// Counters of a scan or refresh run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    pub libraries_scanned: u64,
    pub libraries_failed: u64,
    pub files_discovered: u64,
    pub files_new: u64,
    pub files_missing: u64,
    pub files_processed: u64,
    pub files_skipped: u64,
    pub files_linked: u64,
    pub files_removed: u64,
    pub movies_created: u64,
    pub movies_updated: u64,
    pub shows_created: u64,
    pub shows_updated: u64,
    pub items_failed: u64,
    pub people_total: u64,
    pub people_synced: u64,
    pub people_failed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonCleanupPayload {
    pub people_checked: u64,
    pub people_deleted: u64,
    pub people_retained: u64,
    pub people_failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadPayload {
    pub node_id: String,
    pub remote_path: String,
    pub destination_path: String,
    pub downloaded_bytes: u64,
    /// Content length announced by the peer
    pub total_bytes: Option<u64>,
}

impl DownloadPayload {
    pub fn new(
        node_id: impl Into<String>,
        remote_path: impl Into<String>,
        destination_path: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            remote_path: remote_path.into(),
            destination_path: destination_path.into(),
            downloaded_bytes: 0,
            total_bytes: None,
        }
    }

    /// Percent complete, when the total size is known
    pub fn percent(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(100.0),
            Some(total) => Some((self.downloaded_bytes as f64 / total as f64 * 100.0).min(100.0)),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_percent() {
        let mut payload = DownloadPayload::new("n1", "/a.mkv", "/lib/a.mkv");
        assert_eq!(payload.percent(), None);

        payload.total_bytes = Some(200);
        payload.downloaded_bytes = 50;
        assert_eq!(payload.percent(), Some(25.0));

        payload.total_bytes = Some(0);
        assert_eq!(payload.percent(), Some(100.0));
    }

    #[test]
    fn test_payload_is_tagged() {
        let json = serde_json::to_value(TaskPayload::Sync(SyncPayload {
            files_discovered: 3,
            ..SyncPayload::default()
        }))
        .unwrap();

        assert_eq!(json["kind"], "Sync");
        assert_eq!(json["data"]["filesDiscovered"], 3);
        assert_eq!(
            serde_json::to_value(TaskPayload::None).unwrap()["kind"],
            "None"
        );
    }
}

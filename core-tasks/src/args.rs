//! Submission arguments, one variant per task type

use crate::task::TaskType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaskArgs {
    /// Scan the given libraries, or every library when `None`
    #[serde(rename_all = "camelCase")]
    ScanLibraries { library_ids: Option<Vec<String>> },

    RefreshMetadata,

    /// Delete the listed people unless something still references them
    #[serde(rename_all = "camelCase")]
    PersonCleanup { person_ids: Vec<i64> },

    #[serde(rename_all = "camelCase")]
    NodeDownload {
        node_id: String,
        remote_path: String,
        library_id: String,
    },
}

impl TaskArgs {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskArgs::ScanLibraries { .. } => TaskType::ScanLibraries,
            TaskArgs::RefreshMetadata => TaskType::RefreshMetadata,
            TaskArgs::PersonCleanup { .. } => TaskType::PersonCleanup,
            TaskArgs::NodeDownload { .. } => TaskType::NodeDownload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_wire_shape() {
        let args = TaskArgs::NodeDownload {
            node_id: "n1".to_string(),
            remote_path: "/movies/x.mkv".to_string(),
            library_id: "l1".to_string(),
        };
        let json = serde_json::to_value(&args).unwrap();

        assert_eq!(json["type"], "NodeDownload");
        assert_eq!(json["remotePath"], "/movies/x.mkv");
        assert_eq!(args.task_type(), TaskType::NodeDownload);

        let scan: TaskArgs =
            serde_json::from_str(r#"{"type":"ScanLibraries","libraryIds":null}"#).unwrap();
        assert_eq!(scan.task_type(), TaskType::ScanLibraries);
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the failure happened before a usable response was received
    /// (timeouts, refused connections, DNS failures, non-2xx statuses).
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            BridgeError::Timeout(_)
                | BridgeError::Connection(_)
                | BridgeError::Status { .. }
                | BridgeError::Io(_)
        )
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            BridgeError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_classification() {
        assert!(BridgeError::Timeout("slow".to_string()).is_connectivity());
        assert!(BridgeError::Connection("refused".to_string()).is_connectivity());
        assert!(BridgeError::Status {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_connectivity());
        assert!(!BridgeError::Decode("bad json".to_string()).is_connectivity());
        assert!(!BridgeError::OperationFailed("other".to_string()).is_connectivity());
    }

    #[test]
    fn test_status_accessor() {
        let err = BridgeError::Status {
            status: 404,
            message: "missing".to_string(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(BridgeError::Decode("x".to_string()).status(), None);
    }
}

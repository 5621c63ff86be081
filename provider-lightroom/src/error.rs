//! Error types for the Lightroom provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Lightroom provider errors
#[derive(Error, Debug)]
pub enum LightroomError {
    /// Non-2xx answer from the REST API
    #[error("Lightroom API error (status {status}): {body}")]
    Api { status: u16, body: String },

    /// Response body did not match the expected resource shape
    #[error("Failed to decode API response: {0}")]
    Decode(String),

    /// Cursor chain repeated itself or exceeded the page budget
    #[error("Pagination did not terminate: cursor {cursor:?} after {pages} pages")]
    PaginationLoop { cursor: String, pages: usize },

    #[error("Network error: {0}")]
    Network(String),

    /// The client was closed and can no longer issue requests
    #[error("Catalog client is closed")]
    Closed,

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl LightroomError {
    pub fn status(&self) -> Option<u16> {
        match self {
            LightroomError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The access token was rejected.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }
}

/// Result type for Lightroom operations
pub type Result<T> = std::result::Result<T, LightroomError>;

impl From<LightroomError> for BridgeError {
    fn from(error: LightroomError) -> Self {
        match error {
            LightroomError::Bridge(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = LightroomError::Api {
            status: 404,
            body: "Asset not found".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Lightroom API error (status 404): Asset not found"
        );
        assert_eq!(error.status(), Some(404));
        assert!(!error.is_unauthorized());
    }

    #[test]
    fn test_error_conversion() {
        let bridge: BridgeError = LightroomError::Closed.into();
        assert!(matches!(bridge, BridgeError::OperationFailed(_)));

        let timeout: BridgeError = LightroomError::Bridge(BridgeError::Timeout("t".into())).into();
        assert!(matches!(timeout, BridgeError::Timeout(_)));
    }
}

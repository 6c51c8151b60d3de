//! Error types for source resolution

use pxmarchive::ExtractionError;
use pxmcache::{AcquisitionError, BundleError};

/// Result type alias for resolution operations
pub type Result<T> = std::result::Result<T, ResolutionError>;

/// Errors that can occur while turning a source descriptor into a local file
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    /// The service refused or could not serve the lookup (401/403/429/5xx,
    /// malformed answer, or no client configured for this kind)
    #[error("Service unavailable for {source_id}: {message}")]
    ServiceUnavailable {
        source_id: String,
        status: Option<u16>,
        message: String,
    },

    /// The service does not know the identifier, or offers nothing playable
    #[error("Not found: {source_id}: {message}")]
    NotFound { source_id: String, message: String },

    /// The lookup exceeded its timeout
    #[error("Lookup timed out for {source_id}")]
    Timeout { source_id: String },

    /// Transport failure during the lookup
    #[error("Network error during lookup of {source_id}: {message}")]
    Network { source_id: String, message: String },

    /// Downloading the resolved asset failed
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    /// Unpacking a downloaded bundle failed
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl ResolutionError {
    /// Map an HTTP status returned by a service
    pub fn from_status_code(source_id: &str, status: u16, message: impl Into<String>) -> Self {
        match status {
            404 | 410 => Self::NotFound {
                source_id: source_id.to_string(),
                message: message.into(),
            },
            _ => Self::ServiceUnavailable {
                source_id: source_id.to_string(),
                status: Some(status),
                message: message.into(),
            },
        }
    }

    /// Classify a transport error from reqwest
    pub fn from_reqwest(source_id: &str, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                source_id: source_id.to_string(),
            }
        } else if error.is_decode() {
            Self::unavailable(source_id, format!("invalid response: {error}"))
        } else {
            Self::Network {
                source_id: source_id.to_string(),
                message: error.to_string(),
            }
        }
    }

    pub fn unavailable(source_id: &str, message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            source_id: source_id.to_string(),
            status: None,
            message: message.into(),
        }
    }

    pub fn not_found(source_id: &str, message: impl Into<String>) -> Self {
        Self::NotFound {
            source_id: source_id.to_string(),
            message: message.into(),
        }
    }

    /// Whether trying again later may succeed
    ///
    /// Extraction failures are terminal: the archive itself is bad.
    pub fn is_retryable(&self) -> bool {
        match self {
            ResolutionError::ServiceUnavailable { .. }
            | ResolutionError::NotFound { .. }
            | ResolutionError::Timeout { .. }
            | ResolutionError::Network { .. } => true,
            ResolutionError::Acquisition(e) => e.is_retryable(),
            ResolutionError::Extraction(_) => false,
        }
    }

    /// Check if this is a service-side failure (as opposed to transport)
    pub fn is_service_error(&self) -> bool {
        matches!(
            self,
            ResolutionError::ServiceUnavailable { .. } | ResolutionError::NotFound { .. }
        )
    }
}

impl From<BundleError> for ResolutionError {
    fn from(e: BundleError) -> Self {
        match e {
            BundleError::Acquisition(e) => ResolutionError::Acquisition(e),
            BundleError::Extraction(e) => ResolutionError::Extraction(e),
        }
    }
}

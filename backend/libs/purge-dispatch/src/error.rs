//! Error types for purge dispatch operations

use thiserror::Error;

/// Purge dispatch errors
#[derive(Error, Debug)]
pub enum PurgeError {
    /// Connection, timeout or protocol error from the HTTP client
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL expression or edge address could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Value cannot be carried in an HTTP header
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    /// Environment configuration could not be loaded
    #[error("Environment error: {0}")]
    Environment(#[from] envy::Error),

    /// Remote end answered with a non-2xx status
    #[error("Unexpected status {status} from {target}")]
    UnexpectedStatus { target: String, status: u16 },

    /// Remote end answered 2xx but the body was not what we expect
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Vendor reported a systemic fault (bad credentials, unknown service)
    #[error("Vendor fault: {0}")]
    VendorFault(String),

    /// No usable backend or invalid settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Request task panicked before reporting an outcome
    #[error("Request panicked: {0}")]
    Panicked(String),
}

impl PurgeError {
    /// True when the error means the purger cannot function at all
    pub fn is_configuration(&self) -> bool {
        matches!(self, PurgeError::Configuration(_) | PurgeError::Environment(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PurgeError::VendorFault("Record not found".to_string());
        assert_eq!(err.to_string(), "Vendor fault: Record not found");

        let err = PurgeError::UnexpectedStatus {
            target: "http://10.0.0.1/tags".to_string(),
            status: 503,
        };
        assert_eq!(
            err.to_string(),
            "Unexpected status 503 from http://10.0.0.1/tags"
        );
    }

    #[test]
    fn test_error_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json");
        assert!(json_err.is_err());

        let err: PurgeError = json_err.unwrap_err().into();
        assert!(matches!(err, PurgeError::Serialization(_)));
    }

    #[test]
    fn test_error_from_url() {
        let err: PurgeError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, PurgeError::InvalidUrl(_)));
    }

    #[test]
    fn test_is_configuration() {
        assert!(PurgeError::Configuration("no backend".into()).is_configuration());
        assert!(!PurgeError::VendorFault("bad token".into()).is_configuration());
        assert!(!PurgeError::MalformedResponse("empty".into()).is_configuration());
    }
}

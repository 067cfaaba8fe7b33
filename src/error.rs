use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Secret '{name}' not found in project '{scope}'")]
    SecretNotFound { name: String, scope: String },

    #[error("Access denied to secret '{name}' in project '{scope}'")]
    AccessDenied { name: String, scope: String },

    #[error("Secret '{name}' does not hold valid UTF-8 text")]
    InvalidSecretPayload { name: String },

    #[error("Google Ads authentication failed: {message}")]
    Authentication { message: String },

    #[error("Request with ID '{request_id}' failed with status {status}: {message}")]
    Query {
        request_id: String,
        status: String,
        message: String,
    },

    #[error("Failed to write {location}: {message}")]
    StorageWrite { location: String, message: String },

    #[error("Data source '{source_name}' is disabled")]
    SourceDisabled { source_name: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse URL: {0}")]
    UrlParsingFailed(#[from] url::ParseError),

    #[error("JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the fault originated in the Google Ads API rather than in our own plumbing.
    pub fn is_ads_api(&self) -> bool {
        matches!(self, Error::Query { .. } | Error::Authentication { .. })
    }

    /// Name of the concrete error kind, logged for unclassified failures.
    pub fn type_name(&self) -> &'static str {
        match self {
            Error::SecretNotFound { .. } => "SecretNotFound",
            Error::AccessDenied { .. } => "AccessDenied",
            Error::InvalidSecretPayload { .. } => "InvalidSecretPayload",
            Error::Authentication { .. } => "AuthenticationError",
            Error::Query { .. } => "QueryError",
            Error::StorageWrite { .. } => "StorageWriteError",
            Error::SourceDisabled { .. } => "SourceDisabled",
            Error::Http(_) => "reqwest::Error",
            Error::UrlParsingFailed(_) => "url::ParseError",
            Error::Serialization(_) => "serde_json::Error",
            Error::Io(_) => "std::io::Error",
        }
    }
}

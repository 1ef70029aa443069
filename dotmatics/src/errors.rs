use http::StatusCode;

/// Result type alias for Dotmatics client operations
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Errors that can occur while querying the Dotmatics API
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// The server answered with anything but 200.
    #[error("GET request failed. HTTP status code: {}. {reason}", .status.as_u16())]
    Request { status: StatusCode, reason: String },

    #[error("no data source named {0} in project")]
    DataSourceNotFound(String),

    #[error("data source name {name} matches {count} entries in project")]
    AmbiguousDataSource { name: String, count: usize },

    #[error("unexpected response shape: {0}")]
    MalformedResponse(String),

    #[error("invalid request url: {0}")]
    InvalidUrl(String),

    #[error("HTTP client error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ClientError {
    pub(crate) fn from_status(status: StatusCode) -> Self {
        ClientError::Request {
            status,
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        }
    }

    /// The HTTP status of a failed request, if the failure came from the server.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Request { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status(),
            _ => None,
        }
    }
}

/// Failures reported by the collaborators the recorder talks to
/// (snapshot provider, interaction observers, the hosting platform).
#[derive(thiserror::Error, Debug, Clone)]
pub enum BackendError {
    #[error("No extension connected")]
    NotConnected,

    #[error("Connection lost")]
    ConnectionLost,

    #[error("Timeout: {operation}")]
    Timeout { operation: String },

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Serialization(err.to_string())
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckError {
    // Local guards, raised before anything is sent
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Unsupported document '{file_name}': only PDF files are accepted")]
    Format { file_name: String },

    #[error("Invalid option: {message}")]
    InvalidOption { message: String },

    #[error("A check is already in progress")]
    Busy,

    // Verification service errors
    #[error("Credential rejected by the verification service (HTTP {status})")]
    Auth { status: u16 },

    #[error("Verification service rejected the request (HTTP {status}): {message}")]
    Validation { status: u16, message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    // Credential store errors
    #[error("Failed to load credentials from '{path}': {source}")]
    StoreLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to save credentials to '{path}': {source}")]
    StoreSave {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CheckError {
    pub fn configuration(message: impl Into<String>) -> Self {
        CheckError::Configuration {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        CheckError::Transport {
            message: message.into(),
        }
    }

    /// Message shown to the user. Service-side failures collapse into one
    /// generic line; the variant itself is only logged.
    pub fn user_message(&self) -> String {
        match self {
            CheckError::Auth { .. } | CheckError::Validation { .. } | CheckError::Transport { .. } => {
                format!("Verification failed: {}", self)
            }
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for CheckError {
    fn from(err: std::io::Error) -> Self {
        CheckError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CheckError {
    fn from(err: serde_json::Error) -> Self {
        CheckError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for CheckError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CheckError::Transport {
                message: format!("request timed out: {}", err),
            }
        } else {
            CheckError::Transport {
                message: err.to_string(),
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, CheckError>;

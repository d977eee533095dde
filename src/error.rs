use thiserror::Error;

/// Failures the engine can observe. Everything except [ZenError::InvalidSettings] and
/// [ZenError::TogglePending] comes from talking to the remote service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ZenError {
    #[error("remote service unreachable: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("a toggle request is already in flight")]
    TogglePending,

    #[error("engine has been shut down")]
    Shutdown,
}

impl ZenError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    pub fn invalid_settings(message: impl Into<String>) -> Self {
        Self::InvalidSettings(message.into())
    }
}

impl From<ureq::Error> for ZenError {
    fn from(value: ureq::Error) -> Self {
        match value {
            // Body decoding goes through serde_json, every other failure is the network or the
            // server refusing us.
            ureq::Error::Json(e) => Self::Malformed(e.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ZenError {
    fn from(value: serde_json::Error) -> Self {
        Self::Malformed(value.to_string())
    }
}

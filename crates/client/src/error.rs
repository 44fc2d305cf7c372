use parley_relay::RelayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("relay error: {0}")]
    Relay(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] RelayError),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("not connected to the relay")]
    NotConnected,
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error("not signed in")]
    NotAuthenticated,
    #[error("message content is empty")]
    EmptyMessage,
}

impl ClientError {
    /// HTTP status of an API rejection, if that is what this is.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

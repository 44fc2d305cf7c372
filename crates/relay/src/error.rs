use thiserror::Error;

use crate::presence::ConnectionId;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("malformed frame: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
    #[error("outbound queue of connection {0} is full")]
    Full(ConnectionId),
}

use crate::connection::ConnectionState;

/// Errors surfaced by the room connection.
///
/// Transport and decode errors are reported and survived; only
/// [`ClientError::Exhausted`] ends automatic recovery.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("cannot connect while {0}")]
    InvalidState(ConnectionState),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed frame: {0}")]
    Decode(String),

    #[error("gave up after {attempts} reconnect attempts")]
    Exhausted { attempts: u32 },

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("room client has shut down")]
    ClientClosed,
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<std::str::Utf8Error> for ClientError {
    fn from(err: std::str::Utf8Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

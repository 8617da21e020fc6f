//! Errors.

use crate::messages::PgErrorMsg;

/// Various errors.
#[derive(Debug, PartialEq, Clone)]
pub enum Error {
    SocketError(String),
    ProtocolSyncError(String),
    ParseBytesError(String),
    UnsupportedMessageType(u8),
    UnsupportedAuthentication(i32),
    AuthError(String),
    ScramClientError(String),
    ScramServerError(String),
    ServerError(PgErrorMsg),
    BadConfig(String),
    ConnectTimeout,
    PoolExhausted,
    PoolClosed,
    InitializationError(Box<Error>),
    Unsupported(String),
}

impl Error {
    /// Framing and handshake failures: fatal to the connection, never retried.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Error::ProtocolSyncError(_)
                | Error::ParseBytesError(_)
                | Error::UnsupportedMessageType(_)
                | Error::UnsupportedAuthentication(_)
                | Error::ScramClientError(_)
                | Error::ScramServerError(_)
        )
    }

    /// The ErrorResponse sent by the server, if that is what this error is.
    pub fn server_error(&self) -> Option<&PgErrorMsg> {
        match self {
            Error::ServerError(msg) => Some(msg),
            Error::InitializationError(cause) => cause.server_error(),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self {
            Error::SocketError(msg) => write!(f, "Socket connection error: {msg}"),
            Error::ProtocolSyncError(msg) => write!(f, "Protocol synchronization error: {msg}"),
            Error::ParseBytesError(msg) => write!(f, "Failed to parse bytes: {msg}"),
            Error::UnsupportedMessageType(code) => {
                write!(f, "Unsupported message type: {}", *code as char)
            }
            Error::UnsupportedAuthentication(code) => {
                write!(f, "Unsupported authentication data type: {code}")
            }
            Error::AuthError(msg) => write!(f, "Authentication failed: {msg}"),
            Error::ScramClientError(msg) => write!(f, "SCRAM client error: {msg}"),
            Error::ScramServerError(msg) => write!(f, "SCRAM server error: {msg}"),
            Error::ServerError(msg) => write!(f, "{msg}"),
            Error::BadConfig(msg) => write!(f, "Configuration error: {msg}"),
            Error::ConnectTimeout => write!(f, "Timed out while connecting to the server"),
            Error::PoolExhausted => write!(f, "Timed out waiting for an idle connection"),
            Error::PoolClosed => write!(f, "Connection pool is closed"),
            Error::InitializationError(cause) => {
                write!(f, "Connection pool initialization failed: {cause}")
            }
            Error::Unsupported(msg) => write!(f, "Unsupported operation: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

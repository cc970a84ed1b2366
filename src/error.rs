//! Error types for the Oracle thin driver.

use crate::protocol::constants::*;
use std::io;
use std::panic::Location;
use thiserror::Error;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A single failed iteration from an `executemany` call in batch-errors mode.
#[derive(Debug, Clone)]
pub struct BatchError {
    /// Zero-based iteration offset of the failed row.
    pub offset: u32,
    /// Oracle error code.
    pub code: u32,
    /// Error message, when the server supplied one.
    pub message: String,
}

/// Error type for Oracle thin driver operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during network communication.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Misuse of the driver API or a client-side protocol violation.
    #[error("interface error: {message}")]
    Interface { message: String },

    /// Oracle database error.
    #[error("ORA-{code:05}: {message}")]
    Database {
        code: u32,
        message: String,
        /// Offset into the SQL text where the error was detected, if any.
        offset: u16,
        is_warning: bool,
    },

    /// Integrity constraint violation (classified subset of database errors).
    #[error("ORA-{code:05}: {message}")]
    Integrity { code: u32, message: String },

    /// Data error (classified subset of database errors).
    #[error("ORA-{code:05}: {message}")]
    Data { code: u32, message: String },

    /// Operation valid for the protocol but not supported by this driver.
    #[error("not supported: {feature}")]
    NotSupported { feature: &'static str },

    /// Connection refused by the listener.
    #[error("connection refused: {message}")]
    ConnectionRefused { message: String },

    /// Invalid service name.
    #[error("invalid service name: {service_name}")]
    InvalidServiceName { service_name: String },

    /// Invalid SID.
    #[error("invalid SID: {sid}")]
    InvalidSid { sid: String },

    /// Server protocol version below the supported minimum.
    #[error("server version not supported (minimum required: {min_version})")]
    ServerVersionNotSupported { min_version: u16 },

    /// Authentication failed.
    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Unsupported verifier type.
    #[error("unsupported verifier type: {verifier_type:#x}")]
    UnsupportedVerifierType { verifier_type: u32 },

    /// Invalid server response during authentication.
    #[error("invalid server response during authentication")]
    InvalidServerResponse,

    /// Protocol error.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Unexpected packet type received.
    #[error("unexpected packet type: expected {expected}, got {actual}")]
    UnexpectedPacketType { expected: u8, actual: u8 },

    /// Connection closed (peer EOF or forced close after a fatal error).
    #[error("connection closed")]
    ConnectionClosed,

    /// The message decoder ran out of packet data; the caller should
    /// receive another packet and replay from its restore point.
    #[error("out of packet data: need {needed} bytes, have {available} at {location}")]
    OutOfPackets {
        needed: usize,
        available: usize,
        location: &'static Location<'static>,
    },

    /// A call exceeded the configured call timeout and was broken off.
    #[error("call timeout of {timeout_ms} ms exceeded")]
    CallTimeout { timeout_ms: u64 },

    /// An in-flight call was cancelled by an external break.
    #[error("call cancelled by break")]
    CallCancelled,

    /// Type conversion error.
    #[error("type conversion error: {message}")]
    TypeConversion { message: String },

    /// Column not found.
    #[error("column not found: {name}")]
    ColumnNotFound { name: String },

    /// Column index out of bounds.
    #[error("column index {index} out of bounds (columns: {count})")]
    ColumnIndexOutOfBounds { index: usize, count: usize },

    /// Invalid connect string.
    #[error("invalid connect string: {message}")]
    InvalidConnectString { message: String },

    /// Unsupported Oracle data type.
    #[error("unsupported Oracle data type: {type_num}")]
    UnsupportedType { type_num: u8 },

    /// Connection timed out during TCP connect.
    #[error("connection to {host}:{port} timed out after {timeout:?}")]
    ConnectionTimeout {
        host: String,
        port: u16,
        timeout: std::time::Duration,
    },

    /// HTTPS CONNECT proxy rejected the tunnel request.
    #[error("proxy tunnel to {host}:{port} failed: {message}")]
    ProxyFailure {
        host: String,
        port: u16,
        message: String,
    },

    /// TLS handshake or renegotiation failure.
    #[error("TLS error: {message}")]
    Tls { message: String },

    /// DNS resolution failed.
    #[error("failed to resolve hostname '{hostname}': {message}")]
    DnsResolutionFailed { hostname: String, message: String },

    /// Pool exhausted under the NOWAIT or TIMEDWAIT get mode.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// Pool has been closed.
    #[error("connection pool closed")]
    PoolClosed,

    /// SQL statement ends with a terminator the protocol refuses.
    #[error("statement ends with an unsupported terminator '{terminator}'")]
    TrailingStatementTerminator { terminator: char },
}

impl Error {
    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create an interface error.
    pub fn interface(message: impl Into<String>) -> Self {
        Self::Interface {
            message: message.into(),
        }
    }

    /// Create a type conversion error.
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion {
            message: message.into(),
        }
    }

    /// Classify a server error code into the proper error kind.
    pub fn from_server(code: u32, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            TNS_ERR_UNIQUE_CONSTRAINT_VIOLATED
            | TNS_ERR_CHECK_CONSTRAINT_VIOLATED
            | TNS_ERR_PARENT_KEY_NOT_FOUND
            | TNS_ERR_CHILD_RECORD_FOUND => Self::Integrity { code, message },
            TNS_ERR_INCONSISTENT_DATA_TYPES => Self::Data { code, message },
            _ => Self::Database {
                code,
                message,
                offset: 0,
                is_warning: false,
            },
        }
    }

    /// Oracle error code carried by this error, if any.
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::Database { code, .. }
            | Self::Integrity { code, .. }
            | Self::Data { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether this error means the session is dead and the socket useless.
    pub fn is_session_dead(&self) -> bool {
        match self.code() {
            Some(code) => SESSION_DEAD_ERROR_CODES.contains(&code),
            None => matches!(self, Self::ConnectionClosed | Self::Io(_)),
        }
    }

    /// Whether the decoder ran out of packets (resumable condition).
    pub fn is_out_of_packets(&self) -> bool {
        matches!(self, Self::OutOfPackets { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_classification() {
        let err = Error::from_server(1, "unique constraint violated");
        assert!(matches!(err, Error::Integrity { code: 1, .. }));

        let err = Error::from_server(932, "inconsistent datatypes");
        assert!(matches!(err, Error::Data { code: 932, .. }));

        let err = Error::from_server(1017, "invalid username/password");
        assert!(matches!(err, Error::Database { code: 1017, .. }));
    }

    #[test]
    fn test_session_dead() {
        assert!(Error::from_server(3113, "end-of-file").is_session_dead());
        assert!(Error::from_server(12571, "packet writer failure").is_session_dead());
        assert!(!Error::from_server(1017, "bad login").is_session_dead());
        assert!(Error::ConnectionClosed.is_session_dead());
    }

    #[test]
    fn test_error_display() {
        let err = Error::from_server(942, "table or view does not exist");
        assert_eq!(
            err.to_string(),
            "ORA-00942: table or view does not exist"
        );
    }
}

use std::io;
use thiserror::Error;

/// Custom error types for the dispatcher and its host tools
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Worker error: {0}")]
    Worker(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new registration error
    pub fn registration(msg: impl Into<String>) -> Self {
        Error::Registration(msg.into())
    }

    /// Creates a new protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Creates a new worker error
    pub fn worker(msg: impl Into<String>) -> Self {
        Error::Worker(msg.into())
    }
}

/// Error codes reported to the remote peer in `ERROR` frames.
///
/// Every recoverable failure on the link ends up as one of these, pushed onto
/// an error queue and serialized as a signed decimal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    #[error("message allocation failed")]
    MemAlloc = -1,

    #[error("message parsing failed")]
    MessageParsing = -2,

    #[error("malformed message")]
    MalformedMessage = -3,

    #[error("message buffer too small")]
    MessageBufTooSmall = -4,

    #[error("unknown message type")]
    UnknownMessageType = -5,

    #[error("bad checksum on received frame")]
    RxChecksum = -6,

    #[error("transmit buffer full")]
    TxBufferFull = -7,

    #[error("receive buffer full")]
    RxBufferFull = -8,

    #[error("message formatting failed")]
    MessageFormatting = -9,

    #[error("message routing failed")]
    MessageRouting = -10,

    #[error("incoming message too long")]
    IncomingMessageTooLong = -11,

    #[error("unknown subsystem")]
    UnknownSubsystem = -12,

    #[error("missing message handler")]
    MissingMessageHandler = -13,
}

impl ErrorCode {
    /// All codes, in wire order
    pub const ALL: [ErrorCode; 13] = [
        ErrorCode::MemAlloc,
        ErrorCode::MessageParsing,
        ErrorCode::MalformedMessage,
        ErrorCode::MessageBufTooSmall,
        ErrorCode::UnknownMessageType,
        ErrorCode::RxChecksum,
        ErrorCode::TxBufferFull,
        ErrorCode::RxBufferFull,
        ErrorCode::MessageFormatting,
        ErrorCode::MessageRouting,
        ErrorCode::IncomingMessageTooLong,
        ErrorCode::UnknownSubsystem,
        ErrorCode::MissingMessageHandler,
    ];

    /// Returns the signed value sent on the wire
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> i32 {
        code.code()
    }
}

impl TryFrom<i32> for ErrorCode {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        ErrorCode::ALL
            .iter()
            .copied()
            .find(|code| code.code() == value)
            .ok_or_else(|| Error::protocol(format!("Unknown error code {}", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::registration("table full");
        assert!(matches!(err, Error::Registration(_)));
        assert_eq!(err.to_string(), "Registration error: table full");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::Other, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_wire_codes() {
        assert_eq!(ErrorCode::RxChecksum.code(), -6);
        assert_eq!(ErrorCode::TxBufferFull.code(), -7);
        assert_eq!(ErrorCode::MessageFormatting.code(), -9);
        assert_eq!(ErrorCode::MissingMessageHandler.code(), -13);

        for code in ErrorCode::ALL {
            assert_eq!(ErrorCode::try_from(code.code()).unwrap(), code);
        }
        assert!(ErrorCode::try_from(0).is_err());
    }
}

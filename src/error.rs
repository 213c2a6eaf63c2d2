//! Error types for the FedRound node
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Retryable/fatal classification used by the sender and the round loop
//! - Exit codes for CLI
//!
//! A stale contribution is not an error: it is reported through
//! [`AcceptResult::IgnoredWrongRound`](crate::round::AcceptResult) and the
//! matching wire reply.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::RoundNumber;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,
    Serialization = 204,

    // Connection errors (3xx)
    ConnectionFailed = 300,
    ConnectionTimeout = 301,
    ConnectionLost = 303,
    PeerRejected = 304,

    // Protocol errors (4xx)
    ProtocolVersion = 400,
    ProtocolMalformed = 401,
    ProtocolUnexpected = 402,
    MessageTooLarge = 403,
    PeerProtocol = 404,

    // Round errors (5xx)
    InsufficientQuorum = 500,
    RoundCancelled = 501,

    // Aggregation errors (6xx)
    EmptyInput = 600,
    ShapeMismatch = 601,

    // Training errors (7xx)
    TrainingFailed = 700,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Connection errors
            400..=499 => 40, // Protocol errors
            500..=599 => 50, // Round errors
            600..=699 => 60, // Aggregation errors
            700..=799 => 70, // Training errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the node
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Connection Errors
    // ─────────────────────────────────────────────────────────────

    /// Could not reach a peer
    #[error("Failed to connect to {endpoint}: {message}")]
    ConnectionFailed { endpoint: String, message: String },

    /// Peer did not answer in time
    #[error("Request to {endpoint} timed out after {timeout_ms}ms")]
    ConnectionTimeout { endpoint: String, timeout_ms: u64 },

    /// Connection dropped mid-exchange
    #[error("Lost connection to {endpoint}: {message}")]
    ConnectionLost { endpoint: String, message: String },

    /// Peer answered with an explicit error
    #[error("Peer {peer} rejected the request: {message}")]
    PeerRejected { peer: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // Protocol Errors
    // ─────────────────────────────────────────────────────────────

    /// Protocol version mismatch
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    ProtocolVersion { expected: String, actual: String },

    /// Malformed message
    #[error("Malformed protocol message: {message}")]
    ProtocolMalformed { message: String },

    /// A well-formed but unexpected message
    #[error("Unexpected {actual} message, expected {expected}")]
    ProtocolUnexpected { expected: String, actual: String },

    /// Frame larger than the transport accepts
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: u64, max: u64 },

    /// Peer answered with a protocol-level error code (E4xx); resending the
    /// same request cannot succeed
    #[error("Peer {peer} could not decode the request ({code}): {message}")]
    PeerProtocol {
        peer: String,
        code: String,
        message: String,
    },

    // ─────────────────────────────────────────────────────────────
    // Round Errors
    // ─────────────────────────────────────────────────────────────

    /// Quorum was not reached and the timeout policy gave up on the round
    #[error("Insufficient quorum in round {round}: {accepted} of {required} peer contributions")]
    InsufficientQuorum {
        round: RoundNumber,
        accepted: usize,
        required: usize,
    },

    /// Operator interrupted the round loop
    #[error("Round loop cancelled during round {round}")]
    Cancelled { round: RoundNumber },

    // ─────────────────────────────────────────────────────────────
    // Aggregation Errors
    // ─────────────────────────────────────────────────────────────

    /// Aggregation called with no contributions
    #[error("Cannot aggregate an empty set of contributions")]
    EmptyInput,

    /// Contributions disagree on parameter names or shapes
    #[error("Shape mismatch for parameter '{parameter}': {message}")]
    ShapeMismatch { parameter: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // Training Errors
    // ─────────────────────────────────────────────────────────────

    /// Local training collaborator failed
    #[error("Local training failed in round {round}: {source}")]
    TrainingFailed {
        round: RoundNumber,
        #[source]
        source: anyhow::Error,
    },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::Json(_) => ErrorCode::Serialization,

            Error::ConnectionFailed { .. } => ErrorCode::ConnectionFailed,
            Error::ConnectionTimeout { .. } => ErrorCode::ConnectionTimeout,
            Error::ConnectionLost { .. } => ErrorCode::ConnectionLost,
            Error::PeerRejected { .. } => ErrorCode::PeerRejected,

            Error::ProtocolVersion { .. } => ErrorCode::ProtocolVersion,
            Error::ProtocolMalformed { .. } => ErrorCode::ProtocolMalformed,
            Error::ProtocolUnexpected { .. } => ErrorCode::ProtocolUnexpected,
            Error::MessageTooLarge { .. } => ErrorCode::MessageTooLarge,
            Error::PeerProtocol { .. } => ErrorCode::PeerProtocol,

            Error::InsufficientQuorum { .. } => ErrorCode::InsufficientQuorum,
            Error::Cancelled { .. } => ErrorCode::RoundCancelled,

            Error::EmptyInput => ErrorCode::EmptyInput,
            Error::ShapeMismatch { .. } => ErrorCode::ShapeMismatch,

            Error::TrainingFailed { .. } => ErrorCode::TrainingFailed,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is a transient network failure worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectionFailed { .. }
                | Error::ConnectionTimeout { .. }
                | Error::ConnectionLost { .. }
                | Error::PeerRejected { .. }
                | Error::Io(_)
        )
    }

    /// Check if the error is fatal (the round loop must stop)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::ConfigParse { .. }
                | Error::ConfigValidation { .. }
                | Error::EmptyInput
                | Error::ShapeMismatch { .. }
                | Error::TrainingFailed { .. }
                | Error::Internal(_)
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'fedround-node config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'fedround-node config validate' to see details."
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration file and fix the invalid values."
            ),

            Error::ConnectionFailed { .. } => Some(
                "Check that the peer is running and that its host and port in [[peers]] are correct."
            ),
            Error::ConnectionTimeout { .. } => Some(
                "The peer may be overloaded or unreachable. Consider raising sender.attempt_timeout_ms."
            ),

            Error::ProtocolVersion { .. } | Error::PeerProtocol { .. } => Some(
                "All peers must run a compatible release. Run 'fedround-node version' on each node."
            ),

            Error::InsufficientQuorum { .. } => Some(
                "Too few peers contributed before the round timeout. Check peer connectivity or use round.timeout_policy = \"retry_same_round\"."
            ),
            Error::EmptyInput | Error::ShapeMismatch { .. } => Some(
                "Peers disagree on the model layout. Make sure every node trains the same architecture."
            ),
            Error::TrainingFailed { .. } => Some(
                "Inspect the training settings in the [training] section and the log output above."
            ),

            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        let code = self.code();
        format!("[{}] {}", code.as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors (for ergonomic error creation)
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound { path: path.into() }
    }

    /// Create a config parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Error::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config validation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a connection failed error
    pub fn connection_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConnectionFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a connection timeout error
    pub fn connection_timeout(endpoint: impl Into<String>, timeout_ms: u64) -> Self {
        Error::ConnectionTimeout {
            endpoint: endpoint.into(),
            timeout_ms,
        }
    }

    /// Create a malformed protocol message error
    pub fn protocol_malformed(message: impl Into<String>) -> Self {
        Error::ProtocolMalformed {
            message: message.into(),
        }
    }

    /// Create a shape mismatch error
    pub fn shape_mismatch(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ShapeMismatch {
            parameter: parameter.into(),
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

//! Error types for the scene tracker.
//!
//! A single [`TrackerError`] enum covers every failure kind the service
//! distinguishes, built on [`thiserror`] for `Display`/`Error` derivation.
//!
//! Per-message failures (schema, parse, routing) stay local to the message
//! handler: they are logged and counted, never propagated. Registry and
//! configuration failures are fatal at startup. Bus failures carry a
//! retryable/permanent classification that decides the process exit code.

use thiserror::Error;

/// A specialized `Result` type for tracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Unified error type for the scene tracker service.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TrackerError {
    /// Configuration file, schema, or environment override problem
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error
        message: String,
    },

    /// Inbound payload rejected by schema validation
    #[error("Schema validation failed at '{path}': {message}")]
    SchemaValidation {
        /// JSON pointer to the offending document location
        path: String,
        /// What the schema expected
        message: String,
    },

    /// Malformed JSON or missing required field
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parse failure
        message: String,
    },

    /// Unknown camera or invalid topic segment
    #[error("Routing error: {message}")]
    Routing {
        /// Description of the routing failure
        message: String,
    },

    /// A camera is registered to more than one scene
    #[error("Camera '{camera_id}' is assigned to multiple scenes: '{scene_a}' and '{scene_b}'")]
    DuplicateCamera {
        /// The camera appearing twice
        camera_id: String,
        /// Scene that registered the camera first
        scene_a: String,
        /// Scene that attempted the second registration
        scene_b: String,
    },

    /// Transient bus failure; reconnect/retry is expected to succeed
    #[error("Bus transient failure: {message}")]
    BusTransient {
        /// Description of the transient failure
        message: String,
    },

    /// Permanent bus failure (authentication, protocol); retrying is futile
    #[error("Bus permanent failure: {message}")]
    BusPermanent {
        /// Description of the permanent failure
        message: String,
    },

    /// Shutdown was requested while the operation was in progress
    #[error("Shutdown requested")]
    ShutdownRequested,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackerError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a new schema validation error.
    #[must_use]
    pub fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaValidation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new parse error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates a new routing error.
    #[must_use]
    pub fn routing(message: impl Into<String>) -> Self {
        Self::Routing {
            message: message.into(),
        }
    }

    /// Creates a new transient bus error.
    #[must_use]
    pub fn bus_transient(message: impl Into<String>) -> Self {
        Self::BusTransient {
            message: message.into(),
        }
    }

    /// Creates a new permanent bus error.
    #[must_use]
    pub fn bus_permanent(message: impl Into<String>) -> Self {
        Self::BusPermanent {
            message: message.into(),
        }
    }

    /// Returns `true` if retrying the failed operation can succeed.
    ///
    /// Drives the process exit-code policy: transient failures exit 1 so
    /// the supervisor restarts the service, permanent failures exit 0 so
    /// it does not.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::BusTransient { .. } | Self::Io(_) => true,
            Self::Config { .. }
            | Self::SchemaValidation { .. }
            | Self::Parse { .. }
            | Self::Routing { .. }
            | Self::DuplicateCamera { .. }
            | Self::BusPermanent { .. }
            | Self::ShutdownRequested => false,
        }
    }

    /// Short machine-readable kind tag, used in structured log `error.type`
    /// fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config_error",
            Self::SchemaValidation { .. } => "schema_validation",
            Self::Parse { .. } => "parse_error",
            Self::Routing { .. } => "routing_error",
            Self::DuplicateCamera { .. } => "duplicate_camera",
            Self::BusTransient { .. } => "bus_transient",
            Self::BusPermanent { .. } => "bus_permanent",
            Self::ShutdownRequested => "shutdown_requested",
            Self::Io(_) => "io_error",
        }
    }
}

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Environment not ready: call reset() first")]
    NotReady,

    #[error("Environment is closed")]
    Closed,

    #[error("Render mode unavailable: {0}")]
    RenderUnavailable(String),

    #[error("Batch size mismatch: expected {expected} actions, got {got}")]
    BatchSize { expected: usize, got: usize },

    #[error("Slot {index} out of range for {len} environments")]
    SlotOutOfRange { index: usize, len: usize },

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("World directory was not set; provide one or seed the environment")]
    MissingWorldDir,

    #[error("Config path was not set; provide one or seed the environment")]
    MissingConfigPath,

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Invalid config key: {0:?}")]
    InvalidKey(String),

    #[error("Malformed config line {line}: {content:?}")]
    Parse { line: usize, content: String },

    #[error("Resource collision on {resource}: {value} assigned twice")]
    Collision { resource: &'static str, value: u64 },

    #[error("Explicit {0} cannot be shared between instances")]
    SharedPath(&'static str),
}

/// Wire encoding and decoding errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("CBOR error: {0}")]
    Cbor(#[from] serde_cbor::Error),

    #[error("Truncated message: needed {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("Image size mismatch: {width}x{height}x3 needs {expected} bytes, got {got}")]
    ImageSize {
        width: u32,
        height: u32,
        expected: usize,
        got: usize,
    },

    #[error("Key id {0} appears more than once in one message")]
    DuplicateKey(u32),
}

/// Transport (reply channel) errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Cannot {attempted} in state {state}")]
    OutOfOrder {
        state: &'static str,
        attempted: &'static str,
    },

    #[error("Peer closed the connection")]
    PeerClosed,

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Process spawn and supervision errors.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Filesystem provisioning errors.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{kind} mods must be located at {path}")]
    MissingModRoot { kind: &'static str, path: PathBuf },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl ProvisionError {
    /// Attach a path to an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised when the external process drifts out of lock-step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Echoed action does not match the action sent: sent {sent}, echoed {echoed}")]
    EchoMismatch { sent: String, echoed: String },

    #[error("Image shape changed: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: (u32, u32, u32),
        got: (u32, u32, u32),
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_error_from_config_error() {
        let err: BridgeError = ConfigError::MissingWorldDir.into();
        assert!(matches!(err, BridgeError::Config(_)));
        assert!(err.to_string().contains("World directory"));
    }

    #[test]
    fn bridge_error_from_protocol_error() {
        let err: BridgeError = ProtocolError::EchoMismatch {
            sent: "a".into(),
            echoed: "b".into(),
        }
        .into();
        assert!(matches!(err, BridgeError::Protocol(_)));
    }

    #[test]
    fn provision_error_wraps_config_error() {
        let err: ProvisionError = ConfigError::MissingConfigPath.into();
        assert!(matches!(err, ProvisionError::Config(ConfigError::MissingConfigPath)));
    }

    #[test]
    fn transport_error_display_messages() {
        assert_eq!(
            TransportError::OutOfOrder {
                state: "awaiting_request",
                attempted: "send",
            }
            .to_string(),
            "Cannot send in state awaiting_request"
        );
        assert_eq!(
            TransportError::PayloadTooLarge { size: 10, max: 5 }.to_string(),
            "Payload too large: 10 bytes (max 5)"
        );
    }

    #[test]
    fn codec_error_display_messages() {
        assert_eq!(
            CodecError::ImageSize {
                width: 2,
                height: 2,
                expected: 12,
                got: 11,
            }
            .to_string(),
            "Image size mismatch: 2x2x3 needs 12 bytes, got 11"
        );
        assert_eq!(
            CodecError::DuplicateKey(4).to_string(),
            "Key id 4 appears more than once in one message"
        );
    }

    #[test]
    fn config_error_display_messages() {
        assert_eq!(
            ConfigError::InvalidValue {
                field: "env_port".into(),
                message: "must be non-zero".into()
            }
            .to_string(),
            "Invalid value for env_port: must be non-zero"
        );
        assert_eq!(
            ConfigError::Collision {
                resource: "env_port",
                value: 5555
            }
            .to_string(),
            "Resource collision on env_port: 5555 assigned twice"
        );
    }

    #[test]
    fn protocol_error_is_clone_eq() {
        let err = ProtocolError::ShapeMismatch {
            expected: (4, 4, 3),
            got: (2, 2, 3),
        };
        assert_eq!(err.clone(), err);
    }
}

//! Error types for channel processing.
//!
//! Most protocol trouble on an ANT channel is transient (search timeouts,
//! RX failures, collisions) and is handled inside the state machine without
//! ever surfacing here. What remains are:
//!
//! - **Frame Errors**: inbound bytes that are not a well-formed ANT frame
//! - **Protocol Errors**: events that should never reach a receive channel
//! - **Configuration Errors**: invalid or unreadable YAML configuration
//! - **Transport Errors**: failures reported by the integration layer
//!
//! ```rust
//! use crankset::AntError;
//!
//! let error = AntError::checksum(0x12, 0x34);
//! assert!(error.is_recoverable());
//! ```

use thiserror::Error;

/// Result type alias for channel operations.
pub type Result<T, E = AntError> = std::result::Result<T, E>;

/// Main error type for channel operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AntError {
    #[error("Frame too short: {len} bytes")]
    FrameTooShort { len: usize },

    #[error("Bad sync byte {found:#04x}")]
    BadSync { found: u8 },

    #[error("Frame declares {declared} payload bytes but carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Checksum mismatch: expected {expected:#04x}, found {found:#04x}")]
    Checksum { expected: u8, found: u8 },

    #[error("Acknowledged data event on receive channel {channel}")]
    UnexpectedAcknowledged { channel: u8 },

    #[error("Configuration error in {context}: {details}")]
    Config { context: String, details: String },

    #[error("Transport error: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl AntError {
    /// Returns whether processing can continue after this error.
    ///
    /// Malformed frames and protocol surprises only affect a single message;
    /// configuration problems need operator attention.
    pub fn is_recoverable(&self) -> bool {
        match self {
            AntError::FrameTooShort { .. } => true,
            AntError::BadSync { .. } => true,
            AntError::LengthMismatch { .. } => true,
            AntError::Checksum { .. } => true,
            AntError::UnexpectedAcknowledged { .. } => true,
            AntError::Transport { .. } => true,
            AntError::Config { .. } => false,
            AntError::Io(_) => false,
        }
    }

    /// Whether the error describes bytes that never formed a valid frame.
    pub fn is_malformed_frame(&self) -> bool {
        matches!(
            self,
            AntError::FrameTooShort { .. }
                | AntError::BadSync { .. }
                | AntError::LengthMismatch { .. }
                | AntError::Checksum { .. }
        )
    }

    /// Helper constructor for checksum failures.
    pub fn checksum(expected: u8, found: u8) -> Self {
        AntError::Checksum { expected, found }
    }

    /// Helper constructor for configuration errors.
    pub fn config(context: impl Into<String>, details: impl Into<String>) -> Self {
        AntError::Config { context: context.into(), details: details.into() }
    }

    /// Helper constructor for transport errors.
    pub fn transport(reason: impl Into<String>) -> Self {
        AntError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        AntError::Transport { reason: reason.into(), source: Some(source) }
    }
}

impl From<serde_yaml_ng::Error> for AntError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        AntError::Config { context: "YAML".to_string(), details: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn messages_carry_their_context(
            expected in any::<u8>(),
            found in any::<u8>(),
            channel in 0u8..8,
            reason in "[a-z ]{1,24}",
        ) {
            let checksum = AntError::checksum(expected, found).to_string();
            let expected_hex = format!("{:#04x}", expected);
            let found_hex = format!("{:#04x}", found);
            prop_assert!(checksum.contains(&expected_hex));
            prop_assert!(checksum.contains(&found_hex));

            let ack = AntError::UnexpectedAcknowledged { channel }.to_string();
            prop_assert!(ack.contains(&channel.to_string()));

            let transport = AntError::transport(reason.clone()).to_string();
            prop_assert!(transport.contains(&reason));
        }
    }

    #[test]
    fn classification() {
        assert!(AntError::FrameTooShort { len: 2 }.is_malformed_frame());
        assert!(AntError::BadSync { found: 0 }.is_recoverable());
        assert!(!AntError::UnexpectedAcknowledged { channel: 0 }.is_malformed_frame());
        assert!(!AntError::config("registry", "empty").is_recoverable());
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<AntError>();
    }

    #[test]
    fn transport_source_chain_is_preserved() {
        let io = std::io::Error::other("serial port vanished");
        let err = AntError::transport_with_source("write failed", Box::new(io));
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("serial port vanished"));
    }

    #[test]
    fn yaml_errors_become_config_errors() {
        let yaml_err = serde_yaml_ng::from_str::<u32>("[not, a, number]").unwrap_err();
        let err: AntError = yaml_err.into();
        assert!(matches!(err, AntError::Config { .. }));
    }
}

use thiserror::Error;

use super::state::EngineState;

/// Errors surfaced by the streaming engine.
///
/// The `Display` text is what the error channel delivers to the caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("audio device not available: {0}")]
    DeviceNotAvailable(String),

    #[error("failed to acquire audio device: {0}")]
    DeviceAcquisitionFailed(String),

    #[error("failed to assign output sink: {0}")]
    SinkAssignmentFailed(String),

    #[error("malformed audio packet: {0}")]
    MalformedPacket(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("cannot {operation} while engine is {state}")]
    InvalidState {
        operation: &'static str,
        state: EngineState,
    },

    #[error("audio stream error: {0}")]
    StreamFailed(String),
}

impl EngineError {
    pub(crate) fn invalid_state(operation: &'static str, state: EngineState) -> Self {
        Self::InvalidState { operation, state }
    }
}

use thiserror::Error;

use voice_stream_core::EngineError;

/// Failures raised by the cpal backend before they cross into the engine.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no default {0} device")]
    NoDefaultDevice(&'static str),

    #[error("{direction} device '{id}' not found")]
    DeviceNotFound { direction: &'static str, id: String },

    #[error("failed to enumerate devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to read device name: {0}")]
    DeviceName(#[from] cpal::DeviceNameError),

    #[error("failed to query stream configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("failed to query default stream config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("unsupported sample format {0}")]
    UnsupportedFormat(String),

    #[error("stream thread: {0}")]
    Thread(String),
}

impl From<BackendError> for EngineError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::NoDefaultDevice(_) | BackendError::DeviceNotFound { .. } => {
                EngineError::DeviceNotAvailable(e.to_string())
            }
            BackendError::Thread(_) => EngineError::StreamFailed(e.to_string()),
            _ => EngineError::DeviceAcquisitionFailed(e.to_string()),
        }
    }
}

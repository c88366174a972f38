use crate::models::audio_models::AudioDevice;
use crate::models::error::EngineError;

/// Lists physical devices and their human-readable labels.
///
/// The engine itself only consumes [`crate::DeviceSelector`]s; this is the
/// collaborator that supplies valid identifiers.
pub trait DeviceEnumerator: Send + Sync {
    fn list_input_devices(&self) -> Result<Vec<AudioDevice>, EngineError>;

    fn list_output_devices(&self) -> Result<Vec<AudioDevice>, EngineError>;
}

pub mod audio_backend;
pub mod device_enumerator;
pub mod engine_delegate;

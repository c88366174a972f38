pub mod gain;
pub mod level_meter;
pub mod pcm_codec;
pub mod resampler;
pub mod sample_ring;
pub mod silence;

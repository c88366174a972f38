use cpal::traits::DeviceTrait;
use cpal::{SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};

use voice_stream_core::Direction;

use crate::error::BackendError;

/// Sample formats the backend converts to and from.
pub fn is_supported_format(format: SampleFormat) -> bool {
    matches!(format, SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16)
}

/// Pick a config range that can run at `preferred_rate`, favoring f32 and
/// then the fewest channels.
fn best_range(
    ranges: impl IntoIterator<Item = SupportedStreamConfigRange>,
    preferred_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    ranges
        .into_iter()
        .filter(|r| is_supported_format(r.sample_format()))
        .filter(|r| r.min_sample_rate().0 <= preferred_rate && preferred_rate <= r.max_sample_rate().0)
        .min_by_key(|r| (r.sample_format() != SampleFormat::F32, r.channels()))
}

/// Stream config for `device`: the preferred rate when the device offers
/// it, otherwise the device default.
pub fn choose_config(
    device: &cpal::Device,
    direction: Direction,
    preferred_rate: u32,
) -> Result<SupportedStreamConfig, BackendError> {
    let ranges: Vec<SupportedStreamConfigRange> = match direction {
        Direction::Input => device.supported_input_configs()?.collect(),
        Direction::Output => device.supported_output_configs()?.collect(),
    };

    if let Some(range) = best_range(ranges, preferred_rate) {
        return Ok(range.with_sample_rate(cpal::SampleRate(preferred_rate)));
    }

    let config = match direction {
        Direction::Input => device.default_input_config()?,
        Direction::Output => device.default_output_config()?,
    };
    log::info!(
        "Device does not offer {} Hz, using default {} Hz",
        preferred_rate,
        config.sample_rate().0
    );
    if !is_supported_format(config.sample_format()) {
        return Err(BackendError::UnsupportedFormat(format!("{:?}", config.sample_format())));
    }
    Ok(config)
}

use std::borrow::Cow;

use crate::models::audio_models::AudioBlock;

/// Box-filter decimation from `from_rate` to `to_rate`.
///
/// Output length is `ceil(len / ratio)` with `ratio = from_rate / to_rate`.
/// Output sample `i` is the mean of input samples in
/// `[round(i * ratio), round((i + 1) * ratio))`. A window that rounds to
/// nothing (only possible when upsampling) holds the nearest input sample.
///
/// Stateless: every call starts a fresh window grid, so the seam between
/// two consecutive blocks is averaged independently.
///
/// Returns the input unchanged (borrowed) when the rates match.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Cow<'_, [f32]> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return Cow::Borrowed(samples);
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = resampled_len(samples.len(), from_rate, to_rate);
    let mut output = Vec::with_capacity(output_len);

    let mut window_start = 0usize;
    for i in 0..output_len {
        let window_end = (((i + 1) as f64 * ratio).round() as usize).min(samples.len());

        let value = if window_end > window_start {
            let window = &samples[window_start..window_end];
            window.iter().sum::<f32>() / window.len() as f32
        } else {
            samples[window_start.min(samples.len() - 1)]
        };
        output.push(value);

        window_start = window_end.max(window_start);
    }

    Cow::Owned(output)
}

/// [`resample`] for a tagged block; the result is tagged with `to_rate`.
pub fn resample_block(block: &AudioBlock, to_rate: u32) -> AudioBlock {
    let samples = resample(&block.samples, block.sample_rate, to_rate).into_owned();
    AudioBlock::new(samples, to_rate)
}

/// Number of samples [`resample`] produces for `len` input samples.
pub fn resampled_len(len: usize, from_rate: u32, to_rate: u32) -> usize {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return len;
    }
    // ceil(len / (from / to)) == ceil(len * to / from), in integers.
    let numerator = len as u64 * to_rate as u64;
    numerator.div_ceil(from_rate as u64) as usize
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Cow<'_, [f32]> {
    if channels <= 1 {
        return Cow::Borrowed(samples);
    }
    let scale = 1.0 / channels as f32;
    Cow::Owned(
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale)
            .collect(),
    )
}

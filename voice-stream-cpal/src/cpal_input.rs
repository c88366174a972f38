//! Microphone capture through cpal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::DeviceTrait;
use cpal::{FromSample, Sample, SizedSample};

use voice_stream_core::processing::resampler::downmix_to_mono;
use voice_stream_core::{
    AudioBufferCallback, CaptureConstraints, DeviceSelector, Direction, EngineError, InputBackend,
    InputStream,
};

use crate::device_enumerator::find_device;
use crate::error::BackendError;
use crate::stream_config::choose_config;
use crate::stream_thread::{StreamInfo, StreamThread};

/// Input backend over the default cpal host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalInputBackend;

impl CpalInputBackend {
    pub fn new() -> Self {
        Self
    }
}

impl InputBackend for CpalInputBackend {
    fn acquire(
        &self,
        selector: &DeviceSelector,
        constraints: &CaptureConstraints,
        callback: AudioBufferCallback,
    ) -> Result<Box<dyn InputStream>, EngineError> {
        log::debug!(
            "Requested capture processing: echo_cancellation={} noise_suppression={} auto_gain_control={} (platform defaults apply)",
            constraints.echo_cancellation,
            constraints.noise_suppression,
            constraints.auto_gain_control
        );

        let enabled = Arc::new(AtomicBool::new(false));
        let selector = selector.clone();
        let preferred_rate = constraints.preferred_rate;
        let gate = Arc::clone(&enabled);

        let (thread, info) = StreamThread::spawn("cpal-input", move || {
            open_input(&selector, preferred_rate, gate, callback)
        })?;

        log::info!(
            "Input '{}' open at {} Hz, {} channel(s)",
            info.device_name,
            info.sample_rate,
            info.channels
        );
        Ok(Box::new(CpalInputStream {
            info,
            enabled,
            thread: Some(thread),
        }))
    }
}

/// A live cpal input stream. Audio reaches the callback only between
/// `start` and `stop`.
pub struct CpalInputStream {
    info: StreamInfo,
    enabled: Arc<AtomicBool>,
    thread: Option<StreamThread>,
}

impl InputStream for CpalInputStream {
    fn sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    fn start(&mut self) -> Result<(), EngineError> {
        if self.thread.is_none() {
            return Err(EngineError::StreamFailed("input stream already released".into()));
        }
        self.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.enabled.store(false, Ordering::SeqCst);
        if let Some(mut thread) = self.thread.take() {
            thread.stop();
            log::debug!("Input '{}' released", self.info.device_name);
        }
    }
}

impl Drop for CpalInputStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_input(
    selector: &DeviceSelector,
    preferred_rate: u32,
    enabled: Arc<AtomicBool>,
    callback: AudioBufferCallback,
) -> Result<(cpal::Stream, StreamInfo), BackendError> {
    let device = find_device(Direction::Input, selector)?;
    let device_name = device.name()?;
    let supported = choose_config(&device, Direction::Input, preferred_rate)?;

    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let info = StreamInfo {
        device_name,
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    };

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_input::<f32>(&device, &config, enabled, callback)?,
        cpal::SampleFormat::I16 => build_input::<i16>(&device, &config, enabled, callback)?,
        cpal::SampleFormat::U16 => build_input::<u16>(&device, &config, enabled, callback)?,
        other => return Err(BackendError::UnsupportedFormat(format!("{:?}", other))),
    };
    Ok((stream, info))
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    enabled: Arc<AtomicBool>,
    callback: AudioBufferCallback,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    let rate = config.sample_rate.0;
    let mut scratch: Vec<f32> = Vec::new();

    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            if !enabled.load(Ordering::Relaxed) {
                return;
            }
            convert_samples(data, &mut scratch);
            let mono = downmix_to_mono(&scratch, channels);
            callback(&mono, rate);
        },
        |err| log::error!("Input stream error: {}", err),
        None,
    )
}

/// Convert device samples to f32 into `out`, reusing its allocation.
fn convert_samples<T>(data: &[T], out: &mut Vec<f32>)
where
    T: Sample,
    f32: FromSample<T>,
{
    out.clear();
    out.extend(data.iter().map(|s| f32::from_sample(*s)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn integer_formats_convert_to_unit_range() {
        let mut out = Vec::new();
        convert_samples(&[i16::MIN, 0, i16::MAX], &mut out);
        assert_abs_diff_eq!(out[0], -1.0);
        assert_abs_diff_eq!(out[1], 0.0);
        assert_abs_diff_eq!(out[2], 1.0, epsilon = 1e-4);

        convert_samples(&[0u16, 32768, u16::MAX], &mut out);
        assert_eq!(out.len(), 3);
        assert_abs_diff_eq!(out[0], -1.0);
        assert_abs_diff_eq!(out[1], 0.0);
        assert_abs_diff_eq!(out[2], 1.0, epsilon = 1e-4);
    }
}

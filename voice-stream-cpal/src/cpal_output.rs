//! Playback through cpal: renders an `OutputTimeline` into a device.

use cpal::traits::DeviceTrait;
use cpal::{FromSample, Sample, SizedSample};

use voice_stream_core::{DeviceSelector, Direction, EngineError, OutputBackend, OutputStream, OutputTimeline};

use crate::device_enumerator::find_device;
use crate::error::BackendError;
use crate::stream_config::choose_config;
use crate::stream_thread::{StreamInfo, StreamThread};

/// Linear-interpolating rate converter pulling from a mono source.
///
/// Keeps up to two lookahead frames between calls so consecutive device
/// buffers join without a seam.
#[derive(Debug, Clone)]
pub(crate) struct RateConverter {
    step: f64,
    position: f64,
    pending: Vec<f32>,
}

impl RateConverter {
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        Self {
            step: source_rate as f64 / target_rate as f64,
            position: 0.0,
            pending: Vec::new(),
        }
    }

    /// Fill `out` at the target rate, rendering source frames on demand.
    pub fn fill(&mut self, out: &mut [f32], mut source: impl FnMut(&mut [f32])) {
        if out.is_empty() {
            return;
        }
        let base = self.position;
        let last = base + self.step * (out.len() - 1) as f64;
        let needed = last.floor() as usize + 2;
        if self.pending.len() < needed {
            let have = self.pending.len();
            self.pending.resize(needed, 0.0);
            source(&mut self.pending[have..]);
        }

        for (i, sample) in out.iter_mut().enumerate() {
            let position = base + self.step * i as f64;
            let index = position.floor() as usize;
            let frac = (position - index as f64) as f32;
            *sample = self.pending[index] * (1.0 - frac) + self.pending[index + 1] * frac;
        }

        let end = base + self.step * out.len() as f64;
        let consumed = (end.floor() as usize).min(self.pending.len());
        self.pending.drain(..consumed);
        self.position = end - consumed as f64;
    }
}

/// Render-callback state: the timeline plus conversion to the device rate.
struct Renderer {
    timeline: OutputTimeline,
    converter: Option<RateConverter>,
    mono: Vec<f32>,
}

impl Renderer {
    fn new(timeline: OutputTimeline, device_rate: u32) -> Self {
        let converter = (timeline.sample_rate() != device_rate)
            .then(|| RateConverter::new(timeline.sample_rate(), device_rate));
        Self {
            timeline,
            converter,
            mono: Vec::new(),
        }
    }

    fn render(&mut self, frames: usize) -> &[f32] {
        self.mono.resize(frames, 0.0);
        match self.converter {
            Some(ref mut converter) => {
                let timeline = &self.timeline;
                converter.fill(&mut self.mono, |buf| timeline.render(buf));
            }
            None => self.timeline.render(&mut self.mono),
        }
        &self.mono
    }
}

/// Copy each mono sample to every channel of its frame.
fn write_frames<T>(data: &mut [T], channels: usize, mono: &[f32])
where
    T: Sample + FromSample<f32>,
{
    for (frame, &sample) in data.chunks_mut(channels.max(1)).zip(mono) {
        frame.fill(T::from_sample(sample));
    }
}

/// Output backend over the default cpal host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalOutputBackend;

impl CpalOutputBackend {
    pub fn new() -> Self {
        Self
    }
}

impl OutputBackend for CpalOutputBackend {
    fn open(
        &self,
        selector: &DeviceSelector,
        timeline: OutputTimeline,
    ) -> Result<Box<dyn OutputStream>, EngineError> {
        let (thread, info) = spawn_output(selector, &timeline)?;
        Ok(Box::new(CpalOutputStream {
            timeline,
            selector: selector.clone(),
            info,
            thread: Some(thread),
        }))
    }
}

/// A live output context. Sink reassignment rebuilds the stream on the new
/// device; the timeline (and so the output clock) carries across.
pub struct CpalOutputStream {
    timeline: OutputTimeline,
    selector: DeviceSelector,
    info: StreamInfo,
    thread: Option<StreamThread>,
}

impl CpalOutputStream {
    pub fn device_name(&self) -> &str {
        &self.info.device_name
    }
}

impl OutputStream for CpalOutputStream {
    fn assign_sink(&mut self, selector: &DeviceSelector) -> Result<(), EngineError> {
        if self.thread.is_some() && *selector == self.selector {
            return Ok(());
        }

        // Drain the current device before opening the next one
        if let Some(mut thread) = self.thread.take() {
            thread.stop();
        }

        match spawn_output(selector, &self.timeline) {
            Ok((thread, info)) => {
                log::info!("Output moved to '{}'", info.device_name);
                self.thread = Some(thread);
                self.info = info;
                self.selector = selector.clone();
                Ok(())
            }
            Err(e) => {
                let failure = EngineError::SinkAssignmentFailed(format!("'{}': {}", selector, e));
                match spawn_output(&self.selector, &self.timeline) {
                    Ok((thread, info)) => {
                        self.thread = Some(thread);
                        self.info = info;
                    }
                    Err(e) => log::error!("Failed to reopen output '{}': {}", self.selector, e),
                }
                Err(failure)
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut thread) = self.thread.take() {
            thread.stop();
            log::debug!("Output '{}' released", self.info.device_name);
        }
    }
}

impl Drop for CpalOutputStream {
    fn drop(&mut self) {
        self.close();
    }
}

fn spawn_output(
    selector: &DeviceSelector,
    timeline: &OutputTimeline,
) -> Result<(StreamThread, StreamInfo), BackendError> {
    let selector = selector.clone();
    let timeline = timeline.clone();
    let (thread, info) = StreamThread::spawn("cpal-output", move || open_output(&selector, timeline))?;
    log::info!(
        "Output '{}' open at {} Hz, {} channel(s)",
        info.device_name,
        info.sample_rate,
        info.channels
    );
    Ok((thread, info))
}

fn open_output(
    selector: &DeviceSelector,
    timeline: OutputTimeline,
) -> Result<(cpal::Stream, StreamInfo), BackendError> {
    let device = find_device(Direction::Output, selector)?;
    let device_name = device.name()?;
    let supported = choose_config(&device, Direction::Output, timeline.sample_rate())?;

    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let info = StreamInfo {
        device_name,
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    };
    let renderer = Renderer::new(timeline, info.sample_rate);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_output::<f32>(&device, &config, renderer)?,
        cpal::SampleFormat::I16 => build_output::<i16>(&device, &config, renderer)?,
        cpal::SampleFormat::U16 => build_output::<u16>(&device, &config, renderer)?,
        other => return Err(BackendError::UnsupportedFormat(format!("{:?}", other))),
    };
    Ok((stream, info))
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: Renderer,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels.max(1);
            let mono = renderer.render(frames);
            write_frames(data, channels, mono);
        },
        |err| log::error!("Output stream error: {}", err),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    use voice_stream_core::{GainControl, OutputClock, SignalTap};

    fn ramp_source() -> impl FnMut(&mut [f32]) {
        let mut next = 0.0f32;
        move |buf: &mut [f32]| {
            for s in buf.iter_mut() {
                *s = next;
                next += 1.0;
            }
        }
    }

    #[test]
    fn upsampling_interpolates_across_calls() {
        let mut converter = RateConverter::new(12000, 24000);
        let mut source = ramp_source();
        let mut out = vec![0.0; 4];

        converter.fill(&mut out, &mut source);
        assert_eq!(out, vec![0.0, 0.5, 1.0, 1.5]);
        converter.fill(&mut out, &mut source);
        assert_eq!(out, vec![2.0, 2.5, 3.0, 3.5]);
    }

    #[test]
    fn downsampling_skips_frames() {
        let mut converter = RateConverter::new(48000, 24000);
        let mut source = ramp_source();
        let mut out = vec![0.0; 3];

        converter.fill(&mut out, &mut source);
        assert_eq!(out, vec![0.0, 2.0, 4.0]);
        converter.fill(&mut out, &mut source);
        assert_eq!(out, vec![6.0, 8.0, 10.0]);
    }

    #[test]
    fn renderer_advances_the_wire_clock() {
        let timeline = OutputTimeline::new(24000, GainControl::default(), SignalTap::new());
        let mut renderer = Renderer::new(timeline.clone(), 48000);
        for _ in 0..100 {
            renderer.render(480);
        }
        // one second at the device rate, plus the converter's lookahead
        assert_abs_diff_eq!(timeline.now(), 1.0, epsilon = 2.0 / 24000.0);
    }

    #[test]
    fn mono_fans_out_to_every_channel() {
        let mut data = [0i16; 6];
        write_frames(&mut data, 2, &[0.5, -1.0, 0.0]);
        assert_eq!(data, [16384, 16384, -32768, -32768, 0, 0]);
    }
}

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::processing::gain::GainControl;
use crate::processing::level_meter::SignalTap;

/// Source of output-device time, in seconds.
pub trait OutputClock {
    fn now(&self) -> f64;
}

struct ScheduledBuffer {
    start_frame: u64,
    samples: Vec<f32>,
}

impl ScheduledBuffer {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

struct TimelineState {
    frames_rendered: u64,
    scheduled: VecDeque<ScheduledBuffer>,
}

/// Mono render timeline at the inbound wire rate.
///
/// The output clock is the number of frames the device has pulled through
/// [`OutputTimeline::render`]. Scheduled buffers are mixed into whatever
/// render window they overlap; audio scheduled before the current position
/// is trimmed rather than replayed. Playback gain is applied and the
/// playback tap fed after mixing.
#[derive(Clone)]
pub struct OutputTimeline {
    sample_rate: u32,
    state: Arc<Mutex<TimelineState>>,
    gain: GainControl,
    tap: SignalTap,
}

impl OutputTimeline {
    pub fn new(sample_rate: u32, gain: GainControl, tap: SignalTap) -> Self {
        Self {
            sample_rate,
            state: Arc::new(Mutex::new(TimelineState {
                frames_rendered: 0,
                scheduled: VecDeque::new(),
            })),
            gain,
            tap,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Queue `samples` to begin at output time `start_time` (seconds).
    pub fn schedule(&self, start_time: f64, samples: Vec<f32>) {
        if samples.is_empty() {
            return;
        }
        let start_frame = (start_time.max(0.0) * self.sample_rate as f64).round() as u64;
        let mut state = self.state.lock();
        let position = state
            .scheduled
            .iter()
            .rposition(|b| b.start_frame <= start_frame)
            .map_or(0, |i| i + 1);
        state.scheduled.insert(
            position,
            ScheduledBuffer {
                start_frame,
                samples,
            },
        );
    }

    /// Drop every scheduled buffer that has not finished playing.
    ///
    /// Returns the number of buffers discarded.
    pub fn clear_pending(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.scheduled.len();
        state.scheduled.clear();
        dropped
    }

    /// Seconds of audio scheduled beyond the current position.
    pub fn pending_secs(&self) -> f64 {
        let state = self.state.lock();
        let end = state
            .scheduled
            .iter()
            .map(ScheduledBuffer::end_frame)
            .max()
            .unwrap_or(0);
        end.saturating_sub(state.frames_rendered) as f64 / self.sample_rate as f64
    }

    pub fn pending_buffers(&self) -> usize {
        self.state.lock().scheduled.len()
    }

    /// Fill `out` with the next `out.len()` mono frames and advance the clock.
    ///
    /// Called from the device render callback.
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);
        {
            let mut state = self.state.lock();
            let window_start = state.frames_rendered;
            let window_end = window_start + out.len() as u64;

            for buffer in state.scheduled.iter() {
                if buffer.start_frame >= window_end {
                    break;
                }
                let buffer_end = buffer.end_frame();
                if buffer_end <= window_start {
                    continue;
                }
                let from = window_start.max(buffer.start_frame);
                let to = window_end.min(buffer_end);
                let src = &buffer.samples
                    [(from - buffer.start_frame) as usize..(to - buffer.start_frame) as usize];
                let dst = &mut out[(from - window_start) as usize..(to - window_start) as usize];
                for (d, s) in dst.iter_mut().zip(src) {
                    *d += *s;
                }
            }

            state.scheduled.retain(|b| b.end_frame() > window_end);
            state.frames_rendered = window_end;
        }

        self.gain.apply(out);
        self.tap.feed(out);
    }
}

impl OutputClock for OutputTimeline {
    fn now(&self) -> f64 {
        self.state.lock().frames_rendered as f64 / self.sample_rate as f64
    }
}

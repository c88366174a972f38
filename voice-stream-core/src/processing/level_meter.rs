//! Frequency-domain amplitude estimation for the volume callbacks.
//!
//! A [`SignalTap`] is a non-mutating measurement point: audio code feeds it
//! copies of the samples it is already routing, and the volume monitor reads
//! the most recent window. Neither side ever waits on the other; a
//! contended lock simply skips that feed or that reading.

use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::config::VolumeReduction;
use crate::processing::sample_ring::SampleRing;

/// Samples per spectrum snapshot.
pub const ANALYSIS_WINDOW: usize = 256;

/// Spectrum floor/ceiling mapped to the 0-255 byte scale.
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

struct TapInner {
    window: Mutex<SampleRing>,
    active: AtomicBool,
}

/// Shared measurement point on one signal path.
#[derive(Clone)]
pub struct SignalTap {
    inner: Arc<TapInner>,
}

impl SignalTap {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TapInner {
                window: Mutex::new(SampleRing::new(ANALYSIS_WINDOW)),
                active: AtomicBool::new(false),
            }),
        }
    }

    pub fn activate(&self) {
        self.inner.active.store(true, Ordering::SeqCst);
    }

    /// Mark the path inactive and forget its samples so no stale level is
    /// reported.
    pub fn deactivate(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
        self.inner.window.lock().reset();
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Copy samples into the tap. Never blocks.
    pub fn feed(&self, samples: &[f32]) {
        if !self.is_active() {
            return;
        }
        if let Some(mut window) = self.inner.window.try_lock() {
            window.write(samples);
        }
    }

    /// Most recent analysis window, or `None` when inactive or contended.
    pub fn snapshot(&self) -> Option<Vec<f32>> {
        if !self.is_active() {
            return None;
        }
        self.inner
            .window
            .try_lock()
            .map(|window| window.latest(ANALYSIS_WINDOW))
    }
}

impl Default for SignalTap {
    fn default() -> Self {
        Self::new()
    }
}

/// Reduces a tap's spectrum to a scalar in `[0, 1]`.
///
/// Per bin: Blackman-windowed DFT magnitude (scaled by `1/N`), converted to
/// decibels and mapped from `[-100, -30]` dB onto `[0, 255]`. The bins are
/// reduced (first bin or mean), divided by `divisor` and clamped.
#[derive(Debug, Clone)]
pub struct LevelMeter {
    reduction: VolumeReduction,
    divisor: f32,
    window: Vec<f32>,
    cos_table: Vec<f32>,
    sin_table: Vec<f32>,
}

impl LevelMeter {
    pub fn new(reduction: VolumeReduction, divisor: f32) -> Self {
        let n = ANALYSIS_WINDOW;
        let window = (0..n)
            .map(|i| {
                let x = i as f32 / n as f32;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            })
            .collect();
        let cos_table = (0..n).map(|i| (2.0 * PI * i as f32 / n as f32).cos()).collect();
        let sin_table = (0..n).map(|i| (2.0 * PI * i as f32 / n as f32).sin()).collect();

        Self {
            reduction,
            divisor,
            window,
            cos_table,
            sin_table,
        }
    }

    /// Level of a tap; inactive, empty or contended taps read as silence.
    pub fn level(&self, tap: &SignalTap) -> f32 {
        match tap.snapshot() {
            Some(samples) if !samples.is_empty() => self.measure(&samples),
            _ => 0.0,
        }
    }

    /// Level of a sample window (zero-padded to the analysis size).
    pub fn measure(&self, samples: &[f32]) -> f32 {
        let spectrum = self.byte_spectrum(samples);
        let reduced = match self.reduction {
            VolumeReduction::FirstBin => spectrum.first().copied().unwrap_or(0.0),
            VolumeReduction::MeanOfBins => {
                if spectrum.is_empty() {
                    0.0
                } else {
                    spectrum.iter().sum::<f32>() / spectrum.len() as f32
                }
            }
        };
        let level = reduced / self.divisor;
        if level.is_finite() {
            level.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Spectrum bins `0..N/2` on the analyser byte scale (0-255).
    fn byte_spectrum(&self, samples: &[f32]) -> Vec<f32> {
        let n = ANALYSIS_WINDOW;
        let tail = &samples[samples.len().saturating_sub(n)..];
        let mut frame = vec![0.0f32; n];
        for (i, &s) in tail.iter().enumerate() {
            frame[i] = s * self.window[i];
        }

        (0..n / 2)
            .map(|k| {
                let (mut re, mut im) = (0.0f32, 0.0f32);
                for (i, &x) in frame.iter().enumerate() {
                    let idx = (k * i) % n;
                    re += x * self.cos_table[idx];
                    im -= x * self.sin_table[idx];
                }
                let magnitude = (re * re + im * im).sqrt() / n as f32;
                let db = if magnitude > 0.0 {
                    20.0 * magnitude.log10()
                } else {
                    f32::NEG_INFINITY
                };
                let scaled = 255.0 * (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
                scaled.clamp(0.0, 255.0)
            })
            .collect()
    }
}

/// Root-mean-square of a sample window.
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sine(freq_bin: usize, amplitude: f32) -> Vec<f32> {
        (0..ANALYSIS_WINDOW)
            .map(|i| amplitude * (2.0 * PI * freq_bin as f32 * i as f32 / ANALYSIS_WINDOW as f32).sin())
            .collect()
    }

    #[test]
    fn silence_measures_zero() {
        let meter = LevelMeter::new(VolumeReduction::MeanOfBins, 128.0);
        assert_eq!(meter.measure(&[0.0; ANALYSIS_WINDOW]), 0.0);
    }

    #[test]
    fn louder_signal_reads_higher() {
        let meter = LevelMeter::new(VolumeReduction::MeanOfBins, 128.0);
        let quiet = meter.measure(&sine(8, 0.01));
        let loud = meter.measure(&sine(8, 0.8));
        assert!(loud > quiet, "loud={loud} quiet={quiet}");
        assert!(loud > 0.0);
    }

    #[test]
    fn values_stay_in_unit_range() {
        let meter = LevelMeter::new(VolumeReduction::MeanOfBins, 1.0);
        let mut seed = 12345u32;
        let noise: Vec<f32> = (0..ANALYSIS_WINDOW)
            .map(|_| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
                (seed >> 8) as f32 / (1u32 << 24) as f32 * 8.0 - 4.0
            })
            .collect();
        for reduction in [VolumeReduction::FirstBin, VolumeReduction::MeanOfBins] {
            for divisor in [0.001, 1.0, 128.0, 255.0] {
                let meter = LevelMeter::new(reduction, divisor);
                let level = meter.measure(&noise);
                assert!((0.0..=1.0).contains(&level), "{level}");
            }
        }
        assert!((0.0..=1.0).contains(&meter.measure(&[f32::MAX; 4])));
    }

    #[test]
    fn first_bin_tracks_dc() {
        let meter = LevelMeter::new(VolumeReduction::FirstBin, 255.0);
        let dc = meter.measure(&[0.5; ANALYSIS_WINDOW]);
        assert_abs_diff_eq!(dc, 1.0, epsilon = 1e-6);
        let ac = meter.measure(&sine(16, 0.5));
        assert!(ac < dc);
    }

    #[test]
    fn inactive_tap_reads_zero() {
        let meter = LevelMeter::new(VolumeReduction::MeanOfBins, 128.0);
        let tap = SignalTap::new();
        tap.feed(&sine(8, 0.8));
        assert_eq!(meter.level(&tap), 0.0);
        assert!(tap.snapshot().is_none());
    }

    #[test]
    fn deactivation_forgets_samples() {
        let meter = LevelMeter::new(VolumeReduction::MeanOfBins, 128.0);
        let tap = SignalTap::new();
        tap.activate();
        tap.feed(&sine(8, 0.8));
        assert!(meter.level(&tap) > 0.0);

        tap.deactivate();
        tap.activate();
        assert_eq!(meter.level(&tap), 0.0);
    }

    #[test]
    fn rms_levels() {
        assert_eq!(rms_level(&[]), 0.0);
        assert_eq!(rms_level(&[0.0, 0.0]), 0.0);
        assert_abs_diff_eq!(rms_level(&[1.0, -1.0, 1.0]), 1.0, epsilon = 1e-6);
    }
}

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub const MIN_GAIN: f32 = 0.0;
pub const MAX_GAIN: f32 = 2.0;
pub const DEFAULT_GAIN: f32 = 1.0;

/// Shared linear gain for one signal path, clamped to `[0, 2]`.
///
/// Written from the control path, read lock-free from audio callbacks.
/// Cloning is a single `Arc` increment; all clones see the same value, so
/// a change applies to the live graph immediately and is still there for
/// the next activation.
#[derive(Clone, Debug)]
pub struct GainControl {
    bits: Arc<AtomicU32>,
}

impl GainControl {
    pub fn new(gain: f32) -> Self {
        Self {
            bits: Arc::new(AtomicU32::new(clamp_gain(gain).to_bits())),
        }
    }

    /// Store a new gain, clamped to range. Returns the value applied.
    pub fn set(&self, gain: f32) -> f32 {
        let clamped = clamp_gain(gain);
        self.bits.store(clamped.to_bits(), Ordering::Relaxed);
        clamped
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Multiply `samples` by the current gain in place.
    pub fn apply(&self, samples: &mut [f32]) {
        let gain = self.get();
        if gain == 1.0 {
            return;
        }
        for sample in samples.iter_mut() {
            *sample *= gain;
        }
    }
}

impl Default for GainControl {
    fn default() -> Self {
        Self::new(DEFAULT_GAIN)
    }
}

fn clamp_gain(gain: f32) -> f32 {
    if gain.is_nan() {
        return DEFAULT_GAIN;
    }
    gain.clamp(MIN_GAIN, MAX_GAIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_unity() {
        assert_eq!(GainControl::default().get(), 1.0);
    }

    #[test]
    fn clamps_to_range() {
        let gain = GainControl::default();
        assert_eq!(gain.set(3.5), 2.0);
        assert_eq!(gain.set(-1.0), 0.0);
        assert_eq!(gain.set(f32::NAN), 1.0);
        assert_eq!(GainControl::new(9.0).get(), 2.0);
    }

    #[test]
    fn clones_share_value() {
        let gain = GainControl::default();
        let audio_side = gain.clone();
        gain.set(0.5);
        assert_eq!(audio_side.get(), 0.5);
    }

    #[test]
    fn apply_scales_samples() {
        let gain = GainControl::new(0.5);
        let mut samples = [0.4, -0.8];
        gain.apply(&mut samples);
        assert_eq!(samples, [0.2, -0.4]);
    }
}

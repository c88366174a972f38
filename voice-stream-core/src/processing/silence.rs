use std::time::Instant;

use crate::models::audio_models::AudioBlock;
use crate::models::config::SilenceInjectionConfig;
use crate::processing::level_meter::rms_level;

/// Decides when to emit a synthetic silent block as a segmentation marker.
///
/// A block is "quiet" when the RMS of its trailing probe window is under the
/// threshold. An injection fires once quiet has been sustained for the
/// minimum interval, measured from whichever is later: the start of the
/// quiet streak or the previous injection. Injections are therefore never
/// closer together than the interval.
#[derive(Debug, Clone)]
pub struct SilenceInjector {
    config: SilenceInjectionConfig,
    quiet_since: Option<Instant>,
    last_injection: Option<Instant>,
}

impl SilenceInjector {
    pub fn new(config: SilenceInjectionConfig) -> Self {
        Self {
            config,
            quiet_since: None,
            last_injection: None,
        }
    }

    /// Feed one captured block; returns true when a silent block should be
    /// injected now.
    pub fn observe(&mut self, block: &[f32], now: Instant) -> bool {
        let probe = &block[block.len().saturating_sub(self.config.probe_window)..];
        if probe.is_empty() || rms_level(probe) >= self.config.rms_threshold {
            self.quiet_since = None;
            return false;
        }

        let quiet_since = *self.quiet_since.get_or_insert(now);
        let anchor = match self.last_injection {
            Some(last) if last > quiet_since => last,
            _ => quiet_since,
        };

        if now.saturating_duration_since(anchor) >= self.config.min_interval() {
            self.last_injection = Some(now);
            true
        } else {
            false
        }
    }

    /// A zero-filled block of the configured duration at `sample_rate`.
    pub fn silence_block(&self, sample_rate: u32) -> AudioBlock {
        let frames =
            (sample_rate as u64 * self.config.silence_duration_ms).div_ceil(1000) as usize;
        AudioBlock::new(vec![0.0; frames], sample_rate)
    }
}

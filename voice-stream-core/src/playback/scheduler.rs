use crate::models::audio_models::{DropReason, EncodedPacket, PlaybackOutcome};
use crate::models::config::{EngineConfiguration, InterruptPolicy};
use crate::processing::pcm_codec;

use super::timeline::{OutputClock, OutputTimeline};

/// Where a buffer of a given duration will start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub start_time: f64,
    /// The cursor had fallen behind `now` and was pulled forward.
    pub drift_reset: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub scheduled: u64,
    pub dropped: u64,
    pub drift_resets: u64,
    pub interrupts_honored: u64,
}

/// Owns the playback cursor: the output time at which the next inbound
/// buffer may start.
///
/// Buffers are laid end to end in arrival order. When the cursor is found
/// behind the output clock it is reset to `now + epsilon`; this is the only
/// backwards-looking adjustment, apart from an honored interrupt.
#[derive(Debug, Clone)]
pub struct PlaybackScheduler {
    sample_rate: u32,
    next_start_time: f64,
    epsilon: f64,
    max_lead: Option<f64>,
    interrupt_policy: InterruptPolicy,
    stats: SchedulerStats,
}

impl PlaybackScheduler {
    /// Create a scheduler whose cursor starts at the clock's current time.
    pub fn new(config: &EngineConfiguration, now: f64) -> Self {
        Self {
            sample_rate: config.playback_wire_rate,
            next_start_time: now,
            epsilon: config.playback_start_epsilon().as_secs_f64(),
            max_lead: config.max_playback_lead().map(|d| d.as_secs_f64()),
            interrupt_policy: config.interrupt_policy,
            stats: SchedulerStats::default(),
        }
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn interrupt_policy(&self) -> InterruptPolicy {
        self.interrupt_policy
    }

    /// Reserve the next slot for a buffer of `duration` seconds.
    ///
    /// The returned start is never earlier than `now`. Fails without moving
    /// the cursor when a lead limit is configured and would be exceeded.
    pub fn reserve(&mut self, duration: f64, now: f64) -> Result<Slot, DropReason> {
        let mut drift_reset = false;
        let mut start_time = self.next_start_time;
        if start_time < now {
            start_time = now + self.epsilon;
            drift_reset = true;
        }

        if let Some(max_lead) = self.max_lead {
            if start_time - now > max_lead {
                return Err(DropReason::LeadExceeded);
            }
        }

        if drift_reset {
            self.stats.drift_resets += 1;
            log::debug!(
                "Playback cursor behind by {:.3}s, resetting to {:.3}",
                now - self.next_start_time,
                start_time
            );
        }
        self.next_start_time = start_time + duration;
        Ok(Slot {
            start_time,
            drift_reset,
        })
    }

    /// Decode `packet` and schedule it on `timeline`.
    ///
    /// Malformed and empty packets are dropped; the cursor is untouched.
    pub fn enqueue(&mut self, packet: &EncodedPacket, timeline: &OutputTimeline) -> PlaybackOutcome {
        let samples = match pcm_codec::decode_packet(packet) {
            Ok(samples) => samples,
            Err(e) => {
                log::warn!("Dropping inbound packet: {}", e);
                self.stats.dropped += 1;
                return PlaybackOutcome::Dropped(DropReason::Malformed);
            }
        };
        if samples.is_empty() {
            self.stats.dropped += 1;
            return PlaybackOutcome::Dropped(DropReason::Empty);
        }

        let duration_secs = samples.len() as f64 / self.sample_rate as f64;
        let now = timeline.now();
        match self.reserve(duration_secs, now) {
            Ok(slot) => {
                timeline.schedule(slot.start_time, samples);
                self.stats.scheduled += 1;
                PlaybackOutcome::Scheduled {
                    start_time: slot.start_time,
                    duration_secs,
                }
            }
            Err(reason) => {
                log::warn!(
                    "Dropping inbound packet: playback lead {:.3}s over limit",
                    self.next_start_time - now
                );
                self.stats.dropped += 1;
                PlaybackOutcome::Dropped(reason)
            }
        }
    }

    /// Handle a remote "interrupted" notification.
    ///
    /// With [`InterruptPolicy::Honor`] the unplayed backlog is discarded and
    /// the cursor restarts at `now`. Returns whether anything was reset.
    pub fn interrupt(&mut self, timeline: &OutputTimeline) -> bool {
        match self.interrupt_policy {
            InterruptPolicy::Ignore => {
                log::debug!("Interrupt ignored by policy");
                false
            }
            InterruptPolicy::Honor => {
                let discarded = timeline.clear_pending();
                self.next_start_time = timeline.now();
                self.stats.interrupts_honored += 1;
                log::info!("Playback interrupted, discarded {} buffer(s)", discarded);
                true
            }
        }
    }
}

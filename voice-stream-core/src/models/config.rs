use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::EngineError;

/// Smallest capture block the engine accepts (samples).
pub const MIN_CAPTURE_BLOCK_SIZE: usize = 1024;
/// Largest capture block the engine accepts (samples).
pub const MAX_CAPTURE_BLOCK_SIZE: usize = 4096;
pub const MIN_VOLUME_POLL_INTERVAL_MS: u64 = 50;
pub const MAX_VOLUME_POLL_INTERVAL_MS: u64 = 500;

/// Whether a remote "interrupted" notification resets the playback cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptPolicy {
    /// Drop the unplayed backlog and restart the cursor at `now`.
    Honor,
    /// Keep the backlog; used for uninterrupted simultaneous translation.
    #[default]
    Ignore,
}

/// How a magnitude spectrum is reduced to one volume scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeReduction {
    FirstBin,
    #[default]
    MeanOfBins,
}

/// Synthetic silence emitted as a segmentation marker during long pauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SilenceInjectionConfig {
    /// Blocks whose probe-window RMS falls below this count as silent.
    pub rms_threshold: f32,
    /// Number of trailing samples of each block used for the RMS probe.
    pub probe_window: usize,
    /// Minimum time between injections.
    pub min_interval_ms: u64,
    /// Length of each injected silent block.
    pub silence_duration_ms: u64,
}

impl Default for SilenceInjectionConfig {
    fn default() -> Self {
        Self {
            rms_threshold: 0.01,
            probe_window: 512,
            min_interval_ms: 3000,
            silence_duration_ms: 700,
        }
    }
}

impl SilenceInjectionConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.rms_threshold) {
            return Err(format!("silence rms threshold out of range: {}", self.rms_threshold));
        }
        if self.probe_window == 0 {
            return Err("silence probe window must be non-zero".into());
        }
        if self.min_interval_ms == 0 {
            return Err("silence injection interval must be non-zero".into());
        }
        if self.silence_duration_ms == 0 {
            return Err("silence duration must be non-zero".into());
        }
        Ok(())
    }
}

/// Constants fixed for the lifetime of one engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfiguration {
    /// Outbound wire rate in Hz (default: 16000).
    pub capture_wire_rate: u32,

    /// Inbound wire rate in Hz (default: 24000).
    pub playback_wire_rate: u32,

    /// Samples per capture block, 1024-4096 (default: 4096).
    ///
    /// Smaller blocks lower latency but raise callback overhead and jitter.
    pub capture_block_size: usize,

    /// Volume sampling cadence, 50-500 ms (default: 100).
    pub volume_poll_interval_ms: u64,

    /// Lead added when the playback cursor is caught up to `now` (default: 10).
    pub playback_start_epsilon_ms: u64,

    pub interrupt_policy: InterruptPolicy,

    pub volume_reduction: VolumeReduction,

    /// Divisor applied to the reduced spectrum value (byte scale, 0-255).
    pub volume_divisor: f32,

    /// Maximum scheduling lead before inbound packets are dropped
    /// (None = unbounded).
    pub max_playback_lead_ms: Option<u64>,

    /// Silence injection, disabled when None.
    pub silence_injection: Option<SilenceInjectionConfig>,
}

impl EngineConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.capture_wire_rate == 0 || self.playback_wire_rate == 0 {
            return Err("wire sample rates must be positive".into());
        }
        if !(MIN_CAPTURE_BLOCK_SIZE..=MAX_CAPTURE_BLOCK_SIZE).contains(&self.capture_block_size) {
            return Err(format!(
                "capture block size {} outside {}..={}",
                self.capture_block_size, MIN_CAPTURE_BLOCK_SIZE, MAX_CAPTURE_BLOCK_SIZE
            ));
        }
        if !(MIN_VOLUME_POLL_INTERVAL_MS..=MAX_VOLUME_POLL_INTERVAL_MS)
            .contains(&self.volume_poll_interval_ms)
        {
            return Err(format!(
                "volume poll interval {}ms outside {}..={}ms",
                self.volume_poll_interval_ms,
                MIN_VOLUME_POLL_INTERVAL_MS,
                MAX_VOLUME_POLL_INTERVAL_MS
            ));
        }
        if self.volume_divisor.is_nan() || self.volume_divisor <= 0.0 {
            return Err(format!("volume divisor must be positive: {}", self.volume_divisor));
        }
        if self.max_playback_lead_ms == Some(0) {
            return Err("max playback lead must be non-zero when set".into());
        }
        if let Some(ref silence) = self.silence_injection {
            silence.validate()?;
        }
        Ok(())
    }

    /// Parse a JSON document; omitted fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EngineError::ConfigurationFailed(e.to_string()))?;
        config.validate().map_err(EngineError::ConfigurationFailed)?;
        Ok(config)
    }

    pub fn volume_poll_interval(&self) -> Duration {
        Duration::from_millis(self.volume_poll_interval_ms)
    }

    pub fn playback_start_epsilon(&self) -> Duration {
        Duration::from_millis(self.playback_start_epsilon_ms)
    }

    pub fn max_playback_lead(&self) -> Option<Duration> {
        self.max_playback_lead_ms.map(Duration::from_millis)
    }
}

impl Default for EngineConfiguration {
    fn default() -> Self {
        Self {
            capture_wire_rate: 16000,
            playback_wire_rate: 24000,
            capture_block_size: 4096,
            volume_poll_interval_ms: 100,
            playback_start_epsilon_ms: 10,
            interrupt_policy: InterruptPolicy::Ignore,
            volume_reduction: VolumeReduction::MeanOfBins,
            volume_divisor: 128.0,
            max_playback_lead_ms: None,
            silence_injection: None,
        }
    }
}

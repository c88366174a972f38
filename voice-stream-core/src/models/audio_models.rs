use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Signal direction of a device or tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

/// Which physical device a direction should use.
///
/// Serialized as a plain string; `"default"` is the system-default sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum DeviceSelector {
    #[default]
    Default,
    Id(String),
}

impl DeviceSelector {
    pub const DEFAULT_SENTINEL: &'static str = "default";

    /// Build a selector from an identifier, mapping empty strings and the
    /// sentinel to [`DeviceSelector::Default`].
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        if id.is_empty() || id == Self::DEFAULT_SENTINEL {
            Self::Default
        } else {
            Self::Id(id)
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }

    /// The concrete device identifier, or `None` for the system default.
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::Default => None,
            Self::Id(id) => Some(id),
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str(Self::DEFAULT_SENTINEL),
            Self::Id(id) => f.write_str(id),
        }
    }
}

impl FromStr for DeviceSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_id(s))
    }
}

impl Serialize for DeviceSelector {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceSelector {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_id(raw))
    }
}

/// A device reported by a [`crate::DeviceEnumerator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioDevice {
    pub id: String,
    pub label: String,
    pub direction: Direction,
    pub is_default: bool,
}

impl AudioDevice {
    pub fn selector(&self) -> DeviceSelector {
        DeviceSelector::from_id(self.id.clone())
    }
}

/// One mono block of samples tagged with the rate it was produced at.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBlock {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Block duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Text-safe (base64) little-endian 16-bit mono PCM at a fixed wire rate.
///
/// This is the only unit that crosses the engine boundary in either
/// direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedPacket(String);

impl EncodedPacket {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for EncodedPacket {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl fmt::Display for EncodedPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why an inbound packet was not scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Malformed,
    Empty,
    LeadExceeded,
}

/// Result of handing an inbound packet to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackOutcome {
    /// Scheduled to start at this output-clock time (seconds).
    Scheduled { start_time: f64, duration_secs: f64 },
    Dropped(DropReason),
    /// Output is not initialized; the packet was ignored.
    OutputNotReady,
}

/// Counters for debugging a streaming session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineDiagnostics {
    pub capture_session_id: Option<String>,
    pub capture_blocks: u64,
    pub packets_sent: u64,
    pub packets_scheduled: u64,
    pub packets_dropped: u64,
    pub drift_resets: u64,
    pub interrupts_honored: u64,
    pub silence_injections: u64,
    pub discarded_device_handles: u64,
    pub sink_assignment_failures: u64,
}

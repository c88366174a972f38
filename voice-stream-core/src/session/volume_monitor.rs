use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::models::error::EngineError;
use crate::processing::level_meter::{LevelMeter, SignalTap};

/// Receives one `(capture, playback)` level pair per tick.
pub type VolumeSink = Arc<dyn Fn(f32, f32) + Send + Sync + 'static>;

/// Cancellable periodic task sampling the capture and playback taps.
///
/// Readers never mutate the taps, and a contended or inactive tap reads as
/// zero, so the task cannot stall the audio path. Stopping is synchronous:
/// [`VolumeMonitor::stop`] returns after the thread has exited.
pub struct VolumeMonitor {
    cancel: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl VolumeMonitor {
    pub fn start(
        interval: Duration,
        meter: LevelMeter,
        capture_tap: SignalTap,
        playback_tap: SignalTap,
        sink: VolumeSink,
    ) -> Result<Self, EngineError> {
        let (cancel, cancelled) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("volume-monitor".into())
            .spawn(move || loop {
                match cancelled.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let (capture, playback) = sample(&meter, &capture_tap, &playback_tap);
                        sink(capture, playback);
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| EngineError::StreamFailed(format!("volume monitor: {}", e)))?;

        log::debug!("Volume monitor started ({:?} interval)", interval);
        Ok(Self {
            cancel: Some(cancel),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Cancel and join. Idempotent.
    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Volume monitor thread panicked");
            }
            log::debug!("Volume monitor stopped");
        }
    }
}

impl Drop for VolumeMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One tick: levels of both paths, zero for inactive ones.
pub fn sample(meter: &LevelMeter, capture_tap: &SignalTap, playback_tap: &SignalTap) -> (f32, f32) {
    (meter.level(capture_tap), meter.level(playback_tap))
}

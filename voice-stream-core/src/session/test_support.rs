//! In-memory backends and a recording delegate for engine tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::DeviceSelector;
use crate::models::error::EngineError;
use crate::models::state::EngineState;
use crate::playback::timeline::OutputTimeline;
use crate::traits::audio_backend::{
    AudioBufferCallback, CaptureConstraints, InputBackend, InputStream, OutputBackend,
    OutputStream,
};
use crate::traits::engine_delegate::EngineDelegate;

#[derive(Default)]
struct FakeInputInner {
    callbacks: Mutex<Vec<AudioBufferCallback>>,
    acquisitions: AtomicUsize,
    live: Arc<AtomicUsize>,
    fail_next: Mutex<Option<EngineError>>,
    entered: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<Option<mpsc::Receiver<()>>>,
    last_selector: Mutex<Option<DeviceSelector>>,
}

/// Input backend whose "device" is fed by [`FakeInputBackend::push`].
#[derive(Clone)]
pub(crate) struct FakeInputBackend {
    rate: u32,
    inner: Arc<FakeInputInner>,
}

impl FakeInputBackend {
    pub fn new(rate: u32) -> Self {
        Self {
            rate,
            inner: Arc::new(FakeInputInner::default()),
        }
    }

    /// Make the next acquisition block. The first receiver fires once the
    /// acquisition is pending; sending on the returned sender completes it.
    pub fn gate(&self) -> (mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *self.inner.entered.lock() = Some(entered_tx);
        *self.inner.release.lock() = Some(release_rx);
        (entered_rx, release_tx)
    }

    pub fn fail_next_acquisition(&self, error: EngineError) {
        *self.inner.fail_next.lock() = Some(error);
    }

    /// Deliver samples to every callback ever handed out, including those
    /// of released streams, the way an in-flight device callback would.
    pub fn push(&self, samples: &[f32]) {
        let callbacks = self.inner.callbacks.lock().clone();
        for callback in callbacks {
            callback(samples, self.rate);
        }
    }

    pub fn live_streams(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    pub fn acquisitions(&self) -> usize {
        self.inner.acquisitions.load(Ordering::SeqCst)
    }

    pub fn last_selector(&self) -> Option<DeviceSelector> {
        self.inner.last_selector.lock().clone()
    }
}

impl InputBackend for FakeInputBackend {
    fn acquire(
        &self,
        selector: &DeviceSelector,
        _constraints: &CaptureConstraints,
        callback: AudioBufferCallback,
    ) -> Result<Box<dyn InputStream>, EngineError> {
        let release = self.inner.release.lock().take();
        if let Some(release) = release {
            if let Some(entered) = self.inner.entered.lock().take() {
                let _ = entered.send(());
            }
            let _ = release.recv();
        }

        self.inner.acquisitions.fetch_add(1, Ordering::SeqCst);
        *self.inner.last_selector.lock() = Some(selector.clone());
        if let Some(error) = self.inner.fail_next.lock().take() {
            return Err(error);
        }

        self.inner.callbacks.lock().push(callback);
        Ok(Box::new(FakeInputStream {
            rate: self.rate,
            started: false,
            live: Arc::clone(&self.inner.live),
        }))
    }
}

struct FakeInputStream {
    rate: u32,
    started: bool,
    live: Arc<AtomicUsize>,
}

impl InputStream for FakeInputStream {
    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn start(&mut self) -> Result<(), EngineError> {
        if !self.started {
            self.started = true;
            self.live.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn stop(&mut self) {
        if self.started {
            self.started = false;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeInputStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Default)]
struct FakeOutputInner {
    timeline: Mutex<Option<OutputTimeline>>,
    sink: Arc<Mutex<Option<DeviceSelector>>>,
    rejected_sinks: Arc<Mutex<Vec<String>>>,
    fail_open: AtomicBool,
    live: Arc<AtomicUsize>,
}

/// Output backend whose clock advances only through [`FakeOutputBackend::render`].
#[derive(Clone, Default)]
pub(crate) struct FakeOutputBackend {
    inner: Arc<FakeOutputInner>,
}

impl FakeOutputBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_open(&self) {
        self.inner.fail_open.store(true, Ordering::SeqCst);
    }

    /// Sink ids that `assign_sink` refuses.
    pub fn reject_sink(&self, id: &str) {
        self.inner.rejected_sinks.lock().push(id.to_string());
    }

    pub fn current_sink(&self) -> Option<DeviceSelector> {
        self.inner.sink.lock().clone()
    }

    pub fn live_streams(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Render `seconds` of output, returning the rendered samples.
    pub fn render(&self, seconds: f64) -> Vec<f32> {
        let timeline = self.inner.timeline.lock().clone();
        match timeline {
            Some(timeline) => {
                let frames = (seconds * timeline.sample_rate() as f64).round() as usize;
                let mut out = vec![0.0; frames];
                timeline.render(&mut out);
                out
            }
            None => Vec::new(),
        }
    }
}

impl OutputBackend for FakeOutputBackend {
    fn open(
        &self,
        selector: &DeviceSelector,
        timeline: OutputTimeline,
    ) -> Result<Box<dyn OutputStream>, EngineError> {
        if self.inner.fail_open.load(Ordering::SeqCst) {
            return Err(EngineError::DeviceAcquisitionFailed("output refused".into()));
        }
        *self.inner.timeline.lock() = Some(timeline);
        *self.inner.sink.lock() = Some(selector.clone());
        self.inner.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeOutputStream {
            open: true,
            sink: Arc::clone(&self.inner.sink),
            rejected: Arc::clone(&self.inner.rejected_sinks),
            live: Arc::clone(&self.inner.live),
        }))
    }
}

struct FakeOutputStream {
    open: bool,
    sink: Arc<Mutex<Option<DeviceSelector>>>,
    rejected: Arc<Mutex<Vec<String>>>,
    live: Arc<AtomicUsize>,
}

impl OutputStream for FakeOutputStream {
    fn assign_sink(&mut self, selector: &DeviceSelector) -> Result<(), EngineError> {
        let refused = selector
            .device_id()
            .is_some_and(|id| self.rejected.lock().iter().any(|r| r == id));
        if refused {
            return Err(EngineError::SinkAssignmentFailed(selector.to_string()));
        }
        *self.sink.lock() = Some(selector.clone());
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Delegate that records every notification.
#[derive(Default)]
pub(crate) struct RecordingDelegate {
    pub states: Mutex<Vec<EngineState>>,
    pub errors: Mutex<Vec<String>>,
    pub capture_volumes: Mutex<Vec<f32>>,
    pub playback_volumes: Mutex<Vec<f32>>,
}

impl EngineDelegate for RecordingDelegate {
    fn on_state_changed(&self, state: &EngineState) {
        self.states.lock().push(*state);
    }

    fn on_capture_volume(&self, level: f32) {
        self.capture_volumes.lock().push(level);
    }

    fn on_playback_volume(&self, level: f32) {
        self.playback_volumes.lock().push(level);
    }

    fn on_error(&self, error: &EngineError) {
        self.errors.lock().push(error.to_string());
    }
}

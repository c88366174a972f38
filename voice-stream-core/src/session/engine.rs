use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::models::audio_models::{DeviceSelector, EncodedPacket, EngineDiagnostics, PlaybackOutcome};
use crate::models::config::EngineConfiguration;
use crate::models::error::EngineError;
use crate::models::state::{EngineEvent, EngineState};
use crate::playback::scheduler::{PlaybackScheduler, SchedulerStats};
use crate::playback::timeline::{OutputClock, OutputTimeline};
use crate::processing::gain::GainControl;
use crate::processing::level_meter::{LevelMeter, SignalTap};
use crate::session::capture::{CaptureStage, CaptureStart};
use crate::session::volume_monitor::{VolumeMonitor, VolumeSink};
use crate::traits::audio_backend::{InputBackend, OutputBackend, OutputStream};
use crate::traits::engine_delegate::{EngineDelegate, PacketCallback};

type DelegateSlot = Arc<RwLock<Option<Arc<dyn EngineDelegate>>>>;

/// The live output side: context, render timeline, cursor and the volume
/// task. Torn down as a unit.
struct OutputPipeline {
    stream: Box<dyn OutputStream>,
    timeline: OutputTimeline,
    scheduler: PlaybackScheduler,
    monitor: VolumeMonitor,
}

/// Internal mutable engine state, protected by `parking_lot::Mutex`.
struct EngineInner {
    state: EngineState,
    input_device: DeviceSelector,
    output_device: DeviceSelector,
    on_packet: Option<PacketCallback>,
    output: Option<OutputPipeline>,
    retired_playback: SchedulerStats,
    sink_assignment_failures: u64,
}

impl EngineInner {
    fn playback_stats(&self) -> SchedulerStats {
        match self.output {
            Some(ref output) => output.scheduler.stats(),
            None => self.retired_playback,
        }
    }

    /// Apply `event` and return the new state if it changed.
    fn apply(&mut self, operation: &'static str, event: EngineEvent) -> Result<Option<EngineState>, EngineError> {
        let next = self
            .state
            .transition(event)
            .ok_or_else(|| EngineError::invalid_state(operation, self.state))?;
        if next == self.state {
            return Ok(None);
        }
        log::info!("Engine state: {} -> {}", self.state, next);
        self.state = next;
        Ok(Some(next))
    }

    fn ensure_open(&self, operation: &'static str) -> Result<(), EngineError> {
        if self.state.is_closed() {
            return Err(EngineError::invalid_state(operation, self.state));
        }
        Ok(())
    }
}

/// Real-time voice streaming engine.
///
/// Generic over input and output backends via the `InputBackend` and
/// `OutputBackend` traits. Captures microphone audio into wire-rate encoded
/// packets and schedules inbound packets for gapless playback.
///
/// ```text
/// [InputBackend] → [CaptureStage: gain → tap → resample → encode] → on_packet
///
/// enqueue_playback → [decode] → [PlaybackScheduler] → [OutputTimeline] → [OutputBackend]
///                                                        └→ tap
/// [VolumeMonitor] reads both taps → EngineDelegate
/// ```
///
/// All methods take `&self`; the engine can be shared across threads.
/// Delegate callbacks are never invoked while the internal lock is held.
pub struct VoiceStreamEngine<I: InputBackend, O: OutputBackend> {
    config: EngineConfiguration,
    output_backend: O,
    capture: CaptureStage<I>,
    capture_gain: GainControl,
    capture_tap: SignalTap,
    playback_gain: GainControl,
    playback_tap: SignalTap,
    delegate: DelegateSlot,
    inner: Mutex<EngineInner>,
}

impl<I: InputBackend, O: OutputBackend> VoiceStreamEngine<I, O> {
    pub fn new(input: I, output: O, config: EngineConfiguration) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::ConfigurationFailed)?;

        let capture_gain = GainControl::default();
        let capture_tap = SignalTap::new();
        let capture = CaptureStage::new(input, &config, capture_gain.clone(), capture_tap.clone());

        Ok(Self {
            config,
            output_backend: output,
            capture,
            capture_gain,
            capture_tap,
            playback_gain: GainControl::default(),
            playback_tap: SignalTap::new(),
            delegate: Arc::new(RwLock::new(None)),
            inner: Mutex::new(EngineInner {
                state: EngineState::Idle,
                input_device: DeviceSelector::Default,
                output_device: DeviceSelector::Default,
                on_packet: None,
                output: None,
                retired_playback: SchedulerStats::default(),
                sink_assignment_failures: 0,
            }),
        })
    }

    pub fn set_delegate(&self, delegate: Arc<dyn EngineDelegate>) {
        *self.delegate.write() = Some(delegate);
    }

    pub fn config(&self) -> &EngineConfiguration {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.inner.lock().state
    }

    pub fn input_device(&self) -> DeviceSelector {
        self.inner.lock().input_device.clone()
    }

    pub fn output_device(&self) -> DeviceSelector {
        self.inner.lock().output_device.clone()
    }

    pub fn input_backend(&self) -> &I {
        self.capture.backend()
    }

    pub fn output_backend(&self) -> &O {
        &self.output_backend
    }

    /// Current output-clock time in seconds, `None` before `init_output`.
    pub fn output_time(&self) -> Option<f64> {
        self.inner.lock().output.as_ref().map(|o| o.timeline.now())
    }

    pub fn diagnostics(&self) -> EngineDiagnostics {
        let counters = self.capture.counters();
        let inner = self.inner.lock();
        let playback = inner.playback_stats();
        EngineDiagnostics {
            capture_session_id: self.capture.session_id(),
            capture_blocks: counters.blocks.load(Ordering::Relaxed),
            packets_sent: counters.packets_sent.load(Ordering::Relaxed),
            packets_scheduled: playback.scheduled,
            packets_dropped: playback.dropped,
            drift_resets: playback.drift_resets,
            interrupts_honored: playback.interrupts_honored,
            silence_injections: counters.silence_injections.load(Ordering::Relaxed),
            discarded_device_handles: counters.discarded_handles.load(Ordering::Relaxed),
            sink_assignment_failures: inner.sink_assignment_failures,
        }
    }

    /// Establish the output clock and context, start the volume monitor and
    /// assign the requested sink. Idempotent once output is ready; a repeat
    /// call naming another device re-assigns the sink like
    /// [`VoiceStreamEngine::set_output_device`].
    ///
    /// Transitions: idle → output-ready.
    pub fn init_output(&self, selector: DeviceSelector) -> Result<(), EngineError> {
        let changed = {
            let mut inner = self.inner.lock();
            inner.ensure_open("initialize output")?;
            if inner.output.is_some() {
                let same = inner.output_device == selector;
                drop(inner);
                if same {
                    log::debug!("Output already initialized");
                    return Ok(());
                }
                log::debug!("Output already initialized, switching sink to '{}'", selector);
                return self.set_output_device(selector);
            }
            inner.output_device = selector.clone();

            let timeline = OutputTimeline::new(
                self.config.playback_wire_rate,
                self.playback_gain.clone(),
                self.playback_tap.clone(),
            );
            let mut stream = match self.output_backend.open(&DeviceSelector::Default, timeline.clone()) {
                Ok(stream) => stream,
                Err(e) => {
                    drop(inner);
                    log::error!("Failed to open output: {}", e);
                    self.report_error(&e);
                    return Err(e);
                }
            };

            if !selector.is_default() {
                if stream.supports_sink_assignment() {
                    if let Err(e) = stream.assign_sink(&selector) {
                        log::warn!("{}; continuing on the default sink", e);
                        inner.sink_assignment_failures += 1;
                    }
                } else {
                    log::warn!("Sink assignment unsupported; playing on the default sink");
                }
            }

            let monitor = match self.start_volume_monitor() {
                Ok(monitor) => monitor,
                Err(e) => {
                    stream.close();
                    return Err(e);
                }
            };
            self.playback_tap.activate();
            let scheduler = PlaybackScheduler::new(&self.config, timeline.now());
            inner.output = Some(OutputPipeline {
                stream,
                timeline,
                scheduler,
                monitor,
            });
            inner.apply("initialize output", EngineEvent::OutputInitialized)?
        };

        self.notify_state(changed);
        Ok(())
    }

    /// Fully stop any previous capture, then start capturing `selector`,
    /// delivering one encoded packet per block to `on_packet`.
    ///
    /// Transitions: output-ready | streaming → streaming (capture active).
    pub fn start_input(&self, selector: DeviceSelector, on_packet: PacketCallback) -> Result<(), EngineError> {
        {
            let mut inner = self.inner.lock();
            if !inner.state.is_output_ready() {
                return Err(EngineError::invalid_state("start input", inner.state));
            }
            inner.input_device = selector.clone();
            inner.on_packet = Some(Arc::clone(&on_packet));
        }

        match self.capture.start(&selector, on_packet) {
            Ok(CaptureStart::Started { .. }) => self.commit_capture_started(),
            Ok(CaptureStart::Superseded) => Ok(()),
            Err(e) => {
                log::error!("Failed to start capture on '{}': {}", selector, e);
                let changed = self.mark_capture_stopped();
                self.notify_state(changed);
                self.report_error(&e);
                Err(e)
            }
        }
    }

    /// Drain and release the capture graph. No-op when not capturing.
    ///
    /// Transitions: streaming (capture active) → streaming (capture stopped).
    pub fn stop_input(&self) -> Result<(), EngineError> {
        self.inner.lock().ensure_open("stop input")?;
        self.capture.stop();
        let changed = self.mark_capture_stopped();
        self.notify_state(changed);
        Ok(())
    }

    /// Store the input selector; restarts capture on it if capture is active.
    pub fn set_input_device(&self, selector: DeviceSelector) -> Result<(), EngineError> {
        let restart = {
            let mut inner = self.inner.lock();
            inner.ensure_open("set input device")?;
            inner.input_device = selector.clone();
            if inner.state.is_capturing() {
                inner.on_packet.clone()
            } else {
                None
            }
        };

        match restart {
            Some(on_packet) => {
                log::info!("Switching input device to '{}'", selector);
                self.start_input(selector, on_packet)
            }
            None => Ok(()),
        }
    }

    /// Store the output selector and re-assign the sink on the live context.
    ///
    /// Assignment failure is not an error: playback continues on the
    /// previous sink and the failure is counted in diagnostics.
    pub fn set_output_device(&self, selector: DeviceSelector) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        inner.ensure_open("set output device")?;
        inner.output_device = selector.clone();

        let failed = match inner.output {
            Some(ref mut output) if output.stream.supports_sink_assignment() => {
                match output.stream.assign_sink(&selector) {
                    Ok(()) => {
                        log::info!("Output sink set to '{}'", selector);
                        false
                    }
                    Err(e) => {
                        log::warn!("{}; continuing on the previous sink", e);
                        true
                    }
                }
            }
            Some(_) => {
                log::warn!("Sink assignment unsupported; keeping the current sink");
                false
            }
            None => false,
        };
        if failed {
            inner.sink_assignment_failures += 1;
        }
        Ok(())
    }

    /// Decode and schedule an inbound packet.
    ///
    /// Returns [`PlaybackOutcome::OutputNotReady`] before `init_output`.
    /// Malformed packets are dropped, never reported as errors.
    pub fn enqueue_playback(&self, packet: &EncodedPacket) -> Result<PlaybackOutcome, EngineError> {
        let mut inner = self.inner.lock();
        inner.ensure_open("enqueue playback")?;
        match inner.output {
            Some(ref mut output) => Ok(output.scheduler.enqueue(packet, &output.timeline)),
            None => {
                log::trace!("Output not initialized, ignoring inbound packet");
                Ok(PlaybackOutcome::OutputNotReady)
            }
        }
    }

    /// Deliver a remote "interrupted" notification to the scheduler.
    /// Returns whether the backlog was discarded, per the interrupt policy.
    pub fn interrupt_playback(&self) -> Result<bool, EngineError> {
        let mut inner = self.inner.lock();
        inner.ensure_open("interrupt playback")?;
        Ok(match inner.output {
            Some(ref mut output) => output.scheduler.interrupt(&output.timeline),
            None => false,
        })
    }

    /// Set the capture gain (clamped to `[0, 2]`); returns the applied value.
    pub fn set_capture_gain(&self, gain: f32) -> Result<f32, EngineError> {
        self.inner.lock().ensure_open("set capture gain")?;
        Ok(self.capture_gain.set(gain))
    }

    pub fn capture_gain(&self) -> f32 {
        self.capture_gain.get()
    }

    /// Set the playback gain (clamped to `[0, 2]`); returns the applied value.
    pub fn set_playback_gain(&self, gain: f32) -> Result<f32, EngineError> {
        self.inner.lock().ensure_open("set playback gain")?;
        Ok(self.playback_gain.set(gain))
    }

    pub fn playback_gain(&self) -> f32 {
        self.playback_gain.get()
    }

    /// Stop capture, stop the volume monitor and release the output
    /// context, in that order. Safe to call repeatedly.
    pub fn close(&self) {
        self.capture.stop();

        let (output, changed) = {
            let mut inner = self.inner.lock();
            if inner.state.is_closed() {
                return;
            }
            let output = inner.output.take();
            if let Some(ref output) = output {
                inner.retired_playback = output.scheduler.stats();
            }
            inner.on_packet = None;
            let changed = inner.apply("close", EngineEvent::Close).ok().flatten();
            (output, changed)
        };

        if let Some(mut output) = output {
            output.monitor.stop();
            self.playback_tap.deactivate();
            output.stream.close();
        }
        self.notify_state(changed);
    }

    // --- Internal helpers ---

    fn mark_capture_stopped(&self) -> Option<EngineState> {
        let mut inner = self.inner.lock();
        inner
            .apply("stop input", EngineEvent::CaptureStopped)
            .ok()
            .flatten()
    }

    /// Record a successful capture start. A `stop_input` or `close` that ran
    /// after the stage went live but before this point wins: the state is
    /// left alone so a stopped stage is never reported as capturing.
    fn commit_capture_started(&self) -> Result<(), EngineError> {
        let changed = {
            let mut inner = self.inner.lock();
            if inner.state.is_closed() {
                drop(inner);
                self.capture.stop();
                return Ok(());
            }
            if !self.capture.is_active() {
                log::debug!("Capture stopped before its start was recorded");
                return Ok(());
            }
            inner.apply("start input", EngineEvent::CaptureStarted)?
        };
        self.notify_state(changed);
        Ok(())
    }

    fn start_volume_monitor(&self) -> Result<VolumeMonitor, EngineError> {
        let delegate = Arc::clone(&self.delegate);
        let sink: VolumeSink = Arc::new(move |capture, playback| {
            if let Some(ref d) = *delegate.read() {
                d.on_capture_volume(capture);
                d.on_playback_volume(playback);
            }
        });
        VolumeMonitor::start(
            self.config.volume_poll_interval(),
            LevelMeter::new(self.config.volume_reduction, self.config.volume_divisor),
            self.capture_tap.clone(),
            self.playback_tap.clone(),
            sink,
        )
    }

    fn notify_state(&self, changed: Option<EngineState>) {
        if let Some(state) = changed {
            if let Some(ref d) = *self.delegate.read() {
                d.on_state_changed(&state);
            }
        }
    }

    fn report_error(&self, error: &EngineError) {
        if let Some(ref d) = *self.delegate.read() {
            d.on_error(error);
        }
    }
}

impl<I: InputBackend, O: OutputBackend> Drop for VoiceStreamEngine<I, O> {
    fn drop(&mut self) {
        self.close();
    }
}

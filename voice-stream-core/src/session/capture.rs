use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioBlock, DeviceSelector};
use crate::models::config::EngineConfiguration;
use crate::models::error::EngineError;
use crate::processing::gain::GainControl;
use crate::processing::level_meter::SignalTap;
use crate::processing::pcm_codec;
use crate::processing::resampler;
use crate::processing::sample_ring::SampleRing;
use crate::processing::silence::SilenceInjector;
use crate::traits::audio_backend::{CaptureConstraints, InputBackend, InputStream};
use crate::traits::engine_delegate::PacketCallback;

/// Result of [`CaptureStage::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStart {
    /// The device is live and delivering blocks at `native_rate`.
    Started { native_rate: u32 },
    /// A stop (or a newer start) arrived while the device was being
    /// acquired. The late handle was released unused.
    Superseded,
}

#[derive(Debug, Default)]
pub(crate) struct CaptureCounters {
    pub blocks: AtomicU64,
    pub packets_sent: AtomicU64,
    pub silence_injections: AtomicU64,
    pub discarded_handles: AtomicU64,
}

/// Per-session block assembly: accumulate native samples, then for each
/// full block apply gain, tap, resample, encode and emit.
pub(crate) struct BlockProcessor {
    pending: SampleRing,
    block_size: usize,
    wire_rate: u32,
    gain: GainControl,
    tap: SignalTap,
    silence: Option<SilenceInjector>,
    on_packet: PacketCallback,
    counters: Arc<CaptureCounters>,
}

impl BlockProcessor {
    fn new(
        config: &EngineConfiguration,
        gain: GainControl,
        tap: SignalTap,
        on_packet: PacketCallback,
        counters: Arc<CaptureCounters>,
    ) -> Self {
        Self {
            pending: SampleRing::new(config.capture_block_size * 2),
            block_size: config.capture_block_size,
            wire_rate: config.capture_wire_rate,
            gain,
            tap,
            silence: config.silence_injection.clone().map(SilenceInjector::new),
            on_packet,
            counters,
        }
    }

    /// Accepts callbacks of any length. Input is written one block at a
    /// time and every full block is drained before the next write, so the
    /// ring never holds more than two blocks and nothing is overwritten.
    fn push(&mut self, samples: &[f32], native_rate: u32, now: Instant) {
        for chunk in samples.chunks(self.block_size) {
            self.pending.write(chunk);
            while self.pending.count() >= self.block_size {
                let block = AudioBlock::new(self.pending.read(self.block_size), native_rate);
                self.process_block(block, now);
            }
        }
    }

    fn process_block(&mut self, mut block: AudioBlock, now: Instant) {
        self.gain.apply(&mut block.samples);
        self.tap.feed(&block.samples);

        let wire = resampler::resample_block(&block, self.wire_rate);
        (self.on_packet)(pcm_codec::encode_packet(&wire.samples));
        self.counters.blocks.fetch_add(1, Ordering::Relaxed);
        self.counters.packets_sent.fetch_add(1, Ordering::Relaxed);

        if let Some(ref mut silence) = self.silence {
            if silence.observe(&wire.samples, now) {
                let marker = silence.silence_block(self.wire_rate);
                log::debug!("Injecting {:.2}s of silence", marker.duration_secs());
                (self.on_packet)(pcm_codec::encode_packet(&marker.samples));
                self.counters.packets_sent.fetch_add(1, Ordering::Relaxed);
                self.counters.silence_injections.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Owns the input device handle and the capture callback.
///
/// Every `start` and `stop` bumps a generation counter. A callback or a
/// pending acquisition only acts while its own generation is current, so a
/// stop issued mid-acquisition wins and the late device handle is released
/// without any of its audio reaching the outbound callback.
///
/// Teardown order on stop: processor (generation bump), tap, source.
pub struct CaptureStage<I: InputBackend> {
    backend: I,
    config: EngineConfiguration,
    gain: GainControl,
    tap: SignalTap,
    generation: Arc<AtomicU64>,
    stream: Mutex<Option<Box<dyn InputStream>>>,
    counters: Arc<CaptureCounters>,
    session_id: Mutex<Option<String>>,
}

impl<I: InputBackend> CaptureStage<I> {
    pub fn new(backend: I, config: &EngineConfiguration, gain: GainControl, tap: SignalTap) -> Self {
        Self {
            backend,
            config: config.clone(),
            gain,
            tap,
            generation: Arc::new(AtomicU64::new(0)),
            stream: Mutex::new(None),
            counters: Arc::new(CaptureCounters::default()),
            session_id: Mutex::new(None),
        }
    }

    pub fn backend(&self) -> &I {
        &self.backend
    }

    pub fn is_active(&self) -> bool {
        self.stream.lock().is_some()
    }

    /// Id of the current (or most recent) capture session.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    pub(crate) fn counters(&self) -> &CaptureCounters {
        &self.counters
    }

    /// Stop any previous capture, then acquire `selector` and route its
    /// audio to `on_packet`.
    ///
    /// Acquisition runs without holding the stage lock so a concurrent
    /// [`CaptureStage::stop`] can supersede it.
    pub fn start(
        &self,
        selector: &DeviceSelector,
        on_packet: PacketCallback,
    ) -> Result<CaptureStart, EngineError> {
        self.stop();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let processor = Arc::new(Mutex::new(BlockProcessor::new(
            &self.config,
            self.gain.clone(),
            self.tap.clone(),
            on_packet,
            Arc::clone(&self.counters),
        )));

        let current = Arc::clone(&self.generation);
        let callback = Arc::new(move |samples: &[f32], native_rate: u32| {
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            processor.lock().push(samples, native_rate, Instant::now());
        });

        let constraints = CaptureConstraints::voice(self.config.capture_wire_rate);
        log::info!("Acquiring input device '{}'", selector);
        let acquired = self.backend.acquire(selector, &constraints, callback);

        let mut slot = self.stream.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            if let Ok(mut stream) = acquired {
                stream.stop();
                self.counters.discarded_handles.fetch_add(1, Ordering::Relaxed);
                log::warn!("Capture stopped during acquisition, released late device handle");
            }
            return Ok(CaptureStart::Superseded);
        }

        let mut stream = acquired?;
        if let Err(e) = stream.start() {
            stream.stop();
            return Err(e);
        }

        let native_rate = stream.sample_rate();
        self.tap.activate();
        *slot = Some(stream);

        let session_id = uuid::Uuid::new_v4().to_string();
        log::info!(
            "Capture session {} started at {} Hz (wire rate {} Hz)",
            session_id,
            native_rate,
            self.config.capture_wire_rate
        );
        *self.session_id.lock() = Some(session_id);
        Ok(CaptureStart::Started { native_rate })
    }

    /// Drain and release the current capture. Returns false when nothing
    /// was running.
    pub fn stop(&self) -> bool {
        let mut slot = self.stream.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.tap.deactivate();

        match slot.take() {
            Some(mut stream) => {
                stream.stop();
                log::info!("Capture stopped");
                true
            }
            None => false,
        }
    }
}

impl<I: InputBackend> Drop for CaptureStage<I> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    use crate::models::audio_models::EncodedPacket;
    use crate::models::config::SilenceInjectionConfig;
    use crate::session::test_support::FakeInputBackend;

    fn collector() -> (PacketCallback, Arc<Mutex<Vec<EncodedPacket>>>) {
        let packets = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&packets);
        (Arc::new(move |p: EncodedPacket| sink.lock().push(p)), packets)
    }

    fn stage(backend: FakeInputBackend, config: &EngineConfiguration) -> CaptureStage<FakeInputBackend> {
        CaptureStage::new(backend, config, GainControl::default(), SignalTap::new())
    }

    #[test]
    fn block_at_48k_becomes_1366_wire_samples() {
        let backend = FakeInputBackend::new(48000);
        let stage = stage(backend.clone(), &EngineConfiguration::default());
        let (cb, packets) = collector();

        let started = stage.start(&DeviceSelector::Default, cb).unwrap();
        assert_eq!(started, CaptureStart::Started { native_rate: 48000 });

        let tone: Vec<f32> = (0..4096).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
        backend.push(&tone);

        let packets = packets.lock();
        assert_eq!(packets.len(), 1);
        let decoded = pcm_codec::decode_packet(&packets[0]).unwrap();
        assert_eq!(decoded.len(), 1366);
        assert!(stage.session_id().is_some());
    }

    #[test]
    fn partial_buffers_accumulate_into_blocks() {
        let backend = FakeInputBackend::new(16000);
        let config = EngineConfiguration {
            capture_block_size: 1024,
            ..Default::default()
        };
        let stage = stage(backend.clone(), &config);
        let (cb, packets) = collector();
        stage.start(&DeviceSelector::Default, cb).unwrap();

        for _ in 0..5 {
            backend.push(&[0.1; 480]);
        }
        assert_eq!(packets.lock().len(), 2);
        assert_eq!(stage.counters().blocks.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn oversized_callback_loses_no_samples() {
        let backend = FakeInputBackend::new(16000);
        let config = EngineConfiguration {
            capture_block_size: 1024,
            ..Default::default()
        };
        let stage = stage(backend.clone(), &config);
        let (cb, packets) = collector();
        stage.start(&DeviceSelector::Default, cb).unwrap();

        let ramp: Vec<f32> = (0..6400).map(|i| i as f32 / 8192.0).collect();
        backend.push(&ramp[..5400]);
        backend.push(&ramp[5400..]);

        let decoded: Vec<f32> = packets
            .lock()
            .iter()
            .flat_map(|p| pcm_codec::decode_packet(p).unwrap())
            .collect();
        assert_eq!(decoded.len(), 6144);
        for (out, expected) in decoded.iter().zip(&ramp) {
            assert!((out - expected).abs() <= pcm_codec::QUANTIZATION_STEP);
        }
        assert_eq!(stage.counters().blocks.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn gain_is_applied_before_encoding() {
        let backend = FakeInputBackend::new(16000);
        let config = EngineConfiguration {
            capture_block_size: 1024,
            ..Default::default()
        };
        let gain = GainControl::new(0.5);
        let stage = CaptureStage::new(backend.clone(), &config, gain, SignalTap::new());
        let (cb, packets) = collector();
        stage.start(&DeviceSelector::Default, cb).unwrap();

        backend.push(&[0.8; 1024]);
        let decoded = pcm_codec::decode_packet(&packets.lock()[0]).unwrap();
        assert!((decoded[0] - 0.4).abs() <= pcm_codec::QUANTIZATION_STEP);
    }

    #[test]
    fn stop_is_idempotent_and_silences_callbacks() {
        let backend = FakeInputBackend::new(16000);
        let stage = stage(backend.clone(), &EngineConfiguration::default());
        let (cb, packets) = collector();
        stage.start(&DeviceSelector::Default, cb).unwrap();
        assert_eq!(backend.live_streams(), 1);

        assert!(stage.stop());
        assert!(!stage.stop());
        assert_eq!(backend.live_streams(), 0);

        backend.push(&[0.3; 4096]);
        assert!(packets.lock().is_empty());
    }

    #[test]
    fn restart_never_leaves_two_streams() {
        let backend = FakeInputBackend::new(16000);
        let stage = stage(backend.clone(), &EngineConfiguration::default());
        let (cb, packets) = collector();

        for _ in 0..3 {
            stage.start(&DeviceSelector::Default, Arc::clone(&cb)).unwrap();
            assert_eq!(backend.live_streams(), 1);
        }
        assert_eq!(backend.acquisitions(), 3);

        backend.push(&[0.2; 4096]);
        assert_eq!(packets.lock().len(), 1);
    }

    #[test]
    fn stop_during_acquisition_discards_late_handle() {
        let backend = FakeInputBackend::new(48000);
        let (entered, release) = backend.gate();
        let stage = Arc::new(stage(backend.clone(), &EngineConfiguration::default()));
        let (cb, packets) = collector();

        let starter = {
            let stage = Arc::clone(&stage);
            thread::spawn(move || stage.start(&DeviceSelector::Default, cb))
        };

        entered.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!stage.stop());
        release.send(()).unwrap();

        let outcome = starter.join().unwrap().unwrap();
        assert_eq!(outcome, CaptureStart::Superseded);
        assert_eq!(backend.live_streams(), 0);
        assert!(!stage.is_active());
        assert_eq!(stage.counters().discarded_handles.load(Ordering::Relaxed), 1);

        backend.push(&[0.5; 4096]);
        assert!(packets.lock().is_empty());
    }

    #[test]
    fn acquisition_failure_leaves_nothing_active() {
        let backend = FakeInputBackend::new(16000);
        backend.fail_next_acquisition(EngineError::DeviceNotAvailable("no mic".into()));
        let stage = stage(backend.clone(), &EngineConfiguration::default());
        let (cb, _) = collector();

        let err = stage.start(&DeviceSelector::Default, cb).unwrap_err();
        assert_eq!(err, EngineError::DeviceNotAvailable("no mic".into()));
        assert!(!stage.is_active());
        assert_eq!(backend.live_streams(), 0);
    }

    #[test]
    fn silence_injection_is_rate_limited() {
        let config = EngineConfiguration {
            capture_block_size: 1024,
            silence_injection: Some(SilenceInjectionConfig {
                min_interval_ms: 3000,
                ..Default::default()
            }),
            ..Default::default()
        };
        let (cb, packets) = collector();
        let counters = Arc::new(CaptureCounters::default());
        let mut processor = BlockProcessor::new(
            &config,
            GainControl::default(),
            SignalTap::new(),
            cb,
            Arc::clone(&counters),
        );

        let t0 = Instant::now();
        // 64 ms per block at 16 kHz; ten simulated seconds of quiet
        for i in 0..156u64 {
            processor.push(&[0.0; 1024], 16000, t0 + Duration::from_millis(i * 64));
        }

        let injected = counters.silence_injections.load(Ordering::Relaxed);
        assert_eq!(injected, 3);
        let silent = packets
            .lock()
            .iter()
            .filter(|p| pcm_codec::decode_packet(p).unwrap().len() == 11200)
            .count();
        assert_eq!(silent as u64, injected);
    }

    #[test]
    fn tap_follows_capture_lifecycle() {
        let backend = FakeInputBackend::new(16000);
        let tap = SignalTap::new();
        let stage = CaptureStage::new(
            backend.clone(),
            &EngineConfiguration::default(),
            GainControl::default(),
            tap.clone(),
        );
        let (cb, _) = collector();

        stage.start(&DeviceSelector::Default, cb).unwrap();
        assert!(tap.is_active());
        stage.stop();
        assert!(!tap.is_active());
    }
}

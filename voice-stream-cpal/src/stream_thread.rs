use std::sync::mpsc;
use std::thread;

use crate::error::BackendError;

/// What a stream thread reports once its stream is playing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub device_name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Dedicated owner thread for one `cpal::Stream`.
///
/// cpal streams are not `Send`, so the stream is built, played and dropped
/// on this thread. [`StreamThread::stop`] returns only after the stream has
/// been dropped, at which point its callback can no longer fire.
pub(crate) struct StreamThread {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StreamThread {
    /// Spawn `name`, run `build` on it and wait for the stream to start.
    pub fn spawn<F>(name: &str, build: F) -> Result<(Self, StreamInfo), BackendError>
    where
        F: FnOnce() -> Result<(cpal::Stream, StreamInfo), BackendError> + Send + 'static,
    {
        use cpal::traits::StreamTrait;

        let (ready_tx, ready_rx) = mpsc::channel::<Result<StreamInfo, BackendError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                let stream = match build() {
                    Ok((stream, info)) => match stream.play() {
                        Ok(()) => {
                            let _ = ready_tx.send(Ok(info));
                            stream
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.into()));
                            return;
                        }
                    },
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Returns on an explicit stop or when the owner is dropped
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| BackendError::Thread(format!("failed to spawn {}: {}", name, e)))?;

        let mut thread = Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        };
        match ready_rx.recv() {
            Ok(Ok(info)) => Ok((thread, info)),
            Ok(Err(e)) => {
                thread.stop();
                Err(e)
            }
            Err(_) => {
                thread.stop();
                Err(BackendError::Thread(format!("{} exited before starting", name)))
            }
        }
    }

    /// Drop the stream and join the thread. Idempotent.
    pub fn stop(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Audio stream thread panicked");
            }
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Device-backed audio sinks
//!
//! Two ways to reach the device without letting concurrent workers corrupt
//! a stream:
//!
//! - [`PerTaskSink`] opens a dedicated stream for every tone and closes it
//!   once the tone has been consumed. Workers never share a stream.
//! - [`SharedStreamSink`] keeps one stream open on its own thread. Workers
//!   go through a [`QueueWriter`], which holds a single-writer lock for the
//!   whole tone, so chunks of different tones never interleave in the
//!   stream's queue.

use crossbeam_channel::bounded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::buffer::{BufferCursor, PcmQueue, QueueReader, QueueWriter};
use crate::audio::device::{get_output_device, OutputSpec};
use crate::audio::sink::AudioSink;
use crate::audio::synth::StereoBuffer;
use crate::error::AudioError;

/// Slack on top of a tone's own length before playback counts as stuck
const PLAYBACK_MARGIN: Duration = Duration::from_millis(500);

fn playback_deadline(buffer: &StereoBuffer) -> Duration {
    buffer.duration() + PLAYBACK_MARGIN
}

/// Opens and closes a dedicated output stream per tone
pub struct PerTaskSink {
    device_name: Option<String>,
    spec: OutputSpec,
}

impl PerTaskSink {
    pub fn new(device_name: Option<String>, spec: OutputSpec) -> Self {
        Self { device_name, spec }
    }
}

impl AudioSink for PerTaskSink {
    fn name(&self) -> &str {
        "per-task stream"
    }

    fn play(&self, buffer: &StereoBuffer) -> Result<(), AudioError> {
        let device = get_output_device(self.device_name.as_deref())?;
        let spec = OutputSpec {
            sample_rate: buffer.sample_rate(),
            ..self.spec
        };

        let (done_tx, done_rx) = bounded::<()>(1);
        let mut cursor = BufferCursor::new(buffer.clone());

        // Completion fires on the callback after the last samples went out,
        // so the final device buffer is not cut off when the stream drops.
        let stream = device.open_stream(
            &spec,
            move |out| {
                if cursor.is_finished() {
                    out.fill(0);
                    let _ = done_tx.try_send(());
                } else {
                    cursor.fill(out);
                }
            },
            |err| tracing::error!("Output stream error: {}", err),
        )?;

        let timeout = playback_deadline(buffer);
        let result = done_rx
            .recv_timeout(timeout)
            .map_err(|_| AudioError::Timeout(timeout.as_millis() as u64));
        drop(stream);
        result
    }
}

/// One long-lived output stream shared by every worker
pub struct SharedStreamSink {
    writer: QueueWriter,
    spec: OutputSpec,
    running: Arc<AtomicBool>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SharedStreamSink {
    /// Open the device stream on a dedicated thread.
    ///
    /// `queue_chunks` bounds how many device buffers may be queued ahead of
    /// the callback. A stream error reported by the backend closes the sink.
    pub fn open(
        device_name: Option<String>,
        spec: OutputSpec,
        queue_chunks: usize,
    ) -> Result<Self, AudioError> {
        let queue = Arc::new(PcmQueue::new(queue_chunks.max(1)));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<Result<String, AudioError>>(1);

        let reader_queue = queue.clone();
        let running_for_loop = running.clone();
        let running_on_error = running.clone();

        // cpal streams are not Send everywhere; the stream lives and dies on
        // this thread.
        let handle = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let opened = get_output_device(device_name.as_deref()).and_then(|device| {
                    let mut reader = QueueReader::new(reader_queue);
                    let stream = device.open_stream(
                        &spec,
                        move |out| {
                            reader.fill(out);
                        },
                        move |err| {
                            tracing::error!("Shared output stream failed: {}", err);
                            running_on_error.store(false, Ordering::SeqCst);
                        },
                    )?;
                    Ok((device.name, stream))
                });

                match opened {
                    Ok((name, _stream)) => {
                        let _ = ready_tx.send(Ok(name));
                        while running_for_loop.load(Ordering::Relaxed) {
                            thread::sleep(Duration::from_millis(10));
                        }
                        // Stream is dropped here, releasing the device
                    }
                    Err(e) => {
                        running_for_loop.store(false, Ordering::SeqCst);
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(name)) => {
                tracing::info!(
                    "Shared output stream open on {} ({} Hz, {} frames/buffer)",
                    name,
                    spec.sample_rate,
                    spec.frames_per_buffer
                );
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(AudioError::StreamClosed);
            }
        }

        Ok(Self {
            writer: QueueWriter::new(queue, spec.samples_per_buffer(), running.clone()),
            spec,
            running,
            thread_handle: Mutex::new(Some(handle)),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the stream thread and release the device
    pub fn close(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl AudioSink for SharedStreamSink {
    fn name(&self) -> &str {
        "shared stream"
    }

    fn play(&self, buffer: &StereoBuffer) -> Result<(), AudioError> {
        if buffer.sample_rate() != self.spec.sample_rate {
            return Err(AudioError::UnsupportedFormat(format!(
                "buffer at {} Hz on a {} Hz stream",
                buffer.sample_rate(),
                self.spec.sample_rate
            )));
        }
        self.writer.write(buffer.samples(), playback_deadline(buffer))
    }
}

impl Drop for SharedStreamSink {
    fn drop(&mut self) {
        self.close();
    }
}

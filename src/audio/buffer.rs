//! PCM queues and cursors feeding output stream callbacks
//!
//! [`PcmQueue`] is a lock-free bounded queue of interleaved i16 chunks
//! between one writer and the device callback. It counts samples in and
//! out so a writer can block until everything it queued has been consumed.
//! [`QueueWriter`] is the only way workers reach a shared queue: one tone at
//! a time, under a lock, with a deadline on every wait.

use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::synth::StereoBuffer;
use crate::error::AudioError;

/// Poll interval while a writer waits on the reader
const WRITE_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Lock-free chunk queue for a shared output stream
pub struct PcmQueue {
    queue: ArrayQueue<Vec<i16>>,
    /// Samples pushed so far
    enqueued: AtomicU64,
    /// Samples copied out to the device so far
    consumed: AtomicU64,
}

impl PcmQueue {
    /// Create a queue holding at most `capacity` chunks
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            enqueued: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
        }
    }

    /// Push a chunk; hands it back if the queue is full
    pub fn push(&self, chunk: Vec<i16>) -> Result<(), Vec<i16>> {
        let len = chunk.len() as u64;
        self.queue.push(chunk)?;
        self.enqueued.fetch_add(len, Ordering::AcqRel);
        Ok(())
    }

    pub fn pop(&self) -> Option<Vec<i16>> {
        self.queue.pop()
    }

    fn mark_consumed(&self, samples: usize) {
        self.consumed.fetch_add(samples as u64, Ordering::AcqRel);
    }

    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Acquire)
    }

    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Get fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.len() as f32 / self.capacity() as f32
    }
}

/// Thread-safe handle to a PCM queue
pub type SharedPcmQueue = Arc<PcmQueue>;

/// Callback-side reader of a [`PcmQueue`].
///
/// Keeps the partially copied chunk between callbacks and pads with silence
/// when the queue runs dry.
pub struct QueueReader {
    queue: SharedPcmQueue,
    current: Vec<i16>,
    position: usize,
}

impl QueueReader {
    pub fn new(queue: SharedPcmQueue) -> Self {
        Self {
            queue,
            current: Vec::new(),
            position: 0,
        }
    }

    /// Fill `out` from the queue; returns the number of real samples copied
    pub fn fill(&mut self, out: &mut [i16]) -> usize {
        let mut written = 0;
        while written < out.len() {
            if self.position >= self.current.len() {
                match self.queue.pop() {
                    Some(chunk) => {
                        self.current = chunk;
                        self.position = 0;
                        continue;
                    }
                    None => break,
                }
            }
            let n = (self.current.len() - self.position).min(out.len() - written);
            out[written..written + n]
                .copy_from_slice(&self.current[self.position..self.position + n]);
            self.position += n;
            written += n;
        }
        out[written..].fill(0);
        self.queue.mark_consumed(written);
        written
    }
}

/// Serializing writer in front of a [`PcmQueue`].
///
/// `write` holds the lock for a whole tone, so chunks of concurrent tones
/// never interleave. Every wait is bounded by the caller's timeout and
/// aborts once `running` is cleared, so a stalled or failed reader costs
/// each writer at most its own timeout.
pub struct QueueWriter {
    queue: SharedPcmQueue,
    chunk_samples: usize,
    lock: Mutex<()>,
    running: Arc<AtomicBool>,
}

impl QueueWriter {
    pub fn new(queue: SharedPcmQueue, chunk_samples: usize, running: Arc<AtomicBool>) -> Self {
        Self {
            queue,
            chunk_samples: chunk_samples.max(1),
            lock: Mutex::new(()),
            running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Queue `samples` and block until the reader has consumed all of them
    pub fn write(&self, samples: &[i16], timeout: Duration) -> Result<(), AudioError> {
        let _guard = self.lock.lock();
        let deadline = Instant::now() + timeout;
        let timed_out = || AudioError::Timeout(timeout.as_millis() as u64);

        for chunk in samples.chunks(self.chunk_samples) {
            let mut pending = chunk.to_vec();
            loop {
                if !self.is_running() {
                    return Err(AudioError::StreamClosed);
                }
                match self.queue.push(pending) {
                    Ok(()) => break,
                    Err(rejected) => pending = rejected,
                }
                if Instant::now() >= deadline {
                    return Err(timed_out());
                }
                thread::sleep(WRITE_POLL_INTERVAL);
            }
        }

        let target = self.queue.enqueued();
        while self.queue.consumed() < target {
            if !self.is_running() {
                return Err(AudioError::StreamClosed);
            }
            if Instant::now() >= deadline {
                return Err(timed_out());
            }
            thread::sleep(WRITE_POLL_INTERVAL);
        }
        Ok(())
    }
}

/// Callback-side reader of a single buffer, for one-shot streams
pub struct BufferCursor {
    buffer: StereoBuffer,
    position: usize,
}

impl BufferCursor {
    pub fn new(buffer: StereoBuffer) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Fill `out` with the next samples, padding with silence at the end
    pub fn fill(&mut self, out: &mut [i16]) -> usize {
        let samples = self.buffer.samples();
        let n = (samples.len() - self.position).min(out.len());
        out[..n].copy_from_slice(&samples[self.position..self.position + n]);
        out[n..].fill(0);
        self.position += n;
        n
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.buffer.samples().len()
    }
}

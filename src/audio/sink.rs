//! Audio sink abstraction
//!
//! A sink is the last hop of a playback task: it receives a finished stereo
//! buffer and blocks until the buffer has been handed to the output device.
//! Sinks are shared by every worker, so `play` takes `&self`; a sink that
//! owns a single device stream is responsible for serializing its writers.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::audio::synth::StereoBuffer;
use crate::error::AudioError;

/// Destination for rendered tones
pub trait AudioSink: Send + Sync {
    /// Human-readable name for logging
    fn name(&self) -> &str;

    /// Write the whole buffer, blocking until it has been consumed
    fn play(&self, buffer: &StereoBuffer) -> Result<(), AudioError>;
}

/// Discards buffers; used when running headless
#[derive(Debug, Default)]
pub struct NullSink {
    frames: AtomicU64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total frames "played"
    pub fn frames_played(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl AudioSink for NullSink {
    fn name(&self) -> &str {
        "null"
    }

    fn play(&self, buffer: &StereoBuffer) -> Result<(), AudioError> {
        self.frames
            .fetch_add(buffer.frames() as u64, Ordering::Relaxed);
        Ok(())
    }
}

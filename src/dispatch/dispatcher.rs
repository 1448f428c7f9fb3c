//! Packet → tone dispatch
//!
//! Wires the classifier to the admission gate and hands admitted tones to
//! the worker pool. Everything on the `handle`/`offer` path is non-blocking:
//! a lock held for a handful of set operations, one channel send, no audio.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::cache::ToneBank;
use crate::audio::sink::AudioSink;
use crate::audio::synth::ToneDescriptor;
use crate::dispatch::admission::{Admission, AdmissionGate, CompletionToken};
use crate::dispatch::classifier::Classifier;
use crate::dispatch::pool::WorkerPool;
use crate::error::Result;
use crate::network::packet::PacketView;

/// Result of offering a tone for playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    /// Skipped under load; not an error
    Dropped,
}

/// Dispatcher sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchLimits {
    /// Tones playing truly in parallel
    pub max_concurrent_tones: usize,
    /// Tracked (queued + playing) tones before new ones are dropped
    pub max_queue_size: usize,
}

impl Default for DispatchLimits {
    fn default() -> Self {
        Self {
            max_concurrent_tones: crate::constants::MAX_CONCURRENT_TONES,
            max_queue_size: crate::constants::MAX_QUEUE_SIZE,
        }
    }
}

/// Running dispatch counters
#[derive(Debug, Default)]
pub struct DispatchStats {
    packets: AtomicU64,
    classified: AtomicU64,
    accepted: AtomicU64,
    dropped: AtomicU64,
    played: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub packets: u64,
    pub classified: u64,
    pub accepted: u64,
    pub dropped: u64,
    pub played: u64,
    pub failed: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets: self.packets.load(Ordering::Relaxed),
            classified: self.classified.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            played: self.played.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// What was left behind at shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Admitted tones that had not completed
    pub outstanding_tasks: usize,
    /// Workers still busy when the grace period ran out
    pub unjoined_workers: usize,
}

/// One admitted tone, from queue to device
struct PlaybackTask {
    descriptor: ToneDescriptor,
    bank: Arc<ToneBank>,
    sink: Arc<dyn AudioSink>,
    stats: Arc<DispatchStats>,
    // Dropped last, after playback returns or unwinds
    _token: CompletionToken,
}

impl PlaybackTask {
    fn run(self) {
        let buffer = self.bank.tone(&self.descriptor);
        match self.sink.play(&buffer) {
            Ok(()) => {
                self.stats.played.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Playing {}", self.descriptor);
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "Failed to play {} on {}: {}",
                    self.descriptor,
                    self.sink.name(),
                    e
                );
            }
        }
    }
}

/// Classifies packets and schedules their tones
pub struct Dispatcher {
    classifier: Classifier,
    gate: AdmissionGate,
    pool: WorkerPool,
    bank: Arc<ToneBank>,
    sink: Arc<dyn AudioSink>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    pub fn new(
        classifier: Classifier,
        limits: DispatchLimits,
        bank: Arc<ToneBank>,
        sink: Arc<dyn AudioSink>,
    ) -> Result<Self> {
        let pool = WorkerPool::new(limits.max_concurrent_tones, "tone-worker")?;
        tracing::info!(
            "Dispatcher ready: {} workers, queue limit {}, sink {}, {} tones",
            pool.size(),
            limits.max_queue_size,
            sink.name(),
            if bank.is_cached() { "cached" } else { "live" }
        );

        Ok(Self {
            classifier,
            gate: AdmissionGate::new(limits.max_queue_size),
            pool,
            bank,
            sink,
            stats: Arc::new(DispatchStats::default()),
        })
    }

    /// Packet callback: classify, then offer the tone if there is one
    pub fn handle(&self, packet: &PacketView<'_>) -> Option<Offer> {
        self.stats.packets.fetch_add(1, Ordering::Relaxed);
        let descriptor = self.classifier.classify(packet)?;
        self.stats.classified.fetch_add(1, Ordering::Relaxed);
        Some(self.offer(descriptor))
    }

    /// Admit a tone and queue it, or drop it when the gate is full
    pub fn offer(&self, descriptor: ToneDescriptor) -> Offer {
        let token = match self.gate.offer() {
            Admission::Accepted(token) => token,
            Admission::Dropped => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Queue is full, skipping {}", descriptor);
                return Offer::Dropped;
            }
        };

        let task = PlaybackTask {
            descriptor,
            bank: self.bank.clone(),
            sink: self.sink.clone(),
            stats: self.stats.clone(),
            _token: token,
        };

        // A rejected job drops its token, which frees the slot again
        if self.pool.submit(Box::new(move || task.run())).is_err() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return Offer::Dropped;
        }

        self.stats.accepted.fetch_add(1, Ordering::Relaxed);
        Offer::Accepted
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Admitted tones not yet completed
    pub fn outstanding(&self) -> usize {
        self.gate.outstanding()
    }

    /// Tones admitted and still tracked by the gate
    pub fn tracked(&self) -> usize {
        self.gate.tracked()
    }

    /// Stop workers, waiting at most `grace` for queued tones to finish
    pub fn shutdown(mut self, grace: Duration) -> ShutdownReport {
        let unjoined_workers = self.pool.shutdown(grace);
        let report = ShutdownReport {
            outstanding_tasks: self.gate.outstanding(),
            unjoined_workers,
        };
        if report.unjoined_workers > 0 {
            tracing::warn!(
                "Shutdown left {} tones in flight on {} workers",
                report.outstanding_tasks,
                report.unjoined_workers
            );
        } else {
            tracing::info!("Dispatcher stopped");
        }
        report
    }
}

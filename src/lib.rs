//! # Traffic Sonifier
//!
//! Real-time auditory monitoring of network traffic. Every observed packet is
//! classified by transport protocol and direction, mapped to a short tone and
//! played on the stereo channel that encodes its direction.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────┐
//! │ Capture source           │  pcap replay / synthetic / external capture
//! │ (network::PacketSource)  │
//! └────────────┬─────────────┘
//!              │ PacketView (borrowed, one per packet)
//!              ▼
//! ┌──────────────────────────┐
//! │ Classifier               │  IP? TCP before UDP, source prefix → direction
//! └────────────┬─────────────┘
//!              │ ToneDescriptor { frequency, channel }
//!              ▼
//! ┌──────────────────────────┐
//! │ AdmissionGate            │  prune completed, |registry| < max_queue_size?
//! └──────┬────────────┬──────┘
//!        │ Accepted   │ Dropped (logged, skipped)
//!        ▼
//! ┌──────────────────────────┐
//! │ WorkerPool               │  max_concurrent_tones workers, unbounded run queue
//! │  ┌────────┐ ┌────────┐   │
//! │  │ Worker │ │ Worker │.. │  ToneBank (cache / synth) → AudioSink::play
//! │  └────────┘ └────────┘   │
//! └────────────┬─────────────┘
//!              ▼
//! ┌──────────────────────────┐
//! │ AudioSink                │  per-task stream, or one shared stream behind
//! │                          │  a single-writer lock
//! └──────────────────────────┘
//! ```
//!
//! The packet-arrival path (classification and admission) never touches the
//! audio device and never blocks on playback.

pub mod audio;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod network;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Output sample rate
    pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

    /// Output channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Device frame buffer size
    pub const FRAMES_PER_BUFFER: u32 = 512;

    /// TCP packet sent from the local network
    pub const TCP_UPSTREAM_HZ: u32 = 330;

    /// TCP packet arriving from outside
    pub const TCP_DOWNSTREAM_HZ: u32 = 523;

    /// UDP packet sent from the local network
    pub const UDP_UPSTREAM_HZ: u32 = 392;

    /// UDP packet arriving from outside
    pub const UDP_DOWNSTREAM_HZ: u32 = 261;

    /// Source prefixes that mark a packet as upstream: the IPv4 private
    /// range plus IPv6 link-local and unique-local addresses
    pub const LOCAL_NETWORK_PREFIXES: [&str; 3] = ["192.168.0.0/16", "fe80::/10", "fc00::/7"];

    /// Tones played truly in parallel
    pub const MAX_CONCURRENT_TONES: usize = 5;

    /// Tracked in-flight tones before new ones are dropped
    pub const MAX_QUEUE_SIZE: usize = 40;

    /// Tone length in seconds
    pub const TONE_DURATION_SECS: f64 = 0.15;

    /// Longest tone the synthesizer will render
    pub const MAX_TONE_DURATION_SECS: f64 = 10.0;

    /// Peak level relative to full scale
    pub const TONE_VOLUME: f32 = 0.1;

    /// Fade-in/fade-out length in seconds
    pub const TONE_FADE_SECS: f64 = 0.05;

    /// How long shutdown waits for busy workers
    pub const SHUTDOWN_GRACE_MS: u64 = 500;
}

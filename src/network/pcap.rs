//! Classic pcap file replay
//!
//! Reads libpcap capture files (either byte order, microsecond or
//! nanosecond timestamps) and feeds every record through the packet
//! handler, optionally paced by the capture timestamps.

use bytes::{Buf, Bytes};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::CaptureError;
use crate::network::packet::{LinkType, PacketView};
use crate::network::PacketSource;

const MAGIC_MICROS: u32 = 0xa1b2_c3d4;
const MAGIC_NANOS: u32 = 0xa1b2_3c4d;
const GLOBAL_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;

/// Longest single sleep while pacing, so a stop request is noticed quickly
const MAX_PACING_SLEEP: Duration = Duration::from_millis(50);

/// How replayed packets are spaced in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// Deliver every packet immediately
    Burst,
    /// Follow capture timestamps, scaled by `speed` (2.0 = twice as fast)
    Realtime { speed: f64 },
}

/// Replays a pcap file as a packet source
#[derive(Debug)]
pub struct PcapReplay {
    name: String,
    records: Bytes,
    link: LinkType,
    big_endian: bool,
    nanos: bool,
    pacing: Pacing,
}

impl PcapReplay {
    /// Load a capture file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let mut replay = Self::from_bytes(Bytes::from(data))?;
        replay.name = path.display().to_string();
        Ok(replay)
    }

    /// Parse an in-memory capture
    pub fn from_bytes(mut data: Bytes) -> Result<Self, CaptureError> {
        if data.len() < GLOBAL_HEADER_LEN {
            return Err(CaptureError::Truncated(format!(
                "global header needs {} bytes, file has {}",
                GLOBAL_HEADER_LEN,
                data.len()
            )));
        }

        let magic = data.get_u32_le();
        let (big_endian, nanos) = match magic {
            MAGIC_MICROS => (false, false),
            MAGIC_NANOS => (false, true),
            m if m.swap_bytes() == MAGIC_MICROS => (true, false),
            m if m.swap_bytes() == MAGIC_NANOS => (true, true),
            other => return Err(CaptureError::BadMagic(other)),
        };

        // version, thiszone, sigfigs, snaplen
        data.advance(16);
        let link_code = if big_endian {
            data.get_u32()
        } else {
            data.get_u32_le()
        };
        let link = LinkType::from_pcap(link_code)
            .ok_or(CaptureError::UnsupportedLinkType(link_code))?;

        Ok(Self {
            name: "pcap".to_string(),
            records: data,
            link,
            big_endian,
            nanos,
            pacing: Pacing::Burst,
        })
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn link_type(&self) -> LinkType {
        self.link
    }

    fn read_u32(&self, buf: &mut Bytes) -> u32 {
        if self.big_endian {
            buf.get_u32()
        } else {
            buf.get_u32_le()
        }
    }

    fn timestamp(&self, seconds: u32, fraction: u32) -> Duration {
        let nanos = if self.nanos {
            fraction
        } else {
            fraction.saturating_mul(1_000)
        };
        Duration::new(seconds as u64, 0) + Duration::from_nanos(nanos as u64)
    }
}

/// Capture offset divided by `speed`; `None` when the speed is not positive
/// or the result does not fit a `Duration`, in which case the record is not
/// delayed
fn scaled_offset(offset: Duration, speed: f64) -> Option<Duration> {
    if !(speed > 0.0) {
        return None;
    }
    Duration::try_from_secs_f64(offset.as_secs_f64() / speed).ok()
}

/// Sleep until `target` has elapsed since `start`, giving up early on stop
fn wait_until(start: Instant, target: Duration, stop: &AtomicBool) {
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let elapsed = start.elapsed();
        if elapsed >= target {
            return;
        }
        thread::sleep((target - elapsed).min(MAX_PACING_SLEEP));
    }
}

impl PacketSource for PcapReplay {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(
        &mut self,
        stop: &AtomicBool,
        handler: &mut dyn FnMut(&PacketView<'_>),
    ) -> Result<u64, CaptureError> {
        let mut records = self.records.clone();
        let mut delivered = 0u64;
        let mut first_timestamp: Option<Duration> = None;
        let start = Instant::now();

        while records.remaining() >= RECORD_HEADER_LEN {
            if stop.load(Ordering::Relaxed) {
                return Ok(delivered);
            }

            let seconds = self.read_u32(&mut records);
            let fraction = self.read_u32(&mut records);
            let captured_len = self.read_u32(&mut records) as usize;
            let _original_len = self.read_u32(&mut records);

            if captured_len > records.remaining() {
                tracing::warn!(
                    "{}: record {} truncated ({} of {} bytes), stopping replay",
                    self.name,
                    delivered,
                    records.remaining(),
                    captured_len
                );
                return Ok(delivered);
            }
            let frame = records.split_to(captured_len);

            if let Pacing::Realtime { speed } = self.pacing {
                let timestamp = self.timestamp(seconds, fraction);
                let base = *first_timestamp.get_or_insert(timestamp);
                let offset = timestamp.saturating_sub(base);
                if let Some(target) = scaled_offset(offset, speed) {
                    wait_until(start, target, stop);
                }
            }

            handler(&PacketView::parse(self.link, &frame));
            delivered += 1;
        }

        if records.has_remaining() {
            tracing::warn!(
                "{}: {} trailing bytes after last record",
                self.name,
                records.remaining()
            );
        }
        Ok(delivered)
    }
}

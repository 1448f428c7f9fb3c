//! Synthetic traffic generator
//!
//! Produces real IPv4 packets cycling through every protocol/direction
//! combination plus one packet without a transport header, so the whole
//! pipeline can run without capture privileges or a capture file.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::CaptureError;
use crate::network::packet::{LinkType, PacketView, IPPROTO_TCP, IPPROTO_UDP};
use crate::network::PacketSource;

const IPPROTO_ICMP: u8 = 1;

/// Build a minimal IPv4 packet (20-byte header, no options) around `payload`
pub fn ipv4_packet(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, payload: &[u8]) -> Vec<u8> {
    let total_len = (20 + payload.len()) as u16;
    let mut packet = Vec::with_capacity(total_len as usize);
    packet.extend_from_slice(&[0x45, 0x00]);
    packet.extend_from_slice(&total_len.to_be_bytes());
    packet.extend_from_slice(&[0x00, 0x00, 0x40, 0x00]); // id, DF
    packet.extend_from_slice(&[64, protocol, 0x00, 0x00]); // ttl, protocol, checksum
    packet.extend_from_slice(&src.octets());
    packet.extend_from_slice(&dst.octets());
    packet.extend_from_slice(payload);
    packet
}

/// 20-byte TCP header, SYN from an ephemeral port to 443
pub fn tcp_header() -> Vec<u8> {
    let mut header = vec![0u8; 20];
    header[0..2].copy_from_slice(&49152u16.to_be_bytes());
    header[2..4].copy_from_slice(&443u16.to_be_bytes());
    header[12] = 5 << 4;
    header[13] = 0x02;
    header
}

/// 8-byte UDP header from an ephemeral port to 53
pub fn udp_header() -> Vec<u8> {
    let mut header = vec![0u8; 8];
    header[0..2].copy_from_slice(&49152u16.to_be_bytes());
    header[2..4].copy_from_slice(&53u16.to_be_bytes());
    header[4..6].copy_from_slice(&8u16.to_be_bytes());
    header
}

/// Deterministic packet generator
#[derive(Debug, Clone)]
pub struct SyntheticTraffic {
    local: Ipv4Addr,
    remote: Ipv4Addr,
    interval: Duration,
    limit: Option<u64>,
}

impl SyntheticTraffic {
    pub fn new(local: Ipv4Addr, remote: Ipv4Addr, interval: Duration) -> Self {
        Self {
            local,
            remote,
            interval,
            limit: None,
        }
    }

    /// Stop after `count` packets instead of running until stopped
    pub fn with_limit(mut self, count: u64) -> Self {
        self.limit = Some(count);
        self
    }

    /// The `index`-th packet of the cycle
    pub fn packet(&self, index: u64) -> Vec<u8> {
        let (up, down) = (self.local, self.remote);
        match index % 5 {
            0 => ipv4_packet(up, down, IPPROTO_TCP, &tcp_header()),
            1 => ipv4_packet(down, up, IPPROTO_TCP, &tcp_header()),
            2 => ipv4_packet(up, down, IPPROTO_UDP, &udp_header()),
            3 => ipv4_packet(down, up, IPPROTO_UDP, &udp_header()),
            _ => ipv4_packet(up, down, IPPROTO_ICMP, &[8, 0, 0, 0, 0, 0, 0, 0]),
        }
    }
}

impl Default for SyntheticTraffic {
    fn default() -> Self {
        Self::new(
            Ipv4Addr::new(192, 168, 1, 5),
            Ipv4Addr::new(8, 8, 8, 8),
            Duration::from_millis(100),
        )
    }
}

impl PacketSource for SyntheticTraffic {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn run(
        &mut self,
        stop: &AtomicBool,
        handler: &mut dyn FnMut(&PacketView<'_>),
    ) -> Result<u64, CaptureError> {
        let mut delivered = 0u64;
        while !stop.load(Ordering::Relaxed) {
            if self.limit.is_some_and(|limit| delivered >= limit) {
                break;
            }
            let frame = self.packet(delivered);
            handler(&PacketView::parse(LinkType::RawIp, &frame));
            delivered += 1;

            if !self.interval.is_zero() {
                thread::sleep(self.interval);
            }
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::packet::Protocol;
    use std::net::IpAddr;

    #[test]
    fn test_cycle_covers_every_combination() {
        let traffic = SyntheticTraffic::default();
        let local = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 5));

        let frames: Vec<Vec<u8>> = (0..5).map(|i| traffic.packet(i)).collect();
        let views: Vec<PacketView<'_>> = frames
            .iter()
            .map(|f| PacketView::parse(LinkType::RawIp, f))
            .collect();

        assert!(views[0].has(Protocol::Tcp) && views[0].source() == Some(local));
        assert!(views[1].has(Protocol::Tcp) && views[1].source() != Some(local));
        assert!(views[2].has(Protocol::Udp) && views[2].source() == Some(local));
        assert!(views[3].has(Protocol::Udp) && views[3].source() != Some(local));
        assert!(views[4].ip().is_some());
        assert!(!views[4].has(Protocol::Tcp) && !views[4].has(Protocol::Udp));
    }

    #[test]
    fn test_run_respects_limit() {
        let mut traffic = SyntheticTraffic::default().with_limit(12);
        traffic.interval = Duration::ZERO;
        let stop = AtomicBool::new(false);
        let mut seen = 0;
        let delivered = traffic.run(&stop, &mut |_| seen += 1).unwrap();
        assert_eq!(delivered, 12);
        assert_eq!(seen, 12);
    }

    #[test]
    fn test_run_stops_on_flag() {
        let mut traffic = SyntheticTraffic::default();
        let stop = AtomicBool::new(true);
        let delivered = traffic.run(&stop, &mut |_| {}).unwrap();
        assert_eq!(delivered, 0);
    }
}

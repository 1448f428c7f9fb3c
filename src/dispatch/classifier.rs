//! Packet classification
//!
//! Maps a packet to the tone it should produce. Pure and allocation-free:
//! it runs inside the capture callback for every packet.

use std::net::IpAddr;

use crate::audio::synth::{Channel, ToneDescriptor};
use crate::constants::{TCP_DOWNSTREAM_HZ, TCP_UPSTREAM_HZ, UDP_DOWNSTREAM_HZ, UDP_UPSTREAM_HZ};
use crate::network::packet::{PacketView, Protocol};
use crate::network::prefix::LocalNetwork;

/// Order in which transport headers are checked; the first present wins.
///
/// A packet carrying both TCP and UDP headers (tunneled or malformed) is
/// classified as TCP.
pub const PROTOCOL_PRECEDENCE: [Protocol; 2] = [Protocol::Tcp, Protocol::Udp];

/// Traffic direction relative to the local network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Sent from a local address
    Upstream,
    /// Everything else
    Downstream,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Upstream, Direction::Downstream];

    pub fn channel(self) -> Channel {
        match self {
            Direction::Upstream => Channel::Left,
            Direction::Downstream => Channel::Right,
        }
    }
}

/// Frequency for each protocol/direction pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneMap {
    pub tcp_upstream_hz: u32,
    pub tcp_downstream_hz: u32,
    pub udp_upstream_hz: u32,
    pub udp_downstream_hz: u32,
}

impl Default for ToneMap {
    fn default() -> Self {
        Self {
            tcp_upstream_hz: TCP_UPSTREAM_HZ,
            tcp_downstream_hz: TCP_DOWNSTREAM_HZ,
            udp_upstream_hz: UDP_UPSTREAM_HZ,
            udp_downstream_hz: UDP_DOWNSTREAM_HZ,
        }
    }
}

impl ToneMap {
    pub fn frequency(&self, protocol: Protocol, direction: Direction) -> u32 {
        match (protocol, direction) {
            (Protocol::Tcp, Direction::Upstream) => self.tcp_upstream_hz,
            (Protocol::Tcp, Direction::Downstream) => self.tcp_downstream_hz,
            (Protocol::Udp, Direction::Upstream) => self.udp_upstream_hz,
            (Protocol::Udp, Direction::Downstream) => self.udp_downstream_hz,
        }
    }

    /// Every frequency on every channel.
    ///
    /// This is a superset of what the classifier can emit (upstream tones
    /// only ever go left); the tone cache renders all of them.
    pub fn all_descriptors(&self) -> Vec<ToneDescriptor> {
        let mut frequencies = Vec::with_capacity(4);
        for protocol in PROTOCOL_PRECEDENCE {
            for direction in Direction::ALL {
                let hz = self.frequency(protocol, direction);
                if !frequencies.contains(&hz) {
                    frequencies.push(hz);
                }
            }
        }
        frequencies
            .into_iter()
            .flat_map(|hz| Channel::ALL.map(|channel| ToneDescriptor::new(hz, channel)))
            .collect()
    }
}

/// Packet metadata → tone
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    tones: ToneMap,
    local: LocalNetwork,
}

impl Classifier {
    pub fn new(tones: ToneMap, local: LocalNetwork) -> Self {
        Self { tones, local }
    }

    pub fn tones(&self) -> &ToneMap {
        &self.tones
    }

    pub fn direction(&self, source: IpAddr) -> Direction {
        if self.local.contains(source) {
            Direction::Upstream
        } else {
            Direction::Downstream
        }
    }

    /// The tone for `packet`, or `None` when it has no IP header or neither
    /// a TCP nor a UDP header.
    pub fn classify(&self, packet: &PacketView<'_>) -> Option<ToneDescriptor> {
        let ip = packet.ip()?;
        let protocol = PROTOCOL_PRECEDENCE
            .into_iter()
            .find(|protocol| packet.has(*protocol))?;
        let direction = self.direction(ip.src);
        Some(ToneDescriptor::new(
            self.tones.frequency(protocol, direction),
            direction.channel(),
        ))
    }
}

//! Read-only packet view
//!
//! Only what classification needs is extracted: the outermost IP source and
//! destination, and which transport headers (TCP, UDP) appear anywhere in
//! the packet. Beyond the transport header only tunnel encapsulation
//! (IP-in-IP, VXLAN) is followed, one level deep, so a tunneled packet can
//! carry both a TCP and a UDP header.
//!
//! Malformed, truncated or non-IP frames never fail; they produce a view
//! without a network layer.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub const IPPROTO_HOPOPT: u8 = 0;
pub const IPPROTO_IPIP: u8 = 4;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_IPV6: u8 = 41;
pub const IPPROTO_ROUTING: u8 = 43;
pub const IPPROTO_FRAGMENT: u8 = 44;
pub const IPPROTO_DSTOPTS: u8 = 60;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86dd;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88a8;

const ETHERNET_HEADER_LEN: usize = 14;
const SLL_HEADER_LEN: usize = 16;
const IPV4_MIN_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;
const TCP_MIN_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;
const VXLAN_HEADER_LEN: usize = 8;
const VXLAN_PORT: u16 = 4789;

/// Tunnel nesting (IP-in-IP, VXLAN) followed beyond the outer header
const MAX_TUNNEL_DEPTH: usize = 1;
const MAX_EXTENSION_HEADERS: usize = 8;

/// Link-layer framing of captured packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    /// Bare IPv4/IPv6 packets
    RawIp,
    /// Linux cooked capture (`any` interface)
    LinuxSll,
    /// BSD loopback with a 4-byte address family
    Loopback,
}

impl LinkType {
    /// Map a pcap `LINKTYPE_*` code
    pub fn from_pcap(code: u32) -> Option<Self> {
        match code {
            1 => Some(LinkType::Ethernet),
            12 | 14 | 101 | 228 | 229 => Some(LinkType::RawIp),
            113 => Some(LinkType::LinuxSll),
            0 | 108 => Some(LinkType::Loopback),
            _ => None,
        }
    }
}

/// Transport protocols that produce tones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// Addresses of the outermost IP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpEndpoints {
    pub src: IpAddr,
    pub dst: IpAddr,
}

/// Transport headers present in a packet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportLayers {
    pub tcp: bool,
    pub udp: bool,
}

impl TransportLayers {
    pub fn contains(&self, protocol: Protocol) -> bool {
        match protocol {
            Protocol::Tcp => self.tcp,
            Protocol::Udp => self.udp,
        }
    }
}

/// Borrowed view of one captured packet
#[derive(Debug, Clone, Copy)]
pub struct PacketView<'a> {
    raw: &'a [u8],
    ip: Option<IpEndpoints>,
    transport: TransportLayers,
}

impl<'a> PacketView<'a> {
    /// Dissect a captured frame
    pub fn parse(link: LinkType, frame: &'a [u8]) -> Self {
        let mut transport = TransportLayers::default();
        let ip = network_payload(link, frame).and_then(|packet| parse_ip(packet, 0, &mut transport));
        Self {
            raw: frame,
            ip,
            // transport headers without an IP header are meaningless
            transport: if ip.is_some() {
                transport
            } else {
                TransportLayers::default()
            },
        }
    }

    /// Build a view from already-dissected fields
    pub fn from_parts(raw: &'a [u8], ip: Option<IpEndpoints>, transport: TransportLayers) -> Self {
        Self { raw, ip, transport }
    }

    pub fn ip(&self) -> Option<&IpEndpoints> {
        self.ip.as_ref()
    }

    pub fn source(&self) -> Option<IpAddr> {
        self.ip.map(|ip| ip.src)
    }

    pub fn has(&self, protocol: Protocol) -> bool {
        self.transport.contains(protocol)
    }

    pub fn transport(&self) -> TransportLayers {
        self.transport
    }

    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }
}

fn be_u16(data: &[u8], at: usize) -> Option<u16> {
    let bytes = data.get(at..at + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Strip link-layer framing, returning the IP packet if there is one
fn network_payload(link: LinkType, frame: &[u8]) -> Option<&[u8]> {
    match link {
        LinkType::RawIp => Some(frame),
        LinkType::Ethernet => {
            let mut ethertype = be_u16(frame, 12)?;
            let mut offset = ETHERNET_HEADER_LEN;
            while matches!(ethertype, ETHERTYPE_VLAN | ETHERTYPE_QINQ) {
                ethertype = be_u16(frame, offset + 2)?;
                offset += 4;
            }
            match ethertype {
                ETHERTYPE_IPV4 | ETHERTYPE_IPV6 => frame.get(offset..),
                _ => None,
            }
        }
        LinkType::LinuxSll => match be_u16(frame, 14)? {
            ETHERTYPE_IPV4 | ETHERTYPE_IPV6 => frame.get(SLL_HEADER_LEN..),
            _ => None,
        },
        LinkType::Loopback => {
            let family: [u8; 4] = frame.get(..4)?.try_into().ok()?;
            // DLT_NULL is host order, DLT_LOOP network order
            let families = [u32::from_le_bytes(family), u32::from_be_bytes(family)];
            if families.iter().any(|&f| matches!(f, 2 | 24 | 28 | 30)) {
                frame.get(4..)
            } else {
                None
            }
        }
    }
}

fn parse_ip(data: &[u8], depth: usize, transport: &mut TransportLayers) -> Option<IpEndpoints> {
    match data.first()? >> 4 {
        4 => parse_ipv4(data, depth, transport),
        6 => parse_ipv6(data, depth, transport),
        _ => None,
    }
}

fn parse_ipv4(data: &[u8], depth: usize, transport: &mut TransportLayers) -> Option<IpEndpoints> {
    if data.len() < IPV4_MIN_HEADER_LEN {
        return None;
    }
    let header_len = (data[0] & 0x0f) as usize * 4;
    if header_len < IPV4_MIN_HEADER_LEN || data.len() < header_len {
        return None;
    }

    let src = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
    let dst = Ipv4Addr::new(data[16], data[17], data[18], data[19]);

    let total_len = be_u16(data, 2)? as usize;
    let end = if (header_len..=data.len()).contains(&total_len) {
        total_len
    } else {
        data.len()
    };

    let fragment_offset = be_u16(data, 6)? & 0x1fff;
    if fragment_offset == 0 {
        inspect_transport(data[9], &data[header_len..end], depth, transport);
    }

    Some(IpEndpoints {
        src: IpAddr::V4(src),
        dst: IpAddr::V4(dst),
    })
}

fn parse_ipv6(data: &[u8], depth: usize, transport: &mut TransportLayers) -> Option<IpEndpoints> {
    if data.len() < IPV6_HEADER_LEN {
        return None;
    }
    let src: [u8; 16] = data[8..24].try_into().ok()?;
    let dst: [u8; 16] = data[24..40].try_into().ok()?;
    let endpoints = IpEndpoints {
        src: IpAddr::V6(Ipv6Addr::from(src)),
        dst: IpAddr::V6(Ipv6Addr::from(dst)),
    };

    let payload_len = be_u16(data, 4)? as usize;
    // zero payload length means a jumbogram
    let end = if payload_len == 0 {
        data.len()
    } else {
        (IPV6_HEADER_LEN + payload_len).min(data.len())
    };

    let mut next = data[6];
    let mut offset = IPV6_HEADER_LEN;
    for _ in 0..MAX_EXTENSION_HEADERS {
        match next {
            IPPROTO_HOPOPT | IPPROTO_ROUTING | IPPROTO_DSTOPTS => {
                let header = data.get(offset..offset + 2)?;
                next = header[0];
                offset += (header[1] as usize + 1) * 8;
            }
            IPPROTO_FRAGMENT => {
                let header = data.get(offset..offset + 8)?;
                next = header[0];
                offset += 8;
                if u16::from_be_bytes([header[2], header[3]]) >> 3 != 0 {
                    return Some(endpoints);
                }
            }
            _ => break,
        }
    }

    if let Some(payload) = data.get(offset..end) {
        inspect_transport(next, payload, depth, transport);
    }
    Some(endpoints)
}

fn inspect_transport(protocol: u8, payload: &[u8], depth: usize, transport: &mut TransportLayers) {
    match protocol {
        IPPROTO_TCP if payload.len() >= TCP_MIN_HEADER_LEN => transport.tcp = true,
        IPPROTO_UDP if payload.len() >= UDP_HEADER_LEN => {
            transport.udp = true;
            if depth < MAX_TUNNEL_DEPTH && be_u16(payload, 2) == Some(VXLAN_PORT) {
                let inner = payload
                    .get(UDP_HEADER_LEN + VXLAN_HEADER_LEN..)
                    .and_then(|frame| network_payload(LinkType::Ethernet, frame));
                if let Some(inner) = inner {
                    let _ = parse_ip(inner, depth + 1, transport);
                }
            }
        }
        IPPROTO_IPIP | IPPROTO_IPV6 if depth < MAX_TUNNEL_DEPTH => {
            // Inner addresses are ignored: direction follows the outer header
            let _ = parse_ip(payload, depth + 1, transport);
        }
        _ => {}
    }
}

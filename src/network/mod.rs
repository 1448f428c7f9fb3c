//! Packet sources and the read-only packet view handed to the classifier

pub mod packet;
pub mod pcap;
pub mod prefix;
pub mod synthetic;

pub use packet::{IpEndpoints, LinkType, PacketView, Protocol, TransportLayers};
pub use pcap::{Pacing, PcapReplay};
pub use prefix::{LocalNetwork, NetworkPrefix};
pub use synthetic::SyntheticTraffic;

use std::sync::atomic::AtomicBool;

use crate::error::CaptureError;

/// Something that delivers captured packets.
///
/// `run` calls `handler` synchronously, once per packet, on the calling
/// thread, and checks `stop` between packets. It returns the number of
/// packets delivered.
pub trait PacketSource: Send {
    fn name(&self) -> &str;

    fn run(
        &mut self,
        stop: &AtomicBool,
        handler: &mut dyn FnMut(&PacketView<'_>),
    ) -> Result<u64, CaptureError>;
}

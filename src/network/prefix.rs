//! Local network address prefixes
//!
//! A packet whose source address falls inside one of the configured
//! prefixes is upstream (sent from the local network).

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::constants::LOCAL_NETWORK_PREFIXES;
use crate::error::ConfigError;

/// CIDR prefix, e.g. `192.168.0.0/16` or `fd00::/8`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkPrefix {
    addr: IpAddr,
    len: u8,
}

impl NetworkPrefix {
    pub fn new(addr: IpAddr, len: u8) -> Result<Self, ConfigError> {
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if len > max {
            return Err(ConfigError::InvalidPrefix(format!("{}/{}", addr, len)));
        }
        Ok(Self { addr, len })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = mask_u32(self.len);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = mask_u128(self.len);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

fn mask_u32(len: u8) -> u32 {
    u32::MAX.checked_shl(32 - len as u32).unwrap_or(0)
}

fn mask_u128(len: u8) -> u128 {
    u128::MAX.checked_shl(128 - len as u32).unwrap_or(0)
}

impl FromStr for NetworkPrefix {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidPrefix(s.to_string());
        let (addr, len) = match s.trim().split_once('/') {
            Some((addr, len)) => {
                let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
                let len: u8 = len.parse().map_err(|_| invalid())?;
                (addr, len)
            }
            None => {
                let addr: IpAddr = s.trim().parse().map_err(|_| invalid())?;
                let len = if addr.is_ipv4() { 32 } else { 128 };
                (addr, len)
            }
        };
        Self::new(addr, len).map_err(|_| invalid())
    }
}

impl fmt::Display for NetworkPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

/// Set of prefixes that make up the local network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalNetwork {
    prefixes: Vec<NetworkPrefix>,
}

impl LocalNetwork {
    pub fn new(prefixes: Vec<NetworkPrefix>) -> Self {
        Self { prefixes }
    }

    /// Parse a list of CIDR strings
    pub fn parse<S: AsRef<str>>(prefixes: &[S]) -> Result<Self, ConfigError> {
        let prefixes = prefixes
            .iter()
            .map(|p| p.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(prefixes))
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.prefixes.iter().any(|p| p.contains(ip))
    }

    pub fn prefixes(&self) -> &[NetworkPrefix] {
        &self.prefixes
    }
}

impl Default for LocalNetwork {
    fn default() -> Self {
        Self::parse(&LOCAL_NETWORK_PREFIXES).unwrap_or_else(|_| Self::new(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_default_matches_192_168() {
        let local = LocalNetwork::default();
        assert!(local.contains(ip("192.168.1.5")));
        assert!(local.contains(ip("192.168.255.255")));
        assert!(!local.contains(ip("192.169.0.1")));
        assert!(!local.contains(ip("8.8.8.8")));
        assert!(!local.contains(ip("::1")));
    }

    #[test]
    fn test_default_covers_ipv6_local_ranges() {
        let local = LocalNetwork::default();
        assert!(local.contains(ip("fe80::1c2b:3aff:fe4d:5e6f")));
        assert!(local.contains(ip("fd12:3456::1")));
        assert!(!local.contains(ip("2001:db8::1")));
        assert!(!local.contains(ip("2a00:1450:4001::200e")));
    }

    #[test]
    fn test_prefix_parsing() {
        let prefix: NetworkPrefix = "10.0.0.0/8".parse().unwrap();
        assert!(prefix.contains(ip("10.200.3.4")));
        assert_eq!(prefix.to_string(), "10.0.0.0/8");

        let host: NetworkPrefix = "172.16.0.9".parse().unwrap();
        assert!(host.contains(ip("172.16.0.9")));
        assert!(!host.contains(ip("172.16.0.10")));

        assert!("10.0.0.0/33".parse::<NetworkPrefix>().is_err());
        assert!("not-an-ip/8".parse::<NetworkPrefix>().is_err());
    }

    #[test]
    fn test_zero_length_prefix_matches_family() {
        let any_v4: NetworkPrefix = "0.0.0.0/0".parse().unwrap();
        assert!(any_v4.contains(ip("1.2.3.4")));
        assert!(!any_v4.contains(ip("fe80::1")));
    }

    #[test]
    fn test_ipv6_prefix() {
        let local = LocalNetwork::parse(&["fd00::/8", "192.168.0.0/16"]).unwrap();
        assert!(local.contains(ip("fd12:3456::1")));
        assert!(!local.contains(ip("2001:db8::1")));
        assert_eq!(local.prefixes().len(), 2);
    }
}

//! Destination addressing.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Transport network of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Tcp,
    Udp,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            Network::Udp => write!(f, "udp"),
        }
    }
}

/// Host part of a destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    Ip(IpAddr),
    Domain(String),
}

impl Address {
    /// Parse an IP literal, falling back to a domain name. Empty input yields `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        let unbracketed = s.trim_start_matches('[').trim_end_matches(']');
        match IpAddr::from_str(unbracketed) {
            Ok(ip) => Some(Address::Ip(ip)),
            Err(_) => Some(Address::Domain(s.to_string())),
        }
    }

    pub fn is_ip(&self) -> bool {
        matches!(self, Address::Ip(_))
    }
}

impl From<IpAddr> for Address {
    fn from(ip: IpAddr) -> Self {
        Address::Ip(ip)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Ip(IpAddr::V6(ip)) => write!(f, "[{}]", ip),
            Address::Ip(ip) => write!(f, "{}", ip),
            Address::Domain(domain) => write!(f, "{}", domain),
        }
    }
}

/// Network, host and port of one dispatched flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub network: Network,
    pub address: Address,
    pub port: u16,
}

impl Destination {
    pub fn tcp(address: Address, port: u16) -> Self {
        Self {
            network: Network::Tcp,
            address,
            port,
        }
    }

    /// Valid when it names a real port.
    pub fn is_valid(&self) -> bool {
        self.port != 0
    }

    /// `host:port` form accepted by `TcpStream::connect`.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self.address {
            Address::Ip(ip) => Some(SocketAddr::new(ip, self.port)),
            Address::Domain(_) => None,
        }
    }
}

impl From<SocketAddr> for Destination {
    fn from(addr: SocketAddr) -> Self {
        Destination::tcp(Address::Ip(addr.ip()), addr.port())
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.network, self.authority())
    }
}

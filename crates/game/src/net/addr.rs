use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// A network endpoint as a plain value: numeric IPv4 host plus port.
/// The all-zero value means "no destination".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NetAddress {
    pub host: u32,
    pub port: u16,
}

impl NetAddress {
    pub const UNSPECIFIED: NetAddress = NetAddress { host: 0, port: 0 };

    pub fn new(host: u32, port: u16) -> Self {
        Self { host, port }
    }

    pub fn from_octets(a: u8, b: u8, c: u8, d: u8, port: u16) -> Self {
        Self {
            host: u32::from_be_bytes([a, b, c, d]),
            port,
        }
    }

    /// Parses a dotted-quad host string. Returns `None` when the host does
    /// not parse; name resolution is not attempted.
    pub fn parse(host: &str, port: u16) -> Option<Self> {
        let ip: Ipv4Addr = host.parse().ok()?;
        Some(Self {
            host: u32::from(ip),
            port,
        })
    }

    pub fn is_unspecified(&self) -> bool {
        self.host == 0 || self.port == 0
    }

    pub fn to_socket_addr(self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(self.host), self.port))
    }
}

impl From<SocketAddrV4> for NetAddress {
    fn from(addr: SocketAddrV4) -> Self {
        Self {
            host: u32::from(*addr.ip()),
            port: addr.port(),
        }
    }
}

impl std::fmt::Display for NetAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d] = self.host.to_be_bytes();
        write!(f, "{}.{}.{}.{}:{}", a, b, c, d, self.port)
    }
}

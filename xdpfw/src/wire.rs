//! Fixed-size protocol headers.
//!
//! Each header is a plain value decoded from exactly `LEN` bytes. Multi-byte
//! fields are converted from network order as they are read, so nothing past
//! this module ever sees a big-endian integer.

pub const ETH_ALEN: usize = 6;

pub const ETH_P_IP: u16 = 0x0800;
pub const ETH_P_IPV6: u16 = 0x86DD;
pub const ETH_P_8021Q: u16 = 0x8100;
pub const ETH_P_8021AD: u16 = 0x88A8;

pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

/// A header that can be decoded from a slice of exactly `LEN` bytes.
pub trait Header: Sized {
    const LEN: usize;

    /// Decode from `buf`. Callers guarantee `buf.len() == Self::LEN`.
    fn read(buf: &[u8]) -> Self;
}

#[inline(always)]
fn be16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

#[inline(always)]
fn array<const N: usize>(buf: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[at..at + N]);
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EthHdr {
    pub dst_addr: [u8; ETH_ALEN],
    pub src_addr: [u8; ETH_ALEN],
    pub ether_type: u16,
}

impl Header for EthHdr {
    const LEN: usize = 14;

    fn read(buf: &[u8]) -> Self {
        Self {
            dst_addr: array(buf, 0),
            src_addr: array(buf, 6),
            ether_type: be16(buf, 12),
        }
    }
}

/// 802.1Q / 802.1AD tag following the Ethernet header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VlanHdr {
    pub tci: u16,
    pub encapsulated_proto: u16,
}

impl VlanHdr {
    pub fn vlan_id(&self) -> u16 {
        self.tci & 0x0fff
    }
}

impl Header for VlanHdr {
    const LEN: usize = 4;

    fn read(buf: &[u8]) -> Self {
        Self {
            tci: be16(buf, 0),
            encapsulated_proto: be16(buf, 2),
        }
    }
}

/// Minimal IPv4 header; options are skipped via `ihl`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ipv4Hdr {
    pub version_ihl: u8,
    pub proto: u8,
    pub src_addr: [u8; 4],
    pub dst_addr: [u8; 4],
}

impl Ipv4Hdr {
    /// Internet header length in 32-bit words.
    pub fn ihl(&self) -> u8 {
        self.version_ihl & 0x0f
    }
}

impl Header for Ipv4Hdr {
    const LEN: usize = 20;

    fn read(buf: &[u8]) -> Self {
        Self {
            version_ihl: buf[0],
            proto: buf[9],
            src_addr: array(buf, 12),
            dst_addr: array(buf, 16),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ipv6Hdr {
    pub next_hdr: u8,
    pub src_addr: [u8; 16],
    pub dst_addr: [u8; 16],
}

impl Header for Ipv6Hdr {
    const LEN: usize = 40;

    fn read(buf: &[u8]) -> Self {
        Self {
            next_hdr: buf[6],
            src_addr: array(buf, 8),
            dst_addr: array(buf, 24),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TcpHdr {
    pub source: u16,
    pub dest: u16,
}

impl Header for TcpHdr {
    const LEN: usize = 20;

    fn read(buf: &[u8]) -> Self {
        Self {
            source: be16(buf, 0),
            dest: be16(buf, 2),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UdpHdr {
    pub source: u16,
    pub dest: u16,
}

impl Header for UdpHdr {
    const LEN: usize = 8;

    fn read(buf: &[u8]) -> Self {
        Self {
            source: be16(buf, 0),
            dest: be16(buf, 2),
        }
    }
}

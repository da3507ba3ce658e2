#![no_std]

//! Fixed-layout types shared by the classification path and anything that
//! mirrors its tables into kernel maps.
//!
//! Layouts follow the map keys of the XDP firewall: every key is `repr(C)`
//! with a size divisible by four so that byte-wise hashing never sees
//! compiler-inserted padding.

/// Verdict codes, numerically identical to the kernel's `xdp_action`.
pub const XDP_ABORTED: u32 = 0;
pub const XDP_DROP: u32 = 1;
pub const XDP_PASS: u32 = 2;
pub const XDP_TX: u32 = 3;
pub const XDP_REDIRECT: u32 = 4;

/// Number of counter slots: one per verdict code.
pub const XDP_MAX_ACTIONS: usize = (XDP_REDIRECT + 1) as usize;

/// Maximum number of blacklisted source MAC addresses.
pub const MAC_BLACKLIST_MAX_ENTRIES: usize = 4096;
/// Maximum number of blacklisted IPv4 prefixes.
pub const V4_BLACKLIST_MAX_ENTRIES: usize = 10_000;
/// Maximum number of blacklisted IPv6 prefixes.
pub const V6_BLACKLIST_MAX_ENTRIES: usize = 10_000;
/// src + dst * tcp + udp
pub const PORT_BLACKLIST_MAX_ENTRIES: usize = 65_535 * 4;

/// Running totals for one verdict slot.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "user", derive(serde::Serialize, serde::Deserialize))]
pub struct Counters {
    pub packets: u64,
    pub bytes: u64,
}

impl Counters {
    /// Component-wise sum, wrapping like the kernel counters do.
    pub fn merge(self, other: Counters) -> Counters {
        Counters {
            packets: self.packets.wrapping_add(other.packets),
            bytes: self.bytes.wrapping_add(other.bytes),
        }
    }
}

/// Longest-prefix-match key: a prefix length in bits followed by the
/// address bytes in network order.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LpmKey<const N: usize> {
    pub prefix_len: u32,
    pub address: [u8; N],
}

pub type LpmV4Key = LpmKey<4>;
pub type LpmV6Key = LpmKey<16>;

impl<const N: usize> LpmKey<N> {
    /// Widest prefix this family supports (32 or 128).
    pub const MAX_PREFIX_LEN: u32 = (N * 8) as u32;

    /// Key for a full-length address, as built on the classification path.
    pub fn host(address: [u8; N]) -> Self {
        Self {
            prefix_len: Self::MAX_PREFIX_LEN,
            address,
        }
    }

    /// Copy of this key with every bit past `prefix_len` cleared.
    ///
    /// `prefix_len` is clamped to the family maximum.
    pub fn masked(&self) -> Self {
        let len = if self.prefix_len > Self::MAX_PREFIX_LEN {
            Self::MAX_PREFIX_LEN
        } else {
            self.prefix_len
        } as usize;
        let mut address = self.address;
        let full = len / 8;
        let rem = len % 8;
        let mut i = full;
        if rem != 0 {
            address[i] &= 0xffu8 << (8 - rem);
            i += 1;
        }
        while i < N {
            address[i] = 0;
            i += 1;
        }
        Self {
            prefix_len: len as u32,
            address,
        }
    }
}

/// Which end of the connection a port rule applies to.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "user",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum Direction {
    Source = 0,
    Destination = 1,
}

/// Transport protocol a port rule applies to.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "user",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum Transport {
    Tcp = 0,
    Udp = 1,
}

/// Port blacklist key.
///
/// The port is widened to 32 bits so the key stays 12 bytes with no
/// trailing padding.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "user", derive(serde::Serialize, serde::Deserialize))]
pub struct PortKey {
    pub direction: Direction,
    pub protocol: Transport,
    pub port: u32,
}

impl PortKey {
    pub fn new(direction: Direction, protocol: Transport, port: u16) -> Self {
        Self {
            direction,
            protocol,
            port: port as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layouts() {
        assert_eq!(core::mem::size_of::<PortKey>(), 12);
        assert_eq!(core::mem::size_of::<LpmV4Key>(), 8);
        assert_eq!(core::mem::size_of::<LpmV6Key>(), 20);
        assert_eq!(core::mem::size_of::<Counters>(), 16);
    }

    #[test]
    fn test_masked_clears_host_bits() {
        let key = LpmV4Key {
            prefix_len: 12,
            address: [10, 0xff, 9, 9],
        };
        let masked = key.masked();
        assert_eq!(masked.address, [10, 0xf0, 0, 0]);
        assert_eq!(masked.prefix_len, 12);

        let host = LpmV4Key::host([1, 2, 3, 4]);
        assert_eq!(host.masked(), host);

        let zero = LpmV6Key {
            prefix_len: 0,
            address: [0xff; 16],
        };
        assert_eq!(zero.masked().address, [0; 16]);
    }

    #[test]
    fn test_counters_merge() {
        let a = Counters { packets: 1, bytes: 64 };
        let b = Counters { packets: 2, bytes: 100 };
        assert_eq!(a.merge(b), Counters { packets: 3, bytes: 164 });
    }
}

//! Blacklist tables read by the classification path.
//!
//! Every table is a concurrent map so that any number of classifiers can
//! look up entries while the control plane inserts or removes them. A single
//! entry is either fully visible or not visible at all.

use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashSet;
use serde::Serialize;
use xdpfw_common::{
    Direction, LpmKey, PortKey, Transport, MAC_BLACKLIST_MAX_ENTRIES, PORT_BLACKLIST_MAX_ENTRIES,
    V4_BLACKLIST_MAX_ENTRIES, V6_BLACKLIST_MAX_ENTRIES,
};

use crate::error::BlacklistError;
use crate::wire::ETH_ALEN;

pub type MacAddr = [u8; ETH_ALEN];

/// Bounded set with "do not clobber" insert semantics.
///
/// `insert` reports whether the key was newly added; re-inserting a present
/// key succeeds without touching it, even when the table is full.
#[derive(Debug)]
struct BoundedSet<K: Eq + std::hash::Hash> {
    name: &'static str,
    entries: DashSet<K>,
    capacity: usize,
}

impl<K: Eq + std::hash::Hash> BoundedSet<K> {
    fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            entries: DashSet::new(),
            capacity,
        }
    }

    fn insert(&self, key: K) -> Result<bool, BlacklistError> {
        if self.entries.contains(&key) {
            return Ok(false);
        }
        if self.entries.len() >= self.capacity {
            return Err(BlacklistError::TableFull {
                table: self.name,
                capacity: self.capacity,
            });
        }
        Ok(self.entries.insert(key))
    }

    fn remove(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Source MAC addresses to drop at L2.
#[derive(Debug)]
pub struct MacBlacklist {
    set: BoundedSet<MacAddr>,
}

impl MacBlacklist {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            set: BoundedSet::new("mac", capacity),
        }
    }

    pub fn insert(&self, addr: MacAddr) -> Result<bool, BlacklistError> {
        self.set.insert(addr)
    }

    pub fn remove(&self, addr: &MacAddr) -> bool {
        self.set.remove(addr)
    }

    pub fn contains(&self, addr: &MacAddr) -> bool {
        self.set.contains(addr)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Longest-prefix-match table over `N`-byte addresses.
///
/// Entries are stored masked to their prefix length, one logical set per
/// length. `populated[len]` counts the entries of each length so a lookup
/// only probes lengths that can match, longest first. The probe count is
/// bounded by the address width.
#[derive(Debug)]
pub struct PrefixBlacklist<const N: usize> {
    set: BoundedSet<LpmKey<N>>,
    populated: Box<[AtomicU32]>,
}

pub type V4Blacklist = PrefixBlacklist<4>;
pub type V6Blacklist = PrefixBlacklist<16>;

impl<const N: usize> PrefixBlacklist<N> {
    pub fn with_capacity(name: &'static str, capacity: usize) -> Self {
        let lengths = LpmKey::<N>::MAX_PREFIX_LEN as usize + 1;
        Self {
            set: BoundedSet::new(name, capacity),
            populated: (0..lengths).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    fn normalize(key: LpmKey<N>) -> Result<LpmKey<N>, BlacklistError> {
        let max = LpmKey::<N>::MAX_PREFIX_LEN;
        if key.prefix_len > max {
            return Err(BlacklistError::InvalidPrefixLen {
                prefix_len: key.prefix_len,
                max,
            });
        }
        Ok(key.masked())
    }

    pub fn insert(&self, key: LpmKey<N>) -> Result<bool, BlacklistError> {
        let key = Self::normalize(key)?;
        let added = self.set.insert(key)?;
        if added {
            // Published after the entry itself: a concurrent lookup either
            // skips this length or finds the complete key.
            self.populated[key.prefix_len as usize].fetch_add(1, Ordering::Release);
        }
        Ok(added)
    }

    pub fn remove(&self, key: LpmKey<N>) -> Result<bool, BlacklistError> {
        let key = Self::normalize(key)?;
        let removed = self.set.remove(&key);
        if removed {
            self.populated[key.prefix_len as usize].fetch_sub(1, Ordering::Release);
        }
        Ok(removed)
    }

    /// Most specific stored prefix covering `key`, considering only prefixes
    /// no longer than `key.prefix_len`. Returns the matched prefix length.
    pub fn lookup(&self, key: &LpmKey<N>) -> Option<u32> {
        let top = key.prefix_len.min(LpmKey::<N>::MAX_PREFIX_LEN);
        for len in (0..=top).rev() {
            if self.populated[len as usize].load(Ordering::Acquire) == 0 {
                continue;
            }
            let probe = LpmKey {
                prefix_len: len,
                address: key.address,
            }
            .masked();
            if self.set.contains(&probe) {
                return Some(len);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `(direction, transport, port)` rules checked at L4.
#[derive(Debug)]
pub struct PortBlacklist {
    set: BoundedSet<PortKey>,
}

impl PortBlacklist {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            set: BoundedSet::new("port", capacity),
        }
    }

    pub fn insert(&self, key: PortKey) -> Result<bool, BlacklistError> {
        self.set.insert(key)
    }

    pub fn remove(&self, key: &PortKey) -> bool {
        self.set.remove(key)
    }

    pub fn contains(&self, key: &PortKey) -> bool {
        self.set.contains(key)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-table entry limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, Serialize)]
pub struct Capacity {
    #[serde(default = "default_mac_capacity")]
    pub mac: usize,
    #[serde(default = "default_v4_capacity")]
    pub v4: usize,
    #[serde(default = "default_v6_capacity")]
    pub v6: usize,
    #[serde(default = "default_port_capacity")]
    pub ports: usize,
}

fn default_mac_capacity() -> usize {
    MAC_BLACKLIST_MAX_ENTRIES
}

fn default_v4_capacity() -> usize {
    V4_BLACKLIST_MAX_ENTRIES
}

fn default_v6_capacity() -> usize {
    V6_BLACKLIST_MAX_ENTRIES
}

fn default_port_capacity() -> usize {
    PORT_BLACKLIST_MAX_ENTRIES
}

impl Default for Capacity {
    fn default() -> Self {
        Self {
            mac: default_mac_capacity(),
            v4: default_v4_capacity(),
            v6: default_v6_capacity(),
            ports: default_port_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableSizes {
    pub mac: usize,
    pub v4: usize,
    pub v6: usize,
    pub ports: usize,
}

/// All blacklist tables, and the control-plane surface that mutates them.
///
/// Inserts of present keys and removals of absent keys are successful
/// no-ops; there is no reference counting. The `bool` results report whether
/// the table actually changed.
#[derive(Debug)]
pub struct Blacklists {
    mac: MacBlacklist,
    v4: V4Blacklist,
    v6: V6Blacklist,
    ports: PortBlacklist,
}

impl Default for Blacklists {
    fn default() -> Self {
        Self::with_capacity(Capacity::default())
    }
}

impl Blacklists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: Capacity) -> Self {
        Self {
            mac: MacBlacklist::with_capacity(capacity.mac),
            v4: V4Blacklist::with_capacity("v4", capacity.v4),
            v6: V6Blacklist::with_capacity("v6", capacity.v6),
            ports: PortBlacklist::with_capacity(capacity.ports),
        }
    }

    pub fn insert_mac(&self, addr: MacAddr) -> Result<bool, BlacklistError> {
        self.mac.insert(addr)
    }

    pub fn remove_mac(&self, addr: MacAddr) -> bool {
        self.mac.remove(&addr)
    }

    pub fn insert_prefix_v4(&self, addr: [u8; 4], prefix_len: u32) -> Result<bool, BlacklistError> {
        self.v4.insert(LpmKey {
            prefix_len,
            address: addr,
        })
    }

    pub fn remove_prefix_v4(&self, addr: [u8; 4], prefix_len: u32) -> Result<bool, BlacklistError> {
        self.v4.remove(LpmKey {
            prefix_len,
            address: addr,
        })
    }

    pub fn insert_prefix_v6(
        &self,
        addr: [u8; 16],
        prefix_len: u32,
    ) -> Result<bool, BlacklistError> {
        self.v6.insert(LpmKey {
            prefix_len,
            address: addr,
        })
    }

    pub fn remove_prefix_v6(
        &self,
        addr: [u8; 16],
        prefix_len: u32,
    ) -> Result<bool, BlacklistError> {
        self.v6.remove(LpmKey {
            prefix_len,
            address: addr,
        })
    }

    pub fn insert_port(
        &self,
        direction: Direction,
        protocol: Transport,
        port: u16,
    ) -> Result<bool, BlacklistError> {
        self.ports.insert(PortKey::new(direction, protocol, port))
    }

    pub fn remove_port(&self, direction: Direction, protocol: Transport, port: u16) -> bool {
        self.ports.remove(&PortKey::new(direction, protocol, port))
    }

    pub fn contains_mac(&self, addr: &MacAddr) -> bool {
        self.mac.contains(addr)
    }

    pub fn lookup_v4(&self, key: &LpmKey<4>) -> Option<u32> {
        self.v4.lookup(key)
    }

    pub fn lookup_v6(&self, key: &LpmKey<16>) -> Option<u32> {
        self.v6.lookup(key)
    }

    pub fn contains_port(&self, key: &PortKey) -> bool {
        self.ports.contains(key)
    }

    pub fn sizes(&self) -> TableSizes {
        TableSizes {
            mac: self.mac.len(),
            v4: self.v4.len(),
            v6: self.v6.len(),
            ports: self.ports.len(),
        }
    }
}

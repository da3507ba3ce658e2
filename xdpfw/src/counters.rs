//! Per-verdict packet and byte counters.
//!
//! Two bank layouts are available. [`AtomicCounters`] is one shared table
//! updated with `fetch_add`, correct for any number of writers.
//! [`ShardedCounters`] gives every worker its own table: a worker claims a
//! shard once and updates it without read-modify-write instructions, and
//! readers sum all shards on demand. Sums taken while workers are running
//! see each shard at a slightly different instant.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use xdpfw_common::{Counters, XDP_MAX_ACTIONS};

use crate::error::CounterError;

/// Bank layout used when the configuration does not name one.
pub const DEFAULT_COUNTER_MODE: CounterMode = CounterMode::Sharded;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CounterMode {
    #[default]
    Sharded,
    Atomic,
}

impl CounterMode {
    /// Sharding needs the writer count up front; without one, fall back to
    /// the shared atomic bank.
    pub fn resolve(self, workers: usize) -> CounterMode {
        match self {
            CounterMode::Sharded if workers == 0 => CounterMode::Atomic,
            mode => mode,
        }
    }
}

/// Write side: charge one packet to a verdict slot.
pub trait ActionCounters: Send {
    fn record(&self, action: u32, bytes: u64) -> Result<(), CounterError>;
}

/// Read side: aggregate totals per verdict slot.
pub trait CounterSource: Send + Sync {
    fn slots(&self) -> usize;

    fn snapshot(&self, action: u32) -> Result<Counters, CounterError>;

    /// Totals for every configured slot, indexed by action code.
    fn snapshot_all(&self) -> Vec<Counters> {
        (0..self.slots() as u32)
            .filter_map(|action| self.snapshot(action).ok())
            .collect()
    }
}

#[repr(align(64))]
#[derive(Debug, Default)]
struct Slot {
    packets: AtomicU64,
    bytes: AtomicU64,
}

impl Slot {
    fn load(&self) -> Counters {
        Counters {
            packets: self.packets.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

fn slot_table(slots: usize) -> Box<[Slot]> {
    (0..slots).map(|_| Slot::default()).collect()
}

fn slot_for(table: &[Slot], action: u32) -> Result<&Slot, CounterError> {
    table
        .get(action as usize)
        .ok_or(CounterError::SlotMissing {
            action,
            slots: table.len(),
        })
}

/// One counter table shared by every writer.
#[derive(Debug)]
pub struct AtomicCounters {
    slots: Box<[Slot]>,
}

impl Default for AtomicCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicCounters {
    pub fn new() -> Self {
        Self::with_slots(XDP_MAX_ACTIONS)
    }

    pub fn with_slots(slots: usize) -> Self {
        Self {
            slots: slot_table(slots),
        }
    }
}

impl ActionCounters for AtomicCounters {
    fn record(&self, action: u32, bytes: u64) -> Result<(), CounterError> {
        let slot = slot_for(&self.slots, action)?;
        slot.packets.fetch_add(1, Ordering::Relaxed);
        slot.bytes.fetch_add(bytes, Ordering::Relaxed);
        Ok(())
    }
}

impl ActionCounters for Arc<AtomicCounters> {
    fn record(&self, action: u32, bytes: u64) -> Result<(), CounterError> {
        (**self).record(action, bytes)
    }
}

impl CounterSource for AtomicCounters {
    fn slots(&self) -> usize {
        self.slots.len()
    }

    fn snapshot(&self, action: u32) -> Result<Counters, CounterError> {
        slot_for(&self.slots, action).map(Slot::load)
    }
}

#[derive(Debug)]
struct Shard {
    slots: Box<[Slot]>,
    claimed: AtomicBool,
}

/// One counter table per worker, summed on read.
#[derive(Debug)]
pub struct ShardedCounters {
    shards: Box<[Shard]>,
    slots: usize,
}

impl ShardedCounters {
    pub fn new(shards: usize) -> Self {
        Self::with_slots(shards, XDP_MAX_ACTIONS)
    }

    pub fn with_slots(shards: usize, slots: usize) -> Self {
        Self {
            shards: (0..shards)
                .map(|_| Shard {
                    slots: slot_table(slots),
                    claimed: AtomicBool::new(false),
                })
                .collect(),
            slots,
        }
    }

    pub fn shards(&self) -> usize {
        self.shards.len()
    }

    /// Take exclusive write access to shard `index`.
    ///
    /// Returns `None` if the index is out of range or the shard already has a
    /// live writer. Dropping the writer releases the shard.
    pub fn claim(self: &Arc<Self>, index: usize) -> Option<ShardWriter> {
        let shard = self.shards.get(index)?;
        shard
            .claimed
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()?;
        Some(ShardWriter {
            bank: self.clone(),
            index,
        })
    }
}

impl CounterSource for ShardedCounters {
    fn slots(&self) -> usize {
        self.slots
    }

    fn snapshot(&self, action: u32) -> Result<Counters, CounterError> {
        if action as usize >= self.slots {
            return Err(CounterError::SlotMissing {
                action,
                slots: self.slots,
            });
        }
        Ok(self
            .shards
            .iter()
            .map(|shard| shard.slots[action as usize].load())
            .fold(Counters::default(), Counters::merge))
    }
}

/// Exclusive writer for one shard of a [`ShardedCounters`] bank.
#[derive(Debug)]
pub struct ShardWriter {
    bank: Arc<ShardedCounters>,
    index: usize,
}

impl ShardWriter {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl ActionCounters for ShardWriter {
    fn record(&self, action: u32, bytes: u64) -> Result<(), CounterError> {
        let slot = slot_for(&self.bank.shards[self.index].slots, action)?;
        // Sole writer of this shard: a plain load/store pair cannot lose updates.
        let packets = slot.packets.load(Ordering::Relaxed);
        slot.packets.store(packets.wrapping_add(1), Ordering::Relaxed);
        let total = slot.bytes.load(Ordering::Relaxed);
        slot.bytes.store(total.wrapping_add(bytes), Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for ShardWriter {
    fn drop(&mut self) {
        self.bank.shards[self.index]
            .claimed
            .store(false, Ordering::Release);
    }
}

/// Counter bank in either layout.
#[derive(Clone, Debug)]
pub enum CounterBank {
    Atomic(Arc<AtomicCounters>),
    Sharded(Arc<ShardedCounters>),
}

impl CounterBank {
    /// Build a bank for `workers` writers. A sharded request with an unknown
    /// (zero) worker count falls back to the atomic layout.
    pub fn new(mode: CounterMode, workers: usize) -> Self {
        Self::with_slots(mode, workers, XDP_MAX_ACTIONS)
    }

    pub fn with_slots(mode: CounterMode, workers: usize, slots: usize) -> Self {
        match mode.resolve(workers) {
            CounterMode::Atomic => CounterBank::Atomic(Arc::new(AtomicCounters::with_slots(slots))),
            CounterMode::Sharded => {
                CounterBank::Sharded(Arc::new(ShardedCounters::with_slots(workers, slots)))
            }
        }
    }

    pub fn mode(&self) -> CounterMode {
        match self {
            CounterBank::Atomic(_) => CounterMode::Atomic,
            CounterBank::Sharded(_) => CounterMode::Sharded,
        }
    }

    /// Writer for worker `index`: its own shard, or the shared bank.
    pub fn writer(&self, index: usize) -> Option<CounterWriter> {
        match self {
            CounterBank::Atomic(bank) => Some(CounterWriter::Atomic(bank.clone())),
            CounterBank::Sharded(bank) => bank.claim(index).map(CounterWriter::Shard),
        }
    }
}

impl CounterSource for CounterBank {
    fn slots(&self) -> usize {
        match self {
            CounterBank::Atomic(bank) => bank.slots(),
            CounterBank::Sharded(bank) => bank.slots(),
        }
    }

    fn snapshot(&self, action: u32) -> Result<Counters, CounterError> {
        match self {
            CounterBank::Atomic(bank) => bank.snapshot(action),
            CounterBank::Sharded(bank) => bank.snapshot(action),
        }
    }
}

#[derive(Debug)]
pub enum CounterWriter {
    Atomic(Arc<AtomicCounters>),
    Shard(ShardWriter),
}

impl ActionCounters for CounterWriter {
    fn record(&self, action: u32, bytes: u64) -> Result<(), CounterError> {
        match self {
            CounterWriter::Atomic(bank) => bank.record(action, bytes),
            CounterWriter::Shard(shard) => shard.record(action, bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xdpfw_common::{XDP_DROP, XDP_PASS, XDP_REDIRECT};

    #[test]
    fn test_atomic_record_and_snapshot() {
        let bank = AtomicCounters::new();
        bank.record(XDP_PASS, 64).unwrap();
        bank.record(XDP_PASS, 100).unwrap();
        bank.record(XDP_DROP, 60).unwrap();

        assert_eq!(bank.snapshot(XDP_PASS).unwrap(), Counters { packets: 2, bytes: 164 });
        assert_eq!(bank.snapshot(XDP_DROP).unwrap(), Counters { packets: 1, bytes: 60 });
        assert_eq!(bank.snapshot(XDP_REDIRECT).unwrap(), Counters::default());
        assert_eq!(bank.snapshot_all().len(), XDP_MAX_ACTIONS);
    }

    #[test]
    fn test_missing_slot() {
        let bank = AtomicCounters::with_slots(2);
        assert_eq!(
            bank.record(XDP_PASS, 1),
            Err(CounterError::SlotMissing { action: 2, slots: 2 })
        );
        assert!(bank.snapshot(XDP_PASS).is_err());

        let sharded = Arc::new(ShardedCounters::with_slots(1, 2));
        let writer = sharded.claim(0).unwrap();
        assert!(writer.record(XDP_PASS, 1).is_err());
        assert!(sharded.snapshot(XDP_PASS).is_err());
    }

    #[test]
    fn test_shard_claim_is_exclusive() {
        let bank = Arc::new(ShardedCounters::new(2));
        let first = bank.claim(0).unwrap();
        assert!(bank.claim(0).is_none());
        assert!(bank.claim(2).is_none());
        assert_eq!(first.index(), 0);

        drop(first);
        assert!(bank.claim(0).is_some());
    }

    #[test]
    fn test_sharded_snapshot_sums_shards() {
        let bank = Arc::new(ShardedCounters::new(3));
        let writers: Vec<_> = (0..3).map(|i| bank.claim(i).unwrap()).collect();
        for (i, writer) in writers.iter().enumerate() {
            for _ in 0..=i {
                writer.record(XDP_PASS, 10).unwrap();
            }
        }
        assert_eq!(bank.snapshot(XDP_PASS).unwrap(), Counters { packets: 6, bytes: 60 });
    }

    #[test]
    fn test_concurrent_writers_lose_nothing() {
        for mode in [CounterMode::Atomic, CounterMode::Sharded] {
            let bank = CounterBank::new(mode, 4);
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let writer = bank.writer(i).unwrap();
                    std::thread::spawn(move || {
                        for _ in 0..10_000 {
                            writer.record(XDP_DROP, 2).unwrap();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
            assert_eq!(
                bank.snapshot(XDP_DROP).unwrap(),
                Counters { packets: 40_000, bytes: 80_000 },
                "{mode:?}"
            );
        }
    }

    #[test]
    fn test_mode_resolution() {
        assert_eq!(DEFAULT_COUNTER_MODE, CounterMode::Sharded);
        assert_eq!(CounterMode::Sharded.resolve(0), CounterMode::Atomic);
        assert_eq!(CounterMode::Sharded.resolve(4), CounterMode::Sharded);
        assert_eq!(CounterBank::new(CounterMode::Sharded, 0).mode(), CounterMode::Atomic);
    }
}

//! Userspace packet classification engine.
//!
//! Frames go through a fixed L2 → L3 → L4 pipeline checked against
//! source-MAC, source-prefix and port blacklists, and every verdict is
//! charged to a per-verdict packet/byte counter.

pub mod admin;
pub mod api;
pub mod blacklist;
pub mod config;
pub mod counters;
pub mod error;
pub mod packet;
pub mod parse;
pub mod pipeline;
pub mod pool;
pub mod storage;
pub mod verdict;
pub mod wire;

#[cfg(test)]
mod testutil;

pub use blacklist::{Blacklists, Capacity};
pub use counters::{CounterBank, CounterMode, CounterSource};
pub use pipeline::{Classifier, UnknownProtocolPolicy};
pub use pool::{PoolHandle, WorkerPool};
pub use verdict::Verdict;

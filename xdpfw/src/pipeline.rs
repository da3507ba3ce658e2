//! Frame classification: L2 → L3 → L4, then the action counters.
//!
//! ```text
//! Start ─L2 pass─▶ L2Done ─v4/v6 pass─▶ L3Done ─tcp/udp─▶ L4Done ─▶ Decided
//!   │                │                    │                          ▲
//!   └─drop───────────┴─unknown proto──────┴─drop / unknown proto─────┘
//! ```
//!
//! Every path ends in `Decided`, which charges the frame to exactly one
//! counter slot and returns the verdict.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::blacklist::Blacklists;
use crate::counters::ActionCounters;
use crate::packet::{Cursor, PacketView};
use crate::parse::{parse_eth, parse_ipv4, parse_ipv6, parse_tcp, parse_udp};
use crate::verdict::Verdict;
use crate::wire::{ETH_P_IP, ETH_P_IPV6, IPPROTO_TCP, IPPROTO_UDP};

/// What to do with traffic whose L3 or L4 protocol has no parser.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UnknownProtocolPolicy {
    /// Keep the verdict of the last completed layer (fail open).
    #[default]
    Pass,
    /// Drop anything the engine cannot fully inspect (fail closed).
    Drop,
}

/// Classifies frames against shared blacklists and charges a counter sink.
///
/// One classifier per worker: the blacklists are shared, the counter sink is
/// whatever that worker owns (its shard, or the shared atomic bank).
#[derive(Debug)]
pub struct Classifier<C> {
    lists: Arc<Blacklists>,
    counters: C,
    unknown_protocol: UnknownProtocolPolicy,
}

impl<C: ActionCounters> Classifier<C> {
    pub fn new(lists: Arc<Blacklists>, counters: C) -> Self {
        Self {
            lists,
            counters,
            unknown_protocol: UnknownProtocolPolicy::default(),
        }
    }

    pub fn with_unknown_protocol(mut self, policy: UnknownProtocolPolicy) -> Self {
        self.unknown_protocol = policy;
        self
    }

    pub fn counters(&self) -> &C {
        &self.counters
    }

    /// Decide the fate of one frame. Never fails; never retains `frame`.
    pub fn classify(&self, frame: &[u8]) -> Verdict {
        let view = PacketView::new(frame);
        let action = self.decide(&view);
        self.finalize(&view, action)
    }

    fn unknown(&self, carried: Verdict) -> Verdict {
        match self.unknown_protocol {
            UnknownProtocolPolicy::Pass => carried,
            UnknownProtocolPolicy::Drop => Verdict::Drop,
        }
    }

    fn decide(&self, view: &PacketView<'_>) -> Verdict {
        let lists = &*self.lists;
        let mut cursor = Cursor::new();

        let action = parse_eth(view, &mut cursor, lists);
        if action != Verdict::Pass {
            return action;
        }

        let action = match cursor.next_proto {
            p if p == ETH_P_IP as u32 => parse_ipv4(view, &mut cursor, lists),
            p if p == ETH_P_IPV6 as u32 => parse_ipv6(view, &mut cursor, lists),
            _ => return self.unknown(action),
        };
        if action != Verdict::Pass {
            return action;
        }

        match cursor.next_proto {
            p if p == IPPROTO_UDP as u32 => parse_udp(view, &mut cursor, lists),
            p if p == IPPROTO_TCP as u32 => parse_tcp(view, &mut cursor, lists),
            _ => self.unknown(action),
        }
    }

    fn finalize(&self, view: &PacketView<'_>, action: Verdict) -> Verdict {
        match self.counters.record(action.code(), view.len() as u64) {
            Ok(()) => action,
            Err(e) => {
                tracing::error!("counter update failed, aborting packet: {}", e);
                Verdict::Aborted
            }
        }
    }
}

use crate::blacklist::Blacklists;
use crate::packet::{Cursor, PacketView};
use crate::verdict::Verdict;
use crate::wire::{EthHdr, Header, VlanHdr, ETH_P_8021AD, ETH_P_8021Q};

/// Number of stacked VLAN tags unwrapped. A deeper tag is left in place and
/// its ethertype becomes the resolved L3 protocol.
pub const VLAN_MAX_DEPTH: usize = 2;

fn is_vlan(proto: u32) -> bool {
    proto == ETH_P_8021Q as u32 || proto == ETH_P_8021AD as u32
}

/// Parse the Ethernet header and up to [`VLAN_MAX_DEPTH`] VLAN tags.
///
/// Drops truncated frames and frames whose source MAC is blacklisted. On
/// `Pass` the cursor sits on the L3 header with `next_proto` holding its
/// ethertype.
pub fn parse_eth(view: &PacketView<'_>, cursor: &mut Cursor, lists: &Blacklists) -> Verdict {
    let Some(eth) = view.header::<EthHdr>(cursor.offset) else {
        return Verdict::Drop;
    };

    if lists.contains_mac(&eth.src_addr) {
        return Verdict::Drop;
    }

    cursor.advance(EthHdr::LEN);
    cursor.set_next_proto(eth.ether_type as u32);

    for _ in 0..VLAN_MAX_DEPTH {
        if !is_vlan(cursor.next_proto) {
            break;
        }
        let Some(vlan) = view.header::<VlanHdr>(cursor.offset) else {
            return Verdict::Drop;
        };
        cursor.advance(VlanHdr::LEN);
        cursor.set_next_proto(vlan.encapsulated_proto as u32);
    }

    Verdict::Pass
}

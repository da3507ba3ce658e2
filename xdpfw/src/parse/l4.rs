use xdpfw_common::{Direction, PortKey, Transport};

use crate::blacklist::Blacklists;
use crate::packet::{Cursor, PacketView};
use crate::verdict::Verdict;
use crate::wire::{TcpHdr, UdpHdr};

fn check_ports(lists: &Blacklists, protocol: Transport, source: u16, dest: u16) -> Verdict {
    let src_key = PortKey::new(Direction::Source, protocol, source);
    let dst_key = PortKey::new(Direction::Destination, protocol, dest);
    if lists.contains_port(&src_key) || lists.contains_port(&dst_key) {
        return Verdict::Drop;
    }
    Verdict::Pass
}

/// Check both UDP ports against the port blacklist.
pub fn parse_udp(view: &PacketView<'_>, cursor: &mut Cursor, lists: &Blacklists) -> Verdict {
    let Some(udp) = view.header::<UdpHdr>(cursor.offset) else {
        return Verdict::Drop;
    };
    check_ports(lists, Transport::Udp, udp.source, udp.dest)
}

/// Check both TCP ports against the port blacklist.
pub fn parse_tcp(view: &PacketView<'_>, cursor: &mut Cursor, lists: &Blacklists) -> Verdict {
    let Some(tcp) = view.header::<TcpHdr>(cursor.offset) else {
        return Verdict::Drop;
    };
    check_ports(lists, Transport::Tcp, tcp.source, tcp.dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Header;

    fn at_l4() -> Cursor {
        Cursor {
            offset: 0,
            next_proto: 0,
        }
    }

    #[test]
    fn test_udp_destination_rule() {
        let lists = Blacklists::new();
        lists
            .insert_port(Direction::Destination, Transport::Udp, 53)
            .unwrap();

        let dns = crate::testutil::udp(40000, 53);
        assert_eq!(parse_udp(&PacketView::new(&dns), &mut at_l4(), &lists), Verdict::Drop);

        let web = crate::testutil::udp(40000, 80);
        assert_eq!(parse_udp(&PacketView::new(&web), &mut at_l4(), &lists), Verdict::Pass);

        // The rule is direction-specific.
        let reply = crate::testutil::udp(53, 40000);
        assert_eq!(parse_udp(&PacketView::new(&reply), &mut at_l4(), &lists), Verdict::Pass);
    }

    #[test]
    fn test_tcp_source_rule_ignores_udp() {
        let lists = Blacklists::new();
        lists.insert_port(Direction::Source, Transport::Tcp, 22).unwrap();

        let ssh = crate::testutil::tcp(22, 51000);
        assert_eq!(parse_tcp(&PacketView::new(&ssh), &mut at_l4(), &lists), Verdict::Drop);

        let udp = crate::testutil::udp(22, 51000);
        assert_eq!(parse_udp(&PacketView::new(&udp), &mut at_l4(), &lists), Verdict::Pass);
    }

    #[test]
    fn test_truncated_transport_dropped() {
        let lists = Blacklists::new();
        let tcp = crate::testutil::tcp(1, 2);
        let short = &tcp[..TcpHdr::LEN - 1];
        assert_eq!(parse_tcp(&PacketView::new(short), &mut at_l4(), &lists), Verdict::Drop);
        let udp = crate::testutil::udp(1, 2);
        let short = &udp[..UdpHdr::LEN - 1];
        assert_eq!(parse_udp(&PacketView::new(short), &mut at_l4(), &lists), Verdict::Drop);
    }
}

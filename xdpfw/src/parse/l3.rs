use xdpfw_common::LpmKey;

use crate::blacklist::Blacklists;
use crate::packet::{Cursor, PacketView};
use crate::verdict::Verdict;
use crate::wire::{Header, Ipv4Hdr, Ipv6Hdr};

/// Check the IPv4 source address against the v4 prefix blacklist.
///
/// On `Pass` the cursor is moved past the header as sized by its own `ihl`
/// field (options included) and `next_proto` holds the IP protocol.
pub fn parse_ipv4(view: &PacketView<'_>, cursor: &mut Cursor, lists: &Blacklists) -> Verdict {
    let Some(ip) = view.header::<Ipv4Hdr>(cursor.offset) else {
        return Verdict::Drop;
    };

    if lists.lookup_v4(&LpmKey::host(ip.src_addr)).is_some() {
        return Verdict::Drop;
    }

    cursor.advance(ip.ihl() as usize * 4);
    cursor.set_next_proto(ip.proto as u32);
    Verdict::Pass
}

/// Check the IPv6 source address against the v6 prefix blacklist.
///
/// Extension headers are not walked: `next_proto` is whatever the fixed
/// header names.
pub fn parse_ipv6(view: &PacketView<'_>, cursor: &mut Cursor, lists: &Blacklists) -> Verdict {
    let Some(ip) = view.header::<Ipv6Hdr>(cursor.offset) else {
        return Verdict::Drop;
    };

    if lists.lookup_v6(&LpmKey::host(ip.src_addr)).is_some() {
        return Verdict::Drop;
    }

    cursor.advance(Ipv6Hdr::LEN);
    cursor.set_next_proto(ip.next_hdr as u32);
    Verdict::Pass
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::l2::parse_eth;
    use crate::testutil::{udp, FrameBuilder};
    use crate::wire::{EthHdr, IPPROTO_TCP, IPPROTO_UDP};

    fn at_l3(frame: &[u8]) -> Cursor {
        let mut cursor = Cursor::new();
        assert_eq!(
            parse_eth(&PacketView::new(frame), &mut cursor, &Blacklists::new()),
            Verdict::Pass
        );
        cursor
    }

    #[test]
    fn test_ipv4_prefix_match() {
        let lists = Blacklists::new();
        lists.insert_prefix_v4([10, 0, 0, 0], 8).unwrap();
        lists.insert_prefix_v4([10, 1, 2, 3], 32).unwrap();

        for (src, expected) in [
            ([10, 1, 2, 3], Verdict::Drop),
            ([10, 1, 2, 4], Verdict::Drop),
            ([11, 0, 0, 1], Verdict::Pass),
        ] {
            let frame = FrameBuilder::new().ipv4_udp(src, 1000, 2000).build();
            let mut cursor = at_l3(&frame);
            assert_eq!(
                parse_ipv4(&PacketView::new(&frame), &mut cursor, &lists),
                expected,
                "{src:?}"
            );
        }
    }

    #[test]
    fn test_ipv4_pass_advances_by_ihl() {
        let lists = Blacklists::new();
        let frame = FrameBuilder::new()
            .ipv4([172, 16, 0, 1], 7, IPPROTO_UDP, udp(1, 2))
            .build();
        let mut cursor = at_l3(&frame);
        assert_eq!(parse_ipv4(&PacketView::new(&frame), &mut cursor, &lists), Verdict::Pass);
        assert_eq!(cursor.offset, EthHdr::LEN + 28);
        assert_eq!(cursor.next_proto, IPPROTO_UDP as u32);
    }

    #[test]
    fn test_ipv4_truncated_keeps_cursor() {
        let lists = Blacklists::new();
        let mut frame = FrameBuilder::new().ipv4_udp([1, 2, 3, 4], 1, 2).build();
        frame.truncate(EthHdr::LEN + 19);
        let mut cursor = at_l3(&frame);
        let before = cursor;
        assert_eq!(parse_ipv4(&PacketView::new(&frame), &mut cursor, &lists), Verdict::Drop);
        assert_eq!(cursor, before);
    }

    #[test]
    fn test_ipv6_prefix_match() {
        let lists = Blacklists::new();
        let mut blocked = [0u8; 16];
        blocked[..4].copy_from_slice(&[0x20, 0x01, 0x0d, 0xb8]);
        lists.insert_prefix_v6(blocked, 32).unwrap();

        let mut src = blocked;
        src[15] = 0x42;
        let frame = FrameBuilder::new().ipv6_tcp(src, 443, 50000).build();
        let mut cursor = at_l3(&frame);
        assert_eq!(parse_ipv6(&PacketView::new(&frame), &mut cursor, &lists), Verdict::Drop);

        src[3] = 0xb9;
        let frame = FrameBuilder::new().ipv6_tcp(src, 443, 50000).build();
        let mut cursor = at_l3(&frame);
        assert_eq!(parse_ipv6(&PacketView::new(&frame), &mut cursor, &lists), Verdict::Pass);
        assert_eq!(cursor.offset, EthHdr::LEN + Ipv6Hdr::LEN);
        assert_eq!(cursor.next_proto, IPPROTO_TCP as u32);
    }

    #[test]
    fn test_ipv6_truncated() {
        let lists = Blacklists::new();
        let mut frame = FrameBuilder::new().ipv6_udp([1; 16], 1, 2).build();
        frame.truncate(EthHdr::LEN + 39);
        let mut cursor = at_l3(&frame);
        assert_eq!(parse_ipv6(&PacketView::new(&frame), &mut cursor, &lists), Verdict::Drop);
    }
}

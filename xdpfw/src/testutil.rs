//! Frame construction helpers for tests.

use crate::wire::{ETH_P_IP, ETH_P_IPV6, IPPROTO_TCP, IPPROTO_UDP};

pub const SRC_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
pub const DST_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0xfe];

pub struct FrameBuilder {
    src_mac: [u8; 6],
    tags: Vec<(u16, u16)>,
    ether_type: u16,
    payload: Vec<u8>,
    pad_to: usize,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            src_mac: SRC_MAC,
            tags: Vec::new(),
            ether_type: 0,
            payload: Vec::new(),
            pad_to: 0,
        }
    }

    pub fn src_mac(mut self, mac: [u8; 6]) -> Self {
        self.src_mac = mac;
        self
    }

    /// Push a VLAN tag with the given TPID (802.1Q or 802.1AD).
    pub fn vlan(mut self, tpid: u16, vid: u16) -> Self {
        self.tags.push((tpid, vid));
        self
    }

    pub fn payload(mut self, ether_type: u16, payload: Vec<u8>) -> Self {
        self.ether_type = ether_type;
        self.payload = payload;
        self
    }

    pub fn pad_to(mut self, len: usize) -> Self {
        self.pad_to = len;
        self
    }

    pub fn ipv4(self, src: [u8; 4], ihl: u8, proto: u8, l4: Vec<u8>) -> Self {
        let header_len = ihl as usize * 4;
        let mut ip = vec![0u8; header_len.max(20)];
        ip[0] = 0x40 | (ihl & 0x0f);
        let total = (ip.len() + l4.len()) as u16;
        ip[2..4].copy_from_slice(&total.to_be_bytes());
        ip[8] = 64;
        ip[9] = proto;
        ip[12..16].copy_from_slice(&src);
        ip[16..20].copy_from_slice(&[192, 0, 2, 1]);
        ip.extend_from_slice(&l4);
        self.payload(ETH_P_IP, ip)
    }

    pub fn ipv6(self, src: [u8; 16], next_hdr: u8, l4: Vec<u8>) -> Self {
        let mut ip = vec![0u8; 40];
        ip[0] = 0x60;
        ip[4..6].copy_from_slice(&(l4.len() as u16).to_be_bytes());
        ip[6] = next_hdr;
        ip[7] = 64;
        ip[8..24].copy_from_slice(&src);
        ip[24..40].copy_from_slice(&[0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        ip.extend_from_slice(&l4);
        self.payload(ETH_P_IPV6, ip)
    }

    pub fn ipv4_udp(self, src: [u8; 4], sport: u16, dport: u16) -> Self {
        self.ipv4(src, 5, IPPROTO_UDP, udp(sport, dport))
    }

    pub fn ipv4_tcp(self, src: [u8; 4], sport: u16, dport: u16) -> Self {
        self.ipv4(src, 5, IPPROTO_TCP, tcp(sport, dport))
    }

    pub fn ipv6_udp(self, src: [u8; 16], sport: u16, dport: u16) -> Self {
        self.ipv6(src, IPPROTO_UDP, udp(sport, dport))
    }

    pub fn ipv6_tcp(self, src: [u8; 16], sport: u16, dport: u16) -> Self {
        self.ipv6(src, IPPROTO_TCP, tcp(sport, dport))
    }

    pub fn build(self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(64);
        frame.extend_from_slice(&DST_MAC);
        frame.extend_from_slice(&self.src_mac);

        let mut next = self.ether_type;
        let mut tags = Vec::new();
        for &(tpid, vid) in self.tags.iter().rev() {
            tags.push((vid, next));
            next = tpid;
        }
        frame.extend_from_slice(&next.to_be_bytes());
        for &(vid, encapsulated) in tags.iter().rev() {
            frame.extend_from_slice(&vid.to_be_bytes());
            frame.extend_from_slice(&encapsulated.to_be_bytes());
        }

        frame.extend_from_slice(&self.payload);
        if frame.len() < self.pad_to {
            frame.resize(self.pad_to, 0);
        }
        frame
    }
}

pub fn udp(sport: u16, dport: u16) -> Vec<u8> {
    let mut hdr = vec![0u8; 8];
    hdr[0..2].copy_from_slice(&sport.to_be_bytes());
    hdr[2..4].copy_from_slice(&dport.to_be_bytes());
    hdr[4..6].copy_from_slice(&8u16.to_be_bytes());
    hdr
}

pub fn tcp(sport: u16, dport: u16) -> Vec<u8> {
    let mut hdr = vec![0u8; 20];
    hdr[0..2].copy_from_slice(&sport.to_be_bytes());
    hdr[2..4].copy_from_slice(&dport.to_be_bytes());
    hdr[12] = 5 << 4;
    hdr[13] = 0x02;
    hdr
}

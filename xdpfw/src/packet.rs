use crate::wire::Header;

/// Borrowed, read-only window over one frame.
///
/// The view never copies the frame and never outlives the `classify` call
/// that created it.
#[derive(Clone, Copy, Debug)]
pub struct PacketView<'a> {
    data: &'a [u8],
}

impl<'a> PacketView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn start(&self) -> usize {
        0
    }

    pub fn end(&self) -> usize {
        self.data.len()
    }

    /// Total frame length, as charged to the action counters.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether `[offset, offset + size)` lies entirely inside the frame.
    pub fn fits(&self, offset: usize, size: usize) -> bool {
        match offset.checked_add(size) {
            Some(stop) => stop <= self.end(),
            None => false,
        }
    }

    /// Decode the header starting at `offset`, or `None` if it is truncated.
    pub fn header<H: Header>(&self, offset: usize) -> Option<H> {
        if !self.fits(offset, H::LEN) {
            return None;
        }
        Some(H::read(&self.data[offset..offset + H::LEN]))
    }
}

/// Parse position threaded through the layer parsers.
///
/// `next_proto` holds the protocol tag resolved by the last successful layer:
/// an ethertype after L2, an IP protocol number after L3.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    pub offset: usize,
    pub next_proto: u32,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, delta: usize) {
        self.offset += delta;
    }

    pub fn set_next_proto(&mut self, proto: u32) {
        self.next_proto = proto;
    }
}

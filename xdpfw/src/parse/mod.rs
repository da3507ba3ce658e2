//! Layer parsers.
//!
//! Each parser takes the frame, the shared cursor and the blacklists, and
//! returns `Pass` to continue or the verdict that ends classification. A
//! parser moves the cursor only after its header passed the bounds check.

pub mod l2;
pub mod l3;
pub mod l4;

pub use l2::{parse_eth, VLAN_MAX_DEPTH};
pub use l3::{parse_ipv4, parse_ipv6};
pub use l4::{parse_tcp, parse_udp};

//! Administrator input: textual MAC addresses, CIDR prefixes and port rules
//! turned into blacklist mutations.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use ipnet::{Ipv4Net, Ipv6Net};
use xdpfw_common::{Direction, Transport};

use crate::blacklist::{Blacklists, MacAddr};
use crate::error::AdminError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Insert,
    Remove,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Mac(MacAddr),
    V4 { addr: [u8; 4], prefix_len: u32 },
    V6 { addr: [u8; 16], prefix_len: u32 },
    Port {
        direction: Direction,
        protocol: Transport,
        port: u16,
    },
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Mac(mac) => write!(
                f,
                "source MAC address '{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}'",
                mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
            ),
            Target::V4 { addr, prefix_len } => {
                write!(f, "source IPv4 prefix '{}/{}'", Ipv4Addr::from(*addr), prefix_len)
            }
            Target::V6 { addr, prefix_len } => {
                write!(f, "source IPv6 prefix '{}/{}'", Ipv6Addr::from(*addr), prefix_len)
            }
            Target::Port {
                direction,
                protocol,
                port,
            } => {
                let direction = match direction {
                    Direction::Source => "source",
                    Direction::Destination => "dest",
                };
                let protocol = match protocol {
                    Transport::Tcp => "tcp",
                    Transport::Udp => "udp",
                };
                write!(f, "{direction} port '{port}/{protocol}'")
            }
        }
    }
}

/// One control-plane change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mutation {
    pub op: Op,
    pub target: Target,
}

impl Mutation {
    pub fn insert(target: Target) -> Self {
        Self {
            op: Op::Insert,
            target,
        }
    }

    pub fn remove(target: Target) -> Self {
        Self {
            op: Op::Remove,
            target,
        }
    }

    /// Apply to `lists`. Returns whether the table changed.
    pub fn apply(&self, lists: &Blacklists) -> Result<bool, AdminError> {
        let verb = match self.op {
            Op::Insert => "Blacklisting",
            Op::Remove => "Whitelisting",
        };
        tracing::info!("{} {}", verb, self.target);

        let changed = match (self.op, self.target) {
            (Op::Insert, Target::Mac(mac)) => lists.insert_mac(mac)?,
            (Op::Remove, Target::Mac(mac)) => lists.remove_mac(mac),
            (Op::Insert, Target::V4 { addr, prefix_len }) => {
                lists.insert_prefix_v4(addr, prefix_len)?
            }
            (Op::Remove, Target::V4 { addr, prefix_len }) => {
                lists.remove_prefix_v4(addr, prefix_len)?
            }
            (Op::Insert, Target::V6 { addr, prefix_len }) => {
                lists.insert_prefix_v6(addr, prefix_len)?
            }
            (Op::Remove, Target::V6 { addr, prefix_len }) => {
                lists.remove_prefix_v6(addr, prefix_len)?
            }
            (
                Op::Insert,
                Target::Port {
                    direction,
                    protocol,
                    port,
                },
            ) => lists.insert_port(direction, protocol, port)?,
            (
                Op::Remove,
                Target::Port {
                    direction,
                    protocol,
                    port,
                },
            ) => lists.remove_port(direction, protocol, port),
        };

        if !changed {
            tracing::debug!("{} already in requested state", self.target);
        }
        Ok(changed)
    }
}

/// Parse `aa:bb:cc:dd:ee:ff` (hex octets, either case).
pub fn parse_mac(s: &str) -> Result<MacAddr, AdminError> {
    let mut mac = [0u8; 6];
    let mut parts = s.trim().split(':');
    for octet in mac.iter_mut() {
        let part = parts.next().ok_or_else(|| AdminError::InvalidMac(s.to_string()))?;
        if part.is_empty() || part.len() > 2 {
            return Err(AdminError::InvalidMac(s.to_string()));
        }
        *octet = u8::from_str_radix(part, 16).map_err(|_| AdminError::InvalidMac(s.to_string()))?;
    }
    if parts.next().is_some() {
        return Err(AdminError::InvalidMac(s.to_string()));
    }
    Ok(mac)
}

/// Parse `a.b.c.d/len`; a bare address means `/32`.
pub fn parse_v4_prefix(s: &str) -> Result<Target, AdminError> {
    let s = s.trim();
    let net = match s.parse::<Ipv4Net>() {
        Ok(net) => net,
        Err(_) => s
            .parse::<Ipv4Addr>()
            .map(Ipv4Net::from)
            .map_err(|_| AdminError::InvalidPrefix(s.to_string()))?,
    };
    Ok(Target::V4 {
        addr: net.addr().octets(),
        prefix_len: net.prefix_len() as u32,
    })
}

/// Parse `addr/len`; a bare address means `/128`.
pub fn parse_v6_prefix(s: &str) -> Result<Target, AdminError> {
    let s = s.trim();
    let net = match s.parse::<Ipv6Net>() {
        Ok(net) => net,
        Err(_) => s
            .parse::<Ipv6Addr>()
            .map(Ipv6Net::from)
            .map_err(|_| AdminError::InvalidPrefix(s.to_string()))?,
    };
    Ok(Target::V6 {
        addr: net.addr().octets(),
        prefix_len: net.prefix_len() as u32,
    })
}

pub fn parse_direction(s: &str) -> Result<Direction, AdminError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "src" | "source" => Ok(Direction::Source),
        "dst" | "dest" | "destination" => Ok(Direction::Destination),
        _ => Err(AdminError::InvalidDirection(s.to_string())),
    }
}

pub fn parse_protocol(s: &str) -> Result<Transport, AdminError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "tcp" => Ok(Transport::Tcp),
        "udp" => Ok(Transport::Udp),
        _ => Err(AdminError::InvalidProtocol(s.to_string())),
    }
}

pub fn parse_port(s: &str) -> Result<u16, AdminError> {
    s.trim()
        .parse::<u16>()
        .map_err(|_| AdminError::InvalidPort(s.to_string()))
}

/// Parse a port rule written as `<src|dst>/<tcp|udp>/<port>`.
pub fn parse_port_rule(s: &str) -> Result<Target, AdminError> {
    let mut parts = s.split('/');
    let (Some(direction), Some(protocol), Some(port), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AdminError::InvalidPort(s.to_string()));
    };
    Ok(Target::Port {
        direction: parse_direction(direction)?,
        protocol: parse_protocol(protocol)?,
        port: parse_port(port)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BlacklistError;

    #[test]
    fn test_parse_mac() {
        assert_eq!(
            parse_mac("AA:bb:0c:d:ee:ff").unwrap(),
            [0xaa, 0xbb, 0x0c, 0x0d, 0xee, 0xff]
        );
        for bad in ["", "aa:bb:cc:dd:ee", "aa:bb:cc:dd:ee:ff:00", "aa:bb:cc:dd:ee:gg", "aaa:bb:cc:dd:ee:ff"] {
            assert!(matches!(parse_mac(bad), Err(AdminError::InvalidMac(_))), "{bad}");
        }
    }

    #[test]
    fn test_parse_prefixes() {
        assert_eq!(
            parse_v4_prefix("10.0.0.0/8").unwrap(),
            Target::V4 {
                addr: [10, 0, 0, 0],
                prefix_len: 8
            }
        );
        assert_eq!(
            parse_v4_prefix("192.0.2.7").unwrap(),
            Target::V4 {
                addr: [192, 0, 2, 7],
                prefix_len: 32
            }
        );
        let Target::V6 { addr, prefix_len } = parse_v6_prefix("2001:db8::/32").unwrap() else {
            panic!("expected v6 target");
        };
        assert_eq!(prefix_len, 32);
        assert_eq!(&addr[..4], &[0x20, 0x01, 0x0d, 0xb8]);
        assert!(matches!(parse_v6_prefix("::1"), Ok(Target::V6 { prefix_len: 128, .. })));

        assert!(parse_v4_prefix("10.0.0.0/33").is_err());
        assert!(parse_v4_prefix("::1/128").is_err());
        assert!(parse_v6_prefix("nonsense").is_err());
    }

    #[test]
    fn test_parse_port_rule() {
        assert_eq!(
            parse_port_rule("dst/udp/53").unwrap(),
            Target::Port {
                direction: Direction::Destination,
                protocol: Transport::Udp,
                port: 53
            }
        );
        assert!(matches!(parse_port_rule("src/icmp/1"), Err(AdminError::InvalidProtocol(_))));
        assert!(matches!(parse_port_rule("up/tcp/1"), Err(AdminError::InvalidDirection(_))));
        assert!(matches!(parse_port_rule("src/tcp/65536"), Err(AdminError::InvalidPort(_))));
        assert!(matches!(parse_port_rule("src/tcp"), Err(AdminError::InvalidPort(_))));
        assert!(matches!(parse_port_rule("src/tcp/1/2"), Err(AdminError::InvalidPort(_))));
    }

    #[test]
    fn test_apply_mutations() {
        let lists = Blacklists::new();
        let mac = Target::Mac(parse_mac("02:00:00:00:00:01").unwrap());
        assert!(Mutation::insert(mac).apply(&lists).unwrap());
        assert!(!Mutation::insert(mac).apply(&lists).unwrap());
        assert!(Mutation::remove(mac).apply(&lists).unwrap());
        assert!(!Mutation::remove(mac).apply(&lists).unwrap());

        let rule = parse_port_rule("src/tcp/22").unwrap();
        assert!(Mutation::insert(rule).apply(&lists).unwrap());
        assert_eq!(lists.sizes().ports, 1);
    }

    #[test]
    fn test_apply_reports_table_errors() {
        let lists = Blacklists::new();
        let target = Target::V4 {
            addr: [1, 2, 3, 4],
            prefix_len: 40,
        };
        assert!(matches!(
            Mutation::insert(target).apply(&lists),
            Err(AdminError::Blacklist(BlacklistError::InvalidPrefixLen { .. }))
        ));
    }

    #[test]
    fn test_target_display() {
        let target = parse_port_rule("dst/tcp/443").unwrap();
        assert_eq!(target.to_string(), "dest port '443/tcp'");
        let target = parse_v4_prefix("10.0.0.0/8").unwrap();
        assert_eq!(target.to_string(), "source IPv4 prefix '10.0.0.0/8'");
    }
}

//! Address admission list made of inclusive ranges.

use std::net::{AddrParseError, IpAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    low: IpAddr,
    high: IpAddr,
}

impl IpRange {
    pub fn new(low: IpAddr, high: IpAddr) -> Self {
        Self {
            low: normalize(low),
            high: normalize(high),
        }
    }

    /// Ranges only match addresses of their own family.
    pub fn contains(&self, addr: IpAddr) -> bool {
        let addr = normalize(addr);
        match (self.low, self.high, addr) {
            (IpAddr::V4(low), IpAddr::V4(high), IpAddr::V4(a)) => low <= a && a <= high,
            (IpAddr::V6(low), IpAddr::V6(high), IpAddr::V6(a)) => low <= a && a <= high,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IpWhitelist {
    ranges: Vec<IpRange>,
}

impl IpWhitelist {
    pub fn new(ranges: Vec<IpRange>) -> Self {
        Self { ranges }
    }

    /// Parses `[low, high]` string pairs as found in configuration.
    pub fn parse(pairs: &[[String; 2]]) -> Result<Self, AddrParseError> {
        let ranges = pairs
            .iter()
            .map(|[low, high]| Ok(IpRange::new(low.trim().parse()?, high.trim().parse()?)))
            .collect::<Result<Vec<_>, AddrParseError>>()?;
        Ok(Self { ranges })
    }

    pub fn allows(&self, addr: IpAddr) -> bool {
        self.ranges.iter().any(|range| range.contains(addr))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) are compared as IPv4.
pub fn normalize(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

//! Remote address allow-list

use std::net::{IpAddr, Ipv4Addr};

#[derive(Debug, Clone, PartialEq, Eq)]
enum FilterEntry {
    Any,
    Ipv4Cidr { network: u32, mask: u32 },
    Exact(String),
}

impl FilterEntry {
    fn parse(entry: &str) -> Self {
        if entry == "*" {
            return FilterEntry::Any;
        }

        if let Some((addr, prefix)) = entry.split_once('/') {
            if let (Ok(addr), Ok(prefix)) = (addr.parse::<Ipv4Addr>(), prefix.parse::<u8>()) {
                if prefix <= 32 {
                    let mask = if prefix == 0 {
                        0
                    } else {
                        u32::MAX << (32 - prefix)
                    };
                    return FilterEntry::Ipv4Cidr {
                        network: u32::from(addr) & mask,
                        mask,
                    };
                }
            }
        }

        FilterEntry::Exact(entry.to_string())
    }

    fn matches(&self, addr: IpAddr) -> bool {
        match self {
            FilterEntry::Any => true,
            FilterEntry::Ipv4Cidr { network, mask } => match ipv4_of(addr) {
                Some(v4) => u32::from(v4) & mask == *network,
                None => false,
            },
            FilterEntry::Exact(expected) => {
                *expected == addr.to_string()
                    || ipv4_of(addr).is_some_and(|v4| *expected == v4.to_string())
            }
        }
    }
}

fn ipv4_of(addr: IpAddr) -> Option<Ipv4Addr> {
    match addr {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}

/// Comma-separated list of `*`, IPv4 CIDR ranges and exact addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpFilter {
    entries: Vec<FilterEntry>,
}

impl IpFilter {
    pub fn parse(filter: &str) -> Self {
        let entries = filter
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(FilterEntry::parse)
            .collect();
        Self { entries }
    }

    /// A missing remote address never matches
    pub fn matches(&self, addr: Option<IpAddr>) -> bool {
        match addr {
            Some(addr) => self.entries.iter().any(|entry| entry.matches(addr)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    #[test]
    fn test_wildcard() {
        let filter = IpFilter::parse("*");
        assert!(filter.matches(ip("203.0.113.9")));
        assert!(filter.matches(ip("::1")));
        assert!(!filter.matches(None));
    }

    #[test]
    fn test_cidr_ranges() {
        let filter = IpFilter::parse("10.0.0.0/8, 192.168.1.0/24");
        assert!(filter.matches(ip("10.20.30.40")));
        assert!(filter.matches(ip("192.168.1.254")));
        assert!(!filter.matches(ip("192.168.2.1")));
        assert!(filter.matches(ip("::ffff:10.1.1.1")));
    }

    #[test]
    fn test_exact_entries() {
        let filter = IpFilter::parse("127.0.0.1,::1");
        assert!(filter.matches(ip("127.0.0.1")));
        assert!(filter.matches(ip("::1")));
        assert!(!filter.matches(ip("127.0.0.2")));
    }

    #[test]
    fn test_invalid_cidr_falls_back_to_exact() {
        let filter = IpFilter::parse("10.0.0.0/40");
        assert!(!filter.matches(ip("10.0.0.1")));

        let everything = IpFilter::parse("0.0.0.0/0");
        assert!(everything.matches(ip("8.8.8.8")));
    }
}

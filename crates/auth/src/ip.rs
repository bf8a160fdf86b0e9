//! IP whitelist matching: plain addresses or CIDR blocks.

use std::net::IpAddr;

use {ipnet::IpNet, tracing::warn};

/// True when `addr` matches any whitelist entry.
///
/// Entries are plain IPs (`192.168.1.5`) or CIDR blocks (`10.0.0.0/8`).
/// Unparseable entries are skipped with a warning rather than failing the
/// whole check.
pub fn ip_allowed(addr: IpAddr, whitelist: &[String]) -> bool {
    whitelist.iter().any(|entry| {
        if let Ok(net) = entry.parse::<IpNet>() {
            return net.contains(&addr);
        }
        if let Ok(plain) = entry.parse::<IpAddr>() {
            return plain == addr;
        }
        warn!(entry, "unparseable IP whitelist entry");
        false
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn plain_match() {
        let list = vec!["192.168.1.5".to_string()];
        assert!(ip_allowed(ip("192.168.1.5"), &list));
        assert!(!ip_allowed(ip("192.168.1.6"), &list));
    }

    #[test]
    fn cidr_match() {
        let list = vec!["10.0.0.0/8".to_string()];
        assert!(ip_allowed(ip("10.255.0.1"), &list));
        assert!(!ip_allowed(ip("11.0.0.1"), &list));
    }

    #[test]
    fn ipv6() {
        let list = vec!["::1".to_string(), "fd00::/8".to_string()];
        assert!(ip_allowed(ip("::1"), &list));
        assert!(ip_allowed(ip("fd00::42"), &list));
        assert!(!ip_allowed(ip("fe80::1"), &list));
    }

    #[test]
    fn bad_entries_are_skipped() {
        let list = vec!["not-an-ip".to_string(), "127.0.0.1".to_string()];
        assert!(ip_allowed(ip("127.0.0.1"), &list));
        assert!(!ip_allowed(ip("1.1.1.1"), &list));
    }
}

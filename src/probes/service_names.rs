//! Common service names keyed by TCP port

use once_cell::sync::Lazy;
use std::collections::HashMap;

static SERVICES: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (21, "ftp"),
        (22, "ssh"),
        (23, "telnet"),
        (25, "smtp"),
        (53, "dns"),
        (80, "http"),
        (110, "pop3"),
        (111, "rpcbind"),
        (135, "msrpc"),
        (139, "netbios-ssn"),
        (143, "imap"),
        (443, "https"),
        (445, "smb"),
        (993, "imaps"),
        (995, "pop3s"),
        (1433, "mssql"),
        (1521, "oracle"),
        (1723, "pptp"),
        (3306, "mysql"),
        (3389, "rdp"),
        (5432, "postgresql"),
        (5900, "vnc"),
        (6379, "redis"),
        (8080, "http-proxy"),
        (8443, "https-alt"),
        (9200, "elasticsearch"),
        (27017, "mongodb"),
    ])
});

/// Well-known service name for a port, or "unknown"
pub fn service_name(port: u16) -> &'static str {
    SERVICES.get(&port).copied().unwrap_or("unknown")
}

/// The port set scanned by default ("common")
pub fn common_ports() -> Vec<u16> {
    let mut ports: Vec<u16> = SERVICES.keys().copied().collect();
    ports.sort_unstable();
    ports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_ports() {
        assert_eq!(service_name(22), "ssh");
        assert_eq!(service_name(6379), "redis");
        assert_eq!(service_name(47112), "unknown");
    }

    #[test]
    fn test_common_ports_sorted_and_deduped() {
        let ports = common_ports();
        assert!(ports.windows(2).all(|w| w[0] < w[1]));
        assert!(ports.contains(&443));
    }
}

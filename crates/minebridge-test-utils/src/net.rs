//! Free TCP port discovery.

use std::collections::BTreeSet;
use std::net::TcpListener;

/// A TCP port that was free a moment ago.
///
/// The port is released before returning, so another process may grab it;
/// good enough for tests.
///
/// # Panics
///
/// Panics if the OS refuses an ephemeral bind.
#[must_use]
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .expect("ephemeral bind failed")
}

/// `n` distinct free ports.
///
/// # Panics
///
/// Panics if the OS refuses an ephemeral bind.
#[must_use]
pub fn free_ports(n: usize) -> Vec<u16> {
    // hold every listener until all ports are known so none repeats
    let listeners: Vec<TcpListener> = (0..n)
        .map(|_| TcpListener::bind("127.0.0.1:0").expect("ephemeral bind failed"))
        .collect();
    listeners
        .iter()
        .map(|l| l.local_addr().expect("bound listener has an address").port())
        .collect()
}

/// Whether every port in `ports` is distinct.
#[must_use]
pub fn all_distinct(ports: &[u16]) -> bool {
    ports.iter().collect::<BTreeSet<_>>().len() == ports.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_port_is_bindable() {
        let port = free_port();
        assert_ne!(port, 0);
        TcpListener::bind(("127.0.0.1", port)).unwrap();
    }

    #[test]
    fn free_ports_are_distinct() {
        let ports = free_ports(4);
        assert_eq!(ports.len(), 4);
        assert!(all_distinct(&ports));
    }
}

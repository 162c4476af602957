//! Tunables for the UDP tracker client.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// How announces behave when no connection token has been obtained yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectPolicy {
    /// Announce performs the handshake itself whenever the token is missing or stale.
    Auto,
    /// Announce fails with `NotConnected` until `connect()` has succeeded once.
    /// A token that later expires is still refreshed transparently.
    Explicit,
}

#[derive(Debug, Clone, Copy)]
pub struct UdpTrackerConfig {
    /// Read deadline used while no timeouts have been seen
    pub base_timeout: Duration,
    /// The deadline doubles per contiguous timeout up to this many times
    pub max_backoff_exponent: u32,
    /// Lifetime of a connection token from the moment it is received
    pub connection_ttl: Duration,
    /// Local address the socket binds to before dialing the tracker
    pub bind_addr: SocketAddr,
    /// Append the URL-data option (BEP 41) to announce requests
    pub send_url_data: bool,
    pub connect_policy: ConnectPolicy,
    /// Receive buffer size; IP caps a datagram at 64 KiB
    pub max_datagram_size: usize,
}

impl Default for UdpTrackerConfig {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(15),
            max_backoff_exponent: 8,
            connection_ttl: Duration::from_secs(60),
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
            send_url_data: true,
            connect_policy: ConnectPolicy::Auto,
            max_datagram_size: 0x10000,
        }
    }
}

impl UdpTrackerConfig {
    /// Read deadline after `contiguous_timeouts` unanswered requests:
    /// `base_timeout * 2^min(n, max_backoff_exponent)`.
    pub fn timeout_for(&self, contiguous_timeouts: u32) -> Duration {
        let exponent = contiguous_timeouts.min(self.max_backoff_exponent);
        self.base_timeout.saturating_mul(2u32.saturating_pow(exponent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let config = UdpTrackerConfig::default();
        assert_eq!(config.timeout_for(0), Duration::from_secs(15));
        assert_eq!(config.timeout_for(1), Duration::from_secs(30));
        assert_eq!(config.timeout_for(2), Duration::from_secs(60));
        assert_eq!(config.timeout_for(3), Duration::from_secs(120));
    }

    #[test]
    fn test_backoff_caps_at_max_exponent() {
        let config = UdpTrackerConfig::default();
        assert_eq!(config.timeout_for(8), Duration::from_secs(3840));
        assert_eq!(config.timeout_for(9), Duration::from_secs(3840));
        assert_eq!(config.timeout_for(20), Duration::from_secs(3840));
        assert_eq!(config.timeout_for(u32::MAX), Duration::from_secs(3840));
    }

    #[test]
    fn test_backoff_saturates_with_large_exponent() {
        let config = UdpTrackerConfig {
            max_backoff_exponent: 64,
            ..UdpTrackerConfig::default()
        };
        assert!(config.timeout_for(64) >= config.timeout_for(31));
    }
}

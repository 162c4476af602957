//! Blocking client for the UDP BitTorrent tracker protocol (BEP 15).
//!
//! ```no_run
//! use torrent_udp_tracker::{AnnounceRequest, ClientRegistry};
//!
//! let registry = ClientRegistry::with_defaults();
//! let mut client = registry.client_for("udp://tracker.example.org:6969/announce")?;
//! let response = client.announce(&AnnounceRequest::new([0u8; 20], 6881))?;
//! println!("{} peers, next announce in {}s", response.peers.len(), response.interval);
//! # Ok::<(), torrent_udp_tracker::TrackerError>(())
//! ```

pub mod config;
pub mod error;
pub mod peer_id;
pub mod tracker;

pub use config::{ConnectPolicy, UdpTrackerConfig};
pub use error::{Result, TrackerError};
pub use tracker::udp::UdpTrackerClient;
pub use tracker::{
    AnnounceEvent, AnnounceRequest, AnnounceResponse, ClientRegistry, PeerAddress, TrackerClient,
};

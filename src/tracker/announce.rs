use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::peer_id::{gen_peer_id, PEER_ID_LEN};

/// Client state reported with an announce. Discriminants are the BEP 15 wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceEvent {
    None = 0,
    Completed = 1,
    Started = 2,
    Stopped = 3,
}

impl AnnounceEvent {
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Parameters of one announce. Protocol clients encode these verbatim.
#[derive(Debug, Clone)]
pub struct AnnounceRequest {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; PEER_ID_LEN],
    pub downloaded: u64,
    pub left: u64,
    pub uploaded: u64,
    pub event: AnnounceEvent,
    /// IPv4 address to advertise, 0 lets the tracker use the sender address
    pub ip: u32,
    pub key: u32,
    /// Peers wanted, -1 for the tracker default
    pub num_want: i32,
    pub port: u16,
}

impl AnnounceRequest {
    pub fn new(info_hash: [u8; 20], port: u16) -> Self {
        AnnounceRequest {
            info_hash,
            peer_id: gen_peer_id(),
            downloaded: 0,
            left: 0,
            uploaded: 0,
            event: AnnounceEvent::None,
            ip: 0,
            key: rand::random(),
            num_want: -1,
            port,
        }
    }

    pub fn with_event(mut self, event: AnnounceEvent) -> Self {
        self.event = event;
        self
    }

    pub fn with_progress(mut self, downloaded: u64, left: u64, uploaded: u64) -> Self {
        self.downloaded = downloaded;
        self.left = left;
        self.uploaded = uploaded;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub ip: IpAddr,
    pub port: u16,
}

impl PeerAddress {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl From<(Ipv4Addr, u16)> for PeerAddress {
    fn from((ip, port): (Ipv4Addr, u16)) -> Self {
        PeerAddress {
            ip: IpAddr::V4(ip),
            port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceResponse {
    /// Seconds the tracker asks us to wait before the next announce
    pub interval: u32,
    pub leechers: u32,
    pub seeders: u32,
    pub peers: Vec<PeerAddress>,
}

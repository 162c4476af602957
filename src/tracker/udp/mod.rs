//! UDP tracker client (BEP 15).
//!
//! Every request goes through the same cycle: make sure a fresh connection
//! token is held (the tracker hands one out per handshake and it lives for a
//! minute), send one datagram tagged with a random transaction id, then wait
//! for the datagram carrying that id. A client owns its socket, token and
//! backoff counter, and is meant for one caller at a time.

pub mod codec;
pub mod connection;
pub mod exchange;
pub mod transport;

use std::time::{Duration, Instant};

use tracing::info;
use url::Url;

use self::codec::{decode_announce, Action, Command, UrlData, ANNOUNCE_REQUEST_SIZE};
use self::connection::Connection;
use self::exchange::Exchange;
pub use self::transport::{Transport, UdpTransport};
use crate::config::{ConnectPolicy, UdpTrackerConfig};
use crate::error::{Result, TrackerError};
use crate::tracker::{
    AnnounceRequest, AnnounceResponse, ClientRegistry, PeerAddress, TrackerClient,
};

pub const SCHEME: &str = "udp";

/// Makes `udp://` URLs resolvable through `registry`.
pub fn register(registry: &mut ClientRegistry) {
    registry.register(SCHEME, new_client);
}

fn new_client(url: &Url) -> Result<Box<dyn TrackerClient>> {
    Ok(Box::new(UdpTrackerClient::new(url)?))
}

pub struct UdpTrackerClient<T = UdpTransport> {
    request_uri: String,
    config: UdpTrackerConfig,
    connection: Connection,
    exchange: Exchange<T>,
}

impl UdpTrackerClient<UdpTransport> {
    pub fn new(url: &Url) -> Result<Self> {
        Self::with_config(url, UdpTrackerConfig::default())
    }

    /// Validates the tracker address. No socket is opened until the first request.
    pub fn with_config(url: &Url, config: UdpTrackerConfig) -> Result<Self> {
        let addr = tracker_addr(url)?;
        let bind_addr = config.bind_addr;
        let exchange = Exchange::new(
            Box::new(move || UdpTransport::dial(bind_addr, &addr)),
            config,
        );
        Ok(UdpTrackerClient {
            request_uri: request_uri(url),
            config,
            connection: Connection::Absent,
            exchange,
        })
    }
}

impl<T: Transport> UdpTrackerClient<T> {
    /// Builds a client over an already open transport.
    pub fn with_transport(url: &Url, transport: T, config: UdpTrackerConfig) -> Self {
        UdpTrackerClient {
            request_uri: request_uri(url),
            config,
            connection: Connection::Absent,
            exchange: Exchange::with_transport(transport, config),
        }
    }

    /// Performs a handshake even if the current token is still fresh.
    pub fn connect(&mut self) -> Result<()> {
        self.connection.handshake(&mut self.exchange)?;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_valid_at(Instant::now(), self.config.connection_ttl)
    }

    pub fn contiguous_timeouts(&self) -> u32 {
        self.exchange.contiguous_timeouts()
    }

    /// How long the next request will wait for its answer.
    pub fn current_timeout(&self) -> Duration {
        self.exchange.current_timeout()
    }

    /// Drops the socket and the token. The next request dials again.
    pub fn close(&mut self) {
        self.exchange.close();
        self.connection = Connection::Absent;
    }

    pub fn announce(&mut self, request: &AnnounceRequest) -> Result<AnnounceResponse> {
        let connection_id = match self.config.connect_policy {
            ConnectPolicy::Explicit if !self.connection.has_connected() => {
                return Err(TrackerError::NotConnected);
            }
            _ => self
                .connection
                .ensure(&mut self.exchange, self.config.connection_ttl)?,
        };

        let mut body = Vec::with_capacity(ANNOUNCE_REQUEST_SIZE);
        request.serialize(&mut body)?;
        let trailer = self
            .config
            .send_url_data
            .then(|| UrlData::new(&self.request_uri));

        let response = self.exchange.exchange(
            connection_id,
            Action::Announce,
            &body,
            trailer.as_ref(),
        )?;

        let (header, peers) = decode_announce(&response)?;
        let peers = peers
            .map(|entry| entry.map(PeerAddress::from))
            .collect::<Result<Vec<_>>>()?;

        info!(
            interval = header.interval,
            leechers = header.leechers,
            seeders = header.seeders,
            peers = peers.len(),
            "announced to tracker"
        );

        Ok(AnnounceResponse {
            interval: header.interval,
            leechers: header.leechers,
            seeders: header.seeders,
            peers,
        })
    }
}

impl<T: Transport + Send> TrackerClient for UdpTrackerClient<T> {
    fn announce(&mut self, request: &AnnounceRequest) -> Result<AnnounceResponse> {
        UdpTrackerClient::announce(self, request)
    }
}

fn tracker_addr(url: &Url) -> Result<String> {
    if url.scheme() != SCHEME {
        return Err(TrackerError::UnsupportedScheme(url.scheme().to_string()));
    }
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| TrackerError::InvalidTrackerAddress(format!("{url} has no host")))?;
    let port = url
        .port()
        .ok_or_else(|| TrackerError::InvalidTrackerAddress(format!("{url} has no port")))?;
    Ok(format!("{host}:{port}"))
}

/// Path and query of the tracker URL, carried in the URL-data option.
fn request_uri(url: &Url) -> String {
    let path = match url.path() {
        "" => "/",
        path => path,
    };
    match url.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    }
}

//! Big-endian wire layouts of the UDP tracker protocol (BEP 15), plus the
//! URL-data request option from BEP 41.

use std::io::{self, Write};
use std::iter::FusedIterator;
use std::net::Ipv4Addr;

use byteorder::{ReadBytesExt, WriteBytesExt, BE};

use crate::error::{Result, TrackerError};
use crate::tracker::{AnnounceRequest, PeerAddress};

/// Connection id every handshake is sent with.
pub const PROTOCOL_MAGIC: u64 = 0x41727101980;

pub const REQUEST_HEADER_SIZE: usize = 16;
pub const RESPONSE_HEADER_SIZE: usize = 8;
pub const ANNOUNCE_REQUEST_SIZE: usize = 82;
pub const ANNOUNCE_HEADER_SIZE: usize = 12;
pub const PEER_SIZE: usize = 6;

pub const OPTION_URL_DATA: u8 = 2;
pub const MAX_URL_DATA_LEN: usize = u8::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Connect = 0,
    Announce = 1,
    Scrape = 2,
    Error = 3,
}

impl Action {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Action> {
        match code {
            0 => Some(Action::Connect),
            1 => Some(Action::Announce),
            2 => Some(Action::Scrape),
            3 => Some(Action::Error),
            _ => None,
        }
    }
}

/**
 * Command serialization
 */

pub trait Command {
    fn serialize(&self, out: &mut Vec<u8>) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub connection_id: u64,
    pub action: Action,
    pub transaction_id: u32,
}

impl Command for RequestHeader {
    fn serialize(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.write_u64::<BE>(self.connection_id)?;
        out.write_u32::<BE>(self.action.code())?;
        out.write_u32::<BE>(self.transaction_id)
    }
}

impl Command for AnnounceRequest {
    fn serialize(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.write_all(&self.info_hash)?;
        out.write_all(&self.peer_id)?;
        out.write_u64::<BE>(self.downloaded)?;
        out.write_u64::<BE>(self.left)?;
        out.write_u64::<BE>(self.uploaded)?;
        out.write_u32::<BE>(self.event.code())?;
        out.write_u32::<BE>(self.ip)?;
        out.write_u32::<BE>(self.key)?;
        out.write_i32::<BE>(self.num_want)?;
        out.write_u16::<BE>(self.port)
    }
}

/// Single URL-data option carrying the path (and query) of the tracker URL,
/// cut to the 255 bytes its length byte can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlData<'a> {
    path: &'a [u8],
}

impl<'a> UrlData<'a> {
    pub fn new(path: &'a str) -> Self {
        let path = path.as_bytes();
        UrlData {
            path: &path[..path.len().min(MAX_URL_DATA_LEN)],
        }
    }

    pub fn path(&self) -> &'a [u8] {
        self.path
    }
}

impl Command for UrlData<'_> {
    fn serialize(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.write_u8(OPTION_URL_DATA)?;
        out.write_u8(self.path.len() as u8)?;
        out.write_all(self.path)
    }
}

/// Lays out one outgoing datagram: header, action body, then the optional trailer.
pub fn encode_request(
    header: &RequestHeader,
    body: &[u8],
    trailer: Option<&UrlData>,
) -> io::Result<Vec<u8>> {
    let trailer_len = trailer.map_or(0, |t| 2 + t.path.len());
    let mut datagram = Vec::with_capacity(REQUEST_HEADER_SIZE + body.len() + trailer_len);
    header.serialize(&mut datagram)?;
    datagram.write_all(body)?;
    if let Some(trailer) = trailer {
        trailer.serialize(&mut datagram)?;
    }
    Ok(datagram)
}

/**
 * Response deserialization
 */

pub trait Response: Sized {
    /// Reads one record from the front of `data`, advancing it.
    fn deserialize(data: &mut &[u8]) -> io::Result<Self>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Raw action code; trackers may send codes we do not know
    pub action: u32,
    pub transaction_id: u32,
}

impl ResponseHeader {
    pub fn is(&self, action: Action) -> bool {
        self.action == action.code()
    }
}

impl Response for ResponseHeader {
    fn deserialize(data: &mut &[u8]) -> io::Result<Self> {
        Ok(ResponseHeader {
            action: data.read_u32::<BE>()?,
            transaction_id: data.read_u32::<BE>()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectResponse {
    pub connection_id: u64,
}

impl Response for ConnectResponse {
    fn deserialize(data: &mut &[u8]) -> io::Result<Self> {
        Ok(ConnectResponse {
            connection_id: data.read_u64::<BE>()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnounceResponseHeader {
    pub interval: u32,
    pub leechers: u32,
    pub seeders: u32,
}

impl Response for AnnounceResponseHeader {
    fn deserialize(data: &mut &[u8]) -> io::Result<Self> {
        Ok(AnnounceResponseHeader {
            interval: data.read_u32::<BE>()?,
            leechers: data.read_u32::<BE>()?,
            seeders: data.read_u32::<BE>()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerEntry {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Response for PeerEntry {
    fn deserialize(data: &mut &[u8]) -> io::Result<Self> {
        Ok(PeerEntry {
            ip: Ipv4Addr::from(data.read_u32::<BE>()?),
            port: data.read_u16::<BE>()?,
        })
    }
}

impl From<PeerEntry> for PeerAddress {
    fn from(entry: PeerEntry) -> Self {
        PeerAddress::from((entry.ip, entry.port))
    }
}

/// Peer entries packed back to back after the announce header. Yields a
/// decode error, then stops, if the data ends inside an entry.
#[derive(Debug, Clone)]
pub struct Peers<'a> {
    data: &'a [u8],
}

impl Iterator for Peers<'_> {
    type Item = Result<PeerEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        match PeerEntry::deserialize(&mut self.data) {
            Ok(entry) => Some(Ok(entry)),
            Err(err) => {
                self.data = &[];
                Some(Err(TrackerError::decode("peer list", err)))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.data.len().div_ceil(PEER_SIZE);
        (n, Some(n))
    }
}

impl FusedIterator for Peers<'_> {}

/// Splits a datagram into its header and body. Fails only when the datagram
/// is shorter than a header.
pub fn decode_response(datagram: &[u8]) -> Result<(ResponseHeader, &[u8])> {
    let mut data = datagram;
    let header = ResponseHeader::deserialize(&mut data)
        .map_err(|e| TrackerError::decode("response header", e))?;
    Ok((header, data))
}

pub fn decode_connect(body: &[u8]) -> Result<ConnectResponse> {
    let mut data = body;
    ConnectResponse::deserialize(&mut data)
        .map_err(|e| TrackerError::decode("connect response", e))
}

pub fn decode_announce(body: &[u8]) -> Result<(AnnounceResponseHeader, Peers<'_>)> {
    let mut data = body;
    let header = AnnounceResponseHeader::deserialize(&mut data)
        .map_err(|e| TrackerError::decode("announce response", e))?;
    Ok((header, Peers { data }))
}

/// Error bodies are UTF-8 text running to the end of the datagram.
pub fn decode_error_message(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

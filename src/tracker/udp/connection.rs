use std::time::{Duration, Instant};

use tracing::info;

use super::codec::{decode_connect, Action, PROTOCOL_MAGIC};
use super::exchange::Exchange;
use super::transport::Transport;
use crate::error::Result;

/// Cached connection token. A token is good for `ttl` from the instant it was
/// received and must be renewed with a fresh handshake afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connection {
    #[default]
    Absent,
    Valid {
        connection_id: u64,
        received_at: Instant,
    },
}

impl Connection {
    pub fn is_valid_at(&self, now: Instant, ttl: Duration) -> bool {
        self.id_at(now, ttl).is_some()
    }

    /// The token, if it is still usable at `now`.
    pub fn id_at(&self, now: Instant, ttl: Duration) -> Option<u64> {
        match *self {
            Connection::Absent => None,
            Connection::Valid {
                connection_id,
                received_at,
            } => now
                .checked_duration_since(received_at)
                .filter(|age| *age < ttl)
                .map(|_| connection_id),
        }
    }

    pub fn has_connected(&self) -> bool {
        matches!(self, Connection::Valid { .. })
    }

    /// Returns a usable token, handshaking first if there is none or it expired.
    pub fn ensure<T: Transport>(
        &mut self,
        exchange: &mut Exchange<T>,
        ttl: Duration,
    ) -> Result<u64> {
        match self.id_at(Instant::now(), ttl) {
            Some(connection_id) => Ok(connection_id),
            None => self.handshake(exchange),
        }
    }

    /// Unconditionally obtains a new token from the tracker.
    pub fn handshake<T: Transport>(&mut self, exchange: &mut Exchange<T>) -> Result<u64> {
        let body = exchange.exchange(PROTOCOL_MAGIC, Action::Connect, &[], None)?;
        let connection_id = decode_connect(&body)?.connection_id;
        *self = Connection::Valid {
            connection_id,
            received_at: Instant::now(),
        };
        info!("connected to tracker, connection id {connection_id:#018x}");
        Ok(connection_id)
    }
}

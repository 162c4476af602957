//! Errors surfaced by tracker clients.

use std::io;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// Socket dial, send or receive failed for a reason other than a timeout.
    #[error("tracker transport error: {0}")]
    Transport(#[from] io::Error),

    /// No correlated response arrived before the read deadline.
    #[error("tracker did not respond within {after:?}")]
    Timeout { after: Duration },

    /// A correlated response could not be parsed into the expected shape.
    #[error("malformed {context}: {source}")]
    Decode {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    /// The tracker answered with an error action.
    #[error("tracker returned error: {0}")]
    Tracker(String),

    /// Announce attempted before any handshake under the explicit connect policy.
    #[error("not connected to tracker")]
    NotConnected,

    #[error("invalid tracker url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid tracker address: {0}")]
    InvalidTrackerAddress(String),

    #[error("no tracker client registered for scheme {0:?}")]
    UnsupportedScheme(String),
}

impl TrackerError {
    pub(crate) fn decode(context: &'static str, source: io::Error) -> Self {
        TrackerError::Decode { context, source }
    }

    /// True when the call failed because the tracker stayed silent, the one
    /// case where a caller retry is usually worthwhile.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TrackerError::Timeout { .. })
    }
}

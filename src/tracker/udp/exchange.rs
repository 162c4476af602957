//! Sends one request datagram and waits for the datagram that answers it.
//!
//! UDP gives no framing between calls, so anything can arrive on the socket:
//! late answers to earlier requests, duplicates, or garbage. A response only
//! counts when its transaction id matches the request just sent and its
//! action is either the one requested or `Error`. Everything else is dropped
//! and reading continues until the deadline computed at send time.
//!
//! Unanswered calls grow the next call's deadline exponentially; the first
//! correlated response resets it.

use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::codec::{
    decode_error_message, decode_response, encode_request, Action, RequestHeader, UrlData,
};
use super::transport::{is_timeout, Transport};
use crate::config::UdpTrackerConfig;
use crate::error::{Result, TrackerError};

pub type Dialer<T> = Box<dyn Fn() -> io::Result<T> + Send>;

pub struct Exchange<T> {
    socket: Option<T>,
    dial: Option<Dialer<T>>,
    contiguous_timeouts: u32,
    config: UdpTrackerConfig,
}

impl<T: Transport> Exchange<T> {
    /// The socket is dialed on first use and kept until `close`.
    pub fn new(dial: Dialer<T>, config: UdpTrackerConfig) -> Self {
        Exchange {
            socket: None,
            dial: Some(dial),
            contiguous_timeouts: 0,
            config,
        }
    }

    /// Starts from an already open transport. Once closed there is nothing to
    /// redial, so later calls fail with `NotConnected`.
    pub fn with_transport(transport: T, config: UdpTrackerConfig) -> Self {
        Exchange {
            socket: Some(transport),
            dial: None,
            contiguous_timeouts: 0,
            config,
        }
    }

    pub fn contiguous_timeouts(&self) -> u32 {
        self.contiguous_timeouts
    }

    /// Deadline the next call will wait for.
    pub fn current_timeout(&self) -> Duration {
        self.config.timeout_for(self.contiguous_timeouts)
    }

    pub fn close(&mut self) {
        self.socket = None;
    }

    /// Performs one request and returns the body of its response, i.e. the
    /// datagram minus the response header.
    pub fn exchange(
        &mut self,
        connection_id: u64,
        action: Action,
        body: &[u8],
        trailer: Option<&UrlData>,
    ) -> Result<Vec<u8>> {
        let header = RequestHeader {
            connection_id,
            action,
            transaction_id: rand::random(),
        };
        let datagram = encode_request(&header, body, trailer)?;
        let timeout = self.current_timeout();

        if self.socket.is_none() {
            if let Some(dial) = &self.dial {
                self.socket = Some(dial()?);
            }
        }
        let socket = self.socket.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "tracker transport was closed")
        })?;

        let sent = socket.send(&datagram)?;
        if sent != datagram.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("sent {} of {} byte datagram", sent, datagram.len()),
            )
            .into());
        }
        debug!(
            ?action,
            transaction_id = header.transaction_id,
            len = datagram.len(),
            ?timeout,
            "sent tracker request"
        );

        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; self.config.max_datagram_size];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let received = if remaining.is_zero() {
                Err(io::ErrorKind::TimedOut.into())
            } else {
                socket.recv(&mut buf, remaining)
            };

            let len = match received {
                Ok(len) => len,
                Err(err) if is_timeout(&err) => {
                    self.contiguous_timeouts = self.contiguous_timeouts.saturating_add(1);
                    warn!(
                        ?action,
                        ?timeout,
                        contiguous_timeouts = self.contiguous_timeouts,
                        "tracker request timed out"
                    );
                    return Err(TrackerError::Timeout { after: timeout });
                }
                Err(err) => return Err(err.into()),
            };

            let (response, response_body) = match decode_response(&buf[..len]) {
                Ok(decoded) => decoded,
                Err(_) => {
                    trace!(len, "dropping datagram shorter than a response header");
                    continue;
                }
            };

            if response.transaction_id != header.transaction_id {
                trace!(
                    transaction_id = response.transaction_id,
                    expected = header.transaction_id,
                    "dropping response to another transaction"
                );
                continue;
            }

            if response.is(Action::Error) {
                self.contiguous_timeouts = 0;
                let message = decode_error_message(response_body);
                debug!(?action, %message, "tracker returned error");
                return Err(TrackerError::Tracker(message));
            }

            if !response.is(action) {
                trace!(
                    action = response.action,
                    expected = ?action,
                    "dropping response with unexpected action"
                );
                continue;
            }

            self.contiguous_timeouts = 0;
            debug!(
                ?action,
                transaction_id = response.transaction_id,
                len,
                "received tracker response"
            );
            return Ok(response_body.to_vec());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::codec::PROTOCOL_MAGIC;
    use super::super::transport::scripted::{request_tid, response, Inbound, ScriptedTransport};
    use super::*;

    fn engine(transport: ScriptedTransport) -> Exchange<ScriptedTransport> {
        Exchange::with_transport(transport, UdpTrackerConfig::default())
    }

    #[test]
    fn test_skips_unrelated_transactions() {
        let transport = ScriptedTransport::new(|request| {
            let tid = request_tid(request);
            vec![
                Inbound::Datagram(response(1, tid.wrapping_add(1), b"stale")),
                Inbound::Datagram(response(1, tid.wrapping_sub(7), b"other")),
                Inbound::Datagram(response(1, tid, b"mine")),
            ]
        });
        let mut engine = engine(transport);

        let body = engine.exchange(42, Action::Announce, b"req", None).unwrap();
        assert_eq!(body, b"mine");
        assert_eq!(engine.contiguous_timeouts(), 0);
    }

    #[test]
    fn test_skips_short_datagrams() {
        let transport = ScriptedTransport::new(|request| {
            vec![
                Inbound::Datagram(vec![0, 0, 0]),
                Inbound::Datagram(Vec::new()),
                Inbound::Datagram(response(0, request_tid(request), b"ok")),
            ]
        });
        let mut engine = engine(transport);
        assert_eq!(engine.exchange(1, Action::Connect, &[], None).unwrap(), b"ok");
    }

    #[test]
    fn test_skips_matching_tid_with_other_action() {
        let transport = ScriptedTransport::new(|request| {
            vec![Inbound::Datagram(response(0, request_tid(request), b"connect?"))]
        });
        let mut engine = engine(transport);

        let err = engine.exchange(1, Action::Announce, &[], None).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(engine.contiguous_timeouts(), 1);
    }

    #[test]
    fn test_timeout_counts_once_per_call() {
        let mut engine = engine(ScriptedTransport::new(|_| vec![Inbound::Timeout]));

        for expected in 1..=3 {
            let err = engine.exchange(1, Action::Announce, &[], None).unwrap_err();
            assert!(matches!(err, TrackerError::Timeout { .. }));
            assert_eq!(engine.contiguous_timeouts(), expected);
        }
    }

    #[test]
    fn test_timeout_reports_deadline() {
        let mut engine = engine(ScriptedTransport::new(|_| Vec::new()));
        engine.contiguous_timeouts = 3;

        match engine.exchange(1, Action::Announce, &[], None) {
            Err(TrackerError::Timeout { after }) => assert_eq!(after, Duration::from_secs(120)),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_success_resets_counter() {
        let transport = ScriptedTransport::new(|request| {
            vec![Inbound::Datagram(response(1, request_tid(request), &[]))]
        });
        let mut engine = engine(transport);
        engine.contiguous_timeouts = 6;

        engine.exchange(1, Action::Announce, &[], None).unwrap();
        assert_eq!(engine.contiguous_timeouts(), 0);
        assert_eq!(engine.current_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_error_action_is_tracker_error() {
        let transport = ScriptedTransport::new(|request| {
            vec![Inbound::Datagram(response(3, request_tid(request), b"rate limited"))]
        });
        let mut engine = engine(transport);
        engine.contiguous_timeouts = 2;

        let err = engine.exchange(PROTOCOL_MAGIC, Action::Connect, &[], None).unwrap_err();
        match err {
            TrackerError::Tracker(message) => assert_eq!(message, "rate limited"),
            other => panic!("expected tracker error, got {other:?}"),
        }
        assert_eq!(engine.contiguous_timeouts(), 0);
    }

    #[test]
    fn test_error_for_other_transaction_is_ignored() {
        let transport = ScriptedTransport::new(|request| {
            let tid = request_tid(request);
            vec![
                Inbound::Datagram(response(3, tid ^ 1, b"not yours")),
                Inbound::Datagram(response(1, tid, b"fine")),
            ]
        });
        let mut engine = engine(transport);
        assert_eq!(engine.exchange(1, Action::Announce, &[], None).unwrap(), b"fine");
    }

    #[test]
    fn test_transport_error_leaves_counter() {
        let transport =
            ScriptedTransport::new(|_| vec![Inbound::Fail(io::ErrorKind::ConnectionRefused)]);
        let mut engine = engine(transport);
        engine.contiguous_timeouts = 2;

        let err = engine.exchange(1, Action::Announce, &[], None).unwrap_err();
        match err {
            TrackerError::Transport(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionRefused),
            other => panic!("expected transport error, got {other:?}"),
        }
        assert_eq!(engine.contiguous_timeouts(), 2);
    }

    #[test]
    fn test_short_write_is_transport_error() {
        let mut transport = ScriptedTransport::new(|_| Vec::new());
        transport.short_write = true;
        let mut engine = engine(transport);

        let err = engine.exchange(1, Action::Announce, b"body", None).unwrap_err();
        match err {
            TrackerError::Transport(e) => assert_eq!(e.kind(), io::ErrorKind::WriteZero),
            other => panic!("expected transport error, got {other:?}"),
        }
        assert_eq!(engine.contiguous_timeouts(), 0);
    }

    #[test]
    fn test_request_datagram_layout() {
        let transport = ScriptedTransport::new(|request| {
            vec![Inbound::Datagram(response(1, request_tid(request), &[]))]
        });
        let sent = transport.sent.clone();
        let mut engine = engine(transport);

        let trailer = UrlData::new("/a");
        engine
            .exchange(0x0102030405060708, Action::Announce, b"xyz", Some(&trailer))
            .unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let datagram = &sent[0];
        assert_eq!(&datagram[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&datagram[8..12], &[0, 0, 0, 1]);
        assert_eq!(&datagram[16..19], b"xyz");
        assert_eq!(&datagram[19..], &[2, 2, b'/', b'a']);
    }

    #[test]
    fn test_fresh_transaction_id_per_call() {
        let transport = ScriptedTransport::new(|request| {
            vec![Inbound::Datagram(response(1, request_tid(request), &[]))]
        });
        let sent = transport.sent.clone();
        let mut engine = engine(transport);

        for _ in 0..4 {
            engine.exchange(1, Action::Announce, &[], None).unwrap();
        }
        let tids: Vec<u32> = sent.lock().unwrap().iter().map(|d| request_tid(d)).collect();
        let mut unique = tids.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), tids.len());
    }

    #[test]
    fn test_deadline_not_extended_by_noise() {
        let transport = ScriptedTransport::new(|request| {
            let tid = request_tid(request);
            let mut replies: Vec<Inbound> = (0..5)
                .map(|i| Inbound::Datagram(response(1, tid.wrapping_add(i + 1), &[])))
                .collect();
            replies.push(Inbound::Datagram(response(1, tid, &[])));
            replies
        });
        let read_timeouts = transport.read_timeouts.clone();
        let mut engine = engine(transport);

        engine.exchange(1, Action::Announce, &[], None).unwrap();

        let read_timeouts = read_timeouts.lock().unwrap();
        assert_eq!(read_timeouts.len(), 6);
        assert!(read_timeouts[0] <= Duration::from_secs(15));
        assert!(read_timeouts.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_closed_transport_cannot_redial() {
        let mut engine = engine(ScriptedTransport::new(|_| Vec::new()));
        engine.close();

        let err = engine.exchange(1, Action::Announce, &[], None).unwrap_err();
        match err {
            TrackerError::Transport(e) => assert_eq!(e.kind(), io::ErrorKind::NotConnected),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[test]
    fn test_dials_lazily_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let dials = Arc::new(AtomicUsize::new(0));
        let counter = dials.clone();
        let dial: Dialer<ScriptedTransport> = Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ScriptedTransport::new(|request| {
                vec![Inbound::Datagram(response(1, request_tid(request), &[]))]
            }))
        });
        let mut engine = Exchange::new(dial, UdpTrackerConfig::default());
        assert_eq!(dials.load(Ordering::SeqCst), 0);

        engine.exchange(1, Action::Announce, &[], None).unwrap();
        engine.exchange(1, Action::Announce, &[], None).unwrap();
        assert_eq!(dials.load(Ordering::SeqCst), 1);

        engine.close();
        engine.exchange(1, Action::Announce, &[], None).unwrap();
        assert_eq!(dials.load(Ordering::SeqCst), 2);
    }
}

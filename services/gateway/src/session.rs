//! Session loop: one request, one reply, strictly in order.
//!
//! ```text
//! AwaitingRequest -> Processing -> Replied -> AwaitingRequest
//! ```
//!
//! A reply is sent only after persistence was attempted, and the next
//! request is not read until that reply has been written. Nothing in the
//! per-message path ends the session; only the peer closing, a broken
//! frame, or shutdown does.

use crate::outcome::{IngestionOutcome, compose};
use crate::persister::Persister;
use crate::store::LocationStore;
use futures_util::{SinkExt, StreamExt};
use gt_protocol::{ClassifiedMessage, classify, decode};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Framed};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingRequest,
    Processing,
    Replied,
}

pub struct Session<S> {
    persister: Arc<Persister<S>>,
    peer: SocketAddr,
    state: SessionState,
    turns: u64,
}

impl<S: LocationStore> Session<S> {
    pub fn new(persister: Arc<Persister<S>>, peer: SocketAddr) -> Self {
        Session {
            persister,
            peer,
            state: SessionState::AwaitingRequest,
            turns: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn turns(&self) -> u64 {
        self.turns
    }

    /// Process one request and return the reply line to send.
    ///
    /// Leaves the session in `Processing`; the caller marks it `Replied`
    /// once the reply is on the wire.
    pub async fn process(&mut self, raw: &[u8]) -> String {
        self.state = SessionState::Processing;
        self.turns += 1;
        let outcome = handle_request(&self.persister, raw).await;
        match &outcome {
            IngestionOutcome::DecodeError(e) => {
                warn!(peer = %self.peer, turn = self.turns, error = %e, "rejected payload");
            }
            IngestionOutcome::TransportError(reason) => {
                warn!(peer = %self.peer, turn = self.turns, error = %reason, "unreadable request");
            }
            _ => {}
        }
        compose(&outcome)
    }

    /// Drive the session over a newline-framed byte stream until the peer
    /// disconnects or `shutdown` flips to `true`.
    pub async fn run<T>(
        mut self,
        io: T,
        max_message_bytes: usize,
        mut shutdown: watch::Receiver<bool>,
    ) where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let codec = AnyDelimiterCodec::new_with_max_length(
            b"\n".to_vec(),
            b"\n".to_vec(),
            max_message_bytes,
        );
        let mut framed = Framed::new(io, codec);
        info!(peer = %self.peer, "session opened");

        loop {
            self.state = SessionState::AwaitingRequest;
            let frame = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                frame = framed.next() => frame,
            };

            let raw = match frame {
                None => break,
                Some(Ok(raw)) => raw,
                Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                    warn!(
                        peer = %self.peer,
                        limit = max_message_bytes,
                        "request too large, closing"
                    );
                    let outcome = IngestionOutcome::TransportError(format!(
                        "message exceeds {max_message_bytes} bytes"
                    ));
                    self.send_reply(&mut framed, compose(&outcome)).await;
                    break;
                }
                Some(Err(AnyDelimiterCodecError::Io(e))) => {
                    warn!(peer = %self.peer, error = %e, "read failed, closing");
                    break;
                }
            };

            let reply = self.process(strip_cr(&raw)).await;
            self.send_reply(&mut framed, reply).await;
            self.state = SessionState::Replied;
        }

        info!(peer = %self.peer, turns = self.turns, "session closed");
    }

    async fn send_reply<T>(&self, framed: &mut Framed<T, AnyDelimiterCodec>, reply: String)
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        if let Err(e) = framed.send(reply).await {
            error!(peer = %self.peer, turn = self.turns, error = %e, "failed to send reply");
        }
    }
}

/// Classify, decode and persist one request.
pub async fn handle_request<S: LocationStore>(
    persister: &Persister<S>,
    raw: &[u8],
) -> IngestionOutcome {
    let message = match classify(raw) {
        Ok(message) => message,
        Err(e) => return IngestionOutcome::TransportError(e.to_string()),
    };
    debug!(?message, "classified request");

    match message {
        ClassifiedMessage::Handshake => IngestionOutcome::Handshake,
        ClassifiedMessage::Opaque(text) => IngestionOutcome::EchoAck(text),
        ClassifiedMessage::LocationPayload(payload) => match decode(&payload) {
            Ok(decoded) => {
                IngestionOutcome::from_report(persister.persist(decoded.into_records()).await)
            }
            Err(e) => IngestionOutcome::DecodeError(e),
        },
    }
}

fn strip_cr(raw: &[u8]) -> &[u8] {
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

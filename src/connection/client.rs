//! Client-side connection handler.
//!
//! ```text
//! OPEN ──read gives 0 bytes OR everything received──> CLOSING ──> CLOSED
//! ```
//!
//! A connection sends its queued messages front to back, one message in the
//! outbound buffer at a time, and counts what comes back. How it decides that
//! "everything" has arrived depends on [`Accounting`].

use super::{recv_chunk, send_pending, CloseReason, ConnectionError, ConnectionStats};
use super::{EchoTracker, EventHandler, Flow, RECV_CHUNK_SIZE};
use crate::ECHO_SUFFIX;
use bytes::{Bytes, BytesMut};
use mio::Interest;
use std::collections::VecDeque;
use std::io::{Read, Write};
use tracing::{info, trace};

/// How a client connection decides it has received the full reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Accounting {
    /// Match the reply against the echo contract: every chunk the server
    /// received, followed by the suffix. Completes when all sent bytes have
    /// come back and the reply ends on a suffix.
    #[default]
    Echo,

    /// Compare raw received bytes with the total length of the sent
    /// messages. The echo is always longer than what was sent, so against a
    /// real server this ends in [`ConnectionError::Overrun`] instead of
    /// completing.
    Raw,
}

/// State of one outbound connection.
#[derive(Debug)]
pub struct ClientConnection {
    /// Connection id, starting at 1
    id: usize,

    /// Total payload bytes of all messages
    expected: usize,

    /// Raw bytes received so far
    received: usize,

    /// Messages not yet moved to the outbound buffer
    messages: VecDeque<Bytes>,

    /// Bytes of the current message not yet accepted by the socket
    outbound: BytesMut,

    /// Bytes of the chunk currently being received
    inbound: BytesMut,

    /// Messages fully handed to the socket
    messages_sent: usize,

    accounting: Accounting,
    tracker: EchoTracker,
}

impl ClientConnection {
    pub fn new(id: usize, messages: &[Bytes], accounting: Accounting) -> Self {
        let expected = messages.iter().map(Bytes::len).sum();
        let mut sent = BytesMut::with_capacity(expected);
        for message in messages {
            sent.extend_from_slice(message);
        }

        Self {
            id,
            expected,
            received: 0,
            messages: messages.iter().cloned().collect(),
            outbound: BytesMut::new(),
            inbound: BytesMut::with_capacity(RECV_CHUNK_SIZE),
            messages_sent: 0,
            accounting,
            tracker: EchoTracker::new(sent.freeze(), ECHO_SUFFIX),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Total payload bytes of all messages
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Raw bytes received so far
    pub fn received(&self) -> usize {
        self.received
    }

    /// Messages fully handed to the socket
    pub fn messages_sent(&self) -> usize {
        self.messages_sent
    }

    pub fn accounting(&self) -> Accounting {
        self.accounting
    }

    /// True once the connection has everything it waits for.
    pub fn is_complete(&self) -> bool {
        match self.accounting {
            Accounting::Raw => self.received == self.expected,
            Accounting::Echo => self.tracker.is_complete(),
        }
    }

    fn account_chunk(&mut self) -> Result<(), ConnectionError> {
        match self.accounting {
            Accounting::Raw if self.received > self.expected => Err(ConnectionError::Overrun {
                expected: self.expected,
                received: self.received,
            }),
            Accounting::Raw => Ok(()),
            Accounting::Echo => self.tracker.feed(&self.inbound),
        }
    }
}

impl EventHandler for ClientConnection {
    fn on_readable<S: Read>(
        &mut self,
        socket: &mut S,
        stats: &ConnectionStats,
    ) -> Result<Flow, ConnectionError> {
        match recv_chunk(socket, &mut self.inbound)? {
            Some(0) => return Ok(Flow::Close(CloseReason::PeerClosed)),
            Some(n) => {
                stats.bytes_read(n);
                info!(id = self.id, payload = ?self.inbound, "Received");

                self.received += n;
                let accounted = self.account_chunk();
                self.inbound.clear();
                accounted?;
            }
            None => trace!(id = self.id, "Spurious read readiness"),
        }

        // Runs on every read event: completion depends on the running total,
        // not on this read.
        if self.is_complete() {
            Ok(Flow::Close(CloseReason::Completed))
        } else {
            Ok(Flow::Continue)
        }
    }

    fn on_writable<S: Write>(
        &mut self,
        socket: &mut S,
        stats: &ConnectionStats,
    ) -> Result<Flow, ConnectionError> {
        if self.outbound.is_empty() {
            if let Some(next) = self.messages.pop_front() {
                self.outbound.extend_from_slice(&next);
            }
        }

        if self.outbound.is_empty() {
            return Ok(Flow::Continue);
        }

        info!(id = self.id, payload = ?self.outbound, "Sending");
        let sent = send_pending(socket, &mut self.outbound)?;
        if sent > 0 {
            stats.bytes_written(sent);
            if self.outbound.is_empty() {
                self.messages_sent += 1;
            }
        }

        Ok(Flow::Continue)
    }

    fn interest(&self) -> Interest {
        if self.outbound.is_empty() && self.messages.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        }
    }
}

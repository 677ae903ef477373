//! Echo stream matcher.
//!
//! The server answers each chunk it happens to receive with the chunk
//! followed by the suffix, so for a sent stream `S` the reply has the shape
//!
//! ```text
//! c1 SUFFIX c2 SUFFIX ... ck SUFFIX      where c1 c2 ... ck == S, every ci non-empty
//! ```
//!
//! The chunk boundaries are chosen by the server's reads and are not visible
//! to the client. Payload bytes may also look like the start of the suffix
//! (`"Message 1"` contains a space), so a greedy match can take a wrong turn.
//! [`EchoTracker`] follows every parse that is still possible, one byte at a
//! time, and fails as soon as none is left.
//!
//! The reply is complete once some parse has echoed all of `S` and ends on a
//! suffix. That point is unambiguous unless `S` itself contains the suffix.

use super::ConnectionError;
use bytes::Bytes;

/// One possible position in the echo grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Cursor {
    /// Bytes of the sent stream matched so far
    echoed: usize,
    /// Bytes of the suffix matched so far, when inside a suffix
    suffix: Option<usize>,
    /// At the start of the stream or right after a suffix
    boundary: bool,
}

impl Cursor {
    const START: Cursor = Cursor {
        echoed: 0,
        suffix: None,
        boundary: true,
    };

    fn advance(self, byte: u8, sent: &[u8], suffix: &[u8], out: &mut Vec<Cursor>) {
        match self.suffix {
            Some(matched) => {
                if suffix[matched] == byte {
                    out.push(Self::after_suffix_byte(self.echoed, matched + 1, suffix));
                }
            }
            None => {
                if sent.get(self.echoed) == Some(&byte) {
                    out.push(Cursor {
                        echoed: self.echoed + 1,
                        suffix: None,
                        boundary: false,
                    });
                }
                // A suffix can only follow a non-empty chunk.
                if !self.boundary && suffix.first() == Some(&byte) {
                    out.push(Self::after_suffix_byte(self.echoed, 1, suffix));
                }
            }
        }
    }

    fn after_suffix_byte(echoed: usize, matched: usize, suffix: &[u8]) -> Cursor {
        if matched == suffix.len() {
            Cursor {
                echoed,
                suffix: None,
                boundary: true,
            }
        } else {
            Cursor {
                echoed,
                suffix: Some(matched),
                boundary: false,
            }
        }
    }
}

/// Incrementally checks a received byte stream against the echo of `sent`.
#[derive(Debug, Clone)]
pub struct EchoTracker {
    sent: Bytes,
    suffix: &'static [u8],
    cursors: Vec<Cursor>,
    scratch: Vec<Cursor>,
    offset: usize,
}

impl EchoTracker {
    /// Creates a tracker for the reply to `sent`.
    ///
    /// `suffix` must not be empty.
    pub fn new(sent: Bytes, suffix: &'static [u8]) -> Self {
        debug_assert!(!suffix.is_empty(), "echo suffix must not be empty");

        Self {
            sent,
            suffix,
            cursors: vec![Cursor::START],
            scratch: Vec::new(),
            offset: 0,
        }
    }

    /// Feeds received bytes.
    ///
    /// Fails on the first byte that no parse of the echo grammar accepts.
    /// After an error the tracker must not be used again.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
        for &byte in data {
            self.scratch.clear();
            for cursor in &self.cursors {
                cursor.advance(byte, &self.sent, self.suffix, &mut self.scratch);
            }
            self.scratch.sort_unstable();
            self.scratch.dedup();

            if self.scratch.is_empty() {
                return Err(ConnectionError::UnexpectedEcho {
                    offset: self.offset,
                    byte,
                });
            }

            std::mem::swap(&mut self.cursors, &mut self.scratch);
            self.offset += 1;
        }

        Ok(())
    }

    /// True once the whole sent stream has been echoed and the reply ends on
    /// a suffix.
    pub fn is_complete(&self) -> bool {
        self.cursors
            .iter()
            .any(|c| c.boundary && c.suffix.is_none() && c.echoed == self.sent.len())
    }

    /// Number of bytes fed so far
    pub fn received(&self) -> usize {
        self.offset
    }

    /// Largest number of sent bytes any live parse has seen echoed
    pub fn echoed(&self) -> usize {
        self.cursors.iter().map(|c| c.echoed).max().unwrap_or(0)
    }
}

//! Joins handshake fragments into complete messages.

use std::ops::Range;

use crate::message::{Header, MessageType};
use crate::Error;

/// Largest handshake message we assemble, enough for a long certificate chain.
pub(crate) const MAX_MESSAGE_LEN: u32 = 64 * 1024;

/// Rejects a claimed message length before anything is allocated for it.
pub(crate) fn check_message_len(header: &Header) -> Result<(), Error> {
    if header.length > MAX_MESSAGE_LEN {
        return Err(Error::Decode(format!(
            "handshake {:?} of {} bytes exceeds {}",
            header.msg_type, header.length, MAX_MESSAGE_LEN
        )));
    }
    Ok(())
}

/// A complete handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Message {
    pub header: Header,
    pub body: Vec<u8>,
}

impl Message {
    pub fn msg_type(&self) -> MessageType {
        self.header.msg_type
    }

    /// Unfragmented encoding: header with `offset = 0, fragment_length = length`, then body.
    pub fn canonical(&self) -> Vec<u8> {
        let header = Header::whole(self.header.msg_type, self.header.length, self.header.message_seq);
        let mut out = Vec::with_capacity(Header::LEN + self.body.len());
        header.serialize(&mut out);
        out.extend_from_slice(&self.body);
        out
    }
}

/// The message being assembled.
#[derive(Debug)]
struct Partial {
    msg_type: MessageType,
    message_seq: u16,
    body: Vec<u8>,
    /// Received byte ranges, sorted and merged.
    covered: Vec<Range<u32>>,
}

impl Partial {
    fn new(header: &Header) -> Self {
        Partial {
            msg_type: header.msg_type,
            message_seq: header.message_seq,
            body: vec![0; header.length as usize],
            covered: Vec::new(),
        }
    }

    fn insert(&mut self, range: Range<u32>) {
        if range.is_empty() {
            return;
        }

        let mut merged = range;
        let mut out = Vec::with_capacity(self.covered.len() + 1);

        for r in self.covered.drain(..) {
            if r.end < merged.start || r.start > merged.end {
                out.push(r);
            } else {
                merged = merged.start.min(r.start)..merged.end.max(r.end);
            }
        }

        out.push(merged);
        out.sort_by_key(|r| r.start);
        self.covered = out;
    }

    fn is_complete(&self) -> bool {
        let len = self.body.len() as u32;
        len == 0 || self.covered.first() == Some(&(0..len))
    }
}

/// Reassembles one handshake message at a time, by fragment offset.
///
/// Fragments may arrive in any order and may overlap (a peer can
/// re-fragment a resent flight differently).
#[derive(Debug, Default)]
pub(crate) struct Reassembler {
    current: Option<Partial>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fragment. Returns the message once every byte is covered.
    pub fn push(&mut self, header: &Header, fragment: &[u8]) -> Result<Option<Message>, Error> {
        if !header.is_in_range() {
            return Err(Error::FragmentRange {
                offset: header.fragment_offset,
                length: header.fragment_length,
                total: header.length,
            });
        }
        check_message_len(header)?;

        if fragment.len() != header.fragment_length as usize {
            return Err(Error::Decode(format!(
                "fragment length {} does not match header {}",
                fragment.len(),
                header.fragment_length
            )));
        }

        let partial = match &mut self.current {
            Some(p) if p.message_seq == header.message_seq => {
                if p.msg_type != header.msg_type || p.body.len() != header.length as usize {
                    return Err(Error::Decode(format!(
                        "fragment of message_seq {} disagrees on type or length",
                        header.message_seq
                    )));
                }
                p
            }
            current => current.insert(Partial::new(header)),
        };

        let start = header.fragment_offset as usize;
        partial.body[start..start + fragment.len()].copy_from_slice(fragment);
        partial.insert(header.fragment_offset..header.fragment_offset + header.fragment_length);

        if !partial.is_complete() {
            trace!(
                "Handshake {:?} seq {} incomplete: {:?}",
                partial.msg_type,
                partial.message_seq,
                partial.covered
            );
            return Ok(None);
        }

        let Some(done) = self.current.take() else {
            return Ok(None);
        };

        Ok(Some(Message {
            header: Header::whole(done.msg_type, done.body.len() as u32, done.message_seq),
            body: done.body,
        }))
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

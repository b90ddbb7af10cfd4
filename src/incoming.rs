//! Records that made it through the epoch, replay and authentication checks.

use std::fmt;

use tinyvec::ArrayVec;

use crate::message::{ContentType, Header};
use crate::Error;

/// Max handshake fragments in one record.
const MAX_FRAGMENTS: usize = 32;

/// One accepted record with its plaintext.
pub(crate) struct Record {
    pub content_type: ContentType,
    pub epoch: u16,
    pub sequence_number: u64,
    pub plaintext: Vec<u8>,
}

impl Record {
    /// Split a handshake record into its fragments.
    ///
    /// A record can carry several handshake messages back to back.
    pub fn fragments(&self) -> Result<ArrayVec<[(Header, &[u8]); MAX_FRAGMENTS]>, Error> {
        let mut out = ArrayVec::new();
        let mut rest = self.plaintext.as_slice();

        while !rest.is_empty() {
            let (r, fragment) = Header::parse_fragment(rest)?;
            if out.try_push(fragment).is_some() {
                return Err(Error::Decode(format!(
                    "more than {} handshake fragments in one record",
                    MAX_FRAGMENTS
                )));
            }
            rest = r;
        }

        Ok(out)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("content_type", &self.content_type)
            .field("epoch", &self.epoch)
            .field("sequence_number", &self.sequence_number)
            .field("len", &self.plaintext.len())
            .finish()
    }
}

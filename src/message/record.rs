//! DTLS 1.2 record layer.

use std::fmt;

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use super::ProtocolVersion;
use crate::util::{be_u48, put_u48};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    #[default]
    Handshake,
    ApplicationData,
    Unknown(u8),
}

impl ContentType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            _ => ContentType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
            ContentType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ContentType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, ContentType::from_u8(byte)))
    }
}

/// A single DTLS record.
///
/// The fragment is opaque here; it is plaintext in epoch 0 and
/// `explicit_nonce || ciphertext || tag` in later epochs.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct DTLSRecord<'a> {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub epoch: u16,
    /// 48 bit record sequence number.
    pub sequence_number: u64,
    pub fragment: &'a [u8],
}

impl<'a> DTLSRecord<'a> {
    /// content_type(1) + version(2) + epoch(2) + sequence_number(6) + length(2)
    pub const HEADER_LEN: usize = 13;

    pub fn new(
        content_type: ContentType,
        epoch: u16,
        sequence_number: u64,
        fragment: &'a [u8],
    ) -> Self {
        DTLSRecord {
            content_type,
            version: ProtocolVersion::DTLS1_2,
            epoch,
            sequence_number,
            fragment,
        }
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], DTLSRecord<'a>> {
        let (input, content_type) = ContentType::parse(input)?;
        let (input, version) = ProtocolVersion::parse(input)?;
        let (input, epoch) = be_u16(input)?;
        let (input, sequence_number) = be_u48(input)?;
        let (input, length) = be_u16(input)?;
        let (rest, fragment) = take(length as usize)(input)?;

        Ok((
            rest,
            DTLSRecord {
                content_type,
                version,
                epoch,
                sequence_number,
                fragment,
            },
        ))
    }

    /// Decode exactly one record from the front of `input`.
    ///
    /// Returns the record and the unconsumed remainder, so a caller can call
    /// this repeatedly on the same buffer.
    pub fn decode(input: &'a [u8]) -> Result<(DTLSRecord<'a>, &'a [u8]), Error> {
        if input.len() < Self::HEADER_LEN {
            return Err(Error::Decode(format!(
                "record header needs {} bytes, got {}",
                Self::HEADER_LEN,
                input.len()
            )));
        }

        let declared = u16::from_be_bytes([input[11], input[12]]) as usize;
        let available = input.len() - Self::HEADER_LEN;
        if declared > available {
            return Err(Error::Decode(format!(
                "record length {} exceeds available {}",
                declared, available
            )));
        }

        let (rest, record) = Self::parse(input)?;
        Ok((record, rest))
    }

    /// Length of the record on the wire.
    pub fn wire_len(&self) -> usize {
        Self::HEADER_LEN + self.fragment.len()
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        Self::serialize_header(
            self.content_type,
            self.version,
            self.epoch,
            self.sequence_number,
            self.fragment.len(),
            output,
        );
        output.extend_from_slice(self.fragment);
    }

    pub(crate) fn serialize_header(
        content_type: ContentType,
        version: ProtocolVersion,
        epoch: u16,
        sequence_number: u64,
        length: usize,
        output: &mut Vec<u8>,
    ) {
        output.push(content_type.as_u8());
        version.serialize(output);
        output.extend_from_slice(&epoch.to_be_bytes());
        put_u48(output, sequence_number);
        output.extend_from_slice(&(length as u16).to_be_bytes());
    }
}

impl fmt::Debug for DTLSRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DTLSRecord")
            .field("content_type", &self.content_type)
            .field("version", &self.version)
            .field("epoch", &self.epoch)
            .field("sequence_number", &self.sequence_number)
            .field("length", &self.fragment.len())
            .finish()
    }
}

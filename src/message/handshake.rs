use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u16, be_u24, be_u8};
use nom::{Err, IResult};

use super::{
    put_u24, Certificate, CipherSuite, ClientHello, ClientKeyExchange, Finished,
    HelloVerifyRequest, ServerHello, ServerKeyExchange,
};

/// The 12 byte DTLS handshake header.
#[derive(Debug, PartialEq, Eq, Default, Clone, Copy)]
pub struct Header {
    pub msg_type: MessageType,
    /// Length of the complete body.
    pub length: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

impl Header {
    pub const LEN: usize = 12;

    /// Header of an unfragmented message.
    pub fn whole(msg_type: MessageType, length: u32, message_seq: u16) -> Self {
        Header {
            msg_type,
            length,
            message_seq,
            fragment_offset: 0,
            fragment_length: length,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Header> {
        let (input, msg_type) = MessageType::parse(input)?;
        let (input, length) = be_u24(input)?;
        let (input, message_seq) = be_u16(input)?;
        let (input, fragment_offset) = be_u24(input)?;
        let (input, fragment_length) = be_u24(input)?;

        Ok((
            input,
            Header {
                msg_type,
                length,
                message_seq,
                fragment_offset,
                fragment_length,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(self.msg_type.as_u8());
        put_u24(output, self.length);
        output.extend_from_slice(&self.message_seq.to_be_bytes());
        put_u24(output, self.fragment_offset);
        put_u24(output, self.fragment_length);
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment_offset > 0 || self.fragment_length < self.length
    }

    /// Whether `offset + length` stays within the total length.
    pub fn is_in_range(&self) -> bool {
        self.fragment_offset as u64 + self.fragment_length as u64 <= self.length as u64
    }

    /// Parse one header plus its fragment bytes.
    pub fn parse_fragment(input: &[u8]) -> IResult<&[u8], (Header, &[u8])> {
        let (input, header) = Header::parse(input)?;
        let (input, fragment) = take(header.fragment_length as usize)(input)?;
        Ok((input, (header, fragment)))
    }
}

/// A complete (reassembled) handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake<'a> {
    pub header: Header,
    pub body: Body<'a>,
}

impl<'a> Handshake<'a> {
    pub fn new(message_seq: u16, body: Body<'a>) -> Self {
        Handshake {
            header: Header::whole(body.msg_type(), 0, message_seq),
            body,
        }
    }

    /// Serialize header and body in canonical unfragmented form.
    ///
    /// The header length is taken from the serialized body.
    pub fn serialize(&self, output: &mut Vec<u8>) {
        let mut body = Vec::new();
        self.body.serialize(&mut body);
        let header = Header::whole(self.body.msg_type(), body.len() as u32, self.header.message_seq);
        header.serialize(output);
        output.extend_from_slice(&body);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body<'a> {
    HelloRequest,
    ClientHello(ClientHello<'a>),
    ServerHello(ServerHello<'a>),
    HelloVerifyRequest(HelloVerifyRequest),
    Certificate(Certificate<'a>),
    ServerKeyExchange(ServerKeyExchange<'a>),
    ServerHelloDone,
    ClientKeyExchange(ClientKeyExchange<'a>),
    Finished(Finished<'a>),
    Unknown(u8),
}

impl<'a> Body<'a> {
    pub fn msg_type(&self) -> MessageType {
        match self {
            Body::HelloRequest => MessageType::HelloRequest,
            Body::ClientHello(_) => MessageType::ClientHello,
            Body::ServerHello(_) => MessageType::ServerHello,
            Body::HelloVerifyRequest(_) => MessageType::HelloVerifyRequest,
            Body::Certificate(_) => MessageType::Certificate,
            Body::ServerKeyExchange(_) => MessageType::ServerKeyExchange,
            Body::ServerHelloDone => MessageType::ServerHelloDone,
            Body::ClientKeyExchange(_) => MessageType::ClientKeyExchange,
            Body::Finished(_) => MessageType::Finished,
            Body::Unknown(v) => MessageType::Unknown(*v),
        }
    }

    /// Parse a complete message body.
    ///
    /// Key exchange and Finished bodies need the negotiated suite.
    pub fn parse(
        input: &'a [u8],
        msg_type: MessageType,
        cipher_suite: Option<CipherSuite>,
    ) -> IResult<&'a [u8], Body<'a>> {
        match msg_type {
            MessageType::HelloRequest => Ok((input, Body::HelloRequest)),
            MessageType::ClientHello => {
                let (input, m) = ClientHello::parse(input)?;
                Ok((input, Body::ClientHello(m)))
            }
            MessageType::ServerHello => {
                let (input, m) = ServerHello::parse(input)?;
                Ok((input, Body::ServerHello(m)))
            }
            MessageType::HelloVerifyRequest => {
                let (input, m) = HelloVerifyRequest::parse(input)?;
                Ok((input, Body::HelloVerifyRequest(m)))
            }
            MessageType::Certificate => {
                let (input, m) = Certificate::parse(input)?;
                Ok((input, Body::Certificate(m)))
            }
            MessageType::ServerKeyExchange => {
                let suite = need_suite(input, cipher_suite)?;
                let (input, m) = ServerKeyExchange::parse(input, suite.key_exchange_algorithm())?;
                Ok((input, Body::ServerKeyExchange(m)))
            }
            MessageType::ServerHelloDone => Ok((input, Body::ServerHelloDone)),
            MessageType::ClientKeyExchange => {
                let suite = need_suite(input, cipher_suite)?;
                let (input, m) = ClientKeyExchange::parse(input, suite.key_exchange_algorithm())?;
                Ok((input, Body::ClientKeyExchange(m)))
            }
            MessageType::Finished => {
                let suite = need_suite(input, cipher_suite)?;
                let (input, m) = Finished::parse(input, suite)?;
                Ok((input, Body::Finished(m)))
            }
            MessageType::CertificateRequest
            | MessageType::CertificateVerify
            | MessageType::Unknown(_) => Ok((&input[input.len()..], Body::Unknown(msg_type.as_u8()))),
        }
    }

    /// Like [`Body::parse`] but trailing bytes are an error.
    pub fn parse_complete(
        input: &'a [u8],
        msg_type: MessageType,
        cipher_suite: Option<CipherSuite>,
    ) -> Result<Body<'a>, crate::Error> {
        let (rest, body) = Body::parse(input, msg_type, cipher_suite)?;
        if !rest.is_empty() {
            return Err(crate::Error::Decode(format!(
                "{} trailing bytes after {:?}",
                rest.len(),
                msg_type
            )));
        }
        Ok(body)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        match self {
            Body::HelloRequest | Body::ServerHelloDone | Body::Unknown(_) => {}
            Body::ClientHello(m) => m.serialize(output),
            Body::ServerHello(m) => m.serialize(output),
            Body::HelloVerifyRequest(m) => m.serialize(output),
            Body::Certificate(m) => m.serialize(output),
            Body::ServerKeyExchange(m) => m.serialize(output),
            Body::ClientKeyExchange(m) => m.serialize(output),
            Body::Finished(m) => m.serialize(output),
        }
    }
}

fn need_suite(
    input: &[u8],
    cipher_suite: Option<CipherSuite>,
) -> Result<CipherSuite, Err<Error<&[u8]>>> {
    cipher_suite.ok_or_else(|| Err::Failure(Error::new(input, ErrorKind::Verify)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageType {
    HelloRequest,
    #[default]
    ClientHello,
    ServerHello,
    HelloVerifyRequest,
    Certificate,
    ServerKeyExchange,
    CertificateRequest,
    ServerHelloDone,
    CertificateVerify,
    ClientKeyExchange,
    Finished,
    Unknown(u8),
}

impl MessageType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => MessageType::HelloRequest,
            1 => MessageType::ClientHello,
            2 => MessageType::ServerHello,
            3 => MessageType::HelloVerifyRequest,
            11 => MessageType::Certificate,
            12 => MessageType::ServerKeyExchange,
            13 => MessageType::CertificateRequest,
            14 => MessageType::ServerHelloDone,
            15 => MessageType::CertificateVerify,
            16 => MessageType::ClientKeyExchange,
            20 => MessageType::Finished,
            _ => MessageType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            MessageType::HelloRequest => 0,
            MessageType::ClientHello => 1,
            MessageType::ServerHello => 2,
            MessageType::HelloVerifyRequest => 3,
            MessageType::Certificate => 11,
            MessageType::ServerKeyExchange => 12,
            MessageType::CertificateRequest => 13,
            MessageType::ServerHelloDone => 14,
            MessageType::CertificateVerify => 15,
            MessageType::ClientKeyExchange => 16,
            MessageType::Finished => 20,
            MessageType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], MessageType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_u8(byte)))
    }
}

use nom::error::{Error, ErrorKind};
use nom::Err;
use nom::{
    bytes::complete::take,
    number::complete::{be_u16, be_u8},
    IResult,
};
use tinyvec::ArrayVec;

use super::{CipherSuite, CompressionMethod, ProtocolVersion};
use super::{Cookie, Extension, Random, SessionId};
use crate::util::many1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello<'a> {
    pub client_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cookie: Cookie,
    pub cipher_suites: ArrayVec<[CipherSuite; 128]>,
    pub compression_methods: ArrayVec<[CompressionMethod; 32]>,
    pub extensions: ArrayVec<[Extension<'a>; 32]>,
}

impl<'a> ClientHello<'a> {
    pub fn new(
        random: Random,
        session_id: SessionId,
        cookie: Cookie,
        suites: &[CipherSuite],
    ) -> Self {
        let mut cipher_suites = ArrayVec::new();
        cipher_suites.extend(suites.iter().copied());
        let mut compression_methods = ArrayVec::new();
        compression_methods.push(CompressionMethod::Null);

        ClientHello {
            client_version: ProtocolVersion::DTLS1_2,
            random,
            session_id,
            cookie,
            cipher_suites,
            compression_methods,
            extensions: ArrayVec::new(),
        }
    }

    pub fn with_extension(mut self, extension: Extension<'a>) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], ClientHello<'a>> {
        let (input, client_version) = ProtocolVersion::parse(input)?;
        let (input, random) = Random::parse(input)?;
        let (input, session_id) = SessionId::parse(input)?;
        let (input, cookie) = Cookie::parse(input)?;
        let (input, cipher_suites_len) = be_u16(input)?;
        let (input, input_cipher) = take(cipher_suites_len)(input)?;
        let (rest, cipher_suites) = many1(CipherSuite::parse)(input_cipher)?;
        if !rest.is_empty() {
            return Err(Err::Failure(Error::new(rest, ErrorKind::LengthValue)));
        }
        let (input, compression_methods_len) = be_u8(input)?;
        let (input, input_compression) = take(compression_methods_len)(input)?;
        let (rest, compression_methods) = many1(CompressionMethod::parse)(input_compression)?;
        if !rest.is_empty() {
            return Err(Err::Failure(Error::new(rest, ErrorKind::LengthValue)));
        }

        let (input, extensions) = Extension::parse_list(input)?;

        Ok((
            input,
            ClientHello {
                client_version,
                random,
                session_id,
                cookie,
                cipher_suites,
                compression_methods,
                extensions,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.client_version.serialize(output);
        self.random.serialize(output);
        self.session_id.serialize(output);
        self.cookie.serialize(output);
        output.extend_from_slice(&(self.cipher_suites.len() as u16 * 2).to_be_bytes());
        for suite in &self.cipher_suites {
            output.extend_from_slice(&suite.as_u16().to_be_bytes());
        }
        output.push(self.compression_methods.len() as u8);
        for method in &self.compression_methods {
            output.push(method.as_u8());
        }
        Extension::serialize_list(&self.extensions, output);
    }
}

use nom::error::{Error, ErrorKind};
use nom::number::complete::be_u16;
use nom::Err;
use nom::{bytes::complete::take, IResult};

use super::{DigitallySigned, KeyExchangeAlgorithm};

/// ServerKeyExchange for DHE_RSA: the ephemeral DH parameters and a
/// signature over `client_random || server_random || params`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerKeyExchange<'a> {
    pub params: DhParams<'a>,
    pub signature: DigitallySigned<'a>,
}

impl<'a> ServerKeyExchange<'a> {
    pub fn new(params: DhParams<'a>, signature: DigitallySigned<'a>) -> Self {
        ServerKeyExchange { params, signature }
    }

    pub fn parse(
        input: &'a [u8],
        key_exchange_algorithm: KeyExchangeAlgorithm,
    ) -> IResult<&'a [u8], ServerKeyExchange<'a>> {
        if key_exchange_algorithm != KeyExchangeAlgorithm::DheRsa {
            return Err(Err::Failure(Error::new(input, ErrorKind::Tag)));
        }
        let (input, params) = DhParams::parse(input)?;
        let (input, signature) = DigitallySigned::parse(input)?;
        Ok((input, ServerKeyExchange { params, signature }))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.params.serialize(output);
        self.signature.serialize(output);
    }
}

/// ServerDHParams (RFC 5246 §7.4.3). All three are big endian integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DhParams<'a> {
    pub p: &'a [u8],
    pub g: &'a [u8],
    pub ys: &'a [u8],
}

impl<'a> DhParams<'a> {
    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], DhParams<'a>> {
        let (input, p) = opaque16(input)?;
        let (input, g) = opaque16(input)?;
        let (input, ys) = opaque16(input)?;
        Ok((input, DhParams { p, g, ys }))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        for v in [self.p, self.g, self.ys] {
            output.extend_from_slice(&(v.len() as u16).to_be_bytes());
            output.extend_from_slice(v);
        }
    }
}

fn opaque16(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = be_u16(input)?;
    if len == 0 {
        return Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)));
    }
    take(len)(input)
}

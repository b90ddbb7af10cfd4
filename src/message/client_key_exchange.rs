use nom::error::{Error, ErrorKind};
use nom::number::complete::be_u16;
use nom::Err;
use nom::{bytes::complete::take, IResult};

use super::KeyExchangeAlgorithm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKeyExchange<'a> {
    /// RSA encrypted pre-master secret.
    Rsa(&'a [u8]),
    /// Client DH public value `Yc`.
    Dh(&'a [u8]),
}

impl<'a> ClientKeyExchange<'a> {
    pub fn parse(
        input: &'a [u8],
        key_exchange_algorithm: KeyExchangeAlgorithm,
    ) -> IResult<&'a [u8], ClientKeyExchange<'a>> {
        let (input, len) = be_u16(input)?;
        if len == 0 {
            return Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)));
        }
        let (input, data) = take(len)(input)?;

        let exchange = match key_exchange_algorithm {
            KeyExchangeAlgorithm::Rsa => ClientKeyExchange::Rsa(data),
            KeyExchangeAlgorithm::DheRsa => ClientKeyExchange::Dh(data),
            KeyExchangeAlgorithm::Unknown => {
                return Err(Err::Failure(Error::new(input, ErrorKind::Tag)))
            }
        };

        Ok((input, exchange))
    }

    pub fn data(&self) -> &'a [u8] {
        match self {
            ClientKeyExchange::Rsa(data) | ClientKeyExchange::Dh(data) => data,
        }
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        let data = self.data();
        output.extend_from_slice(&(data.len() as u16).to_be_bytes());
        output.extend_from_slice(data);
    }
}

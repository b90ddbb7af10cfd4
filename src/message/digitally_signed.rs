use nom::number::complete::be_u16;
use nom::{bytes::complete::take, IResult};

use super::SignatureAndHashAlgorithm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitallySigned<'a> {
    pub algorithm: SignatureAndHashAlgorithm,
    pub signature: &'a [u8],
}

impl<'a> DigitallySigned<'a> {
    pub fn new(algorithm: SignatureAndHashAlgorithm, signature: &'a [u8]) -> Self {
        DigitallySigned {
            algorithm,
            signature,
        }
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], DigitallySigned<'a>> {
        let (input, algorithm) = SignatureAndHashAlgorithm::parse(input)?;
        let (input, signature_len) = be_u16(input)?;
        let (input, signature) = take(signature_len)(input)?;
        Ok((
            input,
            DigitallySigned {
                algorithm,
                signature,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.algorithm.as_u16().to_be_bytes());
        output.extend_from_slice(&(self.signature.len() as u16).to_be_bytes());
        output.extend_from_slice(self.signature);
    }
}

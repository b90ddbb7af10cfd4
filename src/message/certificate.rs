use std::ops::Deref;

use nom::error::{Error, ErrorKind};
use nom::number::complete::be_u24;
use nom::{bytes::complete::take, Err, IResult};
use tinyvec::ArrayVec;

use super::put_u24;
use crate::util::many0;

/// One DER encoded X.509 certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Asn1Cert<'a>(pub &'a [u8]);

impl<'a> Asn1Cert<'a> {
    fn parse(input: &'a [u8]) -> IResult<&'a [u8], Asn1Cert<'a>> {
        let (input, len) = be_u24(input)?;
        let (input, data) = take(len as usize)(input)?;
        Ok((input, Asn1Cert(data)))
    }
}

impl Deref for Asn1Cert<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate<'a> {
    pub certificate_list: ArrayVec<[Asn1Cert<'a>; 32]>,
}

impl<'a> Certificate<'a> {
    pub fn new(certificate_list: ArrayVec<[Asn1Cert<'a>; 32]>) -> Self {
        Certificate { certificate_list }
    }

    pub fn single(der: &'a [u8]) -> Self {
        let mut certificate_list = ArrayVec::new();
        certificate_list.push(Asn1Cert(der));
        Certificate { certificate_list }
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], Certificate<'a>> {
        let (input, total_len) = be_u24(input)?;
        let (input, list) = take(total_len as usize)(input)?;
        let (rest, certificate_list) = many0(Asn1Cert::parse)(list)?;
        if !rest.is_empty() {
            return Err(Err::Failure(Error::new(rest, ErrorKind::LengthValue)));
        }

        Ok((input, Certificate { certificate_list }))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        let total_len: usize = self
            .certificate_list
            .iter()
            .map(|cert| 3 + cert.len())
            .sum();
        put_u24(output, total_len as u32);

        for cert in &self.certificate_list {
            put_u24(output, cert.len() as u32);
            output.extend_from_slice(cert);
        }
    }
}

use nom::bytes::complete::take;
use nom::IResult;

use super::CipherSuite;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finished<'a> {
    pub verify_data: &'a [u8],
}

impl<'a> Finished<'a> {
    pub fn new(verify_data: &'a [u8]) -> Self {
        Finished { verify_data }
    }

    pub fn parse(input: &'a [u8], cipher_suite: CipherSuite) -> IResult<&'a [u8], Finished<'a>> {
        let (input, verify_data) = take(cipher_suite.verify_data_length())(input)?;
        Ok((input, Finished { verify_data }))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(self.verify_data);
    }
}

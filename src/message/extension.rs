use nom::number::complete::be_u16;
use nom::{bytes::complete::take, IResult};
use tinyvec::ArrayVec;

use super::{HashAlgorithm, SignatureAlgorithm, SignatureAndHashAlgorithm};
use crate::util::many0;

/// A raw hello extension. Only transported, not negotiated, apart from
/// `signature_algorithms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extension<'a> {
    pub extension_type: ExtensionType,
    pub extension_data: &'a [u8],
}

impl<'a> Extension<'a> {
    pub fn new(extension_type: ExtensionType, extension_data: &'a [u8]) -> Self {
        Extension {
            extension_type,
            extension_data,
        }
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], Extension<'a>> {
        let (input, extension_type) = ExtensionType::parse(input)?;
        let (input, extension_length) = be_u16(input)?;
        let (input, extension_data) = take(extension_length)(input)?;

        Ok((
            input,
            Extension {
                extension_type,
                extension_data,
            },
        ))
    }

    /// Parse an optional `u16` length prefixed extension list.
    ///
    /// No bytes at all means no extensions.
    pub fn parse_list<const N: usize>(
        input: &'a [u8],
    ) -> IResult<&'a [u8], ArrayVec<[Extension<'a>; N]>>
    where
        [Extension<'a>; N]: tinyvec::Array<Item = Extension<'a>>,
    {
        if input.is_empty() {
            return Ok((input, ArrayVec::new()));
        }
        let (input, len) = be_u16(input)?;
        let (input, data) = take(len)(input)?;
        let (rest, list) = many0(Extension::parse)(data)?;
        if !rest.is_empty() {
            return Err(nom::Err::Failure(nom::error::Error::new(
                rest,
                nom::error::ErrorKind::LengthValue,
            )));
        }
        Ok((input, list))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.extension_type.as_u16().to_be_bytes());
        output.extend_from_slice(&(self.extension_data.len() as u16).to_be_bytes());
        output.extend_from_slice(self.extension_data);
    }

    /// Serialize a list with its `u16` length prefix. An empty list writes nothing.
    pub fn serialize_list(list: &[Extension<'_>], output: &mut Vec<u8>) {
        if list.is_empty() {
            return;
        }
        let len: usize = list.iter().map(|e| 4 + e.extension_data.len()).sum();
        output.extend_from_slice(&(len as u16).to_be_bytes());
        for ext in list {
            ext.serialize(output);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtensionType {
    ServerName,
    MaxFragmentLength,
    StatusRequest,
    SupportedGroups,
    EcPointFormats,
    #[default]
    SignatureAlgorithms,
    UseSrtp,
    Heartbeat,
    ApplicationLayerProtocolNegotiation,
    Padding,
    EncryptThenMac,
    ExtendedMasterSecret,
    SessionTicket,
    RenegotiationInfo,
    Unknown(u16),
}

impl ExtensionType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0000 => ExtensionType::ServerName,
            0x0001 => ExtensionType::MaxFragmentLength,
            0x0005 => ExtensionType::StatusRequest,
            0x000A => ExtensionType::SupportedGroups,
            0x000B => ExtensionType::EcPointFormats,
            0x000D => ExtensionType::SignatureAlgorithms,
            0x000E => ExtensionType::UseSrtp,
            0x000F => ExtensionType::Heartbeat,
            0x0010 => ExtensionType::ApplicationLayerProtocolNegotiation,
            0x0015 => ExtensionType::Padding,
            0x0016 => ExtensionType::EncryptThenMac,
            0x0017 => ExtensionType::ExtendedMasterSecret,
            0x0023 => ExtensionType::SessionTicket,
            0xFF01 => ExtensionType::RenegotiationInfo,
            _ => ExtensionType::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            ExtensionType::ServerName => 0x0000,
            ExtensionType::MaxFragmentLength => 0x0001,
            ExtensionType::StatusRequest => 0x0005,
            ExtensionType::SupportedGroups => 0x000A,
            ExtensionType::EcPointFormats => 0x000B,
            ExtensionType::SignatureAlgorithms => 0x000D,
            ExtensionType::UseSrtp => 0x000E,
            ExtensionType::Heartbeat => 0x000F,
            ExtensionType::ApplicationLayerProtocolNegotiation => 0x0010,
            ExtensionType::Padding => 0x0015,
            ExtensionType::EncryptThenMac => 0x0016,
            ExtensionType::ExtendedMasterSecret => 0x0017,
            ExtensionType::SessionTicket => 0x0023,
            ExtensionType::RenegotiationInfo => 0xFF01,
            ExtensionType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ExtensionType> {
        let (input, value) = be_u16(input)?;
        Ok((input, ExtensionType::from_u16(value)))
    }
}

/// `signature_algorithms` extension body (RFC 5246 §7.4.1.4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureAlgorithmsExtension {
    pub supported_signature_algorithms: ArrayVec<[SignatureAndHashAlgorithm; 32]>,
}

impl Default for SignatureAlgorithmsExtension {
    /// RSA with SHA-256 and SHA-384, the hashes our suites use.
    fn default() -> Self {
        let mut supported_signature_algorithms = ArrayVec::new();
        supported_signature_algorithms.push(SignatureAndHashAlgorithm::new(
            HashAlgorithm::SHA256,
            SignatureAlgorithm::RSA,
        ));
        supported_signature_algorithms.push(SignatureAndHashAlgorithm::new(
            HashAlgorithm::SHA384,
            SignatureAlgorithm::RSA,
        ));
        SignatureAlgorithmsExtension {
            supported_signature_algorithms,
        }
    }
}

impl SignatureAlgorithmsExtension {
    pub fn parse(input: &[u8]) -> IResult<&[u8], SignatureAlgorithmsExtension> {
        let (input, list_len) = be_u16(input)?;
        let (input, data) = take(list_len)(input)?;
        let (_, supported_signature_algorithms) = many0(SignatureAndHashAlgorithm::parse)(data)?;

        Ok((
            input,
            SignatureAlgorithmsExtension {
                supported_signature_algorithms,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(
            &((self.supported_signature_algorithms.len() * 2) as u16).to_be_bytes(),
        );
        for alg in &self.supported_signature_algorithms {
            output.extend_from_slice(&alg.as_u16().to_be_bytes());
        }
    }
}

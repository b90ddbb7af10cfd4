//! Wire types for DTLS 1.2 records and handshake messages.
//!
//! Parsers are written with nom and borrow from the input where possible.
//! Serializers append to a `Vec<u8>`.

mod alert;
mod certificate;
mod client_hello;
mod client_key_exchange;
mod digitally_signed;
mod extension;
mod finished;
mod handshake;
mod hello_verify;
mod id;
mod random;
mod record;
mod server_hello;
mod server_key_exchange;

pub use alert::{Alert, AlertDescription, AlertLevel};
pub use certificate::{Asn1Cert, Certificate};
pub use client_hello::ClientHello;
pub use client_key_exchange::ClientKeyExchange;
pub use digitally_signed::DigitallySigned;
pub use extension::{Extension, ExtensionType, SignatureAlgorithmsExtension};
pub use finished::Finished;
pub use handshake::{Body, Handshake, Header, MessageType};
pub use hello_verify::HelloVerifyRequest;
pub use id::{Cookie, InvalidLength, SessionId};
pub use random::Random;
pub use record::{ContentType, DTLSRecord};
pub use server_hello::ServerHello;
pub use server_key_exchange::{DhParams, ServerKeyExchange};

use nom::number::complete::{be_u16, be_u8};
use nom::IResult;
use tinyvec::ArrayVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    DTLS1_0,
    #[default]
    DTLS1_2,
    Unknown(u16),
}

impl ProtocolVersion {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0xFEFF => ProtocolVersion::DTLS1_0,
            0xFEFD => ProtocolVersion::DTLS1_2,
            _ => ProtocolVersion::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            ProtocolVersion::DTLS1_0 => 0xFEFF,
            ProtocolVersion::DTLS1_2 => 0xFEFD,
            ProtocolVersion::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ProtocolVersion> {
        let (input, version) = be_u16(input)?;
        Ok((input, ProtocolVersion::from_u16(version)))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.as_u16().to_be_bytes());
    }
}

/// The closed set of cipher suites this crate speaks.
///
/// All of them are AES-GCM with a 4 byte implicit IV, an 8 byte explicit nonce
/// and a 16 byte tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum CipherSuite {
    /// TLS_RSA_WITH_AES_128_GCM_SHA256
    RSA_AES128_GCM_SHA256,
    /// TLS_RSA_WITH_AES_256_GCM_SHA384
    RSA_AES256_GCM_SHA384,
    /// TLS_DHE_RSA_WITH_AES_128_GCM_SHA256
    DHE_RSA_AES128_GCM_SHA256,
    /// TLS_DHE_RSA_WITH_AES_256_GCM_SHA384
    DHE_RSA_AES256_GCM_SHA384,
    Unknown(u16),
}

impl Default for CipherSuite {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

impl CipherSuite {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x009C => CipherSuite::RSA_AES128_GCM_SHA256,
            0x009D => CipherSuite::RSA_AES256_GCM_SHA384,
            0x009E => CipherSuite::DHE_RSA_AES128_GCM_SHA256,
            0x009F => CipherSuite::DHE_RSA_AES256_GCM_SHA384,
            _ => CipherSuite::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CipherSuite::RSA_AES128_GCM_SHA256 => 0x009C,
            CipherSuite::RSA_AES256_GCM_SHA384 => 0x009D,
            CipherSuite::DHE_RSA_AES128_GCM_SHA256 => 0x009E,
            CipherSuite::DHE_RSA_AES256_GCM_SHA384 => 0x009F,
            CipherSuite::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], CipherSuite> {
        let (input, value) = be_u16(input)?;
        Ok((input, CipherSuite::from_u16(value)))
    }

    /// IANA name of the suite.
    pub fn name(&self) -> &'static str {
        match self {
            CipherSuite::RSA_AES128_GCM_SHA256 => "TLS_RSA_WITH_AES_128_GCM_SHA256",
            CipherSuite::RSA_AES256_GCM_SHA384 => "TLS_RSA_WITH_AES_256_GCM_SHA384",
            CipherSuite::DHE_RSA_AES128_GCM_SHA256 => "TLS_DHE_RSA_WITH_AES_128_GCM_SHA256",
            CipherSuite::DHE_RSA_AES256_GCM_SHA384 => "TLS_DHE_RSA_WITH_AES_256_GCM_SHA384",
            CipherSuite::Unknown(_) => "UNKNOWN",
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, CipherSuite::Unknown(_))
    }

    pub fn key_exchange_algorithm(&self) -> KeyExchangeAlgorithm {
        match self {
            CipherSuite::RSA_AES128_GCM_SHA256 | CipherSuite::RSA_AES256_GCM_SHA384 => {
                KeyExchangeAlgorithm::Rsa
            }
            CipherSuite::DHE_RSA_AES128_GCM_SHA256 | CipherSuite::DHE_RSA_AES256_GCM_SHA384 => {
                KeyExchangeAlgorithm::DheRsa
            }
            CipherSuite::Unknown(_) => KeyExchangeAlgorithm::Unknown,
        }
    }

    /// Hash used for the PRF and the Finished transcript hash.
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            CipherSuite::RSA_AES128_GCM_SHA256 | CipherSuite::DHE_RSA_AES128_GCM_SHA256 => {
                HashAlgorithm::SHA256
            }
            CipherSuite::RSA_AES256_GCM_SHA384 | CipherSuite::DHE_RSA_AES256_GCM_SHA384 => {
                HashAlgorithm::SHA384
            }
            CipherSuite::Unknown(_) => HashAlgorithm::Unknown(0),
        }
    }

    /// AES key length in bytes.
    pub fn key_length(&self) -> usize {
        match self {
            CipherSuite::RSA_AES128_GCM_SHA256 | CipherSuite::DHE_RSA_AES128_GCM_SHA256 => 16,
            CipherSuite::RSA_AES256_GCM_SHA384 | CipherSuite::DHE_RSA_AES256_GCM_SHA384 => 32,
            CipherSuite::Unknown(_) => 0,
        }
    }

    /// Implicit (fixed) part of the GCM nonce.
    pub fn fixed_iv_length(&self) -> usize {
        4
    }

    pub fn verify_data_length(&self) -> usize {
        12
    }

    pub(crate) fn all() -> ArrayVec<[CipherSuite; 4]> {
        let mut suites = ArrayVec::new();
        suites.push(CipherSuite::RSA_AES128_GCM_SHA256);
        suites.push(CipherSuite::RSA_AES256_GCM_SHA384);
        suites.push(CipherSuite::DHE_RSA_AES128_GCM_SHA256);
        suites.push(CipherSuite::DHE_RSA_AES256_GCM_SHA384);
        suites
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchangeAlgorithm {
    Rsa,
    DheRsa,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    #[default]
    Null,
    Deflate,
    Unknown(u8),
}

impl CompressionMethod {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => CompressionMethod::Null,
            0x01 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            CompressionMethod::Null => 0x00,
            CompressionMethod::Deflate => 0x01,
            CompressionMethod::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], CompressionMethod> {
        let (input, value) = be_u8(input)?;
        Ok((input, CompressionMethod::from_u8(value)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    None,
    MD5,
    SHA1,
    SHA224,
    #[default]
    SHA256,
    SHA384,
    SHA512,
    Unknown(u8),
}

impl HashAlgorithm {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => HashAlgorithm::None,
            1 => HashAlgorithm::MD5,
            2 => HashAlgorithm::SHA1,
            3 => HashAlgorithm::SHA224,
            4 => HashAlgorithm::SHA256,
            5 => HashAlgorithm::SHA384,
            6 => HashAlgorithm::SHA512,
            _ => HashAlgorithm::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            HashAlgorithm::None => 0,
            HashAlgorithm::MD5 => 1,
            HashAlgorithm::SHA1 => 2,
            HashAlgorithm::SHA224 => 3,
            HashAlgorithm::SHA256 => 4,
            HashAlgorithm::SHA384 => 5,
            HashAlgorithm::SHA512 => 6,
            HashAlgorithm::Unknown(value) => *value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureAlgorithm {
    Anonymous,
    #[default]
    RSA,
    DSA,
    ECDSA,
    Unknown(u8),
}

impl SignatureAlgorithm {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => SignatureAlgorithm::Anonymous,
            1 => SignatureAlgorithm::RSA,
            2 => SignatureAlgorithm::DSA,
            3 => SignatureAlgorithm::ECDSA,
            _ => SignatureAlgorithm::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            SignatureAlgorithm::Anonymous => 0,
            SignatureAlgorithm::RSA => 1,
            SignatureAlgorithm::DSA => 2,
            SignatureAlgorithm::ECDSA => 3,
            SignatureAlgorithm::Unknown(value) => *value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignatureAndHashAlgorithm {
    pub hash: HashAlgorithm,
    pub signature: SignatureAlgorithm,
}

impl SignatureAndHashAlgorithm {
    pub fn new(hash: HashAlgorithm, signature: SignatureAlgorithm) -> Self {
        SignatureAndHashAlgorithm { hash, signature }
    }

    pub fn from_u16(value: u16) -> Self {
        SignatureAndHashAlgorithm {
            hash: HashAlgorithm::from_u8((value >> 8) as u8),
            signature: SignatureAlgorithm::from_u8(value as u8),
        }
    }

    pub fn as_u16(&self) -> u16 {
        ((self.hash.as_u8() as u16) << 8) | self.signature.as_u8() as u16
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], SignatureAndHashAlgorithm> {
        let (input, value) = be_u16(input)?;
        Ok((input, SignatureAndHashAlgorithm::from_u16(value)))
    }
}

/// Append `value` as a 24 bit big endian integer.
pub(crate) fn put_u24(output: &mut Vec<u8>, value: u32) {
    output.extend_from_slice(&value.to_be_bytes()[1..]);
}

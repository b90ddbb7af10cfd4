use thiserror::Error;

use crate::message::{AlertDescription, AlertLevel};

/// Errors surfaced by a DTLS session.
///
/// Every variant except [`Error::NotConnected`] and [`Error::TransmitQueueFull`]
/// is terminal: the session queues a fatal alert (where one applies) and refuses
/// further I/O with [`Error::Closed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed or truncated wire bytes.
    #[error("decode error: {0}")]
    Decode(String),

    /// A handshake fragment reaches past the end of its message.
    #[error("handshake fragment out of range: offset {offset} + length {length} > {total}")]
    FragmentRange {
        /// Fragment offset.
        offset: u32,
        /// Fragment length.
        length: u32,
        /// Total message length.
        total: u32,
    },

    /// Valid encoding, wrong moment in the handshake.
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    /// AEAD tag verification failed.
    #[error("record authentication failed")]
    Authentication,

    /// The peer sent an alert.
    #[error("peer alert: {level:?} {description:?}")]
    Alert {
        /// Level of the alert.
        level: AlertLevel,
        /// Description of the alert.
        description: AlertDescription,
    },

    /// The server picked a cipher suite we do not support or did not offer.
    #[error("unsupported cipher suite: {0:#06x}")]
    UnsupportedCipher(u16),

    /// No overlap between the offered and the accepted cipher suites.
    #[error("no common cipher suite")]
    NoCommonCipher,

    /// A field carried a value that is syntactically valid but not allowed.
    #[error("illegal parameter: {0}")]
    IllegalParameter(String),

    /// The peer certificate is missing or unusable.
    #[error("bad certificate: {0}")]
    BadCertificate(String),

    /// The Finished verify data did not match the transcript.
    #[error("finished verify data mismatch")]
    VerifyData,

    /// The ServerKeyExchange signature did not verify.
    #[error("key exchange signature did not verify")]
    Signature,

    /// Internal failure in a cryptographic primitive.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Invalid construction parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A flight ran out of retries or the handshake deadline passed.
    #[error("timeout: {0}")]
    Timeout(&'static str),

    /// Application data was sent before the handshake completed.
    #[error("handshake not complete")]
    NotConnected,

    /// Too many outgoing datagrams are queued.
    #[error("transmit queue full")]
    TransmitQueueFull,

    /// The session is closed.
    #[error("session closed")]
    Closed,
}

impl Error {
    /// The alert to send to the peer when this error terminates a session.
    pub fn alert_description(&self) -> Option<AlertDescription> {
        let description = match self {
            Error::Decode(_) | Error::FragmentRange { .. } => AlertDescription::DecodeError,
            Error::UnexpectedMessage(_) => AlertDescription::UnexpectedMessage,
            Error::Authentication => AlertDescription::BadRecordMac,
            Error::UnsupportedCipher(_) | Error::NoCommonCipher => {
                AlertDescription::HandshakeFailure
            }
            Error::IllegalParameter(_) => AlertDescription::IllegalParameter,
            Error::BadCertificate(_) => AlertDescription::BadCertificate,
            Error::VerifyData | Error::Signature => AlertDescription::DecryptError,
            Error::Crypto(_) => AlertDescription::InternalError,
            Error::Alert { .. }
            | Error::Configuration(_)
            | Error::Timeout(_)
            | Error::NotConnected
            | Error::TransmitQueueFull
            | Error::Closed => return None,
        };
        Some(description)
    }

    /// Whether this error ends the session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::NotConnected | Error::TransmitQueueFull)
    }
}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Error {
    fn from(value: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        match value {
            nom::Err::Incomplete(_) => Error::Decode("incomplete input".to_string()),
            nom::Err::Error(e) | nom::Err::Failure(e) => Error::Decode(format!(
                "{:?} with {} bytes remaining",
                e.code,
                e.input.len()
            )),
        }
    }
}

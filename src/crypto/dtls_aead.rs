//! AES-GCM record protection for DTLS 1.2 (RFC 5288).

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};

use crate::message::ContentType;
use crate::Error;

/// Explicit nonce length. Sent in front of every ciphertext.
pub(crate) const DTLS_EXPLICIT_NONCE_LEN: usize = 8;

/// GCM tag length. Appended to the ciphertext.
pub(crate) const GCM_TAG_LEN: usize = 16;

/// Overhead per protected record.
pub const DTLS_AEAD_OVERHEAD: usize = DTLS_EXPLICIT_NONCE_LEN + GCM_TAG_LEN;

/// Implicit (fixed) IV from the key block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Iv(pub [u8; 4]);

impl Iv {
    pub(crate) fn new(iv: &[u8]) -> Result<Self, Error> {
        let iv: [u8; 4] = iv
            .try_into()
            .map_err(|_| Error::Crypto(format!("Invalid implicit IV length: {}", iv.len())))?;
        Ok(Self(iv))
    }
}

/// Full GCM nonce, `implicit IV || explicit nonce`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce(pub [u8; 12]);

impl Nonce {
    pub(crate) fn new(iv: Iv, explicit_nonce: &[u8; DTLS_EXPLICIT_NONCE_LEN]) -> Self {
        let mut nonce = [0u8; 12];
        nonce[..4].copy_from_slice(&iv.0);
        nonce[4..].copy_from_slice(explicit_nonce);
        Self(nonce)
    }

    /// The explicit part, `epoch(2) || sequence_number(6)`.
    pub(crate) fn explicit_for(epoch: u16, sequence_number: u64) -> [u8; DTLS_EXPLICIT_NONCE_LEN] {
        let mut explicit = sequence_number.to_be_bytes();
        explicit[..2].copy_from_slice(&epoch.to_be_bytes());
        explicit
    }
}

/// Additional data: `epoch || sequence_number || type || version || length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aad(pub [u8; 13]);

impl Aad {
    pub(crate) fn new(
        content_type: ContentType,
        epoch: u16,
        sequence_number: u64,
        plaintext_len: u16,
    ) -> Self {
        let mut aad = [0u8; 13];
        aad[..8].copy_from_slice(&Nonce::explicit_for(epoch, sequence_number));
        aad[8] = content_type.as_u8();
        aad[9] = 0xfe;
        aad[10] = 0xfd;
        aad[11..].copy_from_slice(&plaintext_len.to_be_bytes());
        Aad(aad)
    }
}

/// AES-GCM with a 128 or 256 bit key.
pub(crate) enum AesGcm {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl std::fmt::Debug for AesGcm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AesGcm::Aes128(_) => f.debug_tuple("AesGcm::Aes128").finish(),
            AesGcm::Aes256(_) => f.debug_tuple("AesGcm::Aes256").finish(),
        }
    }
}

impl AesGcm {
    pub(crate) fn new(key: &[u8]) -> Result<Self, Error> {
        match key.len() {
            16 => Aes128Gcm::new_from_slice(key)
                .map(|c| AesGcm::Aes128(Box::new(c)))
                .map_err(|_| Error::Crypto("Invalid AES-128 key".to_string())),
            32 => Aes256Gcm::new_from_slice(key)
                .map(|c| AesGcm::Aes256(Box::new(c)))
                .map_err(|_| Error::Crypto("Invalid AES-256 key".to_string())),
            _ => Err(Error::Crypto(format!(
                "Invalid key size for AES-GCM: {}",
                key.len()
            ))),
        }
    }

    /// Encrypt in place, appending the tag.
    pub(crate) fn encrypt(&self, data: &mut Vec<u8>, aad: &Aad, nonce: &Nonce) -> Result<(), Error> {
        let n = GenericArray::from_slice(&nonce.0);
        let res = match self {
            AesGcm::Aes128(cipher) => cipher.encrypt_in_place(n, &aad.0, data),
            AesGcm::Aes256(cipher) => cipher.encrypt_in_place(n, &aad.0, data),
        };
        res.map_err(|_| Error::Crypto("AES-GCM encryption failed".to_string()))
    }

    /// Decrypt in place, removing the tag. A tag mismatch is `Error::Authentication`.
    pub(crate) fn decrypt(&self, data: &mut Vec<u8>, aad: &Aad, nonce: &Nonce) -> Result<(), Error> {
        if data.len() < GCM_TAG_LEN {
            return Err(Error::Authentication);
        }
        let n = GenericArray::from_slice(&nonce.0);
        let res = match self {
            AesGcm::Aes128(cipher) => cipher.decrypt_in_place(n, &aad.0, data),
            AesGcm::Aes256(cipher) => cipher.decrypt_in_place(n, &aad.0, data),
        };
        res.map_err(|_| Error::Authentication)
    }
}

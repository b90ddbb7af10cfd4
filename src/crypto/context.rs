//! Per session key material and record protection.

use zeroize::Zeroizing;

use super::dtls_aead::{Aad, AesGcm, Iv, Nonce, DTLS_EXPLICIT_NONCE_LEN, GCM_TAG_LEN};
use super::prf;
use crate::message::{CipherSuite, ContentType};
use crate::session::Role;
use crate::Error;

/// Keys for one direction.
#[derive(Debug)]
struct Direction {
    cipher: AesGcm,
    iv: Iv,
}

/// Derived key material of a negotiated cipher suite.
///
/// Built once from the master secret. The write direction uses our own
/// role's key, the read direction the peer's.
#[derive(Debug)]
pub struct CryptoContext {
    suite: CipherSuite,
    write: Direction,
    read: Direction,
}

impl CryptoContext {
    /// Split the key block into
    /// `client_write_key || server_write_key || client_write_IV || server_write_IV`.
    pub fn new(
        suite: CipherSuite,
        role: Role,
        master_secret: &[u8],
        client_random: &[u8; 32],
        server_random: &[u8; 32],
    ) -> Result<Self, Error> {
        let key_len = suite.key_length();
        let iv_len = suite.fixed_iv_length();
        if key_len == 0 {
            return Err(Error::UnsupportedCipher(suite.as_u16()));
        }

        let key_block: Zeroizing<Vec<u8>> = prf::key_expansion(
            master_secret,
            client_random,
            server_random,
            2 * key_len + 2 * iv_len,
            suite.hash_algorithm(),
        )?;

        let (client_key, rest) = key_block.split_at(key_len);
        let (server_key, rest) = rest.split_at(key_len);
        let (client_iv, server_iv) = rest.split_at(iv_len);

        let client = Direction {
            cipher: AesGcm::new(client_key)?,
            iv: Iv::new(client_iv)?,
        };
        let server = Direction {
            cipher: AesGcm::new(server_key)?,
            iv: Iv::new(server_iv)?,
        };

        let (write, read) = match role {
            Role::Client => (client, server),
            Role::Server => (server, client),
        };

        Ok(CryptoContext { suite, write, read })
    }

    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    /// Protect a record fragment.
    ///
    /// Returns `explicit_nonce || ciphertext || tag` where the explicit nonce is
    /// `epoch || sequence_number`.
    pub fn encrypt(
        &self,
        content_type: ContentType,
        epoch: u16,
        sequence_number: u64,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let explicit = Nonce::explicit_for(epoch, sequence_number);
        let nonce = Nonce::new(self.write.iv, &explicit);
        let aad = Aad::new(content_type, epoch, sequence_number, plaintext.len() as u16);

        let mut data = Vec::with_capacity(plaintext.len() + GCM_TAG_LEN);
        data.extend_from_slice(plaintext);
        self.write.cipher.encrypt(&mut data, &aad, &nonce)?;

        let mut out = Vec::with_capacity(DTLS_EXPLICIT_NONCE_LEN + data.len());
        out.extend_from_slice(&explicit);
        out.extend_from_slice(&data);
        Ok(out)
    }

    /// Inverse of [`CryptoContext::encrypt`], using the explicit nonce from the wire.
    ///
    /// Any failure, including a fragment too short to hold nonce and tag, is
    /// `Error::Authentication`.
    pub fn decrypt(
        &self,
        content_type: ContentType,
        epoch: u16,
        sequence_number: u64,
        fragment: &[u8],
    ) -> Result<Vec<u8>, Error> {
        if fragment.len() < DTLS_EXPLICIT_NONCE_LEN + GCM_TAG_LEN {
            return Err(Error::Authentication);
        }

        let (explicit, ciphertext) = fragment.split_at(DTLS_EXPLICIT_NONCE_LEN);
        let mut explicit_arr = [0u8; DTLS_EXPLICIT_NONCE_LEN];
        explicit_arr.copy_from_slice(explicit);

        let nonce = Nonce::new(self.read.iv, &explicit_arr);
        let plaintext_len = ciphertext.len() - GCM_TAG_LEN;
        let aad = Aad::new(content_type, epoch, sequence_number, plaintext_len as u16);

        let mut data = ciphertext.to_vec();
        self.read.cipher.decrypt(&mut data, &aad, &nonce)?;
        Ok(data)
    }
}

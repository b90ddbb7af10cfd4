use sha2::{Digest, Sha256, Sha384};

use crate::message::HashAlgorithm;
use crate::Error;

/// Incremental SHA-256 or SHA-384.
#[derive(Clone)]
pub enum Hash {
    Sha256(Sha256),
    Sha384(Sha384),
}

impl Hash {
    pub fn new(algorithm: HashAlgorithm) -> Result<Self, Error> {
        match algorithm {
            HashAlgorithm::SHA256 => Ok(Hash::Sha256(Sha256::new())),
            HashAlgorithm::SHA384 => Ok(Hash::Sha384(Sha384::new())),
            _ => Err(Error::Crypto(format!(
                "Unsupported hash algorithm: {:?}",
                algorithm
            ))),
        }
    }

    /// Hash `data` in one go.
    pub fn digest(algorithm: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut hash = Hash::new(algorithm)?;
        hash.update(data);
        Ok(hash.finalize())
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hash::Sha256(hasher) => hasher.update(data),
            Hash::Sha384(hasher) => hasher.update(data),
        }
    }

    pub fn finalize(self) -> Vec<u8> {
        match self {
            Hash::Sha256(hasher) => hasher.finalize().to_vec(),
            Hash::Sha384(hasher) => hasher.finalize().to_vec(),
        }
    }
}

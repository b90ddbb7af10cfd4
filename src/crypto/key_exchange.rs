//! Pre-master secret creation for the RSA and DHE_RSA key exchanges.

use num_bigint::{BigUint, RandomBits};
use once_cell::sync::Lazy;
use rand::distributions::Distribution;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use crate::{Error, SeededRng};

/// Length of an RSA pre-master secret.
pub const PRE_MASTER_LEN: usize = 48;

/// Smallest accepted DH modulus.
const MIN_DH_PRIME_BITS: u64 = 1024;
/// Larger groups only make our exponentiation expensive.
const MAX_DH_PRIME_BITS: u64 = 8192;

/// Private exponent size. Twice the strength of ffdhe2048.
const DH_EXPONENT_BITS: u64 = 256;

/// RFC 7919 ffdhe2048 prime.
static FFDHE2048_P: Lazy<BigUint> = Lazy::new(|| {
    const HEX: &[u8] = b"\
        FFFFFFFFFFFFFFFFADF85458A2BB4A9AAFDC5620273D3CF1D8B9C583CE2D3695A9E13641146433FBCC939DCE\
        249B3EF97D2FE363630C75D8F681B202AEC4617AD3DF1ED5D5FD65612433F51F5F066ED0856365553DED1AF3\
        B557135E7F57C935984F0C70E0E68B77E2A689DAF3EFE8721DF158A136ADE73530ACCA4F483A797ABC0AB182\
        B324FB61D108A94BB2C8E3FBB96ADAB760D7F4681D4F42A3DE394DF4AE56EDE76372BB190B07A7C8EE0A6D70\
        9E02FCE1CDF7E2ECC03404CD28342F619172FE9CE98583FF8E4F1232EEF28183C3FE3B1B4C6FAD733BB5FCBC\
        2EC22005C58EF1837D1683B2C6F34A26C1B2EFFA886B423861285C97FFFFFFFFFFFFFFFF";
    // The constant is valid hex.
    BigUint::parse_bytes(HEX, 16).unwrap_or_default()
});

/// An ephemeral finite field Diffie-Hellman key pair.
pub struct DhKeyExchange {
    prime: BigUint,
    generator: BigUint,
    private_key: BigUint,
    public_key: BigUint,
}

impl std::fmt::Debug for DhKeyExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhKeyExchange")
            .field("prime_bits", &self.prime.bits())
            .finish()
    }
}

impl DhKeyExchange {
    /// Server side: a fresh key pair in the ffdhe2048 group, g = 2.
    pub fn ffdhe2048(rng: &mut SeededRng) -> Self {
        Self::generate(FFDHE2048_P.clone(), BigUint::from(2u8), rng)
    }

    /// Client side: a fresh key pair in the group the server picked.
    ///
    /// Rejects weak or degenerate groups with `IllegalParameter`.
    pub fn for_params(p: &[u8], g: &[u8], rng: &mut SeededRng) -> Result<Self, Error> {
        let prime = BigUint::from_bytes_be(p);
        let generator = BigUint::from_bytes_be(g);

        if prime.bits() < MIN_DH_PRIME_BITS {
            return Err(Error::IllegalParameter(format!(
                "DH prime of {} bits is too small",
                prime.bits()
            )));
        }
        if prime.bits() > MAX_DH_PRIME_BITS {
            return Err(Error::IllegalParameter(format!(
                "DH prime of {} bits is too large",
                prime.bits()
            )));
        }
        if generator < BigUint::from(2u8) || generator >= prime {
            return Err(Error::IllegalParameter("DH generator out of range".to_string()));
        }

        Ok(Self::generate(prime, generator, rng))
    }

    fn generate(prime: BigUint, generator: BigUint, rng: &mut SeededRng) -> Self {
        let distribution = RandomBits::new(DH_EXPONENT_BITS);
        let mut private_key: BigUint = distribution.sample(rng);
        // Exponents 0 and 1 are useless.
        private_key |= BigUint::from(2u8);

        let public_key = generator.modpow(&private_key, &prime);

        DhKeyExchange {
            prime,
            generator,
            private_key,
            public_key,
        }
    }

    pub fn prime(&self) -> Vec<u8> {
        self.prime.to_bytes_be()
    }

    pub fn generator(&self) -> Vec<u8> {
        self.generator.to_bytes_be()
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.public_key.to_bytes_be()
    }

    /// Shared secret with leading zero bytes stripped (RFC 5246 §8.1.2).
    ///
    /// The peer value must be in `(1, p - 1)`.
    pub fn compute_shared_secret(&self, peer_public_key: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
        let peer = BigUint::from_bytes_be(peer_public_key);
        let one = BigUint::from(1u8);
        let upper = &self.prime - &one;

        if peer <= one || peer >= upper {
            return Err(Error::IllegalParameter(
                "DH public value out of range".to_string(),
            ));
        }

        let shared = peer.modpow(&self.private_key, &self.prime);
        // to_bytes_be has no leading zeros.
        Ok(Zeroizing::new(shared.to_bytes_be()))
    }
}

/// `client_version || 46 random bytes`.
pub fn rsa_pre_master_secret(rng: &mut SeededRng) -> Zeroizing<Vec<u8>> {
    let mut pre_master = Zeroizing::new(vec![0u8; PRE_MASTER_LEN]);
    pre_master[0] = 0xFE;
    pre_master[1] = 0xFD;
    for b in &mut pre_master[2..] {
        *b = rng.random();
    }
    pre_master
}

/// RSAES-PKCS1-v1_5 encrypt the pre-master secret for the server.
pub fn rsa_encrypt_pre_master(
    public_key: &RsaPublicKey,
    pre_master: &[u8],
    rng: &mut SeededRng,
) -> Result<Vec<u8>, Error> {
    public_key
        .encrypt(rng, Pkcs1v15Encrypt, pre_master)
        .map_err(|e| Error::Crypto(format!("RSA encryption failed: {}", e)))
}

/// Decrypt the client's pre-master secret.
///
/// Any failure, wrong length or wrong version yields a random pre-master so
/// the handshake fails at Finished instead (RFC 5246 §7.4.7.1).
pub fn rsa_decrypt_pre_master(
    private_key: &RsaPrivateKey,
    encrypted: &[u8],
    rng: &mut SeededRng,
) -> Zeroizing<Vec<u8>> {
    let fallback = rsa_pre_master_secret(rng);

    match private_key.decrypt(Pkcs1v15Encrypt, encrypted) {
        Ok(pm) if pm.len() == PRE_MASTER_LEN && pm[..2] == [0xFE, 0xFD] => Zeroizing::new(pm),
        Ok(_) | Err(_) => {
            debug!("RSA pre-master did not decrypt, continuing with a random one");
            fallback
        }
    }
}

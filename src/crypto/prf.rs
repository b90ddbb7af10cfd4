//! The TLS 1.2 PRF (RFC 5246 §5).

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384};
use zeroize::Zeroizing;

use crate::message::HashAlgorithm;
use crate::Error;

/// PRF(secret, label, seed) = P_<hash>(secret, label + seed)
///
/// `seed` is the seed without the label. The output is exactly `output_len` bytes.
pub fn prf_tls12(
    secret: &[u8],
    label: &str,
    seed: &[u8],
    output_len: usize,
    hash: HashAlgorithm,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut full_seed = Vec::with_capacity(label.len() + seed.len());
    full_seed.extend_from_slice(label.as_bytes());
    full_seed.extend_from_slice(seed);

    match hash {
        HashAlgorithm::SHA256 => p_hash::<Hmac<Sha256>>(secret, &full_seed, output_len),
        HashAlgorithm::SHA384 => p_hash::<Hmac<Sha384>>(secret, &full_seed, output_len),
        _ => Err(Error::Crypto(format!("Unsupported PRF hash: {:?}", hash))),
    }
}

fn p_hash<M>(secret: &[u8], full_seed: &[u8], output_len: usize) -> Result<Zeroizing<Vec<u8>>, Error>
where
    M: Mac + KeyInit + Clone,
{
    let key = <M as Mac>::new_from_slice(secret)
        .map_err(|_| Error::Crypto("Invalid HMAC key".to_string()))?;

    let mut result = Zeroizing::new(Vec::with_capacity(output_len));

    // A(1) = HMAC_hash(secret, A(0)) where A(0) = seed
    let mut a = key.clone().chain_update(full_seed).finalize().into_bytes();

    while result.len() < output_len {
        // HMAC_hash(secret, A(i) + seed)
        let output = key
            .clone()
            .chain_update(&a)
            .chain_update(full_seed)
            .finalize()
            .into_bytes();

        let remaining = output_len - result.len();
        let to_copy = remaining.min(output.len());
        result.extend_from_slice(&output[..to_copy]);

        if result.len() < output_len {
            // A(i+1) = HMAC_hash(secret, A(i))
            a = key.clone().chain_update(&a).finalize().into_bytes();
        }
    }

    Ok(result)
}

/// master_secret = PRF(pre_master_secret, "master secret", client_random + server_random)[0..47]
pub fn master_secret(
    pre_master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    hash: HashAlgorithm,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(client_random);
    seed[32..].copy_from_slice(server_random);
    prf_tls12(pre_master_secret, "master secret", &seed, 48, hash)
}

/// key_block = PRF(master_secret, "key expansion", server_random + client_random)
pub fn key_expansion(
    master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    key_material_length: usize,
    hash: HashAlgorithm,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(server_random);
    seed[32..].copy_from_slice(client_random);
    prf_tls12(
        master_secret,
        "key expansion",
        &seed,
        key_material_length,
        hash,
    )
}

/// verify_data = PRF(master_secret, finished_label, Hash(handshake_messages))[0..11]
pub fn verify_data(
    master_secret: &[u8],
    label: &str,
    transcript_hash: &[u8],
    hash: HashAlgorithm,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    prf_tls12(master_secret, label, transcript_hash, 12, hash)
}

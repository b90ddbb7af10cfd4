//! Cryptographic primitives and helpers used by the DTLS engine.

mod certificate;
mod context;
mod dtls_aead;
mod hash;
mod key_exchange;
mod prf;

pub use certificate::{extract_subject_public_key, verify_signature, ServerIdentity};
pub use context::CryptoContext;
pub use dtls_aead::DTLS_AEAD_OVERHEAD;
pub use hash::Hash;
pub use key_exchange::{rsa_decrypt_pre_master, rsa_encrypt_pre_master, rsa_pre_master_secret};
pub use key_exchange::{DhKeyExchange, PRE_MASTER_LEN};
pub use prf::{key_expansion, master_secret, prf_tls12, verify_data};

//! RSA keys from certificates, and the DHE parameter signatures.

use der::{Decode, Encode};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha384};
use signature::{SignatureEncoding, Signer, Verifier};
use spki::ObjectIdentifier;
use x509_cert::Certificate as X509Certificate;

use crate::message::{HashAlgorithm, SignatureAlgorithm, SignatureAndHashAlgorithm};
use crate::{DtlsCertificate, Error};

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// Read the RSA subject public key out of a DER certificate.
///
/// No chain or validity checks are made.
pub fn extract_subject_public_key(der: &[u8]) -> Result<RsaPublicKey, Error> {
    let cert = X509Certificate::from_der(der)
        .map_err(|e| Error::BadCertificate(format!("not an X.509 certificate: {}", e)))?;

    let spki = &cert.tbs_certificate.subject_public_key_info;
    if spki.algorithm.oid != RSA_ENCRYPTION {
        return Err(Error::BadCertificate(format!(
            "unsupported public key algorithm {}",
            spki.algorithm.oid
        )));
    }

    let spki_der = spki
        .to_der()
        .map_err(|e| Error::BadCertificate(format!("public key info: {}", e)))?;

    RsaPublicKey::from_public_key_der(&spki_der)
        .map_err(|e| Error::BadCertificate(format!("RSA public key: {}", e)))
}

/// Server certificate with its parsed private key.
pub struct ServerIdentity {
    certificate: Vec<u8>,
    private_key: RsaPrivateKey,
}

impl std::fmt::Debug for ServerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerIdentity")
            .field("certificate", &self.certificate.len())
            .finish()
    }
}

impl ServerIdentity {
    /// Parse and cross check the certificate and key.
    pub fn new(cert: &DtlsCertificate) -> Result<Self, Error> {
        let public_key = extract_subject_public_key(&cert.certificate)?;

        let private_key = RsaPrivateKey::from_pkcs8_der(&cert.private_key)
            .or_else(|_| RsaPrivateKey::from_pkcs1_der(&cert.private_key))
            .map_err(|_| Error::Configuration("private key is not an RSA key".to_string()))?;

        if RsaPublicKey::from(&private_key) != public_key {
            return Err(Error::Configuration(
                "private key does not match certificate".to_string(),
            ));
        }

        Ok(ServerIdentity {
            certificate: cert.certificate.clone(),
            private_key,
        })
    }

    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// RSASSA-PKCS1-v1_5 over `data`.
    pub fn sign(&self, data: &[u8], hash: HashAlgorithm) -> Result<Vec<u8>, Error> {
        let signature = match hash {
            HashAlgorithm::SHA256 => SigningKey::<Sha256>::new(self.private_key.clone())
                .try_sign(data)
                .map(|s| s.to_vec()),
            HashAlgorithm::SHA384 => SigningKey::<Sha384>::new(self.private_key.clone())
                .try_sign(data)
                .map(|s| s.to_vec()),
            _ => return Err(Error::Crypto(format!("Unsupported signature hash: {:?}", hash))),
        };
        signature.map_err(|e| Error::Crypto(format!("RSA signing failed: {}", e)))
    }
}

/// Verify an RSASSA-PKCS1-v1_5 signature made by the certificate's key.
pub fn verify_signature(
    public_key: &RsaPublicKey,
    data: &[u8],
    algorithm: SignatureAndHashAlgorithm,
    signature: &[u8],
) -> Result<(), Error> {
    if algorithm.signature != SignatureAlgorithm::RSA {
        return Err(Error::IllegalParameter(format!(
            "unsupported signature algorithm {:?}",
            algorithm.signature
        )));
    }

    let signature = Signature::try_from(signature).map_err(|_| Error::Signature)?;

    let res = match algorithm.hash {
        HashAlgorithm::SHA256 => {
            VerifyingKey::<Sha256>::new(public_key.clone()).verify(data, &signature)
        }
        HashAlgorithm::SHA384 => {
            VerifyingKey::<Sha384>::new(public_key.clone()).verify(data, &signature)
        }
        _ => {
            return Err(Error::IllegalParameter(format!(
                "unsupported signature hash {:?}",
                algorithm.hash
            )))
        }
    };

    res.map_err(|_| Error::Signature)
}

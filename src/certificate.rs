//! Server certificate and key pair, plus fingerprint helpers for the
//! application's own trust decisions on [`Output::PeerCert`](crate::Output::PeerCert).

use std::fmt;

use sha2::{Digest, Sha256};

use crate::Error;

/// Certificate and private key pair.
#[derive(Clone)]
pub struct DtlsCertificate {
    /// X.509 certificate in DER format.
    pub certificate: Vec<u8>,
    /// RSA private key in DER format, PKCS#8 or PKCS#1.
    pub private_key: Vec<u8>,
}

impl DtlsCertificate {
    /// Decode a PEM certificate and a PEM private key.
    ///
    /// The key may be `PRIVATE KEY` (PKCS#8) or `RSA PRIVATE KEY` (PKCS#1).
    pub fn from_pem(certificate: &str, private_key: &str) -> Result<Self, Error> {
        let (label, certificate) = der::pem::decode_vec(certificate.as_bytes())
            .map_err(|e| Error::Configuration(format!("certificate PEM: {}", e)))?;
        if label != "CERTIFICATE" {
            return Err(Error::Configuration(format!(
                "expected CERTIFICATE PEM, got {}",
                label
            )));
        }

        let (label, private_key) = der::pem::decode_vec(private_key.as_bytes())
            .map_err(|e| Error::Configuration(format!("private key PEM: {}", e)))?;
        if label != "PRIVATE KEY" && label != "RSA PRIVATE KEY" {
            return Err(Error::Configuration(format!(
                "expected private key PEM, got {}",
                label
            )));
        }

        Ok(DtlsCertificate {
            certificate,
            private_key,
        })
    }

    /// SHA-256 of the DER certificate.
    pub fn fingerprint(&self) -> Vec<u8> {
        calculate_fingerprint(&self.certificate)
    }

    /// Fingerprint formatted as "AF:12:F6:...".
    pub fn fingerprint_str(&self) -> String {
        format_fingerprint(&self.fingerprint())
    }
}

/// Calculate a certificate fingerprint using SHA-256
pub fn calculate_fingerprint(cert_der: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(cert_der);
    hasher.finalize().to_vec()
}

/// Format a fingerprint as a colon-separated hex string
pub fn format_fingerprint(fingerprint: &[u8]) -> String {
    fingerprint
        .iter()
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<String>>()
        .join(":")
}

impl fmt::Debug for DtlsCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DtlsCertificate")
            .field("certificate", &self.certificate.len())
            .field("private_key", &self.private_key.len())
            .finish()
    }
}

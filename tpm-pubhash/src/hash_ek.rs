// SPDX-License-Identifier: Apache-2.0
// Copyright 2024 TPM Pubhash Authors

use crate::crypto::{hash, pubkey_to_der, x509_get_pubkey, CryptoError};
use openssl::{hash::MessageDigest, x509::X509};

/// Calculate the SHA-256 hash of the certificate public key
///
/// The digest covers the DER encoded SubjectPublicKeyInfo of the key and is
/// returned as lowercase hex. This is the fingerprint registered for a
/// device, so the format must never change.
pub fn hash_ek_pubkey(cert: &X509) -> Result<String, CryptoError> {
    let pubkey = x509_get_pubkey(cert)?;
    let der = pubkey_to_der(&pubkey)?;
    let hash = hash(&der, MessageDigest::sha256())?;
    Ok(hex::encode(hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{load_x509_pem, testing::*};

    #[test]
    fn test_hash_ek_pubkey_known_answer() {
        // Computed with:
        // openssl x509 -in ek-rsa.pem -pubkey -noout \
        //   | openssl pkey -pubin -outform DER | sha256sum
        let cert = load_x509_pem(&test_data("ek-rsa.pem")).unwrap(); //#[allow_ci]
        let h = hash_ek_pubkey(&cert).unwrap(); //#[allow_ci]
        assert_eq!(
            h,
            "cadb3b61eb11828ef4549b3238d3d8ec4218f109913ac2d18bd360e9a3e23edf"
        );

        let cert = load_x509_pem(&test_data("ek-ecc.pem")).unwrap(); //#[allow_ci]
        let h = hash_ek_pubkey(&cert).unwrap(); //#[allow_ci]
        assert_eq!(
            h,
            "09632e43ab6f11584e49011267593ef1e9e953e2b53a186a642626a83572145b"
        );
    }

    #[test]
    fn test_hash_ek_pubkey_deterministic() {
        let key = rsa_generate(2048);
        let cert = ek_certificate(&key, "ek");
        let a = hash_ek_pubkey(&cert).unwrap(); //#[allow_ci]
        let b = hash_ek_pubkey(&cert).unwrap(); //#[allow_ci]
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_hash_ek_pubkey_ignores_certificate_metadata() {
        // Same key, different certificates
        let key = rsa_generate(2048);
        let a = hash_ek_pubkey(&ek_certificate(&key, "first")).unwrap(); //#[allow_ci]
        let b = hash_ek_pubkey(&ek_certificate(&key, "second")).unwrap(); //#[allow_ci]
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_ek_pubkey_distinct_keys() {
        let a = ek_certificate(&rsa_generate(2048), "ek");
        let b = ek_certificate(&rsa_generate(2048), "ek");
        assert_ne!(
            hash_ek_pubkey(&a).unwrap(), //#[allow_ci]
            hash_ek_pubkey(&b).unwrap() //#[allow_ci]
        );
    }

    #[test]
    fn test_hash_ek_pubkey_unsupported_key() {
        let key = dsa_generate();
        let cert = ek_certificate(&key, "dsa");
        let r = hash_ek_pubkey(&cert);
        assert!(matches!(r, Err(CryptoError::UnsupportedKeyType(_))));
    }
}

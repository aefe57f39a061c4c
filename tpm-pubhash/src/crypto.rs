// SPDX-License-Identifier: Apache-2.0
// Copyright 2024 TPM Pubhash Authors

use log::*;
use openssl::{
    hash::MessageDigest,
    pkey::{Id, PKey, Public},
    x509::X509,
};
use picky_asn1_x509::SubjectPublicKeyInfo;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    /// Error calculating hash
    #[error("failed to calculate hash: {0}")]
    HashError(#[source] openssl::error::ErrorStack),

    /// Read error
    #[error("failed to read {path}: {source}")]
    IOReadError {
        path: String,
        source: std::io::Error,
    },

    /// Error parsing an EK certificate as ASN.1 DER
    #[error("EK certificate is not ASN.1 DER encoded: {0}")]
    EKCertParsing(#[source] picky_asn1_der::Asn1DerError),

    /// Error getting the public key from the certificate
    #[error("failed to get public key from certificate: {0}")]
    X509GetPublicError(#[source] openssl::error::ErrorStack),

    /// Error parsing a DER certificate
    #[error("failed to parse X509 certificate from DER: {0}")]
    X509FromDERError(#[source] openssl::error::ErrorStack),

    /// Error parsing a PEM certificate
    #[error("failed to parse X509 certificate from PEM: {0}")]
    X509FromPEMError(#[source] openssl::error::ErrorStack),

    /// Error converting a TSS public area into a SubjectPublicKeyInfo
    #[error("failed to get SubjectPublicKeyInfo from TSS Public: {0}")]
    SubjectPublicKeyInfoFromTSSPublicError(#[source] tss_esapi::Error),

    /// Error encoding a SubjectPublicKeyInfo to DER
    #[error("failed to encode SubjectPublicKeyInfo as DER: {0}")]
    SubjectPublicKeyInfoToDERError(#[source] picky_asn1_der::Asn1DerError),

    /// Error obtaining an OpenSSL key from DER
    #[error("failed to get public key from DER: {0}")]
    PublicKeyFromDERError(#[source] openssl::error::ErrorStack),

    /// Error encoding a public key as DER SubjectPublicKeyInfo
    #[error("failed to encode public key in DER format: {0}")]
    PublicKeyToDERError(#[source] openssl::error::ErrorStack),

    /// Key type with no PKIX encoding
    #[error("unsupported public key type (openssl id {0})")]
    UnsupportedKeyType(i32),
}

/// Load an X509 certificate in PEM format from file
pub fn load_x509_pem(input_cert_path: &Path) -> Result<X509, CryptoError> {
    let contents = std::fs::read(input_cert_path).map_err(|source| {
        CryptoError::IOReadError {
            path: input_cert_path.display().to_string(),
            source,
        }
    })?;

    X509::from_pem(&contents).map_err(CryptoError::X509FromPEMError)
}

/// Re-encode an EK certificate read from NVRAM.
///
/// NV indexes are commonly larger than the certificate they hold and padded
/// with trailing bytes. Parsing the outer DER element and serializing it again
/// drops the padding.
pub fn check_ek_cert(cert: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let parsed_cert: picky_asn1_der::Asn1RawDer =
        picky_asn1_der::from_bytes(cert).map_err(CryptoError::EKCertParsing)?;
    picky_asn1_der::to_vec(&parsed_cert).map_err(CryptoError::EKCertParsing)
}

/// Parse an EK certificate as found in TPM NVRAM
///
/// Falls back to the raw bytes when the content cannot be re-encoded.
pub fn parse_ek_cert(raw: &[u8]) -> Result<X509, CryptoError> {
    let der = match check_ek_cert(raw) {
        Ok(der) => der,
        Err(_) => {
            warn!("EK certificate in TPM NVRAM is not ASN.1 DER encoded");
            raw.to_vec()
        }
    };
    X509::from_der(&der).map_err(CryptoError::X509FromDERError)
}

/// Get the X509 certificate public key
pub fn x509_get_pubkey(cert: &X509) -> Result<PKey<Public>, CryptoError> {
    cert.public_key().map_err(CryptoError::X509GetPublicError)
}

/// Encode a public key as a DER SubjectPublicKeyInfo (PKIX)
///
/// Only RSA, EC and Ed25519 keys are accepted.
pub fn pubkey_to_der(pubkey: &PKey<Public>) -> Result<Vec<u8>, CryptoError> {
    match pubkey.id() {
        Id::RSA | Id::EC | Id::ED25519 => pubkey
            .public_key_to_der()
            .map_err(CryptoError::PublicKeyToDERError),
        other => Err(CryptoError::UnsupportedKeyType(other.as_raw())),
    }
}

/// Convert a TSS Public area into an OpenSSL public key
pub fn tss_pubkey_to_pkey(
    pubkey: tss_esapi::structures::Public,
) -> Result<PKey<Public>, CryptoError> {
    let key = SubjectPublicKeyInfo::try_from(pubkey)
        .map_err(CryptoError::SubjectPublicKeyInfoFromTSSPublicError)?;
    let key_der = picky_asn1_der::to_vec(&key)
        .map_err(CryptoError::SubjectPublicKeyInfoToDERError)?;
    PKey::public_key_from_der(&key_der)
        .map_err(CryptoError::PublicKeyFromDERError)
}

/// Calculate the hash of the input data using the given Message Digest algorithm
pub fn hash(
    data: &[u8],
    algorithm: MessageDigest,
) -> Result<Vec<u8>, CryptoError> {
    Ok(openssl::hash::hash(algorithm, data)
        .map_err(CryptoError::HashError)?
        .to_vec())
}


// Unit Testing
#[cfg(test)]
mod tests {
    use super::*;
    use testing::*;

    #[test]
    fn test_hash() {
        let input = "hello world!".as_bytes();
        let h = hash(input, MessageDigest::sha256());
        assert!(h.is_ok());
        let hex = hex::encode(h.unwrap()); //#[allow_ci]
        assert_eq!(hex, "7509e5bda0c762d2bac7f90d758b5b2263fa01ccbc542ab5e3df163be08e6ca9");
    }

    #[test]
    fn test_load_x509_pem() {
        let r = load_x509_pem(&test_data("ek-rsa.pem"));
        assert!(r.is_ok());

        let r = load_x509_pem(Path::new("/non_existing_path/ek.pem"));
        assert!(matches!(r, Err(CryptoError::IOReadError { .. })));
    }

    #[test]
    fn test_error_message_includes_cause() {
        let err = load_x509_pem(Path::new("/non_existing_path/ek.pem"))
            .unwrap_err(); //#[allow_ci]
        let msg = err.to_string();
        let prefix = "failed to read /non_existing_path/ek.pem: ";
        assert!(msg.starts_with(prefix));
        assert!(msg.len() > prefix.len());

        let err = parse_ek_cert(&[0x01, 0x02, 0x03]).unwrap_err(); //#[allow_ci]
        let msg = err.to_string();
        let prefix = "failed to parse X509 certificate from DER: ";
        assert!(msg.starts_with(prefix));
        assert!(msg.len() > prefix.len());
    }

    #[test]
    fn test_check_ek_cert_strips_padding() {
        let cert = load_x509_pem(&test_data("ek-rsa.pem")).unwrap(); //#[allow_ci]
        let der = cert.to_der().unwrap(); //#[allow_ci]

        let mut padded = der.clone();
        padded.extend_from_slice(&[0xff; 32]);

        let checked = check_ek_cert(&padded);
        assert!(checked.is_ok());
        assert_eq!(checked.unwrap(), der); //#[allow_ci]

        let parsed = parse_ek_cert(&padded).unwrap(); //#[allow_ci]
        assert_eq!(parsed.to_der().unwrap(), der); //#[allow_ci]
    }

    #[test]
    fn test_parse_ek_cert_garbage() {
        let r = parse_ek_cert(&[0x01, 0x02, 0x03]);
        assert!(matches!(r, Err(CryptoError::X509FromDERError(_))));
    }

    #[test]
    fn test_pubkey_to_der() {
        let rsa = rsa_generate(2048);
        let cert = ek_certificate(&rsa, "rsa");
        let pubkey = x509_get_pubkey(&cert).unwrap(); //#[allow_ci]
        let der = pubkey_to_der(&pubkey).unwrap(); //#[allow_ci]
        assert_eq!(der, rsa.public_key_to_der().unwrap()); //#[allow_ci]

        let ecc = ecc_generate();
        let cert = ek_certificate(&ecc, "ecc");
        let pubkey = x509_get_pubkey(&cert).unwrap(); //#[allow_ci]
        assert!(pubkey_to_der(&pubkey).is_ok());
    }

    #[test]
    fn test_pubkey_to_der_unsupported() {
        let dsa = dsa_generate();
        let der = dsa.public_key_to_der().unwrap(); //#[allow_ci]
        let pubkey = PKey::public_key_from_der(&der).unwrap(); //#[allow_ci]
        let r = pubkey_to_der(&pubkey);
        assert!(matches!(r, Err(CryptoError::UnsupportedKeyType(_))));
    }
}

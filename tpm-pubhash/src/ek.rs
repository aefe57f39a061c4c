// SPDX-License-Identifier: Apache-2.0
// Copyright 2024 TPM Pubhash Authors

use crate::{algorithms::KeyAlgorithm, error::Error};
use log::*;
use openssl::{
    pkey::{PKey, Public},
    x509::X509,
};
use std::convert::TryFrom;

/// An Endorsement Key as reported by the TPM.
///
/// `algorithm` is the EK template the entry was read for. The certificate,
/// when present, declares its own key algorithm, which is what selection
/// looks at.
#[derive(Clone, Debug)]
pub struct EndorsementKey {
    pub algorithm: KeyAlgorithm,
    pub certificate: Option<X509>,
    pub public: Option<PKey<Public>>,
    pub handle: Option<u32>,
}

impl EndorsementKey {
    /// EK provisioned with a manufacturer certificate
    pub fn with_certificate(
        algorithm: KeyAlgorithm,
        certificate: X509,
    ) -> Self {
        let public = certificate.public_key().ok();
        EndorsementKey {
            algorithm,
            certificate: Some(certificate),
            public,
            handle: None,
        }
    }

    /// EK found at a persistent handle, with no certificate in NVRAM
    pub fn without_certificate(
        algorithm: KeyAlgorithm,
        public: PKey<Public>,
        handle: u32,
    ) -> Self {
        EndorsementKey {
            algorithm,
            certificate: None,
            public: Some(public),
            handle: Some(handle),
        }
    }

    /// Public key algorithm declared by the certificate, if any
    pub fn certificate_algorithm(&self) -> Option<KeyAlgorithm> {
        let cert = self.certificate.as_ref()?;
        let pubkey = cert.public_key().ok()?;
        KeyAlgorithm::try_from(pubkey.id()).ok()
    }

    /// Size of the EK public key in bits, if known
    pub fn key_bits(&self) -> Option<u32> {
        self.public.as_ref().map(|key| key.bits())
    }

    /// Where the EK was read from
    pub fn location(&self) -> String {
        match (self.handle, &self.certificate) {
            (Some(handle), _) => format!("persistent handle {handle:#010x}"),
            (None, Some(_)) => "NV certificate".to_string(),
            (None, None) => "unknown location".to_string(),
        }
    }
}

/// Select the certificate to fingerprint.
///
/// Returns the certificate of the first entry, in the order given, that
/// carries a certificate whose public key is RSA.
pub fn select_rsa_certificate(
    eks: &[EndorsementKey],
) -> Result<&X509, Error> {
    for (idx, ek) in eks.iter().enumerate() {
        match (&ek.certificate, ek.certificate_algorithm()) {
            (Some(cert), Some(KeyAlgorithm::Rsa)) => {
                debug!(
                    "Selected EK #{idx} ({}, {}) for hashing",
                    ek.algorithm,
                    ek.location()
                );
                return Ok(cert);
            }
            (None, _) => debug!(
                "Skipping EK #{idx} ({}, {} bits, {}): no certificate",
                ek.algorithm,
                ek.key_bits().unwrap_or_default(),
                ek.location()
            ),
            (Some(_), alg) => debug!(
                "Skipping EK #{idx} ({}): certificate key is {alg:?}",
                ek.algorithm
            ),
        }
    }
    Err(Error::NotFound)
}

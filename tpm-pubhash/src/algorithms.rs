// SPDX-License-Identifier: Apache-2.0
// Copyright 2024 TPM Pubhash Authors
use openssl::pkey::Id;
use std::convert::TryFrom;
use std::fmt;
use thiserror::Error;
use tss_esapi::interface_types::algorithm::AsymmetricAlgorithm;

// This error needs to be public because we implement TryFrom for public types
#[derive(Error, Debug)]
pub enum AlgorithmError {
    #[error("Key algorithm {0} not supported")]
    UnsupportedKeyAlgorithm(String),
}

/// Public key algorithm of an Endorsement Key.
///
/// The TCG EK Credential Profile provisions one low-range EK per algorithm:
/// RSA 2048 and ECC NIST P-256. Those are the templates enumerated here.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    Rsa,
    Ecc,
}

impl KeyAlgorithm {
    /// Enumeration order used when reading EKs from the TPM
    pub const ALL: [KeyAlgorithm; 2] = [KeyAlgorithm::Rsa, KeyAlgorithm::Ecc];
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let value = match self {
            KeyAlgorithm::Rsa => "rsa",
            KeyAlgorithm::Ecc => "ecc",
        };
        write!(f, "{value}")
    }
}

impl TryFrom<Id> for KeyAlgorithm {
    type Error = AlgorithmError;

    // Only plain rsaEncryption keys count as RSA; RSA-PSS restricted keys
    // are reported as unsupported.
    fn try_from(id: Id) -> Result<Self, Self::Error> {
        match id {
            Id::RSA => Ok(KeyAlgorithm::Rsa),
            Id::EC => Ok(KeyAlgorithm::Ecc),
            other => Err(AlgorithmError::UnsupportedKeyAlgorithm(format!(
                "openssl id {}",
                other.as_raw()
            ))),
        }
    }
}

impl From<KeyAlgorithm> for AsymmetricAlgorithm {
    fn from(alg: KeyAlgorithm) -> Self {
        match alg {
            KeyAlgorithm::Rsa => AsymmetricAlgorithm::Rsa,
            KeyAlgorithm::Ecc => AsymmetricAlgorithm::Ecc,
        }
    }
}

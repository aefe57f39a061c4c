// SPDX-License-Identifier: Apache-2.0
// Copyright 2024 TPM Pubhash Authors

use thiserror::Error;

/// Broad classification of a failure, one per stage of the pipeline
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The TPM could not be opened or queried
    Device,
    /// No EK carries an RSA certificate
    NotFound,
    /// The selected public key could not be serialized for hashing
    Encoding,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("TPM error: {0}")]
    Device(#[from] crate::tpm::TpmError),
    #[error("could not find RSA public key")]
    NotFound,
    #[error("Public key encoding error: {0}")]
    Encoding(#[from] crate::crypto::CryptoError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Device(_) => ErrorKind::Device,
            Error::NotFound => ErrorKind::NotFound,
            Error::Encoding(_) => ErrorKind::Encoding,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

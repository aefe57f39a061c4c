// SPDX-License-Identifier: Apache-2.0
// Copyright 2024 TPM Pubhash Authors

pub mod algorithms;
pub mod crypto;
pub mod ek;
pub mod error;
pub mod hash_ek;
pub mod pubhash;
pub mod tpm;

pub use error::{Error, ErrorKind, Result};
pub use pubhash::{get_tpm_pubhash, run};

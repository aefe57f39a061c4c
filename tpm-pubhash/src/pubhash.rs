// SPDX-License-Identifier: Apache-2.0
// Copyright 2024 TPM Pubhash Authors

use crate::{
    ek::select_rsa_certificate,
    error::Result,
    hash_ek::hash_ek_pubkey,
    tpm::{OpenConfig, Tpm, TpmError, TpmSession},
};
use log::*;

/// Fingerprint the first RSA-certified Endorsement Key of an opened TPM
pub fn get_tpm_pubhash<T: Tpm + ?Sized>(tpm: &mut T) -> Result<String> {
    let eks = tpm.endorsement_keys()?;
    let cert = select_rsa_certificate(&eks)?;
    Ok(hash_ek_pubkey(cert)?)
}

/// Open the TPM with `open`, fingerprint it and close it again.
///
/// The TPM is closed on every path once `open` succeeded.
pub fn run<T, F>(config: &OpenConfig, open: F) -> Result<String>
where
    T: Tpm,
    F: FnOnce(&OpenConfig) -> std::result::Result<T, TpmError>,
{
    let mut session = TpmSession::new(open(config)?);
    debug!("TPM {} opened", config.tpm_version);
    get_tpm_pubhash(&mut *session)
}

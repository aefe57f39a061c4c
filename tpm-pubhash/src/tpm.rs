// SPDX-License-Identifier: Apache-2.0
// Copyright 2024 TPM Pubhash Authors

use crate::{algorithms::KeyAlgorithm, crypto, ek::EndorsementKey};
use log::*;
use std::{
    fmt,
    ops::{Deref, DerefMut},
    str::FromStr,
};
use thiserror::Error;
use openssl::pkey::{PKey, Public};
use tss_esapi::{
    abstraction::{ek, AsymmetricAlgorithmSelection},
    constants::CapabilityType,
    handles::{KeyHandle, PersistentTpmHandle, TpmHandle},
    interface_types::algorithm::AsymmetricAlgorithm,
    structures::CapabilityData,
    tcti_ldr::TctiNameConf,
};

/// NV index of the RSA 2048 EK certificate (TCG EK Credential Profile)
pub const RSA_EK_CERTIFICATE_NV_INDEX: u32 = 0x01c00002;
/// NV index of the ECC NIST P-256 EK certificate
pub const ECC_EK_CERTIFICATE_NV_INDEX: u32 = 0x01c0000a;
/// Persistent handle where the RSA EK is conventionally made resident
pub const RSA_EK_PERSISTENT_HANDLE: u32 = 0x81010001;
/// Persistent handle where the ECC EK is conventionally made resident
pub const ECC_EK_PERSISTENT_HANDLE: u32 = 0x81010002;

const EK_CERTIFICATE_NV_RANGE: (u32, u32) = (0x01c00002, 0x01c0000c);
const EK_PERSISTENT_RANGE: (u32, u32) = (0x81010001, 0x810100ff);

/// TpmError wraps all possible errors raised in tpm.rs
#[derive(Error, Debug)]
pub enum TpmError {
    /// Error parsing the TCTI configuration
    #[error("Error parsing TCTI configuration {path}: {source}")]
    TctiNameError {
        path: String,
        source: tss_esapi::Error,
    },

    /// Error creating a TCTI context
    #[error("Error creating TCTI context: {source}")]
    TSSTctiContextError { source: tss_esapi::Error },

    /// Requested TPM family is not supported by the TSS stack
    #[error("Unsupported TPM version: {0}")]
    UnsupportedVersion(TpmVersion),

    /// Error reading the TPM vendor properties
    #[error("Error reading TPM vendor: {source}")]
    TSSGetVendorError { source: tss_esapi::Error },

    /// Error listing handles
    #[error("Error listing TPM handles in range {first:#010x}-{last:#010x}: {source}")]
    TSSGetCapabilityError {
        first: u32,
        last: u32,
        source: tss_esapi::Error,
    },

    /// Error reading an EK certificate from NVRAM
    #[error("Error reading {alg} EK certificate from NVRAM: {source}")]
    TSSReadEKCertError {
        alg: KeyAlgorithm,
        source: tss_esapi::Error,
    },

    /// Error creating new persistent TPM handle
    #[error("Error creating handle for persistent TPM object in {handle:#010x}: {source}")]
    TSSNewPersistentHandleError {
        handle: u32,
        source: tss_esapi::Error,
    },

    /// Error creating handle from persistent TPM handle
    #[error("Error creating handle from persistent TPM handle {handle:#010x}: {source}")]
    TSSHandleFromPersistentHandleError {
        handle: u32,
        source: tss_esapi::Error,
    },

    /// Error returned in case of failure reading EK public information
    #[error("Error reading EK public info: {source}")]
    TSSReadPublicError { source: tss_esapi::Error },

    /// The TPM connection was already closed
    #[error("TPM connection is closed")]
    Closed,
}

type Result<T> = std::result::Result<T, TpmError>;

/// TPM family to talk to
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TpmVersion {
    Tpm12,
    Tpm20,
}

impl fmt::Display for TpmVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let value = match self {
            TpmVersion::Tpm12 => "1.2",
            TpmVersion::Tpm20 => "2.0",
        };
        write!(f, "{value}")
    }
}

/// Parameters used to open the TPM
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenConfig {
    pub tpm_version: TpmVersion,
    /// TCTI configuration string, e.g. `device:/dev/tpmrm0` or
    /// `swtpm:host=localhost,port=2321`
    pub tcti: Option<String>,
}

impl Default for OpenConfig {
    fn default() -> Self {
        OpenConfig {
            tpm_version: TpmVersion::Tpm20,
            tcti: None,
        }
    }
}

impl OpenConfig {
    /// Default configuration, taking the TCTI from the `TCTI` environment
    /// variable when set
    pub fn from_env() -> Self {
        OpenConfig {
            tcti: std::env::var("TCTI").ok().filter(|v| !v.is_empty()),
            ..Default::default()
        }
    }

    /// The TCTI to use: the configured one, else the in-kernel resource
    /// manager when present, else the raw device.
    pub fn resolve_tcti(&self) -> String {
        match &self.tcti {
            Some(tcti) => tcti.clone(),
            None => if std::path::Path::new("/dev/tpmrm0").exists() {
                "device:/dev/tpmrm0"
            } else {
                "device:/dev/tpm0"
            }
            .to_string(),
        }
    }
}

/// Operations needed from an opened TPM
pub trait Tpm {
    /// Endorsement Keys in device-reported order
    fn endorsement_keys(&mut self) -> Result<Vec<EndorsementKey>>;

    /// Release the connection to the device
    fn close(&mut self) -> Result<()>;
}

/// Owns an opened TPM and closes it when dropped.
///
/// Close failures are logged and otherwise ignored.
#[derive(Debug)]
pub struct TpmSession<T: Tpm> {
    tpm: T,
}

impl<T: Tpm> TpmSession<T> {
    pub fn new(tpm: T) -> Self {
        TpmSession { tpm }
    }
}

impl<T: Tpm> Deref for TpmSession<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.tpm
    }
}

impl<T: Tpm> DerefMut for TpmSession<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.tpm
    }
}

impl<T: Tpm> Drop for TpmSession<T> {
    fn drop(&mut self) {
        match self.tpm.close() {
            Ok(()) => debug!("TPM connection closed"),
            Err(e) => warn!("Failed to close TPM connection: {e}"),
        }
    }
}

/// Connection to a TPM 2.0 through the TSS Enhanced System API
#[derive(Debug)]
pub struct Context {
    inner: Option<tss_esapi::Context>,
}

impl Context {
    /// Opens a connection context.
    pub fn open(config: &OpenConfig) -> Result<Self> {
        if config.tpm_version != TpmVersion::Tpm20 {
            return Err(TpmError::UnsupportedVersion(config.tpm_version));
        }

        let tcti_path = config.resolve_tcti();
        debug!("Opening TPM using TCTI {tcti_path}");

        let tcti = TctiNameConf::from_str(&tcti_path).map_err(|error| {
            TpmError::TctiNameError {
                path: tcti_path.to_string(),
                source: error,
            }
        })?;

        let mut ctx = tss_esapi::Context::new(tcti)
            .map_err(|source| TpmError::TSSTctiContextError { source })?;

        // Only a TPM 2.0 answers the property query, so this doubles as a
        // version check
        let vendor = tss_esapi::utils::get_tpm_vendor(&mut ctx)
            .map_err(|source| TpmError::TSSGetVendorError { source })?;
        info!("TPM vendor: {}", vendor.trim());
        if vendor.contains("SW") {
            warn!("INSECURE: Using a software TPM emulator rather than a real hardware TPM.");
            warn!("INSECURE: The resulting fingerprint is NOT linked to a hardware root of trust.");
        }

        Ok(Context { inner: Some(ctx) })
    }

    fn inner(&mut self) -> Result<&mut tss_esapi::Context> {
        self.inner.as_mut().ok_or(TpmError::Closed)
    }
}

/// Raw access to the locations where Endorsement Keys are provisioned
trait EkStorage {
    /// Contents of the EK certificate NV index, `None` when undefined
    fn ek_certificate(&mut self, alg: KeyAlgorithm) -> Result<Option<Vec<u8>>>;

    /// Public key of the EK resident at the conventional persistent handle
    fn ek_public(
        &mut self,
        alg: KeyAlgorithm,
    ) -> Result<Option<(PKey<Public>, u32)>>;
}

/// Read the EKs of every algorithm, RSA first.
///
/// The NV certificate is used when present and parsable. Otherwise the
/// public area at the persistent handle yields a certificate-less entry.
/// Read failures are logged and skipped, and only returned when no
/// certificate could be read at all.
fn read_endorsement_keys<S: EkStorage + ?Sized>(
    storage: &mut S,
) -> Result<Vec<EndorsementKey>> {
    let mut eks = Vec::new();
    let mut first_error = None;

    for alg in KeyAlgorithm::ALL {
        match storage.ek_certificate(alg) {
            Ok(Some(raw)) => match crypto::parse_ek_cert(&raw) {
                Ok(cert) => {
                    eks.push(EndorsementKey::with_certificate(alg, cert));
                    continue;
                }
                Err(e) => {
                    warn!("Ignoring unparsable {alg} EK certificate: {e}")
                }
            },
            Ok(None) => warn!("No {alg} EK certificate found in TPM NVRAM"),
            Err(e) => {
                warn!("{e}");
                first_error.get_or_insert(e);
            }
        }

        match storage.ek_public(alg) {
            Ok(Some((public, handle))) => eks.push(
                EndorsementKey::without_certificate(alg, public, handle),
            ),
            Ok(None) => debug!("No resident {alg} EK"),
            Err(e) => {
                warn!("Ignoring {alg} EK public area: {e}");
                first_error.get_or_insert(e);
            }
        }
    }

    let certified = eks.iter().any(|ek| ek.certificate.is_some());
    match first_error {
        Some(e) if !certified => Err(e),
        _ => {
            info!("Found {} endorsement key(s)", eks.len());
            Ok(eks)
        }
    }
}

impl EkStorage for Context {
    fn ek_certificate(
        &mut self,
        alg: KeyAlgorithm,
    ) -> Result<Option<Vec<u8>>> {
        let nv_index = match alg {
            KeyAlgorithm::Rsa => RSA_EK_CERTIFICATE_NV_INDEX,
            KeyAlgorithm::Ecc => ECC_EK_CERTIFICATE_NV_INDEX,
        };
        let ctx = self.inner()?;

        let (first, last) = EK_CERTIFICATE_NV_RANGE;
        if !defined_handles(ctx, first, last)?.contains(&nv_index) {
            return Ok(None);
        }
        AsymmetricAlgorithmSelection::try_from(AsymmetricAlgorithm::from(alg))
            .and_then(|sel| ek::retrieve_ek_pubcert(ctx, sel))
            .map(Some)
            .map_err(|source| TpmError::TSSReadEKCertError { alg, source })
    }

    fn ek_public(
        &mut self,
        alg: KeyAlgorithm,
    ) -> Result<Option<(PKey<Public>, u32)>> {
        let persistent = match alg {
            KeyAlgorithm::Rsa => RSA_EK_PERSISTENT_HANDLE,
            KeyAlgorithm::Ecc => ECC_EK_PERSISTENT_HANDLE,
        };
        let ctx = self.inner()?;

        let (first, last) = EK_PERSISTENT_RANGE;
        if !defined_handles(ctx, first, last)?.contains(&persistent) {
            debug!("Persistent handle {persistent:#010x} is not defined");
            return Ok(None);
        }

        let tpm_handle = TpmHandle::Persistent(
            PersistentTpmHandle::new(persistent).map_err(|source| {
                TpmError::TSSNewPersistentHandleError {
                    handle: persistent,
                    source,
                }
            })?,
        );
        let object = ctx
            .execute_without_session(|ctx| ctx.tr_from_tpm_public(tpm_handle))
            .map_err(|source| TpmError::TSSHandleFromPersistentHandleError {
                handle: persistent,
                source,
            })?;
        let (tpm_pub, _, _) = ctx
            .read_public(KeyHandle::from(object))
            .map_err(|source| TpmError::TSSReadPublicError { source })?;

        match crypto::tss_pubkey_to_pkey(tpm_pub) {
            Ok(public) => Ok(Some((public, persistent))),
            Err(e) => {
                warn!("Ignoring {alg} EK at {persistent:#010x}: {e}");
                Ok(None)
            }
        }
    }
}

impl Tpm for Context {
    fn endorsement_keys(&mut self) -> Result<Vec<EndorsementKey>> {
        read_endorsement_keys(self)
    }

    fn close(&mut self) -> Result<()> {
        match self.inner.take() {
            // Dropping the ESAPI context finalizes it and its TCTI
            Some(ctx) => {
                drop(ctx);
                Ok(())
            }
            None => Err(TpmError::Closed),
        }
    }
}

/// List the handles defined in the inclusive range `first..=last`
fn defined_handles(
    context: &mut tss_esapi::Context,
    first: u32,
    last: u32,
) -> Result<Vec<u32>> {
    let (capabilities, _) = context
        .get_capability(CapabilityType::Handles, first, last - first + 1)
        .map_err(|source| TpmError::TSSGetCapabilityError {
            first,
            last,
            source,
        })?;

    let handles = match capabilities {
        CapabilityData::Handles(handle_list) => handle_list
            .iter()
            .map(|handle| u32::from(*handle))
            .filter(|handle| (first..=last).contains(handle))
            .collect(),
        _ => Vec::new(),
    };
    Ok(handles)
}

//! Update transfer: identity check, then checksummed firmware upload.
//!
//! Nothing here retries. Identity is always confirmed before the firmware
//! file is even opened, and the checksum sent is the one computed from the
//! bytes sent.

use std::path::Path;

use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::error::{OtaError, TransferStep};
use crate::events::{OtaEvent, OtaObserver, OtaPhase};
use crate::firmware::FirmwareImage;
use crate::http::{DeviceClient, HttpError};

/// Device update endpoint.
pub const UPDATE_PATH: &str = "/update";
/// Device identity sub-endpoint.
pub const IDENTITY_PATH: &str = "/update/identity";

/// Identity payload served by the device.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceIdentity {
    pub id: String,
}

/// What the device said about an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub status: u16,
    pub reason: Option<String>,
    pub body: String,
    pub md5: String,
    pub size: usize,
}

impl UploadReport {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Terminal state of a transfer that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Firmware was sent; the device's answer is attached.
    Uploaded(UploadReport),
    /// Identity verified but no firmware path was given.
    NothingToFlash { device_id: String },
}

impl TransferOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            TransferOutcome::Uploaded(_) => 0,
            TransferOutcome::NothingToFlash { .. } => 2,
        }
    }
}

/// GET the device's identity.
#[instrument(skip(client), fields(host = %client.host()))]
pub fn fetch_identity<C: DeviceClient + ?Sized>(client: &C) -> Result<DeviceIdentity, OtaError> {
    let host = client.host();
    let response = client
        .get(IDENTITY_PATH)
        .map_err(|e| OtaError::http(TransferStep::Identity, host, e))?;

    if !response.is_success() {
        return Err(OtaError::http(
            TransferStep::Identity,
            host,
            HttpError::Status {
                url: client.url(IDENTITY_PATH),
                status: response.status,
                body: response.body,
            },
        ));
    }

    serde_json::from_str(&response.body).map_err(|e| OtaError::InvalidIdentity {
        host: host.to_string(),
        message: e.to_string(),
    })
}

/// Compare the reported identity with the expected one, if any.
pub fn verify_identity(expected: Option<&str>, identity: &DeviceIdentity) -> Result<(), OtaError> {
    match expected {
        Some(wanted) if wanted != identity.id => Err(OtaError::IdentityMismatch {
            wanted: wanted.to_string(),
            got: identity.id.clone(),
        }),
        _ => Ok(()),
    }
}

/// POST `image` with its checksum. Any HTTP status is returned as-is.
#[instrument(skip(client, image), fields(host = %client.host(), size = image.len()))]
pub fn upload<C: DeviceClient + ?Sized>(
    client: &C,
    image: &FirmwareImage,
) -> Result<UploadReport, OtaError> {
    let response = client
        .post_multipart(UPDATE_PATH, &image.to_form())
        .map_err(|e| OtaError::http(TransferStep::Upload, client.host(), e))?;

    if !response.is_success() {
        warn!(status = response.status, "Device did not accept the upload");
    }

    Ok(UploadReport {
        status: response.status,
        reason: response.reason,
        body: response.body,
        md5: image.md5_hex().to_string(),
        size: image.len(),
    })
}

/// Run the full transfer against an already known address.
pub fn transfer<C, O>(
    client: &C,
    observer: &O,
    expected_id: Option<&str>,
    firmware_path: Option<&Path>,
) -> Result<TransferOutcome, OtaError>
where
    C: DeviceClient + ?Sized,
    O: OtaObserver + ?Sized,
{
    transfer_from(OtaPhase::Starting, client, observer, expected_id, firmware_path)
}

/// As [`transfer`], for a run that is already in phase `from`.
#[instrument(skip(client, observer), fields(host = %client.host()))]
pub fn transfer_from<C, O>(
    from: OtaPhase,
    client: &C,
    observer: &O,
    expected_id: Option<&str>,
    firmware_path: Option<&Path>,
) -> Result<TransferOutcome, OtaError>
where
    C: DeviceClient + ?Sized,
    O: OtaObserver + ?Sized,
{
    observer.on_event(&OtaEvent::PhaseChanged {
        from,
        to: OtaPhase::VerifyingIdentity,
    });

    let identity = fetch_identity(client)?;
    verify_identity(expected_id, &identity)?;
    info!(device_id = %identity.id, "Identity verified");
    observer.on_event(&OtaEvent::IdentityVerified {
        device_id: identity.id.clone(),
    });

    let Some(path) = firmware_path else {
        observer.on_event(&OtaEvent::NoFirmware);
        return Ok(TransferOutcome::NothingToFlash {
            device_id: identity.id,
        });
    };

    observer.on_event(&OtaEvent::PhaseChanged {
        from: OtaPhase::VerifyingIdentity,
        to: OtaPhase::LoadingFirmware,
    });
    let image = FirmwareImage::load(path).map_err(|source| OtaError::FirmwareRead {
        path: path.to_path_buf(),
        source,
    })?;
    observer.on_event(&OtaEvent::FirmwareLoaded {
        path: image.path().to_path_buf(),
        size: image.len(),
        md5: image.md5_hex().to_string(),
    });

    observer.on_event(&OtaEvent::PhaseChanged {
        from: OtaPhase::LoadingFirmware,
        to: OtaPhase::Uploading,
    });
    let report = upload(client, &image)?;
    observer.on_event(&OtaEvent::UploadResponse {
        status: report.status,
        reason: report.reason.clone(),
        body: report.body.clone(),
    });

    observer.on_event(&OtaEvent::PhaseChanged {
        from: OtaPhase::Uploading,
        to: OtaPhase::Complete,
    });
    Ok(TransferOutcome::Uploaded(report))
}

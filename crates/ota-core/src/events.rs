//! Event system for UI decoupling.
//!
//! Lets the CLI (or anything else) follow an update run without the core
//! printing anything itself.

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

/// Update run phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaPhase {
    /// Validating the requested target.
    Starting,
    /// Browsing mDNS for the device.
    Resolving,
    /// Asking the device who it is.
    VerifyingIdentity,
    /// Reading and hashing the image.
    LoadingFirmware,
    /// Sending the image.
    Uploading,
    /// Run finished.
    Complete,
}

impl fmt::Display for OtaPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OtaPhase::Starting => write!(f, "Starting"),
            OtaPhase::Resolving => write!(f, "Resolving"),
            OtaPhase::VerifyingIdentity => write!(f, "Verifying Identity"),
            OtaPhase::LoadingFirmware => write!(f, "Loading Firmware"),
            OtaPhase::Uploading => write!(f, "Uploading"),
            OtaPhase::Complete => write!(f, "Complete"),
        }
    }
}

/// Events emitted during an update run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtaEvent {
    PhaseChanged { from: OtaPhase, to: OtaPhase },
    /// mDNS resolved the identifier.
    DeviceResolved { device_id: String, address: IpAddr },
    /// The device reported the expected identity (or none was expected).
    IdentityVerified { device_id: String },
    /// No image given; the run stops after the identity check.
    NoFirmware,
    FirmwareLoaded {
        path: PathBuf,
        size: usize,
        md5: String,
    },
    /// The device's answer to the upload, verbatim.
    UploadResponse {
        status: u16,
        reason: Option<String>,
        body: String,
    },
}

/// Observer trait for receiving update events.
pub trait OtaObserver: Send + Sync {
    fn on_event(&self, event: &OtaEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl OtaObserver for NullObserver {
    fn on_event(&self, _event: &OtaEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl OtaObserver for TracingObserver {
    fn on_event(&self, event: &OtaEvent) {
        match event {
            OtaEvent::PhaseChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "Phase changed");
            }
            OtaEvent::DeviceResolved { device_id, address } => {
                tracing::info!(device_id = %device_id, address = %address, "Device resolved");
            }
            OtaEvent::IdentityVerified { device_id } => {
                tracing::info!(device_id = %device_id, "Identity verified");
            }
            OtaEvent::NoFirmware => {
                tracing::warn!("No firmware file specified");
            }
            OtaEvent::FirmwareLoaded { path, size, md5 } => {
                tracing::info!(path = %path.display(), size, md5 = %md5, "Firmware loaded");
            }
            OtaEvent::UploadResponse { status, body, .. } => {
                if (200..300).contains(status) {
                    tracing::info!(status, "Upload answered");
                } else {
                    tracing::warn!(status, body = %body, "Upload rejected by device");
                }
            }
        }
    }
}

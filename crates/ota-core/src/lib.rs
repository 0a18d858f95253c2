//! OTA-Core: network firmware updates for ESP devices.
//!
//! Finds a device on the local network by its logical identifier, checks
//! that the device at that address really is the expected one, and uploads a
//! firmware image together with its MD5 so the device can verify it.
//!
//! # Architecture
//!
//! - **Discovery**: mDNS service browsing abstraction (mdns-sd, mock)
//! - **Resolver**: identifier to address, first match wins, bounded wait
//! - **HTTP**: digest-authenticated device client abstraction (reqwest, mock)
//! - **Transfer**: identity check, then checksummed multipart upload
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: Configuration and high-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use ota_core::session::{UpdateConfig, UpdateSession};
//!
//! let config = UpdateConfig {
//!     device_id: Some("a1b2c3".to_string()),
//!     firmware_path: Some("firmware.bin".into()),
//!     ..Default::default()
//! };
//!
//! let outcome = UpdateSession::new(config).run().expect("OTA failed");
//! std::process::exit(outcome.exit_code());
//! ```

pub mod discovery;
pub mod error;
pub mod events;
pub mod firmware;
pub mod http;
pub mod resolver;
pub mod session;
pub mod transfer;

// Re-exports for convenience
pub use discovery::{MdnsBrowser, MockBrowser, ServiceAdvertisement, ServiceBrowser};
pub use error::{OtaError, TransferStep};
pub use events::{NullObserver, OtaEvent, OtaObserver, OtaPhase, TracingObserver};
pub use firmware::FirmwareImage;
pub use http::{DeviceClient, DigestClient, HttpError, MockDeviceClient};
pub use resolver::{DEFAULT_TIMEOUT, ResolveError, resolve};
pub use session::{UpdateConfig, UpdateSession};
pub use transfer::{DeviceIdentity, TransferOutcome, UploadReport, transfer, transfer_from};

//! Service discovery abstraction.
//!
//! Defines the `ServiceBrowser` trait the resolver browses through,
//! allowing different implementations (mdns-sd, mock, etc.).

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

use thiserror::Error;

/// Well-known service type advertised by the device's HTTP server.
pub const HTTP_SERVICE_TYPE: &str = "_http._tcp.local.";

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to start mDNS daemon: {0}")]
    DaemonFailed(String),

    #[error("Failed to browse {service_type}: {message}")]
    BrowseFailed {
        service_type: String,
        message: String,
    },
}

/// One resolved service advertisement, valid for a single notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceAdvertisement {
    /// Instance name without the service type suffix.
    pub instance_name: String,
    /// Resolved addresses, in preference order.
    pub addresses: Vec<IpAddr>,
    /// Text record properties, already decoded.
    pub properties: BTreeMap<String, String>,
}

impl ServiceAdvertisement {
    pub fn new(instance_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            ..Default::default()
        }
    }

    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.addresses.push(address);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Insert a property from raw text-record bytes.
    pub fn with_raw_property(mut self, key: &[u8], value: &[u8]) -> Self {
        self.properties.insert(decode_lossy(key), decode_lossy(value));
        self
    }

    pub fn first_address(&self) -> Option<IpAddr> {
        self.addresses.first().copied()
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Decode text-record bytes as UTF-8, replacing malformed sequences.
pub fn decode_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Receives browse notifications.
///
/// Backends call these from their own threads, possibly concurrently.
pub trait ServiceListener: Send + Sync {
    fn service_added(&self, advertisement: ServiceAdvertisement);

    fn service_removed(&self, _instance_name: &str) {}
}

/// Abstract service browser.
///
/// `browse` starts delivering notifications to `listener` and returns a
/// session guard. Dropping the guard stops the browse and releases every
/// resource the backend holds for it.
pub trait ServiceBrowser {
    type Session;

    fn browse(
        &self,
        service_type: &str,
        listener: Arc<dyn ServiceListener>,
    ) -> Result<Self::Session, DiscoveryError>;
}

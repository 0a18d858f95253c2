//! Update session - high-level orchestrator for one OTA run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::discovery::{MdnsBrowser, ServiceBrowser};
use crate::error::{OtaError, TransferStep};
use crate::events::{OtaEvent, OtaObserver, OtaPhase, TracingObserver};
use crate::http::{DeviceClient, DigestClient, HttpError};
use crate::resolver::{self, DEFAULT_TIMEOUT};
use crate::transfer::{self, TransferOutcome};

/// Default digest user when none is configured.
pub const DEFAULT_USER: &str = "ota";

/// Configuration for an update run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Firmware image to upload.
    pub firmware_path: Option<PathBuf>,
    /// Logical device identifier (`espid`).
    pub device_id: Option<String>,
    /// Device address; skips discovery when set.
    pub host: Option<String>,
    /// Digest auth user.
    pub user: String,
    /// Digest auth password.
    pub password: String,
    /// How long to browse mDNS, in seconds.
    pub discovery_timeout_secs: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            firmware_path: None,
            device_id: None,
            host: None,
            user: DEFAULT_USER.to_string(),
            password: String::new(),
            discovery_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

/// Where the device is, as far as the configuration knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target<'a> {
    /// Address given directly.
    Host(&'a str),
    /// Only the identifier is known; resolve it first.
    Discover(&'a str),
}

impl UpdateConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: UpdateConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    /// Decide the target. A host wins over an identifier.
    pub fn target(&self) -> Result<Target<'_>, OtaError> {
        match (non_empty(&self.host), non_empty(&self.device_id)) {
            (Some(host), _) => Ok(Target::Host(host)),
            (None, Some(id)) => Ok(Target::Discover(id)),
            (None, None) => Err(OtaError::MissingTarget),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Update session - resolves the device if needed, then runs the transfer.
pub struct UpdateSession<O: OtaObserver> {
    config: UpdateConfig,
    observer: Arc<O>,
}

impl UpdateSession<TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(config: UpdateConfig) -> Self {
        Self::with_observer(config, Arc::new(TracingObserver))
    }
}

impl<O: OtaObserver> UpdateSession<O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(config: UpdateConfig, observer: Arc<O>) -> Self {
        Self { config, observer }
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Run against the network: mDNS discovery and digest-authenticated HTTP.
    pub fn run(&self) -> Result<TransferOutcome, OtaError> {
        let user = self.config.user.clone();
        let password = self.config.password.clone();
        self.run_with(&MdnsBrowser::new(), |host| {
            DigestClient::new(host, user.as_str(), password.as_str())
        })
    }

    /// Run with explicit backends. `connect` builds a client for the host.
    #[instrument(skip_all)]
    pub fn run_with<B, C, F>(&self, browser: &B, connect: F) -> Result<TransferOutcome, OtaError>
    where
        B: ServiceBrowser,
        C: DeviceClient,
        F: FnOnce(&str) -> Result<C, HttpError>,
    {
        let (host, phase) = self.target_host(browser)?;

        let client =
            connect(&host).map_err(|e| OtaError::http(TransferStep::Connect, &host, e))?;

        transfer::transfer_from(
            phase,
            &client,
            self.observer.as_ref(),
            non_empty(&self.config.device_id),
            self.config
                .firmware_path
                .as_deref()
                .filter(|p| !p.as_os_str().is_empty()),
        )
    }

    /// Address to talk to: the configured host, or the resolved identifier.
    /// Also returns the phase the run is left in.
    fn target_host<B: ServiceBrowser>(&self, browser: &B) -> Result<(String, OtaPhase), OtaError> {
        match self.config.target()? {
            Target::Host(host) => {
                info!(host, "Using configured host");
                Ok((host.to_string(), OtaPhase::Starting))
            }
            Target::Discover(device_id) => {
                self.observer.on_event(&OtaEvent::PhaseChanged {
                    from: OtaPhase::Starting,
                    to: OtaPhase::Resolving,
                });

                let address =
                    resolver::resolve(browser, device_id, self.config.discovery_timeout())?;

                self.observer.on_event(&OtaEvent::DeviceResolved {
                    device_id: device_id.to_string(),
                    address,
                });
                Ok((address.to_string(), OtaPhase::Resolving))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{MockBrowser, ServiceAdvertisement};
    use crate::events::NullObserver;
    use crate::http::{MockDeviceClient, RequestMethod};
    use crate::resolver::ResolveError;
    use crate::transfer::UPDATE_PATH;
    use std::io::Write;
    use std::sync::Mutex;

    fn session(config: UpdateConfig) -> UpdateSession<NullObserver> {
        UpdateSession::with_observer(config, Arc::new(NullObserver))
    }

    #[test]
    fn test_default_config() {
        let config = UpdateConfig::default();
        assert_eq!(config.user, "ota");
        assert_eq!(config.password, "");
        assert_eq!(config.discovery_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_config_toml_roundtrip_with_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ota.toml");
        std::fs::write(&path, "device_id = \"abc123\"\npassword = \"pw\"\n").unwrap();

        let config = UpdateConfig::load_from_file(&path).unwrap();
        assert_eq!(config.device_id.as_deref(), Some("abc123"));
        assert_eq!(config.password, "pw");
        assert_eq!(config.user, "ota");

        config.save_to_file(&path).unwrap();
        assert_eq!(UpdateConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_target_selection() {
        let mut config = UpdateConfig::default();
        assert!(matches!(config.target(), Err(OtaError::MissingTarget)));

        config.device_id = Some("abc123".into());
        assert_eq!(config.target().unwrap(), Target::Discover("abc123"));

        config.host = Some("192.168.1.50".into());
        assert_eq!(config.target().unwrap(), Target::Host("192.168.1.50"));

        config.host = Some(String::new());
        assert_eq!(config.target().unwrap(), Target::Discover("abc123"));
    }

    #[test]
    fn test_missing_target_touches_nothing() {
        let browser = MockBrowser::new();
        let err = session(UpdateConfig::default())
            .run_with(&browser, |_| -> Result<MockDeviceClient, HttpError> {
                panic!("must not connect")
            })
            .unwrap_err();

        assert!(matches!(err, OtaError::MissingTarget));
        assert_eq!(browser.sessions_opened(), 0);
    }

    #[test]
    fn test_direct_host_skips_discovery() {
        let browser = MockBrowser::new();
        let config = UpdateConfig {
            host: Some("192.168.1.50".into()),
            device_id: Some("xyz".into()),
            ..Default::default()
        };

        let outcome = session(config)
            .run_with(&browser, |host| {
                assert_eq!(host, "192.168.1.50");
                Ok(MockDeviceClient::with_identity(host, "xyz"))
            })
            .unwrap();

        assert_eq!(outcome.exit_code(), 2);
        assert_eq!(browser.sessions_opened(), 0);
    }

    #[test]
    fn test_resolved_address_feeds_transfer() {
        let browser = MockBrowser::new();
        browser.advertise(
            ServiceAdvertisement::new("kitchen-sensor-abc123")
                .with_address("10.0.0.5".parse().unwrap()),
        );

        let mut fw = tempfile::NamedTempFile::new().unwrap();
        fw.write_all(b"firmware").unwrap();

        let config = UpdateConfig {
            device_id: Some("abc123".into()),
            firmware_path: Some(fw.path().to_path_buf()),
            ..Default::default()
        };

        let connected = Mutex::new(None);
        let outcome = session(config)
            .run_with(&browser, |host| {
                *connected.lock().unwrap() = Some(host.to_string());
                Ok(MockDeviceClient::with_identity(host, "abc123"))
            })
            .unwrap();

        assert_eq!(connected.lock().unwrap().as_deref(), Some("10.0.0.5"));
        assert!(matches!(outcome, TransferOutcome::Uploaded(_)));
        assert_eq!(browser.sessions_closed(), 1);
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<OtaEvent>>);

    impl OtaObserver for Recorder {
        fn on_event(&self, event: &OtaEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    fn phase_changes(recorder: &Recorder) -> Vec<(OtaPhase, OtaPhase)> {
        recorder
            .0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                OtaEvent::PhaseChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_phase_changes_chain_after_discovery() {
        let browser = MockBrowser::new();
        browser.advertise(
            ServiceAdvertisement::new("esp-abc123").with_address("10.0.0.5".parse().unwrap()),
        );
        let config = UpdateConfig {
            device_id: Some("abc123".into()),
            ..Default::default()
        };
        let recorder = Arc::new(Recorder::default());

        UpdateSession::with_observer(config, recorder.clone())
            .run_with(&browser, |host| Ok(MockDeviceClient::with_identity(host, "abc123")))
            .unwrap();

        assert_eq!(
            phase_changes(&recorder),
            vec![
                (OtaPhase::Starting, OtaPhase::Resolving),
                (OtaPhase::Resolving, OtaPhase::VerifyingIdentity),
            ]
        );
    }

    #[test]
    fn test_phase_changes_with_direct_host() {
        let config = UpdateConfig {
            host: Some("192.168.1.50".into()),
            ..Default::default()
        };
        let recorder = Arc::new(Recorder::default());

        UpdateSession::with_observer(config, recorder.clone())
            .run_with(&MockBrowser::new(), |host| {
                Ok(MockDeviceClient::with_identity(host, "xyz"))
            })
            .unwrap();

        assert_eq!(
            phase_changes(&recorder),
            vec![(OtaPhase::Starting, OtaPhase::VerifyingIdentity)]
        );
    }

    #[test]
    fn test_resolution_timeout_is_fatal() {
        let browser = MockBrowser::new();
        let config = UpdateConfig {
            device_id: Some("abc123".into()),
            discovery_timeout_secs: 0,
            ..Default::default()
        };

        let err = session(config)
            .run_with(&browser, |_| -> Result<MockDeviceClient, HttpError> {
                panic!("must not connect")
            })
            .unwrap_err();

        assert!(matches!(err, OtaError::Resolve(ResolveError::Timeout { .. })));
    }

    #[test]
    fn test_connect_failure() {
        let config = UpdateConfig {
            host: Some("192.168.1.50".into()),
            ..Default::default()
        };

        let err = session(config)
            .run_with(&MockBrowser::new(), |_| -> Result<MockDeviceClient, HttpError> {
                Err(HttpError::ClientInit("no tls backend".into()))
            })
            .unwrap_err();

        assert!(matches!(
            err,
            OtaError::Http {
                step: TransferStep::Connect,
                ..
            }
        ));
    }

    #[test]
    fn test_mismatch_through_session() {
        let config = UpdateConfig {
            host: Some("192.168.1.50".into()),
            device_id: Some("abc".into()),
            firmware_path: Some("fw.bin".into()),
            ..Default::default()
        };

        let device = Arc::new(MockDeviceClient::with_identity("192.168.1.50", "xyz"));
        let err = session(config)
            .run_with(&MockBrowser::new(), |_| Ok(device.clone()))
            .unwrap_err();

        assert!(matches!(err, OtaError::IdentityMismatch { .. }));
        assert!(device.requests_to(RequestMethod::Post, UPDATE_PATH).is_empty());
    }
}

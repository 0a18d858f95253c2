//! mdns-sd based service browser.

use std::net::IpAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tracing::{debug, instrument, trace, warn};

use super::traits::{
    DiscoveryError, ServiceAdvertisement, ServiceBrowser, ServiceListener, decode_lossy,
};

/// Browser backed by a private mDNS daemon per session.
#[derive(Debug, Default, Clone, Copy)]
pub struct MdnsBrowser;

impl MdnsBrowser {
    pub fn new() -> Self {
        Self
    }
}

/// Running browse. Stops the query and shuts the daemon down on drop.
pub struct MdnsSession {
    daemon: ServiceDaemon,
    service_type: String,
    pump: Option<JoinHandle<()>>,
}

impl ServiceBrowser for MdnsBrowser {
    type Session = MdnsSession;

    #[instrument(level = "debug", skip(self, listener))]
    fn browse(
        &self,
        service_type: &str,
        listener: Arc<dyn ServiceListener>,
    ) -> Result<MdnsSession, DiscoveryError> {
        let daemon =
            ServiceDaemon::new().map_err(|e| DiscoveryError::DaemonFailed(e.to_string()))?;

        let receiver = match daemon.browse(service_type) {
            Ok(r) => r,
            Err(e) => {
                shutdown_daemon(&daemon);
                return Err(DiscoveryError::BrowseFailed {
                    service_type: service_type.to_string(),
                    message: e.to_string(),
                });
            }
        };

        let ty = service_type.to_string();
        let pump = thread::Builder::new()
            .name("mdns-browse".into())
            .spawn(move || {
                while let Ok(event) = receiver.recv() {
                    match event {
                        ServiceEvent::ServiceResolved(info) => {
                            listener.service_added(advertisement_from_info(&info, &ty));
                        }
                        ServiceEvent::ServiceRemoved(_, fullname) => {
                            listener.service_removed(instance_name(&fullname, &ty));
                        }
                        ServiceEvent::SearchStopped(_) => break,
                        other => trace!(event = ?other, "mDNS event"),
                    }
                }
                debug!("mDNS browse pump exited");
            });

        let pump = match pump {
            Ok(handle) => handle,
            Err(e) => {
                shutdown_daemon(&daemon);
                return Err(DiscoveryError::DaemonFailed(e.to_string()));
            }
        };

        debug!(service_type, "mDNS browse started");
        Ok(MdnsSession {
            daemon,
            service_type: service_type.to_string(),
            pump: Some(pump),
        })
    }
}

impl Drop for MdnsSession {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.stop_browse(&self.service_type) {
            warn!(error = %e, "Failed to stop mDNS browse");
        }
        shutdown_daemon(&self.daemon);
        if let Some(pump) = self.pump.take()
            && pump.join().is_err()
        {
            warn!("mDNS browse pump panicked");
        }
        debug!(service_type = %self.service_type, "mDNS browse closed");
    }
}

fn shutdown_daemon(daemon: &ServiceDaemon) {
    if let Err(e) = daemon.shutdown() {
        warn!(error = %e, "Failed to shut down mDNS daemon");
    }
}

/// Convert a resolved mdns-sd record into the backend-neutral form.
fn advertisement_from_info(info: &ServiceInfo, service_type: &str) -> ServiceAdvertisement {
    let mut advertisement = ServiceAdvertisement::new(instance_name(info.get_fullname(), service_type));
    advertisement.addresses = ordered_addresses(info.get_addresses().iter().copied());

    for property in info.get_properties().iter() {
        let value = property.val().map(decode_lossy).unwrap_or_default();
        advertisement
            .properties
            .insert(property.key().to_string(), value);
    }

    advertisement
}

/// Strip `.<service_type>` from a full service name.
fn instance_name<'a>(fullname: &'a str, service_type: &str) -> &'a str {
    fullname
        .strip_suffix(service_type)
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or(fullname)
}

/// IPv4 before IPv6, each ascending. mdns-sd hands addresses back unordered.
fn ordered_addresses(addresses: impl Iterator<Item = IpAddr>) -> Vec<IpAddr> {
    let mut addresses: Vec<IpAddr> = addresses.collect();
    addresses.sort_by_key(|addr| (addr.is_ipv6(), *addr));
    addresses
}

//! Device resolver: logical device identifier to network address.
//!
//! Browses `_http._tcp` advertisements and commits to the first one that
//! identifies the wanted device. Match rules are checked in a fixed order:
//!
//! 1. the `espid` text property equals the identifier
//! 2. the instance name ends with `-<identifier>`
//! 3. the `name` text property ends with `-<identifier>`
//!
//! Removal notifications are ignored and a committed address is never
//! replaced.

use std::net::IpAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, trace};

use crate::discovery::{
    DiscoveryError, HTTP_SERVICE_TYPE, ServiceAdvertisement, ServiceBrowser, ServiceListener,
};

/// Default time to wait for a matching advertisement.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Device identifier must not be empty")]
    EmptyIdentifier,

    #[error("No device advertising '{identifier}' found within {}s", .timeout.as_secs_f32())]
    Timeout {
        identifier: String,
        timeout: Duration,
    },

    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
}

/// A named match predicate.
pub struct MatchRule {
    pub name: &'static str,
    pub matches: fn(&ServiceAdvertisement, &str) -> bool,
}

/// Match rules in priority order. The first rule that matches wins.
pub const MATCH_RULES: &[MatchRule] = &[
    MatchRule {
        name: "espid-property",
        matches: espid_property_equals,
    },
    MatchRule {
        name: "instance-name-suffix",
        matches: instance_name_has_suffix,
    },
    MatchRule {
        name: "name-property-suffix",
        matches: name_property_has_suffix,
    },
];

fn espid_property_equals(advertisement: &ServiceAdvertisement, identifier: &str) -> bool {
    advertisement.property("espid") == Some(identifier)
}

fn instance_name_has_suffix(advertisement: &ServiceAdvertisement, identifier: &str) -> bool {
    has_id_suffix(&advertisement.instance_name, identifier)
}

fn name_property_has_suffix(advertisement: &ServiceAdvertisement, identifier: &str) -> bool {
    advertisement
        .property("name")
        .is_some_and(|name| has_id_suffix(name, identifier))
}

fn has_id_suffix(name: &str, identifier: &str) -> bool {
    name.strip_suffix(identifier)
        .is_some_and(|rest| rest.ends_with('-'))
}

/// Return the first rule that matches `advertisement`, if any.
pub fn matching_rule(
    advertisement: &ServiceAdvertisement,
    identifier: &str,
) -> Option<&'static MatchRule> {
    MATCH_RULES
        .iter()
        .find(|rule| (rule.matches)(advertisement, identifier))
}

/// Listener that commits the address of the first matching advertisement.
///
/// The result slot is written at most once; notifications racing a commit,
/// or arriving after it, are dropped.
pub struct DeviceFinder {
    identifier: String,
    found: OnceLock<IpAddr>,
    notify: flume::Sender<IpAddr>,
}

impl DeviceFinder {
    /// Create a finder plus the receiver that is signalled on commit.
    pub fn new(identifier: impl Into<String>) -> (Self, flume::Receiver<IpAddr>) {
        let (notify, committed) = flume::bounded(1);
        let finder = Self {
            identifier: identifier.into(),
            found: OnceLock::new(),
            notify,
        };
        (finder, committed)
    }

    /// The committed address, if any.
    pub fn committed(&self) -> Option<IpAddr> {
        self.found.get().copied()
    }
}

impl ServiceListener for DeviceFinder {
    fn service_added(&self, advertisement: ServiceAdvertisement) {
        if self.found.get().is_some() {
            return;
        }

        let Some(address) = advertisement.first_address() else {
            trace!(instance = %advertisement.instance_name, "Advertisement has no addresses");
            return;
        };

        let Some(rule) = matching_rule(&advertisement, &self.identifier) else {
            trace!(instance = %advertisement.instance_name, "Advertisement does not match");
            return;
        };

        if self.found.set(address).is_ok() {
            info!(
                instance = %advertisement.instance_name,
                %address,
                rule = rule.name,
                "Device matched"
            );
            // Capacity 1 and a single successful set, so this never blocks.
            let _ = self.notify.send(address);
        }
    }
}

/// Resolve `identifier` to an address, waiting at most `timeout`.
///
/// The browse session is dropped, and thereby closed, before returning.
#[instrument(skip(browser), fields(timeout_ms = timeout.as_millis() as u64))]
pub fn resolve<B: ServiceBrowser>(
    browser: &B,
    identifier: &str,
    timeout: Duration,
) -> Result<IpAddr, ResolveError> {
    if identifier.is_empty() {
        return Err(ResolveError::EmptyIdentifier);
    }

    let (finder, committed) = DeviceFinder::new(identifier);
    let finder = Arc::new(finder);

    let session = browser.browse(HTTP_SERVICE_TYPE, finder.clone())?;
    debug!("Waiting for advertisements...");

    let result = committed.recv_timeout(timeout).ok().or_else(|| finder.committed());
    drop(session);

    result.ok_or_else(|| ResolveError::Timeout {
        identifier: identifier.to_string(),
        timeout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{Delivery, MockBrowser};
    use std::time::Instant;

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_espid_property_match() {
        let browser = MockBrowser::new();
        browser.advertise(
            ServiceAdvertisement::new("esp-device")
                .with_address(addr("10.0.0.5"))
                .with_property("espid", "abc123"),
        );

        let found = resolve(&browser, "abc123", Duration::from_secs(2)).unwrap();
        assert_eq!(found, addr("10.0.0.5"));
        assert_eq!(browser.browsed_types(), vec![HTTP_SERVICE_TYPE]);
    }

    #[test]
    fn test_instance_name_suffix_match() {
        let browser = MockBrowser::new();
        browser.advertise(
            ServiceAdvertisement::new("kitchen-sensor-abc123").with_address(addr("10.0.0.7")),
        );

        let found = resolve(&browser, "abc123", Duration::from_secs(2)).unwrap();
        assert_eq!(found, addr("10.0.0.7"));
    }

    #[test]
    fn test_name_property_suffix_match() {
        let advertisement = ServiceAdvertisement::new("unrelated")
            .with_address(addr("10.0.0.8"))
            .with_property("name", "porch-light-abc123");
        let rule = matching_rule(&advertisement, "abc123").unwrap();
        assert_eq!(rule.name, "name-property-suffix");
    }

    #[test]
    fn test_rule_priority() {
        let advertisement = ServiceAdvertisement::new("x-abc123")
            .with_property("espid", "abc123")
            .with_property("name", "y-abc123");
        assert_eq!(
            matching_rule(&advertisement, "abc123").unwrap().name,
            "espid-property"
        );

        let advertisement = ServiceAdvertisement::new("x-abc123").with_property("name", "y-abc123");
        assert_eq!(
            matching_rule(&advertisement, "abc123").unwrap().name,
            "instance-name-suffix"
        );
    }

    #[test]
    fn test_suffix_requires_separator() {
        let advertisement = ServiceAdvertisement::new("sensorabc123");
        assert!(matching_rule(&advertisement, "abc123").is_none());

        let advertisement = ServiceAdvertisement::new("x").with_property("espid", "abc1234");
        assert!(matching_rule(&advertisement, "abc123").is_none());
    }

    #[test]
    fn test_first_match_in_delivery_order_wins() {
        let browser = MockBrowser::new();
        browser.advertise(ServiceAdvertisement::new("other-zzz").with_address(addr("10.0.0.1")));
        // Matches but has no address: skipped.
        browser.advertise(ServiceAdvertisement::new("no-addr-abc123"));
        browser.advertise(ServiceAdvertisement::new("first-abc123").with_address(addr("10.0.0.2")));
        browser.advertise(
            ServiceAdvertisement::new("second")
                .with_address(addr("10.0.0.3"))
                .with_property("espid", "abc123"),
        );

        let found = resolve(&browser, "abc123", Duration::from_secs(2)).unwrap();
        assert_eq!(found, addr("10.0.0.2"));
    }

    #[test]
    fn test_commit_is_never_replaced() {
        let (finder, committed) = DeviceFinder::new("abc123");
        finder.service_added(
            ServiceAdvertisement::new("a-abc123").with_address(addr("10.0.0.2")),
        );
        finder.service_added(
            ServiceAdvertisement::new("b")
                .with_address(addr("10.0.0.3"))
                .with_property("espid", "abc123"),
        );
        finder.service_removed("a-abc123");

        assert_eq!(finder.committed(), Some(addr("10.0.0.2")));
        assert_eq!(committed.try_recv().unwrap(), addr("10.0.0.2"));
        assert!(committed.try_recv().is_err());
    }

    #[test]
    fn test_concurrent_advertisements_commit_once() {
        let browser = MockBrowser::with_delivery(Delivery::Concurrent);
        let candidates: Vec<IpAddr> = (1..=16).map(|i| addr(&format!("10.0.1.{i}"))).collect();
        for candidate in &candidates {
            browser.advertise(
                ServiceAdvertisement::new(format!("node-{candidate}"))
                    .with_address(*candidate)
                    .with_property("espid", "abc123"),
            );
        }

        let (finder, committed) = DeviceFinder::new("abc123");
        let finder = Arc::new(finder);
        browser
            .browse(HTTP_SERVICE_TYPE, finder.clone())
            .unwrap()
            .join();

        let winner = committed.try_recv().unwrap();
        assert!(candidates.contains(&winner));
        assert_eq!(finder.committed(), Some(winner));
        assert!(committed.try_recv().is_err());
    }

    #[test]
    fn test_timeout_when_nothing_matches() {
        let browser = MockBrowser::new();
        browser.advertise(ServiceAdvertisement::new("other-zzz").with_address(addr("10.0.0.1")));

        let timeout = Duration::from_millis(200);
        let start = Instant::now();
        let err = resolve(&browser, "abc123", timeout).unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, ResolveError::Timeout { .. }));
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_secs(1));
    }

    #[test]
    fn test_late_match_after_timeout_is_ignored() {
        let browser = MockBrowser::new();
        browser.advertise_after(
            Duration::from_millis(500),
            ServiceAdvertisement::new("late-abc123").with_address(addr("10.0.0.9")),
        );

        let err = resolve(&browser, "abc123", Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, ResolveError::Timeout { .. }));
    }

    #[test]
    fn test_session_closed_on_every_outcome() {
        let browser = MockBrowser::new();
        browser.advertise(ServiceAdvertisement::new("d-abc123").with_address(addr("10.0.0.2")));
        resolve(&browser, "abc123", Duration::from_secs(1)).unwrap();
        assert!(resolve(&browser, "nope", Duration::from_millis(50)).is_err());

        assert_eq!(browser.sessions_opened(), 2);
        assert_eq!(browser.sessions_closed(), 2);
    }

    #[test]
    fn test_empty_identifier_rejected_before_browsing() {
        let browser = MockBrowser::new();
        let err = resolve(&browser, "", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ResolveError::EmptyIdentifier));
        assert_eq!(browser.sessions_opened(), 0);
    }

    #[test]
    fn test_browse_failure_propagates() {
        let browser = MockBrowser::new();
        browser.fail_browse();
        let err = resolve(&browser, "abc123", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ResolveError::Discovery(_)));
    }
}

//! Service discovery layer.

pub mod mdns;
pub mod mock;
pub mod traits;

pub use mdns::{MdnsBrowser, MdnsSession};
pub use mock::{Delivery, MockBrowser, MockSession};
pub use traits::{
    DiscoveryError, HTTP_SERVICE_TYPE, ServiceAdvertisement, ServiceBrowser, ServiceListener,
    decode_lossy,
};

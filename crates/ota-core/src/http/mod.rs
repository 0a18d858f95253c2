//! Device HTTP layer.

pub mod digest;
pub mod mock;
pub mod traits;

pub use digest::DigestClient;
pub use mock::{MockDeviceClient, RecordedRequest};
pub use traits::{
    DeviceClient, FormPart, HttpError, HttpResponse, MultipartForm, RequestMethod, device_url,
};

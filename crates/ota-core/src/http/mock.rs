//! Mock device client for testing.

use std::sync::Mutex;

use super::traits::{DeviceClient, HttpError, HttpResponse, MultipartForm, RequestMethod};
use crate::transfer::{IDENTITY_PATH, UPDATE_PATH};

/// A request the mock received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: RequestMethod,
    pub path: String,
    pub form: Option<MultipartForm>,
}

enum Route {
    Respond(HttpResponse),
    Fail(String),
}

/// Mock device with canned responses per method and path.
///
/// Unrouted requests get a 404.
pub struct MockDeviceClient {
    host: String,
    routes: Mutex<Vec<(RequestMethod, String, Route)>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockDeviceClient {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            routes: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer `method path` with `status` and `body`.
    pub fn respond(&self, method: RequestMethod, path: &str, status: u16, body: &str) {
        self.routes.lock().unwrap().push((
            method,
            path.to_string(),
            Route::Respond(HttpResponse::new(status, body)),
        ));
    }

    /// Make `method path` fail at the transport level.
    pub fn fail(&self, method: RequestMethod, path: &str, message: &str) {
        self.routes.lock().unwrap().push((
            method,
            path.to_string(),
            Route::Fail(message.to_string()),
        ));
    }

    /// Serve a device reporting `id` on the identity endpoint and accepting uploads.
    pub fn with_identity(host: impl Into<String>, id: &str) -> Self {
        let mock = Self::new(host);
        mock.respond(
            RequestMethod::Get,
            IDENTITY_PATH,
            200,
            &format!(r#"{{"id":"{id}"}}"#),
        );
        mock.respond(RequestMethod::Post, UPDATE_PATH, 200, "OK");
        mock
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: RequestMethod, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    fn handle(
        &self,
        method: RequestMethod,
        path: &str,
        form: Option<&MultipartForm>,
    ) -> Result<HttpResponse, HttpError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            path: path.to_string(),
            form: form.cloned(),
        });

        let url = self.url(path);
        let routes = self.routes.lock().unwrap();
        match routes.iter().find(|(m, p, _)| *m == method && p == path) {
            Some((_, _, Route::Respond(response))) => Ok(response.clone()),
            Some((_, _, Route::Fail(message))) => Err(HttpError::Request {
                url,
                message: message.clone(),
            }),
            None => Ok(HttpResponse::new(404, "Not Found")),
        }
    }
}

impl DeviceClient for MockDeviceClient {
    fn host(&self) -> &str {
        &self.host
    }

    fn get(&self, path: &str) -> Result<HttpResponse, HttpError> {
        self.handle(RequestMethod::Get, path, None)
    }

    fn post_multipart(&self, path: &str, form: &MultipartForm) -> Result<HttpResponse, HttpError> {
        self.handle(RequestMethod::Post, path, Some(form))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_routes_and_log() {
        let mock = MockDeviceClient::with_identity("10.0.0.5", "xyz");

        let identity = mock.get("/update/identity").unwrap();
        assert_eq!(identity.status, 200);
        assert_eq!(identity.body, r#"{"id":"xyz"}"#);

        let missing = mock.get("/nope").unwrap();
        assert_eq!(missing.status, 404);

        assert_eq!(mock.requests().len(), 2);
        assert_eq!(mock.requests_to(RequestMethod::Get, "/nope").len(), 1);
    }

    #[test]
    fn test_mock_failure() {
        let mock = MockDeviceClient::new("10.0.0.5");
        mock.fail(RequestMethod::Get, "/update/identity", "connection refused");

        let err = mock.get("/update/identity").unwrap_err();
        assert!(matches!(err, HttpError::Request { .. }));
    }
}

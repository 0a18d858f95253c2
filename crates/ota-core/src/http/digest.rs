//! reqwest-based client with HTTP digest authentication.
//!
//! Each logical request is sent once without credentials. If the device
//! answers 401 with a digest challenge, the request is rebuilt and sent again
//! with the computed `Authorization` header.

use digest_auth::{AuthContext, HttpMethod};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response, multipart};
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use tracing::{debug, instrument};

use super::traits::{DeviceClient, HttpError, HttpResponse, MultipartForm, RequestMethod};

pub struct DigestClient {
    http: Client,
    host: String,
    user: String,
    password: String,
}

impl DigestClient {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, HttpError> {
        let http = Client::builder()
            .build()
            .map_err(|e| HttpError::ClientInit(e.to_string()))?;

        Ok(Self {
            http,
            host: host.into(),
            user: user.into(),
            password: password.into(),
        })
    }

    /// Send a request, answering a digest challenge if one comes back.
    ///
    /// `build` is called once per attempt so bodies that cannot be cloned
    /// are recreated.
    fn send<F>(&self, method: RequestMethod, path: &str, build: F) -> Result<HttpResponse, HttpError>
    where
        F: Fn(RequestBuilder) -> Result<RequestBuilder, HttpError>,
    {
        let url = self.url(path);

        let first = build(self.request(method, &url))?
            .send()
            .map_err(|e| request_error(&url, e))?;

        if first.status() != StatusCode::UNAUTHORIZED {
            return read_response(&url, first);
        }

        let Some(challenge) = first.headers().get(WWW_AUTHENTICATE) else {
            debug!(%url, "401 without challenge");
            return read_response(&url, first);
        };
        let challenge = challenge
            .to_str()
            .map_err(|e| HttpError::Auth {
                url: url.clone(),
                message: e.to_string(),
            })?
            .to_string();

        let authorization = self.answer(&url, &challenge, method, path)?;
        debug!(%url, "Answering digest challenge");

        let second = build(self.request(method, &url))?
            .header(AUTHORIZATION, authorization)
            .send()
            .map_err(|e| request_error(&url, e))?;

        read_response(&url, second)
    }

    fn request(&self, method: RequestMethod, url: &str) -> RequestBuilder {
        match method {
            RequestMethod::Get => self.http.get(url),
            RequestMethod::Post => self.http.post(url),
        }
    }

    fn answer(
        &self,
        url: &str,
        challenge: &str,
        method: RequestMethod,
        path: &str,
    ) -> Result<String, HttpError> {
        let auth_error = |message: String| HttpError::Auth {
            url: url.to_string(),
            message,
        };

        let mut prompt = digest_auth::parse(challenge).map_err(|e| auth_error(e.to_string()))?;
        let http_method = match method {
            RequestMethod::Get => HttpMethod::GET,
            RequestMethod::Post => HttpMethod::POST,
        };
        let context = AuthContext::new_with_method(
            self.user.as_str(),
            self.password.as_str(),
            path,
            Option::<&[u8]>::None,
            http_method,
        );
        let answer = prompt
            .respond(&context)
            .map_err(|e| auth_error(e.to_string()))?;

        Ok(answer.to_header_string())
    }
}

impl DeviceClient for DigestClient {
    fn host(&self) -> &str {
        &self.host
    }

    #[instrument(skip(self), fields(host = %self.host))]
    fn get(&self, path: &str) -> Result<HttpResponse, HttpError> {
        self.send(RequestMethod::Get, path, Ok)
    }

    #[instrument(skip(self, form), fields(host = %self.host))]
    fn post_multipart(&self, path: &str, form: &MultipartForm) -> Result<HttpResponse, HttpError> {
        let url = self.url(path);
        self.send(RequestMethod::Post, path, |request| {
            Ok(request.multipart(to_reqwest_form(&url, form)?))
        })
    }
}

fn to_reqwest_form(url: &str, form: &MultipartForm) -> Result<multipart::Form, HttpError> {
    let mut out = multipart::Form::new();

    for part in form.parts() {
        match (&part.filename, &part.content_type) {
            (None, None) => {
                out = out.text(
                    part.name.clone(),
                    String::from_utf8_lossy(&part.data).into_owned(),
                );
            }
            (filename, content_type) => {
                let mut p = multipart::Part::bytes(part.data.clone());
                if let Some(filename) = filename {
                    p = p.file_name(filename.clone());
                }
                if let Some(content_type) = content_type {
                    p = p.mime_str(content_type).map_err(|e| request_error(url, e))?;
                }
                out = out.part(part.name.clone(), p);
            }
        }
    }

    Ok(out)
}

fn read_response(url: &str, response: Response) -> Result<HttpResponse, HttpError> {
    let status = response.status();
    let body = response.text().map_err(|e| request_error(url, e))?;

    debug!(%url, status = status.as_u16(), len = body.len(), "Response received");
    Ok(HttpResponse {
        status: status.as_u16(),
        reason: status.canonical_reason().map(str::to_string),
        body,
    })
}

fn request_error(url: &str, e: reqwest::Error) -> HttpError {
    HttpError::Request {
        url: url.to_string(),
        message: e.to_string(),
    }
}

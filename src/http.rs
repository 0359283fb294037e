//! HTTP client with rate limiting and cookie management for the REST backend.
//!
//! This module provides:
//! * [`Request`]: a description of a REST call that can be issued any number
//!   of times, whatever its payload (empty, JSON or multipart upload)
//! * [`Transport`]: the seam through which requests are sent, so that the
//!   retry policy in [`gateway`](crate::gateway) can be exercised without a
//!   network
//! * [`Client`]: the `reqwest` based transport with a shared cookie jar
//!
//! # Rate Limiting
//!
//! * 50 calls per 5-second interval
//! * Allows bursts up to the maximum calls per interval
//! * Requests that would exceed the limit are delayed
//!
//! # Example
//!
//! ```rust
//! use melodia::http::{Client, Request, Transport};
//!
//! let client = Client::new(&config)?;
//! let response = client.send(&Request::get("genre")).await?;
//! ```

use std::{fmt, future::Future, num::NonZeroU32, path::Path, sync::Arc, time::Duration};

use cookie_store::CookieStore;
use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use http::{Method, StatusCode};
use reqwest::{
    header::{HeaderValue, ACCEPT_LANGUAGE},
    multipart, Url,
};
use reqwest_cookie_store::CookieStoreMutex;
use serde::Serialize;

use crate::{
    config::Config,
    error::{Error, Result},
};

/// Body of a [`Request`].
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Payload {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<Field>),
}

/// A single part of a multipart form.
#[derive(Clone, PartialEq, Eq)]
pub enum Field {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: String,
        data: Vec<u8>,
    },
}

impl Field {
    #[must_use]
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Text {
            name: name.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn file(
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self::File {
            name: name.into(),
            file_name: file_name.into(),
            mime: mime.into(),
            data,
        }
    }

    /// Reads a file from disk into a form part, guessing its media type from
    /// the extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn from_path(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|file_name| file_name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::invalid_argument(format!("{} is not a file", path.display())))?;

        Ok(Self::file(name, file_name, mime_type(path), data))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Text { name, .. } | Self::File { name, .. } => name,
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { name, value } => f
                .debug_struct("Text")
                .field("name", name)
                .field("value", value)
                .finish(),
            Self::File {
                name,
                file_name,
                mime,
                data,
            } => f
                .debug_struct("File")
                .field("name", name)
                .field("file_name", file_name)
                .field("mime", mime)
                .field("len", &data.len())
                .finish(),
        }
    }
}

/// Media type for an upload, by file extension.
fn mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|extension| extension.to_string_lossy().to_ascii_lowercase());

    match extension.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("m4a" | "mp4") => "audio/mp4",
        Some("aac") => "audio/aac",
        Some("flac") => "audio/flac",
        Some("wav") => "audio/wav",
        Some("ogg" | "oga") => "audio/ogg",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Description of a REST call.
///
/// Requests are plain data: they can be cloned, compared and re-sent, which
/// is what allows a call to be retried after its credentials were refreshed.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub method: Method,

    /// Endpoint path relative to the API base URL.
    pub path: String,

    pub query: Vec<(String, String)>,
    pub payload: Payload,

    /// Whether the session cookie is sent along.
    pub credentials: bool,
}

impl Request {
    /// Creates a credentialed request without payload.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            payload: Payload::Empty,
            credentials: true,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Sends the request without the session cookie.
    #[must_use]
    pub fn anonymous(mut self) -> Self {
        self.credentials = false;
        self
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be represented as JSON.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        self.payload = Payload::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    #[must_use]
    pub fn multipart(mut self, fields: Vec<Field>) -> Self {
        self.payload = Payload::Multipart(fields);
        self
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} /{}", self.method, self.path.trim_start_matches('/'))
    }
}

/// Status and body of a completed exchange.
///
/// Any status is a completed exchange; only transport failures are errors at
/// this level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl Response {
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns the body of a successful response, or the error its status
    /// stands for.
    ///
    /// # Errors
    ///
    /// Returns an error classified by [`ErrorKind::from_status`] when the
    /// status is not a success.
    ///
    /// [`ErrorKind::from_status`]: crate::error::ErrorKind::from_status
    pub fn into_result(self) -> Result<Vec<u8>> {
        if self.status.is_success() {
            Ok(self.body)
        } else {
            Err(Error::from_status(self.status, &self.body))
        }
    }
}

/// Sends requests and reports their outcome.
pub trait Transport {
    /// Issues `request` once.
    ///
    /// Resolves to the response whatever its status; resolves to an error
    /// only when no response was received.
    fn send(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// HTTP client with built-in rate limiting and cookie support.
pub struct Client {
    /// Client that carries the session cookie.
    authenticated: reqwest::Client,

    /// Client without cookies for public endpoints and media files.
    anonymous: reqwest::Client,

    /// Rate limiter to not overload the backend.
    rate_limiter: DefaultDirectRateLimiter,

    /// Resolves request paths against the API base URL.
    config: Config,
}

impl Client {
    /// Rolling window during which at most `RATE_LIMIT_CALLS_PER_INTERVAL`
    /// calls are made.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(5);

    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 50;

    /// Duration to keep idle connections alive.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Duration to wait for individual network reads. Bounds how long a hung
    /// backend, including a hung credential refresh, can stall a call.
    const READ_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a new client for the backend in `config`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP clients cannot be built.
    ///
    /// # Panics
    ///
    /// Panics if rate limit parameters are zero.
    pub fn new(config: &Config) -> Result<Self> {
        // Not having `Accept-Language` set is non-fatal.
        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(lang) = HeaderValue::from_str(&config.app_lang) {
            headers.insert(ACCEPT_LANGUAGE, lang);
        }

        let builder = || {
            reqwest::Client::builder()
                .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
                .read_timeout(Self::READ_TIMEOUT)
                .default_headers(headers.clone())
                .user_agent(&config.user_agent)
        };

        let cookie_jar = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let authenticated = builder()
            .cookie_provider(cookie_jar)
            .build()?;
        let anonymous = builder().build()?;

        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            authenticated,
            anonymous,
            rate_limiter: governor::RateLimiter::direct(quota),
            config: config.clone(),
        })
    }

    /// Downloads a media file in full, without cookies or rate limiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server does not respond
    /// with a success status.
    pub async fn download(&self, url: Url) -> Result<Vec<u8>> {
        let response = self.anonymous.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::from_status(status, &[]));
        }

        let body = response.bytes().await?;
        Ok(body.to_vec())
    }

    /// Executes a request with rate limiting.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be sent or no response arrives.
    pub fn execute(
        &self,
        client: &reqwest::Client,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + Send + '_ {
        let client = client.clone();

        // No need to await with jitter because the level of concurrency is low.
        let throttle = self.rate_limiter.until_ready();
        throttle.then(move |()| client.execute(request).map_err(Into::into))
    }

    fn client(&self, credentials: bool) -> &reqwest::Client {
        if credentials {
            &self.authenticated
        } else {
            &self.anonymous
        }
    }

    fn build(&self, request: &Request) -> Result<reqwest::Request> {
        let url = self.config.endpoint(&request.path)?;

        let mut builder = self
            .client(request.credentials)
            .request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        builder = match &request.payload {
            Payload::Empty => builder,
            Payload::Json(value) => builder.json(value),
            Payload::Multipart(fields) => builder.multipart(form(fields)?),
        };

        builder.build().map_err(Into::into)
    }
}

/// Builds a fresh multipart form. Forms are consumed when sent, so every
/// attempt needs its own.
fn form(fields: &[Field]) -> Result<multipart::Form> {
    let mut form = multipart::Form::new();
    for field in fields {
        form = match field {
            Field::Text { name, value } => form.text(name.clone(), value.clone()),
            Field::File {
                name,
                file_name,
                mime,
                data,
            } => {
                let part = multipart::Part::bytes(data.clone())
                    .file_name(file_name.clone())
                    .mime_str(mime)?;
                form.part(name.clone(), part)
            }
        };
    }

    Ok(form)
}

impl Transport for Client {
    async fn send(&self, request: &Request) -> Result<Response> {
        let http_request = self.build(request)?;

        trace!("{request}");
        let response = self
            .execute(self.client(request.credentials), http_request)
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        trace!("{request}: {status}");

        Ok(Response::new(status, body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_credentialed_by_default() {
        let request = Request::delete("song/1");
        assert!(request.credentials);
        assert!(!request.clone().anonymous().credentials);
        assert_eq!(request.to_string(), "DELETE /song/1");
    }

    #[test]
    fn json_payload() {
        let request = Request::patch("song/1/update-genres")
            .json(&serde_json::json!({ "genreIds": ["a", "b"] }))
            .unwrap();
        assert_eq!(
            request.payload,
            Payload::Json(serde_json::json!({ "genreIds": ["a", "b"] }))
        );
    }

    #[test]
    fn multipart_forms_can_be_rebuilt() {
        let fields = vec![
            Field::text("title", "Song"),
            Field::file("mp3File", "song.mp3", "audio/mpeg", vec![0xff, 0xfb]),
        ];
        assert!(form(&fields).is_ok());
        assert!(form(&fields).is_ok());
    }

    #[test]
    fn file_debug_hides_contents() {
        let field = Field::file("mp3File", "song.mp3", "audio/mpeg", vec![1, 2, 3]);
        assert_eq!(field.name(), "mp3File");
        assert!(format!("{field:?}").contains("len: 3"));
    }

    #[test]
    fn mime_types_by_extension() {
        assert_eq!(mime_type(Path::new("a/b/Track.MP3")), "audio/mpeg");
        assert_eq!(mime_type(Path::new("cover.jpeg")), "image/jpeg");
        assert_eq!(mime_type(Path::new("README")), "application/octet-stream");
    }

    #[test]
    fn error_statuses_become_errors() {
        let ok = Response::new(StatusCode::CREATED, b"{}".to_vec());
        assert_eq!(ok.into_result().unwrap(), b"{}");

        let err = Response::new(StatusCode::NOT_FOUND, Vec::new())
            .into_result()
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NotFound);
    }
}

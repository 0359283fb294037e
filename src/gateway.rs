//! Authenticated access to the REST backend.
//!
//! The session is carried by an HTTP-only cookie that expires well before the
//! user would expect to sign in again. Rather than tracking its lifetime,
//! every credentialed call goes through [`Gateway::call`], which detects an
//! expired session by its `401 Unauthorized` status, renews it once through
//! the refresh endpoint and repeats the call:
//!
//! ```text
//! call ──► 2xx ───────────────────────────────► body
//!      ├─► 401 ──► refresh ──► 2xx ──► call ──► body or error
//!      │                  └──► error ─────────► refresh error
//!      └─► other status or transport error ───► error
//! ```
//!
//! A call is repeated at most once, whatever the outcome of the repetition.

use serde::de::DeserializeOwned;

use crate::{
    config::Config,
    credentials::Credentials,
    error::{Error, Result},
    http::{Client as HttpClient, Request, Transport},
    protocol::{
        user::{Message, SignUp},
        User,
    },
};

pub struct Gateway<T = HttpClient> {
    transport: T,
}

impl Gateway<HttpClient> {
    /// Creates a gateway to the backend in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = HttpClient::new(config)?;
        Ok(Self::with_transport(http_client))
    }
}

impl<T: Transport> Gateway<T> {
    /// Endpoint that renews the session cookie.
    pub const REFRESH_PATH: &'static str = "auth/refresh-token";

    #[must_use]
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Issues `request`, renewing the session and repeating the request once
    /// if the backend reports the session as expired.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * the request cannot be sent
    /// * the backend responds with an error status other than 401
    /// * the session cannot be refreshed
    /// * the repeated request fails for any reason, including another 401
    pub async fn call(&self, request: &Request) -> Result<Vec<u8>> {
        let response = self.transport.send(request).await?;
        match response.into_result() {
            Err(e) if e.is_unauthenticated() => {
                debug!("{request}: session expired, refreshing");
                self.refresh().await?;

                debug!("{request}: retrying with refreshed session");
                self.transport.send(request).await?.into_result()
            }
            result => result,
        }
    }

    /// Like [`call`](Self::call), deserializing the response body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the body is not the expected
    /// JSON.
    pub async fn call_json<R>(&self, request: &Request) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let body = self.call(request).await?;
        serde_json::from_slice(&body).map_err(Into::into)
    }

    /// Issues `request` once, without refreshing the session on 401.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent or the backend
    /// responds with an error status.
    pub async fn send(&self, request: &Request) -> Result<Vec<u8>> {
        self.transport.send(request).await?.into_result()
    }

    /// Like [`send`](Self::send), deserializing the response body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails or the body is not the expected
    /// JSON.
    pub async fn send_json<R>(&self, request: &Request) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let body = self.send(request).await?;
        serde_json::from_slice(&body).map_err(Into::into)
    }

    /// Renews the session cookie.
    ///
    /// # Errors
    ///
    /// Returns the refresh failure, keeping its kind: `Unauthenticated` when
    /// the session can no longer be renewed and the user has to sign in
    /// again.
    pub async fn refresh(&self) -> Result<()> {
        let request = Request::get(Self::REFRESH_PATH);
        match self.send(&request).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("refreshing session failed: {e}");
                Err(Error::new(
                    e.kind,
                    format!("refreshing session failed: {}", e.error),
                ))
            }
        }
    }

    /// Signs in, storing the session cookie.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` for wrong credentials, or another error if
    /// the request fails.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<()> {
        let request = Request::post("auth/signin").json(&serde_json::json!({
            "email": credentials.email,
            "password": credentials.password,
        }))?;

        self.send(&request).await?;
        info!("signed in as {}", credentials.email);
        Ok(())
    }

    /// Registers a new account, returning the backend's acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend refuses the registration, with its
    /// explanation as detail.
    pub async fn sign_up(&self, form: &SignUp) -> Result<Option<String>> {
        if form.password != form.confirm_password {
            return Err(Error::invalid_argument("passwords do not match"));
        }

        let request = Request::post("auth/signup").anonymous().json(form)?;
        let message: Message = self.send_json(&request).await?;
        Ok(message.message)
    }

    /// Ends the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn sign_out(&self) -> Result<()> {
        let request = Request::post("auth/logout").json(&serde_json::json!({}))?;
        self.call(&request).await?;
        info!("signed out");
        Ok(())
    }

    /// The signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` when not signed in, or another error if the
    /// request fails.
    pub async fn me(&self) -> Result<User> {
        self.call_json(&Request::get("user/me")).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::VecDeque,
        future::Future,
        sync::{Arc, Mutex},
    };

    use http::{Method, StatusCode};

    use super::*;
    use crate::{
        error::ErrorKind,
        http::{Field, Payload, Response},
    };

    /// Transport that answers with scripted outcomes and records what was
    /// sent.
    #[derive(Clone, Default)]
    pub(crate) struct ScriptedTransport {
        outcomes: Arc<Mutex<VecDeque<Result<Response>>>>,
        sent: Arc<Mutex<Vec<Request>>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new<I>(outcomes: I) -> Self
        where
            I: IntoIterator<Item = Result<Response>>,
        {
            Self {
                outcomes: Arc::new(Mutex::new(outcomes.into_iter().collect())),
                sent: Arc::default(),
            }
        }

        pub(crate) fn respond(status: StatusCode, body: &str) -> Result<Response> {
            Ok(Response::new(status, body.as_bytes().to_vec()))
        }

        pub(crate) fn sent(&self) -> Vec<Request> {
            self.sent.lock().unwrap().clone()
        }

        pub(crate) fn paths(&self) -> Vec<String> {
            self.sent().into_iter().map(|request| request.path).collect()
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send {
            self.sent.lock().unwrap().push(request.clone());
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::internal("no scripted response left")));
            std::future::ready(outcome)
        }
    }

    pub(crate) fn scripted(
        outcomes: Vec<Result<Response>>,
    ) -> (Gateway<ScriptedTransport>, ScriptedTransport) {
        let transport = ScriptedTransport::new(outcomes);
        (Gateway::with_transport(transport.clone()), transport)
    }

    fn delete_song() -> Request {
        Request::delete("song/42")
    }

    #[tokio::test]
    async fn success_is_returned_as_is() {
        let (gateway, transport) = scripted(vec![ScriptedTransport::respond(
            StatusCode::OK,
            r#"{"ok":true}"#,
        )]);

        let body = gateway.call(&delete_song()).await.unwrap();
        assert_eq!(body, br#"{"ok":true}"#);
        assert_eq!(transport.paths(), ["song/42"]);
    }

    #[tokio::test]
    async fn expired_session_is_refreshed_and_call_retried_once() {
        let (gateway, transport) = scripted(vec![
            ScriptedTransport::respond(StatusCode::UNAUTHORIZED, ""),
            ScriptedTransport::respond(StatusCode::OK, ""),
            ScriptedTransport::respond(StatusCode::OK, "deleted"),
        ]);

        let body = gateway.call(&delete_song()).await.unwrap();
        assert_eq!(body, b"deleted");

        let sent = transport.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], delete_song());
        assert_eq!(sent[1].method, Method::GET);
        assert_eq!(sent[1].path, "auth/refresh-token");
        assert!(sent[1].credentials);
        assert_eq!(sent[2], delete_song());
    }

    #[tokio::test]
    async fn failed_refresh_is_propagated_without_retry() {
        let (gateway, transport) = scripted(vec![
            ScriptedTransport::respond(StatusCode::UNAUTHORIZED, ""),
            ScriptedTransport::respond(StatusCode::UNAUTHORIZED, r#"{"message":"expired"}"#),
        ]);

        let err = gateway.call(&delete_song()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthenticated);
        assert!(err.to_string().contains("refreshing session failed"));
        assert_eq!(transport.paths(), ["song/42", "auth/refresh-token"]);
    }

    #[tokio::test]
    async fn second_unauthorized_is_terminal() {
        let (gateway, transport) = scripted(vec![
            ScriptedTransport::respond(StatusCode::UNAUTHORIZED, ""),
            ScriptedTransport::respond(StatusCode::OK, ""),
            ScriptedTransport::respond(StatusCode::UNAUTHORIZED, ""),
        ]);

        let err = gateway.call(&delete_song()).await.unwrap_err();
        assert!(err.is_unauthenticated());
        assert_eq!(transport.sent().len(), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let (gateway, transport) = scripted(vec![ScriptedTransport::respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            "",
        )]);
        let err = gateway.call(&delete_song()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert_eq!(transport.sent().len(), 1);

        let (gateway, transport) = scripted(vec![Err(Error::unavailable("connection refused"))]);
        let err = gateway.call(&delete_song()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unavailable);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn multipart_uploads_are_retried_identically() {
        let upload = Request::put("song/42/file").multipart(vec![Field::file(
            "mp3File",
            "take2.mp3",
            "audio/mpeg",
            vec![0xff, 0xfb, 0x90],
        )]);
        let (gateway, transport) = scripted(vec![
            ScriptedTransport::respond(StatusCode::UNAUTHORIZED, ""),
            ScriptedTransport::respond(StatusCode::OK, ""),
            ScriptedTransport::respond(StatusCode::OK, ""),
        ]);

        gateway.call(&upload).await.unwrap();
        let sent = transport.sent();
        assert_eq!(sent[0], upload);
        assert_eq!(sent[2], upload);
    }

    #[tokio::test]
    async fn send_does_not_refresh() {
        let (gateway, transport) = scripted(vec![ScriptedTransport::respond(
            StatusCode::UNAUTHORIZED,
            r#"{"message":"wrong password"}"#,
        )]);
        let credentials: Credentials = "email = \"a@b.c\"\npassword = \"nope\"\n".parse().unwrap();

        let err = gateway.sign_in(&credentials).await.unwrap_err();
        assert!(err.is_unauthenticated());
        assert_eq!(transport.paths(), ["auth/signin"]);
    }

    #[tokio::test]
    async fn sign_out_renews_expired_session_first() {
        let (gateway, transport) = scripted(vec![
            ScriptedTransport::respond(StatusCode::UNAUTHORIZED, ""),
            ScriptedTransport::respond(StatusCode::OK, ""),
            ScriptedTransport::respond(StatusCode::OK, r#"{"message":"bye"}"#),
        ]);

        gateway.sign_out().await.unwrap();

        let sent = transport.sent();
        assert_eq!(transport.paths(), ["auth/logout", "auth/refresh-token", "auth/logout"]);
        assert_eq!(sent[0].method, Method::POST);
        assert_eq!(sent[0].payload, Payload::Json(serde_json::json!({})));
        assert_eq!(sent[0], sent[2]);
    }

    #[tokio::test]
    async fn me_deserializes_user() {
        let (gateway, _) = scripted(vec![ScriptedTransport::respond(
            StatusCode::OK,
            r#"{"id":"u1","username":"mod","email":"m@example.com","role":"admin"}"#,
        )]);

        let user = gateway.me().await.unwrap();
        assert!(user.is_admin());
    }

    #[tokio::test]
    async fn sign_up_checks_confirmation_locally() {
        let (gateway, transport) = scripted(Vec::new());
        let form = SignUp {
            email: "new@example.com".to_string(),
            username: "new".to_string(),
            password: "one".to_string(),
            confirm_password: "two".to_string(),
        };

        let err = gateway.sign_up(&form).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert!(transport.sent().is_empty());
    }
}

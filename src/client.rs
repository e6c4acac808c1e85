use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Error;
use crate::models::{ErrorBody, Session, TokenPair};
use crate::session::SessionManager;
use crate::token;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// One logical backend request, before token handling is applied.
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Tracks which phase of the request the pipeline is in. The retry after a
/// 401 happens at most once because `Retrying` has no successor state.
enum Attempt {
    Initial,
    Retrying,
}

/// HTTP client that handles the token lifecycle around every request:
/// bearer header attachment, proactive refresh of a near-expiry token, and
/// a single refresh-and-retry on 401.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: SessionManager,
    /// Serializes session-mutating operations: one refresh exchange in
    /// flight at a time, and logout's clear waits for it.
    refresh_lock: Arc<Mutex<()>>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, session: SessionManager) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("checkoff/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url,
            session,
            refresh_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchanges the refresh token for a new pair and persists the successor
    /// session. Any failure is terminal: the session is cleared and the
    /// caller gets `SessionExpired`.
    ///
    /// `observed` is the access token the caller last read. If the stored
    /// token already differs, another refresh (or a login) won the race and
    /// its result is returned without a second exchange.
    pub async fn refresh(&self, observed: Option<&str>) -> Result<Session, Error> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.session.session()?.ok_or(Error::NoRefreshToken)?;
        if let Some(observed) = observed {
            if current.access_token != observed {
                debug!("refresh already performed by a concurrent caller");
                return Ok(current);
            }
        }

        match self.exchange(&current).await {
            Ok(next) => {
                // A login may have replaced the session while the exchange
                // was in flight; the newer session wins.
                if let Some(stored) = self.session.session()? {
                    if stored.access_token != current.access_token {
                        return Ok(stored);
                    }
                }
                self.session.set_session(&next)?;
                debug!("access token refreshed");
                Ok(next)
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed, clearing session");
                self.session.clear()?;
                Err(Error::SessionExpired)
            }
        }
    }

    async fn exchange(&self, current: &Session) -> Result<Session, Error> {
        let resp = self
            .http
            .post(self.url("/api/auth/refresh"))
            .header(CONTENT_TYPE, "application/json")
            .json(&json!({ "refresh_token": current.refresh_token }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(response_error(resp).await);
        }

        let pair: TokenPair = resp.json().await?;
        SessionManager::apply_refresh(current, pair).ok_or(Error::SessionExpired)
    }

    /// Clears the stored session under the refresh lock, so an in-flight
    /// refresh cannot write a session back after the user signed out.
    pub async fn clear_session(&self) -> Result<(), Error> {
        let _guard = self.refresh_lock.lock().await;
        self.session.clear()
    }

    /// Issues a request through the pipeline and deserializes the JSON body.
    pub async fn call<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T, Error> {
        let resp = self.execute(req).await?;
        Ok(resp.json().await?)
    }

    /// As `call`, for endpoints whose success is 204 No Content.
    pub async fn call_unit(&self, req: ApiRequest) -> Result<(), Error> {
        self.execute(req).await?;
        Ok(())
    }

    async fn execute(&self, req: ApiRequest) -> Result<reqwest::Response, Error> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut access_token = self.session.session()?.map(|s| s.access_token);

        if let Some(token) = &access_token {
            if token::is_expiring_soon(token, now) {
                debug!(path = %req.path, "access token expiring soon, refreshing first");
                let session = self.refresh(Some(token)).await?;
                access_token = Some(session.access_token);
            }
        }

        let mut attempt = Attempt::Initial;
        loop {
            let resp = self.send(&req, access_token.as_deref()).await?;
            let status = resp.status();

            if status == StatusCode::UNAUTHORIZED && access_token.is_some() {
                // A 401 on a request that carried no token (a failed login)
                // is an ordinary error; there is nothing to refresh.
                if matches!(attempt, Attempt::Initial) {
                    warn!(path = %req.path, "unauthorized, refreshing and retrying once");
                    let session = self.refresh(access_token.as_deref()).await?;
                    access_token = Some(session.access_token);
                    attempt = Attempt::Retrying;
                    continue;
                }
            }

            if status == StatusCode::NO_CONTENT {
                return Ok(resp);
            }
            if !status.is_success() {
                return Err(response_error(resp).await);
            }
            return Ok(resp);
        }
    }

    async fn send(
        &self,
        req: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<reqwest::Response, Error> {
        let mut builder = self
            .http
            .request(req.method.clone(), self.url(&req.path))
            .header(CONTENT_TYPE, "application/json");

        if let Some(token) = access_token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }
}

async fn response_error(resp: reqwest::Response) -> Error {
    let status = resp.status().as_u16();

    match resp.json::<ErrorBody>().await {
        Ok(body) => Error::RequestFailed {
            status,
            message: body.message,
            details: body.details,
        },
        Err(_) => Error::RequestFailed {
            status,
            message: format!("request failed with status {status}"),
            details: None,
        },
    }
}

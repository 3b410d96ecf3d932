//! HTTP client with the request/response interceptor pipeline.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use url::Url;

use super::error::{ApiError, ApiResult, value_message};
use crate::config::Config;
use crate::storage::{Store, TOKEN_KEY};

/// Standard User-Agent header for LoboShop API requests.
pub const USER_AGENT: &str = concat!("loboshop/", env!("CARGO_PKG_VERSION"));

const EVENT_CAPACITY: usize = 16;

/// Authentication signals observed by the inbound interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A request was answered with 401. `token` is the bearer that was
    /// attached to it, if any.
    Unauthorized { token: Option<String> },
}

/// Connection settings for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL without trailing slash, e.g. `http://localhost:3000/api/v1`.
    pub base_url: String,
    pub request_timeout: Duration,
    /// Ceiling for multipart product uploads.
    pub upload_timeout: Duration,
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        let defaults = Config::default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout: defaults.request_timeout(),
            upload_timeout: defaults.upload_timeout(),
        }
    }

    /// Builds options from config, honoring the base URL env override.
    ///
    /// # Errors
    /// Returns an error if the resolved base URL is malformed.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            base_url: config.effective_base_url()?,
            request_timeout: config.request_timeout(),
            upload_timeout: config.upload_timeout(),
        })
    }
}

/// LoboShop REST client.
///
/// Every request goes through [`ApiClient::send`], which reads the token
/// from the store and attaches it as a bearer, then inspects the response
/// for authentication failures. Cloning is cheap and shares the connection
/// pool, store and event channel.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    upload_timeout: Duration,
    store: Store,
    events: broadcast::Sender<AuthEvent>,
}

impl ApiClient {
    /// Creates a client that reads its bearer token from `store`.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(options: ClientOptions, store: Store) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(options.request_timeout)
            .build()
            .context("build HTTP client")?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            http,
            base_url: options.base_url,
            upload_timeout: options.upload_timeout,
            store,
            events,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn upload_timeout(&self) -> Duration {
        self.upload_timeout
    }

    /// Subscribes to authentication events from the inbound interceptor.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn publish(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    /// Joins `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Resolves an asset path from a payload (e.g. `/uploads/bici.png`)
    /// against the server origin. Absolute URLs pass through.
    pub fn asset_url(&self, path: &str) -> String {
        let path = if path.contains("://") || path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        match Url::parse(&self.base_url).and_then(|base| base.join(&path)) {
            Ok(resolved) => resolved.to_string(),
            Err(_) => path,
        }
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    /// Sends a request through both interceptors.
    ///
    /// # Errors
    /// Returns a transport error when no response arrives, and a status
    /// error for any non-2xx response.
    pub(crate) async fn send(&self, builder: RequestBuilder) -> ApiResult<Response> {
        let token = self.bearer_token().await;
        self.dispatch(builder, token).await
    }

    async fn dispatch(&self, builder: RequestBuilder, token: Option<String>) -> ApiResult<Response> {
        let builder = match &token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            tracing::debug!(error = %e, "request failed before a response arrived");
            ApiError::transport(&e)
        })?;

        self.inspect(response, token).await
    }

    /// Sends a request and decodes the JSON body.
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ApiResult<T> {
        decode_json(self.send(builder).await?).await
    }

    /// Sends a credential exchange (login, registration) and decodes the body.
    ///
    /// No bearer is attached, so a 401 here rejects the submitted
    /// credentials and never the stored session.
    pub(crate) async fn send_credentials<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> ApiResult<T> {
        decode_json(self.dispatch(builder, None).await?).await
    }

    /// Sends a request whose body only acknowledges the operation.
    ///
    /// An empty body is accepted; a JSON body with `success: false` is
    /// turned into a rejection.
    pub(crate) async fn send_ack(&self, builder: RequestBuilder) -> ApiResult<()> {
        let response = self.send(builder).await?;
        let bytes = response.bytes().await.map_err(|e| ApiError::transport(&e))?;
        if let Ok(json) = serde_json::from_slice::<Value>(&bytes) {
            ensure_success(&json)?;
        }
        Ok(())
    }

    /// GET `path` and decode the JSON body.
    ///
    /// # Errors
    /// Returns an error if the request fails or the body does not decode.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.send_json(self.request(Method::GET, path)).await
    }

    /// Outbound interceptor: the stored token, if readable.
    ///
    /// A failing store read is logged and the request proceeds without a
    /// token; endpoints that need one answer 401.
    async fn bearer_token(&self) -> Option<String> {
        match self.store.get_string(TOKEN_KEY).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "could not read token, sending request without it");
                None
            }
        }
    }

    /// Inbound interceptor.
    async fn inspect(&self, response: Response, token: Option<String>) -> ApiResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(%url, "request rejected with 401 Unauthorized");
            if token.is_some() {
                // No receivers is fine: nobody has opted into eviction.
                let _ = self.events.send(AuthEvent::Unauthorized { token });
            }
        } else {
            tracing::debug!(%url, status = status.as_u16(), "request failed");
        }

        Err(ApiError::from_status(status.as_u16(), &body))
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let url = response.url().to_string();
    let bytes = response.bytes().await.map_err(|e| ApiError::transport(&e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::parse(format!("Invalid response from {url}: {e}")))
}

/// Turns a `success: false` body into a rejection.
pub(crate) fn ensure_success(json: &Value) -> ApiResult<()> {
    if json.get("success") == Some(&Value::Bool(false)) {
        let message = value_message(json).unwrap_or_else(|| "Request was rejected".to_string());
        return Err(ApiError::rejected(message));
    }
    Ok(())
}

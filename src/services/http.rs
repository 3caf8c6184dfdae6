//! Shared reqwest transport for the Registry and NiFi REST surfaces
//!
//! Every call carries explicit connect and request timeouts. Errors are
//! mapped onto [`RegistryError`] and nothing is retried here; callers own
//! their retry policy (see [`crate::services::readiness`]).

use std::time::Duration;

use reqwest::multipart::Form;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::{RegistryError, RegistryResult};

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl HttpSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(15),
        }
    }
}

pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl HttpClient {
    pub fn new(settings: HttpSettings) -> RegistryResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| {
                RegistryError::InvalidConfiguration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Attach a bearer token to every following request
    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    pub async fn has_token(&self) -> bool {
        self.token.read().await.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, path: &str, request: RequestBuilder) -> RegistryResult<Response> {
        let request = match self.token.read().await.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            RegistryError::Unavailable(format!("{}: {}", self.url(path), e))
        })?;

        let status = response.status();
        debug!("{} -> {}", path, status);
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::RequestFailed {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn read_json<T: DeserializeOwned>(path: &str, response: Response) -> RegistryResult<T> {
        let body = response
            .text()
            .await
            .map_err(|e| RegistryError::Unavailable(format!("{}: {}", path, e)))?;
        serde_json::from_str(&body).map_err(|e| RegistryError::malformed(path, e))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> RegistryResult<T> {
        let response = self.send(path, self.client.get(self.url(path))).await?;
        Self::read_json(path, response).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> RegistryResult<Value> {
        let response = self
            .send(path, self.client.post(self.url(path)).json(body))
            .await?;
        Self::read_json(path, response).await
    }

    /// Form-encoded POST whose answer is plain text (token exchange)
    pub async fn post_form_text(&self, path: &str, form: &[(&str, &str)]) -> RegistryResult<String> {
        let response = self
            .send(path, self.client.post(self.url(path)).form(form))
            .await?;
        response
            .text()
            .await
            .map_err(|e| RegistryError::Unavailable(format!("{}: {}", path, e)))
    }

    pub async fn post_multipart(&self, path: &str, form: Form) -> RegistryResult<Value> {
        let response = self
            .send(path, self.client.post(self.url(path)).multipart(form))
            .await?;
        Self::read_json(path, response).await
    }

    /// Status code of a GET, without treating non-2xx as an error
    pub async fn probe(&self, path: &str) -> RegistryResult<u16> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| RegistryError::Unavailable(format!("{}: {}", self.url(path), e)))?;
        Ok(response.status().as_u16())
    }
}

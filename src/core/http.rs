use parking_lot::Mutex;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::core::error::{ClientError, Result};

/// Thin wrapper over reqwest that owns the base URL and the bearer token.
///
/// The token lives behind a mutex because the session manager swaps it from
/// whatever task handles login/refresh while other requests may be reading it.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    auth_token: Arc<Mutex<Option<String>>>,
}

impl HttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: Arc::new(Mutex::new(None)),
        })
    }

    /// Set or clear the bearer token attached to every subsequent request.
    pub fn set_auth_token(&self, token: Option<String>) {
        *self.auth_token.lock() = token;
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.get_query(endpoint, &[]).await
    }

    pub async fn get_query<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let mut req = self.client.get(self.url(endpoint));
        if !query.is_empty() {
            req = req.query(query);
        }
        self.send(req).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        self.send(self.client.post(self.url(endpoint)).json(body)).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        self.send(self.client.put(self.url(endpoint)).json(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.send(self.client.delete(self.url(endpoint))).await
    }

    /// POST a local file as a multipart form with a single `file` part.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        file_path: &Path,
    ) -> Result<T> {
        let bytes = tokio::fs::read(file_path).await?;
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);
        self.send(self.client.post(self.url(endpoint)).multipart(form))
            .await
    }

    fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    fn apply_auth(&self, req: RequestBuilder) -> RequestBuilder {
        match self.auth_token.lock().as_deref() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let response = self.apply_auth(req).send().await?;
        Self::handle(response).await
    }

    /// On success, deserialize the JSON body. On a non-success status, pull a
    /// human-readable message out of the body: JSON `detail`/`message` field
    /// first, raw text next, a generic fallback last.
    async fn handle<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(ClientError::from);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(%status, "request failed");
        Err(ClientError::Request {
            status: status.as_u16(),
            message: error_message(status, &body),
        })
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let detail = value
            .get("detail")
            .or_else(|| value.get("message"))
            .and_then(|m| m.as_str());
        if let Some(message) = detail {
            return message.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("request failed with status {}", status.as_u16())
    } else {
        trimmed.to_string()
    }
}

///! HTTP client shared by the cluster and monitoring server clients

use nodekeeper_common::{Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

pub struct ApiClient {
    service: String,
    base_url: String,
    client: reqwest::Client,
    headers: HeaderMap,
    basic_auth: Option<(String, Option<String>)>,
}

impl ApiClient {
    /// Every request made through this client is bounded by `timeout`.
    pub fn new(service: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            service: service.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            headers: HeaderMap::new(),
            basic_auth: None,
        })
    }

    /// Send a static header with every request
    pub fn with_header(mut self, name: &'static str, value: &str) -> Result<Self> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::Config(format!("Invalid value for header {}: {}", name, e)))?;
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(self)
    }

    /// Authenticate every request with HTTP basic auth
    pub fn with_basic_auth(mut self, user: &str, password: Option<&str>) -> Self {
        self.basic_auth = Some((user.to_string(), password.map(str::to_string)));
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build request with configured headers and credentials
    fn build_request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, &url).headers(self.headers.clone());

        if let Some((user, password)) = &self.basic_auth {
            request = request.basic_auth(user, password.as_ref());
        }

        request
    }

    /// GET a JSON document; any non-success status is an upstream error
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(service = %self.service, method = "GET", path, "API request");

        let response = self
            .build_request(Method::GET, path)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Upstream {
                service: self.service.clone(),
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;
        serde_json::from_str(&body).map_err(|e| Error::Decode {
            service: self.service.clone(),
            reason: e.to_string(),
        })
    }

    /// Send a body-less request and hand back the raw status for the caller to interpret
    pub async fn send(&self, method: Method, path: &str) -> Result<StatusCode> {
        debug!(service = %self.service, method = %method, path, "API request");

        let response = self
            .build_request(method, path)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        Ok(response.status())
    }

    /// Map a transport error onto the shared error taxonomy
    pub fn classify(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                service: self.service.clone(),
            }
        } else if err.is_decode() {
            Error::Decode {
                service: self.service.clone(),
                reason: err.to_string(),
            }
        } else {
            Error::Unreachable {
                service: self.service.clone(),
                reason: err.to_string(),
            }
        }
    }
}

/// Percent-encode a single path segment
pub fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

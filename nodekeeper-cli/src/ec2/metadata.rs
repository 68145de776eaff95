//! Instance metadata service client
//!
//! Uses an IMDSv2 session token when the service hands one out and falls
//! back to plain IMDSv1 requests otherwise.

use std::time::Duration;

use chrono::{DateTime, Utc};
use nodekeeper_common::{Credentials, Error, Result};
use serde::Deserialize;
use tracing::debug;

pub const SERVICE: &str = "Instance metadata";

const TOKEN_PATH: &str = "/latest/api/token";
const TOKEN_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";
const TOKEN_TTL_SECS: &str = "21600";
const ROLE_PATH: &str = "/latest/meta-data/iam/security-credentials/";
const REGION_PATH: &str = "/latest/meta-data/placement/region";

/// Role credentials document
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleCredentials {
    #[serde(default)]
    code: Option<String>,
    access_key_id: String,
    secret_access_key: String,
    token: String,
    expiration: DateTime<Utc>,
}

pub struct MetadataClient {
    client: reqwest::Client,
    base_url: String,
}

impl MetadataClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn session_token(&self) -> Option<String> {
        let url = format!("{}{}", self.base_url, TOKEN_PATH);
        let response = self
            .client
            .put(&url)
            .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECS)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "metadata token refused, using IMDSv1");
            return None;
        }

        response.text().await.ok().filter(|t| !t.is_empty())
    }

    async fn fetch(&self, path: &str, token: Option<&str>) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url);
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request.send().await.map_err(|e| Error::Unreachable {
            service: SERVICE.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| Error::Unreachable {
            service: SERVICE.to_string(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(Error::Upstream {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(body)
    }

    /// Fetch a metadata path, authenticating with a fresh session token if available
    pub async fn get(&self, path: &str) -> Result<String> {
        let token = self.session_token().await;
        self.fetch(path, token.as_deref()).await
    }

    /// Temporary credentials issued to the instance profile role
    pub async fn role_credentials(&self) -> Result<Credentials> {
        let token = self.session_token().await;

        let roles = self.fetch(ROLE_PATH, token.as_deref()).await?;
        let role = roles
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| Error::Credentials("no instance profile role attached".to_string()))?;
        debug!(role, "found instance profile role");

        let body = self
            .fetch(&format!("{}{}", ROLE_PATH, role), token.as_deref())
            .await?;
        let document: RoleCredentials = serde_json::from_str(&body).map_err(|e| Error::Decode {
            service: SERVICE.to_string(),
            reason: e.to_string(),
        })?;

        if let Some(code) = document.code.as_deref() {
            if code != "Success" {
                return Err(Error::Credentials(format!(
                    "instance profile credentials unavailable: {}",
                    code
                )));
            }
        }

        Ok(Credentials::new(document.access_key_id, document.secret_access_key)
            .with_session_token(document.token)
            .with_expiration(document.expiration))
    }

    /// Region the instance runs in
    pub async fn region(&self) -> Result<String> {
        let region = self.get(REGION_PATH).await?;
        Ok(region.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_document_parses() {
        let body = r#"{
            "Code" : "Success",
            "LastUpdated" : "2026-10-19T08:00:00Z",
            "Type" : "AWS-HMAC",
            "AccessKeyId" : "ASIAEXAMPLE",
            "SecretAccessKey" : "secret",
            "Token" : "session",
            "Expiration" : "2026-10-19T14:00:00Z"
        }"#;
        let document: RoleCredentials = serde_json::from_str(body).unwrap();

        assert_eq!(document.access_key_id, "ASIAEXAMPLE");
        assert_eq!(document.code.as_deref(), Some("Success"));
        assert_eq!(document.expiration.to_rfc3339(), "2026-10-19T14:00:00+00:00");
    }
}

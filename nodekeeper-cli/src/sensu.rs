//! Monitoring server (Sensu) API client

use std::time::Duration;

use nodekeeper_common::Result;
use reqwest::Method;

use crate::api::{segment, ApiClient};
use crate::config::ApiConfig;

pub const SERVICE: &str = "Sensu API";

/// Outcome of a client deregistration, classified from the response code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionStatus {
    /// 202
    Deleted,
    /// 404
    NotFound,
    /// 500
    ServerError,
    Unclassified(u16),
}

impl DeletionStatus {
    pub fn from_code(code: u16) -> Self {
        match code {
            202 => DeletionStatus::Deleted,
            404 => DeletionStatus::NotFound,
            500 => DeletionStatus::ServerError,
            other => DeletionStatus::Unclassified(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            DeletionStatus::Deleted => 202,
            DeletionStatus::NotFound => 404,
            DeletionStatus::ServerError => 500,
            DeletionStatus::Unclassified(code) => code,
        }
    }

    /// Log line describing the deletion of `node`
    pub fn describe(self, node: &str) -> String {
        match self {
            DeletionStatus::Deleted => {
                format!("[EC2 Node] 202: Successfully deleted Sensu client: {}", node)
            }
            DeletionStatus::NotFound => {
                format!("[EC2 Node] 404: Unable to delete {}, doesn't exist!", node)
            }
            DeletionStatus::ServerError => {
                format!("[EC2 Node] 500: Miscellaneous error when deleting {}", node)
            }
            DeletionStatus::Unclassified(code) => {
                format!("[EC2 Node] {}: Completely unsure of what happened!", code)
            }
        }
    }
}

pub struct SensuClient {
    api: ApiClient,
}

impl SensuClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(SERVICE, base_url, timeout)?,
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let client = Self::new(&config.base_url(), config.timeout())?;
        Ok(match &config.user {
            Some(user) => client.with_basic_auth(user, config.password.as_deref()),
            None => client,
        })
    }

    pub fn with_basic_auth(self, user: &str, password: Option<&str>) -> Self {
        Self {
            api: self.api.with_basic_auth(user, password),
        }
    }

    /// Remove a client registration; the response code is returned, not judged
    pub async fn delete_client(&self, name: &str) -> Result<DeletionStatus> {
        let path = format!("/clients/{}", segment(name));
        let status = self.api.send(Method::DELETE, &path).await?;
        Ok(DeletionStatus::from_code(status.as_u16()))
    }
}

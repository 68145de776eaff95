//! Consul agent client
//!
//! Only the two agent endpoints the checks need: the member list and
//! force-leave.

use std::time::Duration;

use nodekeeper_common::{ClusterMember, Error, Result};
use reqwest::Method;
use tracing::debug;

use crate::api::{segment, ApiClient};
use crate::config::ConsulConfig;

pub const SERVICE: &str = "Consul";

pub struct ConsulClient {
    api: ApiClient,
}

impl ConsulClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(SERVICE, base_url, timeout)?,
        })
    }

    pub fn from_config(config: &ConsulConfig) -> Result<Self> {
        let client = Self::new(&config.base_url(), config.timeout())?;
        match &config.token {
            Some(token) => client.with_token(token),
            None => Ok(client),
        }
    }

    /// Authenticate requests with an ACL token
    pub fn with_token(self, token: &str) -> Result<Self> {
        Ok(Self {
            api: self.api.with_header("x-consul-token", token)?,
        })
    }

    /// Current cluster membership as seen by the local agent
    pub async fn members(&self) -> Result<Vec<ClusterMember>> {
        let members: Vec<ClusterMember> = self.api.get("/v1/agent/members").await?;
        debug!(count = members.len(), "fetched cluster members");
        Ok(members)
    }

    /// Force a member into the left state
    pub async fn force_leave(&self, name: &str) -> Result<()> {
        let path = format!("/v1/agent/force-leave/{}", segment(name));
        let status = self.api.send(Method::PUT, &path).await?;

        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Upstream {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                message: format!("force-leave of {} was rejected", name),
            })
        }
    }
}

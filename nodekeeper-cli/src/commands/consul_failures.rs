//! Alert when the cluster has failed members or cannot be queried

use nodekeeper_common::{failed_members, ClusterMember};
use tracing::{info, warn};

use super::consul_error_output;
use crate::consul::ConsulClient;
use crate::plugin::PluginOutput;

pub struct ClusterHealthCheck {
    consul: ConsulClient,
}

impl ClusterHealthCheck {
    pub const NAME: &'static str = "CheckConsulFailures";

    pub fn new(consul: ConsulClient) -> Self {
        Self { consul }
    }

    pub async fn run(&self) -> PluginOutput {
        match self.consul.members().await {
            Ok(members) => evaluate(&members),
            Err(e) => {
                warn!(error = %e, "membership query failed");
                consul_error_output(Self::NAME, &e)
            }
        }
    }
}

/// A single failed member is enough to alert
pub fn evaluate(members: &[ClusterMember]) -> PluginOutput {
    let failed = failed_members(members);
    if failed.is_empty() {
        return PluginOutput::ok(ClusterHealthCheck::NAME, None);
    }

    let names: Vec<&str> = failed.iter().map(|m| m.name.as_str()).collect();
    info!(failed = ?names, "failed cluster members found");
    PluginOutput::critical(
        ClusterHealthCheck::NAME,
        "Failed nodes exist within the consul cluster!",
    )
}

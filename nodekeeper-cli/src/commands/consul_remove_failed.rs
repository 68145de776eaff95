//! Force failed members out of the cluster

use nodekeeper_common::{failed_members, Result};
use tracing::{info, warn};

use super::consul_error_output;
use crate::consul::ConsulClient;
use crate::plugin::PluginOutput;

/// Result of one force-leave attempt
#[derive(Debug)]
pub struct RemovalOutcome {
    pub member: String,
    pub result: Result<()>,
}

/// Every removal attempted during one invocation
#[derive(Debug, Default)]
pub struct RemovalReport {
    pub outcomes: Vec<RemovalOutcome>,
}

impl RemovalReport {
    pub fn removed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.member.as_str())
            .collect()
    }

    pub fn failed(&self) -> Vec<&RemovalOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn to_output(&self) -> PluginOutput {
        let name = ClusterFailureRemover::NAME;

        if self.is_empty() {
            return PluginOutput::ok(name, Some("No failed nodes"));
        }

        let failed = self.failed();
        if failed.is_empty() {
            return PluginOutput::ok(
                name,
                Some(&format!("Removed failed nodes: {}", self.removed().join(", "))),
            );
        }

        let names: Vec<&str> = failed.iter().map(|o| o.member.as_str()).collect();
        PluginOutput::critical(
            name,
            &format!("Unable to remove failed nodes: {}", names.join(", ")),
        )
    }
}

pub struct ClusterFailureRemover {
    consul: ConsulClient,
}

impl ClusterFailureRemover {
    pub const NAME: &'static str = "ConsulRemoveFailedNodes";

    pub fn new(consul: ConsulClient) -> Self {
        Self { consul }
    }

    /// Force-leave every failed member, one at a time
    ///
    /// Only the membership query can fail the whole call; individual
    /// removals are recorded in the report.
    pub async fn remove_failed(&self) -> Result<RemovalReport> {
        let members = self.consul.members().await?;
        let mut report = RemovalReport::default();

        for member in failed_members(&members) {
            let result = self.consul.force_leave(&member.name).await;
            match &result {
                Ok(()) => info!(member = %member.name, "forced failed member to leave"),
                Err(e) => warn!(member = %member.name, error = %e, "force-leave failed"),
            }
            report.outcomes.push(RemovalOutcome {
                member: member.name.clone(),
                result,
            });
        }

        Ok(report)
    }

    pub async fn run(&self) -> PluginOutput {
        match self.remove_failed().await {
            Ok(report) => report.to_output(),
            Err(e) => {
                warn!(error = %e, "membership query failed");
                consul_error_output(Self::NAME, &e)
            }
        }
    }
}

//! Deregister monitoring clients whose EC2 instance is gone
//!
//! The client name is taken to be the instance id. A client is deleted when
//! the inventory has no such instance, or when the instance is in a state
//! outside the allowed set and its state reason matches none of the allowed
//! reason patterns.

use nodekeeper_common::{CloudInstance, Error, MonitoredNodeEvent, Result};
use regex::Regex;
use tracing::{debug, info, warn};

use super::error_status;
use crate::ec2::InstanceInventory;
use crate::plugin::{CheckStatus, PluginOutput};
use crate::sensu::{DeletionStatus, SensuClient};

/// Compile the allowed state reason patterns
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| Error::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Deletion predicate over an inventory lookup result
pub fn should_delete(
    instance: Option<&CloudInstance>,
    allowed_states: &[String],
    allowed_reasons: &[Regex],
) -> bool {
    let instance = match instance {
        Some(instance) => instance,
        None => return true,
    };

    let state_allowed = allowed_states.iter().any(|s| s == &instance.state);
    let reason_allowed = match instance.state_reason_code.as_deref() {
        Some(code) => allowed_reasons.iter().any(|re| re.is_match(code)),
        None => false,
    };

    !state_allowed && !reason_allowed
}

/// What the reaper did with a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaperOutcome {
    Preserved { node: String },
    Deleted { node: String, status: DeletionStatus },
}

impl ReaperOutcome {
    /// Deletion results are informational, so every outcome exits OK
    pub fn to_output(&self) -> PluginOutput {
        let line = match self {
            ReaperOutcome::Preserved { node } => {
                format!("[EC2 Node] {} appears to exist in EC2", node)
            }
            ReaperOutcome::Deleted { node, status } => status.describe(node),
        };
        PluginOutput::handler(CheckStatus::Ok, line)
    }
}

pub struct StaleNodeReaper<I> {
    inventory: I,
    sensu: SensuClient,
}

impl<I: InstanceInventory> StaleNodeReaper<I> {
    pub fn new(inventory: I, sensu: SensuClient) -> Self {
        Self { inventory, sensu }
    }

    /// Look the node up and decide whether its registration should go
    pub async fn decide(&self, event: &MonitoredNodeEvent) -> Result<bool> {
        let patterns = compile_patterns(&event.allowed_state_reason_patterns)?;
        let instance = self.inventory.describe_instance(&event.client_name).await?;

        match &instance {
            Some(instance) => debug!(
                node = %event.client_name,
                state = %instance.state,
                reason = ?instance.state_reason_code,
                "instance found"
            ),
            None => debug!(node = %event.client_name, "no matching instance"),
        }

        Ok(should_delete(
            instance.as_ref(),
            &event.allowed_states,
            &patterns,
        ))
    }

    pub async fn handle(&self, event: &MonitoredNodeEvent) -> Result<ReaperOutcome> {
        let node = event.client_name.clone();

        if !self.decide(event).await? {
            info!(node = %node, "instance still exists, keeping client");
            return Ok(ReaperOutcome::Preserved { node });
        }

        let status = self.sensu.delete_client(&node).await?;
        match status {
            DeletionStatus::Deleted => info!(node = %node, "deleted monitoring client"),
            other => warn!(node = %node, code = other.code(), "client deletion not acknowledged"),
        }

        Ok(ReaperOutcome::Deleted { node, status })
    }

    pub async fn run(&self, event: &MonitoredNodeEvent) -> PluginOutput {
        match self.handle(event).await {
            Ok(outcome) => outcome.to_output(),
            Err(e) => {
                warn!(node = %event.client_name, error = %e, "reaper failed");
                failure_output(&event.client_name, &e)
            }
        }
    }
}

/// Handler line for an invocation that could not reach a decision
pub fn failure_output(node: &str, err: &Error) -> PluginOutput {
    PluginOutput::handler(
        error_status(err),
        format!("[EC2 Node] Unable to process {}: {}", node, err),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    fn instance(state: &str, reason: Option<&str>) -> CloudInstance {
        CloudInstance {
            id: "i-1bc624e7".to_string(),
            state: state.to_string(),
            state_reason_code: reason.map(str::to_string),
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn patterns(values: &[&str]) -> Vec<Regex> {
        compile_patterns(&strings(values)).unwrap()
    }

    #[test]
    fn test_missing_instance_is_deleted() {
        assert!(should_delete(None, &strings(&["running"]), &patterns(&[".*"])));
    }

    #[test]
    fn test_running_instance_is_kept() {
        let running = instance("running", None);
        assert!(!should_delete(Some(&running), &strings(&["running"]), &patterns(&[".*"])));
    }

    #[test]
    fn test_excluded_state_without_reason_is_deleted() {
        let terminated = instance("terminated", None);
        assert!(should_delete(Some(&terminated), &strings(&["running"]), &patterns(&[".*"])));
    }

    #[test]
    fn test_matching_reason_keeps_instance() {
        let stopped = instance("stopped", Some("Client.UserInitiatedShutdown"));
        assert!(!should_delete(Some(&stopped), &strings(&["running"]), &patterns(&[".*"])));
        assert!(!should_delete(
            Some(&stopped),
            &strings(&["running"]),
            &patterns(&["UserInitiated"])
        ));
    }

    #[test]
    fn test_unmatched_reason_is_deleted() {
        let spot = instance("terminated", Some("Server.SpotInstanceTermination"));
        assert!(should_delete(
            Some(&spot),
            &strings(&["running"]),
            &patterns(&["^Client\\."])
        ));
        assert!(should_delete(Some(&spot), &strings(&["running"]), &[]));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = compile_patterns(&strings(&["("])).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { ref pattern, .. } if pattern == "("));
    }

    #[test]
    fn test_outcome_lines() {
        let kept = ReaperOutcome::Preserved {
            node: "i-1bc624e7".to_string(),
        };
        assert_eq!(kept.to_output().line, "[EC2 Node] i-1bc624e7 appears to exist in EC2");

        let gone = ReaperOutcome::Deleted {
            node: "i-1bc624e7".to_string(),
            status: DeletionStatus::NotFound,
        };
        let out = gone.to_output();
        assert_eq!(out.line, "[EC2 Node] 404: Unable to delete i-1bc624e7, doesn't exist!");
        assert_eq!(out.status, CheckStatus::Ok);
    }

    struct FakeInventory {
        instances: HashMap<String, CloudInstance>,
    }

    #[async_trait]
    impl InstanceInventory for FakeInventory {
        async fn describe_instance(&self, instance_id: &str) -> Result<Option<CloudInstance>> {
            Ok(self.instances.get(instance_id).cloned())
        }
    }

    // Points at a closed port; reaching it would fail the test.
    fn offline_sensu() -> SensuClient {
        SensuClient::new("http://127.0.0.1:1", Duration::from_millis(200)).unwrap()
    }

    #[tokio::test]
    async fn test_running_instance_never_contacts_sensu() {
        let mut instances = HashMap::new();
        instances.insert("i-1bc624e7".to_string(), instance("running", None));
        let reaper = StaleNodeReaper::new(FakeInventory { instances }, offline_sensu());

        let outcome = reaper
            .handle(&MonitoredNodeEvent::new("i-1bc624e7"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReaperOutcome::Preserved {
                node: "i-1bc624e7".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_sensu_is_critical() {
        let reaper = StaleNodeReaper::new(
            FakeInventory {
                instances: HashMap::new(),
            },
            offline_sensu(),
        );

        let out = reaper.run(&MonitoredNodeEvent::new("i-1bc624e7")).await;
        assert_eq!(out.status, CheckStatus::Critical);
        assert!(out.line.starts_with("[EC2 Node] Unable to process i-1bc624e7"));
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_unknown() {
        let reaper = StaleNodeReaper::new(
            FakeInventory {
                instances: HashMap::new(),
            },
            offline_sensu(),
        );
        let mut event = MonitoredNodeEvent::new("i-1bc624e7");
        event.allowed_state_reason_patterns = vec!["[".to_string()];

        let out = reaper.run(&event).await;
        assert_eq!(out.status, CheckStatus::Unknown);
    }
}

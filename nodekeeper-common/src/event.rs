///! Monitoring event types
///!
///! Handlers receive the triggering event as JSON on stdin. Only the parts
///! the handlers act on are modelled; unknown fields are ignored.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// States a node may be in without being considered stale
pub const DEFAULT_ALLOWED_STATES: &[&str] = &["running"];

/// State reason patterns that preserve a node
pub const DEFAULT_STATE_REASON_PATTERNS: &[&str] = &[".*"];

/// Event as delivered by the monitoring server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensuEvent {
    pub client: ClientInfo,
}

/// Client (monitored node) section of an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ec2_states: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ec2_state_reasons: Option<Vec<String>>,
}

/// The node a reaper invocation is deciding about, with defaults applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredNodeEvent {
    pub client_name: String,
    pub allowed_states: Vec<String>,
    pub allowed_state_reason_patterns: Vec<String>,
}

impl MonitoredNodeEvent {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            allowed_states: DEFAULT_ALLOWED_STATES.iter().map(|s| s.to_string()).collect(),
            allowed_state_reason_patterns: DEFAULT_STATE_REASON_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Parse a raw event document
    pub fn from_json(raw: &str) -> Result<Self> {
        let event: SensuEvent = serde_json::from_str(raw)
            .map_err(|e| Error::InvalidEvent(e.to_string()))?;
        Self::try_from(event)
    }
}

impl TryFrom<SensuEvent> for MonitoredNodeEvent {
    type Error = Error;

    fn try_from(event: SensuEvent) -> Result<Self> {
        let name = event.client.name;
        if name.trim().is_empty() {
            return Err(Error::InvalidEvent("client name is empty".to_string()));
        }
        // The name is used verbatim for the inventory lookup and the registry delete.
        if name.trim() != name {
            return Err(Error::InvalidEvent(format!(
                "client name '{}' has surrounding whitespace",
                name
            )));
        }

        let mut node = MonitoredNodeEvent::new(name);
        if let Some(states) = event.client.ec2_states {
            node.allowed_states = states;
        }
        if let Some(reasons) = event.client.ec2_state_reasons {
            node.allowed_state_reason_patterns = reasons;
        }

        Ok(node)
    }
}

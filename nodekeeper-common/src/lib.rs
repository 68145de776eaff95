//! Common types shared between the nodekeeper checks and handlers

pub mod cloud;
pub mod event;

pub use cloud::{CloudInstance, Credentials};
pub use event::{ClientInfo, MonitoredNodeEvent, SensuEvent};

use serde::{Deserialize, Serialize};

/// Cluster member liveness status, as numbered by serf
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "u8", into = "u8")]
pub enum MemberStatus {
    None,
    Alive,
    Leaving,
    Left,
    Failed,
    Other(u8),
}

impl From<u8> for MemberStatus {
    fn from(code: u8) -> Self {
        match code {
            0 => MemberStatus::None,
            1 => MemberStatus::Alive,
            2 => MemberStatus::Leaving,
            3 => MemberStatus::Left,
            4 => MemberStatus::Failed,
            other => MemberStatus::Other(other),
        }
    }
}

impl From<MemberStatus> for u8 {
    fn from(status: MemberStatus) -> Self {
        match status {
            MemberStatus::None => 0,
            MemberStatus::Alive => 1,
            MemberStatus::Leaving => 2,
            MemberStatus::Left => 3,
            MemberStatus::Failed => 4,
            MemberStatus::Other(code) => code,
        }
    }
}

impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Alive => write!(f, "alive"),
            Self::Leaving => write!(f, "leaving"),
            Self::Left => write!(f, "left"),
            Self::Failed => write!(f, "failed"),
            Self::Other(code) => write!(f, "unknown({})", code),
        }
    }
}

/// A member of the service-discovery cluster as reported by `/v1/agent/members`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterMember {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Status")]
    pub status: MemberStatus,
}

impl ClusterMember {
    pub fn is_failed(&self) -> bool {
        self.status == MemberStatus::Failed
    }
}

/// Select the members currently reported as failed
pub fn failed_members(members: &[ClusterMember]) -> Vec<&ClusterMember> {
    members.iter().filter(|m| m.is_failed()).collect()
}

/// Error types shared by every component
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{service} is not responding: {reason}")]
    Unreachable { service: String, reason: String },

    #[error("{service} connection timed out")]
    Timeout { service: String },

    #[error("{service} returned {status}: {message}")]
    Upstream {
        service: String,
        status: u16,
        message: String,
    },

    #[error("Failed to decode response from {service}: {reason}")]
    Decode { service: String, reason: String },

    #[error("Unable to acquire cloud credentials: {0}")]
    Credentials(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Invalid state reason pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

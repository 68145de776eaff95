//! The checks and handlers exposed as subcommands

pub mod consul_failures;
pub mod consul_remove_failed;
pub mod ec2_node;

use nodekeeper_common::Error;

use crate::plugin::{CheckStatus, PluginOutput};

pub use consul_failures::ClusterHealthCheck;
pub use consul_remove_failed::{ClusterFailureRemover, RemovalOutcome, RemovalReport};
pub use ec2_node::{ReaperOutcome, StaleNodeReaper};

/// Severity of an error that ended an invocation early
///
/// Anything that prevented talking to an upstream is CRITICAL; problems with
/// our own inputs or with understanding a response are UNKNOWN.
pub fn error_status(err: &Error) -> CheckStatus {
    match err {
        Error::Unreachable { .. } | Error::Timeout { .. } | Error::Upstream { .. } => {
            CheckStatus::Critical
        }
        _ => CheckStatus::Unknown,
    }
}

/// Check output for a failed membership query
pub(crate) fn consul_error_output(name: &str, err: &Error) -> PluginOutput {
    match err {
        Error::Timeout { .. } => PluginOutput::critical(name, "Consul Connection timed out"),
        Error::Unreachable { .. } | Error::Upstream { .. } => {
            PluginOutput::critical(name, "Consul is not responding")
        }
        other => PluginOutput::check(name, error_status(other), Some(&other.to_string())),
    }
}

//! Cloud inventory access: credentials, request signing and instance lookups

pub mod credentials;
pub mod inventory;
pub mod metadata;
pub mod signing;

use std::sync::Arc;

use nodekeeper_common::{Error, Result};
use tracing::debug;

use crate::config::AwsConfig;

pub use credentials::{CachedCredentials, CredentialChain, ProvideCredentials};
pub use inventory::{Ec2Inventory, InstanceInventory};
pub use metadata::MetadataClient;

/// Environment variable lookup, injectable so tests never touch the process env
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub fn process_env() -> EnvLookup {
    Arc::new(|key: &str| std::env::var(key).ok())
}

const REGION_VARS: [&str; 3] = ["EC2_REGION", "AWS_REGION", "AWS_DEFAULT_REGION"];

/// Strip an availability-zone suffix: `us-east-1c` becomes `us-east-1`
pub fn normalize_region(value: &str) -> String {
    let value = value.trim();
    let mut chars = value.chars().rev();

    match (chars.next(), chars.next()) {
        (Some(zone), Some(digit)) if zone.is_ascii_lowercase() && digit.is_ascii_digit() => {
            value[..value.len() - 1].to_string()
        }
        _ => value.to_string(),
    }
}

/// Settings, then the region variables, then instance metadata
pub async fn resolve_region(
    configured: Option<&str>,
    lookup: &EnvLookup,
    metadata: &MetadataClient,
) -> Result<String> {
    if let Some(region) = configured.filter(|r| !r.trim().is_empty()) {
        return Ok(normalize_region(region));
    }

    for var in REGION_VARS {
        if let Some(region) = lookup(var).filter(|r| !r.trim().is_empty()) {
            debug!(var, "region taken from environment");
            return Ok(normalize_region(&region));
        }
    }

    let region = metadata
        .region()
        .await
        .map_err(|e| Error::Config(format!("Unable to determine AWS region: {}", e)))?;
    if region.is_empty() {
        return Err(Error::Config("Unable to determine AWS region".to_string()));
    }
    Ok(normalize_region(&region))
}

impl Ec2Inventory {
    /// Wire the standard credential chain and region resolution from settings
    pub async fn from_config(config: &AwsConfig, lookup: EnvLookup) -> Result<Self> {
        let metadata = Arc::new(MetadataClient::new(
            &config.metadata_endpoint,
            config.metadata_timeout(),
        )?);
        let region = resolve_region(config.region.as_deref(), &lookup, &metadata).await?;
        let chain = CredentialChain::standard(config, lookup, metadata);

        Self::new(
            config.endpoint.as_deref(),
            &region,
            config.timeout(),
            CachedCredentials::new(chain),
        )
    }
}

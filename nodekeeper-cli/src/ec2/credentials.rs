//! Credential provider chain
//!
//! Providers are consulted in order; the first one holding a complete key
//! pair wins. Resolved credentials are cached until their expiration.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use nodekeeper_common::{Credentials, Error, Result};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::metadata::MetadataClient;
use super::EnvLookup;
use crate::config::AwsConfig;

#[async_trait]
pub trait ProvideCredentials: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means this provider has nothing to offer and the chain moves on.
    async fn provide(&self) -> Result<Option<Credentials>>;
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Keys from the settings file
pub struct StaticProvider {
    access_key: Option<String>,
    secret_key: Option<String>,
}

impl StaticProvider {
    pub fn new(access_key: Option<String>, secret_key: Option<String>) -> Self {
        Self {
            access_key: non_empty(access_key),
            secret_key: non_empty(secret_key),
        }
    }
}

#[async_trait]
impl ProvideCredentials for StaticProvider {
    fn name(&self) -> &'static str {
        "settings"
    }

    async fn provide(&self) -> Result<Option<Credentials>> {
        Ok(match (&self.access_key, &self.secret_key) {
            (Some(key), Some(secret)) => Some(Credentials::new(key.as_str(), secret.as_str())),
            _ => None,
        })
    }
}

/// `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and optionally `AWS_SESSION_TOKEN`
pub struct EnvironmentProvider {
    lookup: EnvLookup,
}

impl EnvironmentProvider {
    pub fn new(lookup: EnvLookup) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl ProvideCredentials for EnvironmentProvider {
    fn name(&self) -> &'static str {
        "environment"
    }

    async fn provide(&self) -> Result<Option<Credentials>> {
        let key = non_empty((self.lookup)("AWS_ACCESS_KEY_ID"));
        let secret = non_empty((self.lookup)("AWS_SECRET_ACCESS_KEY"));

        Ok(match (key, secret) {
            (Some(key), Some(secret)) => {
                let credentials = Credentials::new(key, secret);
                Some(match non_empty((self.lookup)("AWS_SESSION_TOKEN")) {
                    Some(token) => credentials.with_session_token(token),
                    None => credentials,
                })
            }
            _ => None,
        })
    }
}

/// Temporary credentials issued to the instance profile
pub struct InstanceProfileProvider {
    metadata: Arc<MetadataClient>,
}

impl InstanceProfileProvider {
    pub fn new(metadata: Arc<MetadataClient>) -> Self {
        Self { metadata }
    }
}

#[async_trait]
impl ProvideCredentials for InstanceProfileProvider {
    fn name(&self) -> &'static str {
        "instance-profile"
    }

    async fn provide(&self) -> Result<Option<Credentials>> {
        self.metadata.role_credentials().await.map(Some)
    }
}

pub struct CredentialChain {
    providers: Vec<Box<dyn ProvideCredentials>>,
}

impl CredentialChain {
    pub fn new(providers: Vec<Box<dyn ProvideCredentials>>) -> Self {
        Self { providers }
    }

    /// Settings, then environment, then instance profile
    pub fn standard(config: &AwsConfig, lookup: EnvLookup, metadata: Arc<MetadataClient>) -> Self {
        Self::new(vec![
            Box::new(StaticProvider::new(config.access_key.clone(), config.secret_key.clone())),
            Box::new(EnvironmentProvider::new(lookup)),
            Box::new(InstanceProfileProvider::new(metadata)),
        ])
    }

    pub async fn resolve(&self) -> Result<Credentials> {
        let mut last_error = None;

        for provider in &self.providers {
            match provider.provide().await {
                Ok(Some(credentials)) => {
                    debug!(provider = provider.name(), "resolved cloud credentials");
                    return Ok(credentials);
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "credential provider failed");
                    last_error = Some(e);
                }
            }
        }

        Err(Error::Credentials(match last_error {
            Some(e) => format!("no credential provider succeeded, last error: {}", e),
            None => "no credential provider succeeded".to_string(),
        }))
    }
}

/// Lazily resolved credentials, refreshed once expired
pub struct CachedCredentials {
    chain: CredentialChain,
    cached: RwLock<Option<Credentials>>,
}

impl CachedCredentials {
    pub fn new(chain: CredentialChain) -> Self {
        Self {
            chain,
            cached: RwLock::new(None),
        }
    }

    pub async fn get(&self) -> Result<Credentials> {
        {
            let cached = self.cached.read().await;
            if let Some(credentials) = cached.as_ref() {
                if !credentials.is_expired_at(Utc::now()) {
                    return Ok(credentials.clone());
                }
                debug!("cached credentials expired, refreshing");
            }
        }

        let credentials = self.chain.resolve().await?;
        let mut cached = self.cached.write().await;
        *cached = Some(credentials.clone());
        Ok(credentials)
    }
}

//! Instance inventory lookups against the EC2 query API

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use nodekeeper_common::{CloudInstance, Error, Result};
use reqwest::Url;
use tracing::debug;

use super::credentials::CachedCredentials;
use super::signing::{canonical_query, sign, SigningRequest};

pub const SERVICE: &str = "EC2";
pub const API_VERSION: &str = "2016-11-15";

/// Source of truth for whether an instance exists
#[async_trait]
pub trait InstanceInventory: Send + Sync {
    /// `Ok(None)` when the provider reports no instance with this id.
    async fn describe_instance(&self, instance_id: &str) -> Result<Option<CloudInstance>>;
}

pub struct Ec2Inventory {
    client: reqwest::Client,
    endpoint: Url,
    host: String,
    region: String,
    credentials: CachedCredentials,
}

impl Ec2Inventory {
    /// `endpoint` defaults to the public regional endpoint
    pub fn new(
        endpoint: Option<&str>,
        region: &str,
        timeout: Duration,
        credentials: CachedCredentials,
    ) -> Result<Self> {
        let endpoint = match endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://ec2.{}.amazonaws.com", region),
        };
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| Error::Config(format!("Invalid EC2 endpoint {}: {}", endpoint, e)))?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(Error::Config(format!("EC2 endpoint {} has no host", endpoint))),
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            host,
            region: region.to_string(),
            credentials,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn classify(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                service: SERVICE.to_string(),
            }
        } else {
            Error::Unreachable {
                service: SERVICE.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl InstanceInventory for Ec2Inventory {
    async fn describe_instance(&self, instance_id: &str) -> Result<Option<CloudInstance>> {
        let credentials = self.credentials.get().await?;

        // A filter never errors on unknown or malformed ids; it just matches nothing.
        let query = canonical_query(&[
            ("Action", "DescribeInstances"),
            ("Version", API_VERSION),
            ("Filter.1.Name", "instance-id"),
            ("Filter.1.Value.1", instance_id),
        ]);
        let request = SigningRequest {
            method: "GET",
            host: &self.host,
            path: "/",
            query: &query,
            payload: b"",
        };
        let headers = sign(&request, &credentials, &self.region, "ec2", Utc::now())?;

        let mut url = self.endpoint.clone();
        url.set_path("/");
        url.set_query(Some(&query));

        debug!(instance_id, region = %self.region, "describing instance");
        let mut builder = self.client.get(url);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            let message = match parse_error(&body) {
                Some((code, message)) => format!("{}: {}", code, message),
                None => body,
            };
            return Err(Error::Upstream {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let instance = parse_instances(&body)
            .into_iter()
            .find(|instance| instance.id == instance_id);
        debug!(instance_id, found = instance.is_some(), "inventory lookup finished");

        Ok(instance)
    }
}

/// Extract value from XML tag
fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    extract_section(xml, tag).map(|s| s.trim().to_string())
}

/// Raw contents of the first `<tag>...</tag>` element
fn extract_section<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    find_section(xml, tag).map(|(start, end)| &xml[start..end])
}

/// Byte range of the contents of the first `<tag>...</tag>` element
fn find_section(xml: &str, tag: &str) -> Option<(usize, usize)> {
    let start_tag = format!("<{}>", tag);
    let end_tag = format!("</{}>", tag);

    let start = xml.find(&start_tag)? + start_tag.len();
    let end = xml[start..].find(&end_tag)? + start;
    Some((start, end))
}

/// Pull every instance record out of a `DescribeInstances` response
pub fn parse_instances(xml: &str) -> Vec<CloudInstance> {
    let mut instances = Vec::new();
    let mut rest = xml;

    while let Some((start, end)) = find_section(rest, "instancesSet") {
        let set = &rest[start..end];
        // Each instance record opens with its id.
        for record in set.split("<instanceId>").skip(1) {
            let id = match record.split("</instanceId>").next() {
                Some(id) => id.trim().to_string(),
                None => continue,
            };
            let state = extract_section(record, "instanceState")
                .and_then(|s| extract_xml_value(s, "name"))
                .unwrap_or_default();
            let state_reason_code = extract_section(record, "stateReason")
                .and_then(|s| extract_xml_value(s, "code"))
                .filter(|code| !code.is_empty());

            instances.push(CloudInstance {
                id,
                state,
                state_reason_code,
            });
        }

        rest = &rest[end..];
    }

    instances
}

/// `(Code, Message)` of an EC2 error document
pub fn parse_error(xml: &str) -> Option<(String, String)> {
    let error = extract_section(xml, "Error")?;
    let code = extract_xml_value(error, "Code")?;
    let message = extract_xml_value(error, "Message").unwrap_or_default();
    Some((code, message))
}

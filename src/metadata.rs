//! EC2 instance metadata.
//!
//! Uses IMDSv2: a session token is requested with `PUT /latest/api/token` and
//! sent on every metadata `GET`. A 404 for a key means the instance has no
//! such attribute (e.g. no public IP in a private subnet).

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use tracing::{debug, info};

use crate::error::{ProvisionError, Result};

const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
const TOKEN_TTL_SECS: &str = "21600";

/// What the provisioner needs to know about the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceMetadata {
    pub region: String,
    pub public_hostname: Option<String>,
    pub public_ipv4: Option<String>,
}

impl InstanceMetadata {
    /// Build metadata from raw lookups, applying the hostname fallback.
    ///
    /// # Errors
    ///
    /// `Metadata` if the region is missing or the instance has neither a
    /// public hostname nor a public IP.
    pub fn assemble(
        region: Option<String>,
        public_hostname: Option<String>,
        public_ipv4: Option<String>,
    ) -> Result<Self> {
        let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        let region = non_empty(region)
            .ok_or_else(|| ProvisionError::metadata("instance region is unavailable"))?;
        let public_hostname = non_empty(public_hostname);
        let public_ipv4 = non_empty(public_ipv4);

        if public_hostname.is_none() && public_ipv4.is_none() {
            return Err(ProvisionError::metadata(
                "instance has neither a public hostname nor a public IPv4 address",
            ));
        }

        Ok(Self {
            region,
            public_hostname,
            public_ipv4,
        })
    }

    /// Hostname the site is served under; falls back to the public IP.
    pub fn site_host(&self) -> &str {
        self.public_hostname
            .as_deref()
            .or(self.public_ipv4.as_deref())
            .unwrap_or_default()
    }

    pub fn site_url(&self) -> String {
        format!("http://{}", self.site_host())
    }
}

/// Source of instance metadata.
pub trait MetadataSource {
    /// Fetch metadata. When `region_override` is set the region lookup is
    /// skipped and the override is used.
    fn fetch(&self, region_override: Option<&str>) -> Result<InstanceMetadata>;
}

/// IMDSv2 client.
pub struct ImdsClient {
    endpoint: String,
    client: Client,
}

impl ImdsClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).no_proxy().build()?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn token(&self) -> Result<String> {
        let response = self
            .client
            .put(format!("{}/latest/api/token", self.endpoint))
            .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECS)
            .send()
            .map_err(|e| ProvisionError::metadata(format!("token request failed: {e}")))?
            .error_for_status()
            .map_err(|e| ProvisionError::metadata(format!("token request rejected: {e}")))?;
        Ok(response.text()?)
    }

    fn get(&self, token: &str, key: &str) -> Result<Option<String>> {
        let url = format!("{}/latest/meta-data/{}", self.endpoint, key);
        debug!(%url, "metadata lookup");

        let response = self
            .client
            .get(&url)
            .header(TOKEN_HEADER, token)
            .send()
            .map_err(|e| ProvisionError::metadata(format!("{key}: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| ProvisionError::metadata(format!("{key}: {e}")))?;
        Ok(Some(response.text()?))
    }
}

impl MetadataSource for ImdsClient {
    fn fetch(&self, region_override: Option<&str>) -> Result<InstanceMetadata> {
        let token = self.token()?;

        let region = match region_override {
            Some(region) => Some(region.to_string()),
            None => self.get(&token, "placement/region")?,
        };
        let public_hostname = self.get(&token, "public-hostname")?;
        let public_ipv4 = self.get(&token, "public-ipv4")?;

        let metadata = InstanceMetadata::assemble(region, public_hostname, public_ipv4)?;
        info!(
            region = %metadata.region,
            host = %metadata.site_host(),
            "instance metadata loaded"
        );
        Ok(metadata)
    }
}

//! Deployment settings.
//!
//! Layered like the service configuration: built-in defaults, then `deploy.toml`,
//! then `PARAKEET_DEPLOY_*` environment variables.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::duration_secs;
use crate::constants::http::DEFAULT_PORT;
use crate::error::ProvisionError;

fn default_region() -> String { "us-east-1".to_string() }
fn default_repository() -> String { "parakeet-asr".to_string() }
fn default_image_tag() -> String { "latest".to_string() }
fn default_instance_type() -> String { "ml.g6e.12xlarge".to_string() }
fn default_instance_count() -> i32 { 1 }
fn default_health_check_timeout_secs() -> i32 { 600 }
fn default_name_prefix() -> String { "parakeet".to_string() }
fn default_container_port() -> u16 { DEFAULT_PORT }
fn default_poll_delay() -> Duration { Duration::from_secs(30) }
fn default_max_poll_attempts() -> u32 { 60 }
fn default_list_filter() -> String { "parakeet".to_string() }

/// Settings for creating, listing and tearing down hosted endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Cloud region
    #[serde(default = "default_region")]
    pub region: String,

    /// Role the hosted model runs as (required)
    #[serde(default)]
    pub execution_role_arn: String,

    /// Full container image URI; built from the registry fields when unset
    #[serde(default)]
    pub image_uri: Option<String>,

    /// Registry account used to build the image URI
    #[serde(default)]
    pub account_id: Option<String>,

    /// Registry repository used to build the image URI
    #[serde(default = "default_repository")]
    pub repository: String,

    /// Image tag used to build the image URI
    #[serde(default = "default_image_tag")]
    pub image_tag: String,

    /// Instance type of the serving variant
    #[serde(default = "default_instance_type")]
    pub instance_type: String,

    /// Initial instance count of the serving variant
    #[serde(default = "default_instance_count")]
    pub instance_count: i32,

    /// How long the platform waits for the container's first healthy ping
    #[serde(default = "default_health_check_timeout_secs")]
    pub health_check_timeout_secs: i32,

    /// Prefix of generated resource names
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Port the container is told to bind
    #[serde(default = "default_container_port")]
    pub container_port: u16,

    /// Fixed delay between status polls
    #[serde(with = "duration_secs", default = "default_poll_delay")]
    pub poll_delay: Duration,

    /// Status polls before giving up
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Substring endpoint names must contain to be listed
    #[serde(default = "default_list_filter")]
    pub list_filter: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            execution_role_arn: String::new(),
            image_uri: None,
            account_id: None,
            repository: default_repository(),
            image_tag: default_image_tag(),
            instance_type: default_instance_type(),
            instance_count: default_instance_count(),
            health_check_timeout_secs: default_health_check_timeout_secs(),
            name_prefix: default_name_prefix(),
            container_port: default_container_port(),
            poll_delay: default_poll_delay(),
            max_poll_attempts: default_max_poll_attempts(),
            list_filter: default_list_filter(),
        }
    }
}

impl DeployConfig {
    /// Load deploy settings from `deploy.toml` and `PARAKEET_DEPLOY_*`.
    pub fn load() -> Result<Self, ProvisionError> {
        Self::from_figment(Self::figment())
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(DeployConfig::default()))
            .merge(Toml::file("deploy.toml"))
            .merge(Env::prefixed("PARAKEET_DEPLOY_"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ProvisionError> {
        let config: DeployConfig = figment.extract().map_err(|e| {
            ProvisionError::Config(format!("Failed to load deploy settings: {}", e))
        })?;
        Ok(config)
    }

    /// Container image to deploy.
    pub fn image(&self) -> Result<String, ProvisionError> {
        if let Some(uri) = self.image_uri.as_deref().filter(|u| !u.is_empty()) {
            return Ok(uri.to_string());
        }
        match self.account_id.as_deref().filter(|a| !a.is_empty()) {
            Some(account) => Ok(format!(
                "{}.dkr.ecr.{}.amazonaws.com/{}:{}",
                account, self.region, self.repository, self.image_tag
            )),
            None => Err(ProvisionError::Config(
                "set either image_uri or account_id".to_string(),
            )),
        }
    }

    /// Check the settings a deployment needs. Listing and cleanup need none of them.
    pub fn validate_for_deploy(&self) -> Result<(), ProvisionError> {
        if self.execution_role_arn.trim().is_empty() {
            return Err(ProvisionError::Config(
                "execution_role_arn is required to deploy".to_string(),
            ));
        }

        self.image()?;

        if self.instance_count < 1 {
            return Err(ProvisionError::Config(
                "instance_count must be at least 1".to_string(),
            ));
        }

        if self.max_poll_attempts == 0 {
            return Err(ProvisionError::Config(
                "max_poll_attempts must be at least 1".to_string(),
            ));
        }

        if self.name_prefix.is_empty() {
            return Err(ProvisionError::Config("name_prefix cannot be empty".to_string()));
        }

        Ok(())
    }
}

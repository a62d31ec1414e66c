//! Seam between the deployer and the cloud management API.

use async_trait::async_trait;
use std::fmt;

use crate::error::ProvisionError;

/// Lifecycle status of a hosted endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointState {
    Creating,
    Updating,
    InService,
    Deleting,
    Failed,
    /// Any status this client does not act on.
    Other(String),
}

impl EndpointState {
    pub fn parse(status: &str) -> Self {
        match status {
            "Creating" => EndpointState::Creating,
            "Updating" => EndpointState::Updating,
            "InService" => EndpointState::InService,
            "Deleting" => EndpointState::Deleting,
            "Failed" => EndpointState::Failed,
            other => EndpointState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EndpointState::Creating => "Creating",
            EndpointState::Updating => "Updating",
            EndpointState::InService => "InService",
            EndpointState::Deleting => "Deleting",
            EndpointState::Failed => "Failed",
            EndpointState::Other(status) => status,
        }
    }
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hosted model registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub image: String,
    pub execution_role_arn: String,
    /// Passed to the container as `SAGEMAKER_BIND_TO_PORT`.
    pub container_port: u16,
}

/// Serving configuration with a single variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfigSpec {
    pub name: String,
    pub model_name: String,
    pub variant_name: String,
    pub instance_type: String,
    pub instance_count: i32,
    pub health_check_timeout_secs: i32,
}

/// What describing an endpoint returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescription {
    pub name: String,
    pub config_name: String,
    pub state: EndpointState,
    pub failure_reason: Option<String>,
}

/// One row of an endpoint listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSummary {
    pub name: String,
    pub state: EndpointState,
}

/// Cloud management calls used by the deployer.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn create_model(&self, spec: &ModelSpec) -> Result<(), ProvisionError>;

    async fn create_endpoint_config(&self, spec: &EndpointConfigSpec) -> Result<(), ProvisionError>;

    async fn create_endpoint(&self, name: &str, config_name: &str) -> Result<(), ProvisionError>;

    /// Describe an endpoint. `Ok(None)` means it does not exist.
    async fn describe_endpoint(
        &self,
        name: &str,
    ) -> Result<Option<EndpointDescription>, ProvisionError>;

    /// Model served by the first variant of a serving configuration.
    async fn endpoint_config_model(&self, config_name: &str) -> Result<String, ProvisionError>;

    async fn delete_endpoint(&self, name: &str) -> Result<(), ProvisionError>;

    async fn delete_endpoint_config(&self, name: &str) -> Result<(), ProvisionError>;

    async fn delete_model(&self, name: &str) -> Result<(), ProvisionError>;

    /// Endpoints in service whose names contain `name_contains`.
    async fn list_in_service(
        &self,
        name_contains: &str,
    ) -> Result<Vec<EndpointSummary>, ProvisionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parsing() {
        assert_eq!(EndpointState::parse("InService"), EndpointState::InService);
        assert_eq!(EndpointState::parse("Failed"), EndpointState::Failed);
        let other = EndpointState::parse("RollingBack");
        assert_eq!(other, EndpointState::Other("RollingBack".to_string()));
        assert_eq!(other.to_string(), "RollingBack");
    }
}

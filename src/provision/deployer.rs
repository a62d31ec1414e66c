//! Deploy, tear down and list hosted endpoints.
//!
//! Calls are sequential. Waiting uses a fixed delay and a bounded number of polls.
//! Nothing is retried or rolled back: a failed step leaves earlier resources in place.

use std::time::Duration;
use tracing::{debug, info};

use crate::constants::provision::VARIANT_NAME;
use crate::error::ProvisionError;
use crate::provision::config::DeployConfig;
use crate::provision::control_plane::{
    ControlPlane, EndpointConfigSpec, EndpointState, EndpointSummary, ModelSpec,
};
use crate::provision::names::ResourceNames;

/// Fixed-delay polling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
}

/// Resources removed by a cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub endpoint: String,
    pub config: String,
    pub model: String,
}

/// Drives a [`ControlPlane`] through the deployment workflows.
pub struct Deployer<P> {
    plane: P,
    config: DeployConfig,
}

impl<P: ControlPlane> Deployer<P> {
    pub fn new(plane: P, config: DeployConfig) -> Self {
        Self { plane, config }
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            delay: self.config.poll_delay,
            max_attempts: self.config.max_poll_attempts,
        }
    }

    /// Create model, serving configuration and endpoint, then wait for `InService`.
    pub async fn deploy(&self, names: &ResourceNames) -> Result<(), ProvisionError> {
        self.config.validate_for_deploy()?;
        let image = self.config.image()?;

        self.plane
            .create_model(&ModelSpec {
                name: names.model.clone(),
                image,
                execution_role_arn: self.config.execution_role_arn.clone(),
                container_port: self.config.container_port,
            })
            .await?;
        info!(model = %names.model, "Model created");

        self.plane
            .create_endpoint_config(&EndpointConfigSpec {
                name: names.config.clone(),
                model_name: names.model.clone(),
                variant_name: VARIANT_NAME.to_string(),
                instance_type: self.config.instance_type.clone(),
                instance_count: self.config.instance_count,
                health_check_timeout_secs: self.config.health_check_timeout_secs,
            })
            .await?;
        info!(config = %names.config, "Endpoint config created");

        self.plane
            .create_endpoint(&names.endpoint, &names.config)
            .await?;
        info!(endpoint = %names.endpoint, "Endpoint creation started");

        self.wait_in_service(&names.endpoint).await
    }

    /// Poll until the endpoint is `InService`. `Failed` or a vanished endpoint ends early.
    pub async fn wait_in_service(&self, endpoint: &str) -> Result<(), ProvisionError> {
        let policy = self.poll_policy();

        for attempt in 1..=policy.max_attempts {
            let description = self
                .plane
                .describe_endpoint(endpoint)
                .await?
                .ok_or_else(|| ProvisionError::NotFound(endpoint.to_string()))?;

            match description.state {
                EndpointState::InService => {
                    info!(endpoint, attempt, "Endpoint in service");
                    return Ok(());
                }
                EndpointState::Failed => {
                    return Err(ProvisionError::EndpointFailed {
                        endpoint: endpoint.to_string(),
                        reason: description
                            .failure_reason
                            .unwrap_or_else(|| "no reason given".to_string()),
                    });
                }
                state => debug!(endpoint, attempt, %state, "Waiting for endpoint"),
            }

            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.delay).await;
            }
        }

        Err(ProvisionError::Timeout {
            endpoint: endpoint.to_string(),
            waiting_for: "in service",
            attempts: policy.max_attempts,
        })
    }

    /// Poll until the endpoint no longer exists.
    pub async fn wait_deleted(&self, endpoint: &str) -> Result<(), ProvisionError> {
        let policy = self.poll_policy();

        for attempt in 1..=policy.max_attempts {
            match self.plane.describe_endpoint(endpoint).await? {
                None => {
                    info!(endpoint, attempt, "Endpoint deleted");
                    return Ok(());
                }
                Some(description) if description.state == EndpointState::Failed => {
                    return Err(ProvisionError::EndpointFailed {
                        endpoint: endpoint.to_string(),
                        reason: description
                            .failure_reason
                            .unwrap_or_else(|| "deletion failed".to_string()),
                    });
                }
                Some(description) => {
                    debug!(endpoint, attempt, state = %description.state, "Waiting for deletion")
                }
            }

            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.delay).await;
            }
        }

        Err(ProvisionError::Timeout {
            endpoint: endpoint.to_string(),
            waiting_for: "deleted",
            attempts: policy.max_attempts,
        })
    }

    /// Delete an endpoint, then its configuration, then the configuration's model.
    pub async fn cleanup(&self, endpoint: &str) -> Result<CleanupReport, ProvisionError> {
        let description = self
            .plane
            .describe_endpoint(endpoint)
            .await?
            .ok_or_else(|| ProvisionError::NotFound(endpoint.to_string()))?;
        let config = description.config_name;
        let model = self.plane.endpoint_config_model(&config).await?;

        info!(endpoint, "Deleting endpoint");
        self.plane.delete_endpoint(endpoint).await?;
        self.wait_deleted(endpoint).await?;

        info!(config = %config, "Deleting endpoint config");
        self.plane.delete_endpoint_config(&config).await?;

        info!(model = %model, "Deleting model");
        self.plane.delete_model(&model).await?;

        Ok(CleanupReport {
            endpoint: endpoint.to_string(),
            config,
            model,
        })
    }

    /// Endpoints in service whose names contain the configured filter.
    pub async fn list(&self) -> Result<Vec<EndpointSummary>, ProvisionError> {
        self.plane.list_in_service(&self.config.list_filter).await
    }
}

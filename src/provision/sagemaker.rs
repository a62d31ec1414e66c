//! SageMaker implementation of the control plane.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sagemaker::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sagemaker::types::{
    ContainerDefinition, ContainerMode, EndpointStatus, ProductionVariant,
    ProductionVariantInstanceType,
};
use aws_sdk_sagemaker::Client;
use tracing::debug;

use crate::constants::http::BIND_PORT_ENV;
use crate::error::ProvisionError;
use crate::provision::control_plane::{
    ControlPlane, EndpointConfigSpec, EndpointDescription, EndpointState, EndpointSummary,
    ModelSpec,
};

/// SageMaker reports a missing resource as a validation failure.
const MISSING_RESOURCE_CODE: &str = "ValidationException";

/// Control plane backed by the SageMaker management API.
#[derive(Debug, Clone)]
pub struct SageMakerControlPlane {
    client: Client,
}

impl SageMakerControlPlane {
    /// Build a client for `region` using the default credential chain.
    pub async fn for_region(region: &str) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: Client::new(&sdk_config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn api_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> ProvisionError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    ProvisionError::Api {
        operation,
        message: DisplayErrorContext(err).to_string(),
    }
}

fn is_missing_resource<E, R>(err: &SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata,
{
    err.as_service_error().and_then(|e| e.code()) == Some(MISSING_RESOURCE_CODE)
}

/// Accessors return `&str` or `Option<&str>` depending on whether the field is required.
fn opt_str<'a>(value: impl Into<Option<&'a str>>) -> Option<&'a str> {
    value.into()
}

#[async_trait]
impl ControlPlane for SageMakerControlPlane {
    async fn create_model(&self, spec: &ModelSpec) -> Result<(), ProvisionError> {
        let container = ContainerDefinition::builder()
            .image(&spec.image)
            .mode(ContainerMode::SingleModel)
            .environment(BIND_PORT_ENV, spec.container_port.to_string())
            .build();

        self.client
            .create_model()
            .model_name(&spec.name)
            .primary_container(container)
            .execution_role_arn(&spec.execution_role_arn)
            .send()
            .await
            .map_err(|e| api_error("CreateModel", e))?;
        Ok(())
    }

    async fn create_endpoint_config(&self, spec: &EndpointConfigSpec) -> Result<(), ProvisionError> {
        let variant = ProductionVariant::builder()
            .variant_name(&spec.variant_name)
            .model_name(&spec.model_name)
            .instance_type(ProductionVariantInstanceType::from(spec.instance_type.as_str()))
            .initial_instance_count(spec.instance_count)
            .container_startup_health_check_timeout_in_seconds(spec.health_check_timeout_secs)
            .build();

        self.client
            .create_endpoint_config()
            .endpoint_config_name(&spec.name)
            .production_variants(variant)
            .send()
            .await
            .map_err(|e| api_error("CreateEndpointConfig", e))?;
        Ok(())
    }

    async fn create_endpoint(&self, name: &str, config_name: &str) -> Result<(), ProvisionError> {
        self.client
            .create_endpoint()
            .endpoint_name(name)
            .endpoint_config_name(config_name)
            .send()
            .await
            .map_err(|e| api_error("CreateEndpoint", e))?;
        Ok(())
    }

    async fn describe_endpoint(
        &self,
        name: &str,
    ) -> Result<Option<EndpointDescription>, ProvisionError> {
        let output = match self.client.describe_endpoint().endpoint_name(name).send().await {
            Ok(output) => output,
            Err(e) if is_missing_resource(&e) => {
                debug!(endpoint = name, "Endpoint does not exist");
                return Ok(None);
            }
            Err(e) => return Err(api_error("DescribeEndpoint", e)),
        };

        let status: Option<&EndpointStatus> = output.endpoint_status().into();
        let state = status
            .map(|s| EndpointState::parse(s.as_str()))
            .ok_or_else(|| ProvisionError::InvalidResponse("endpoint without status".into()))?;
        let config_name = opt_str(output.endpoint_config_name())
            .ok_or_else(|| ProvisionError::InvalidResponse("endpoint without config".into()))?;

        Ok(Some(EndpointDescription {
            name: opt_str(output.endpoint_name()).unwrap_or(name).to_string(),
            config_name: config_name.to_string(),
            state,
            failure_reason: output.failure_reason().map(str::to_string),
        }))
    }

    async fn endpoint_config_model(&self, config_name: &str) -> Result<String, ProvisionError> {
        let output = self
            .client
            .describe_endpoint_config()
            .endpoint_config_name(config_name)
            .send()
            .await
            .map_err(|e| api_error("DescribeEndpointConfig", e))?;

        let variants: Option<&[ProductionVariant]> = output.production_variants().into();
        variants
            .and_then(|v| v.first())
            .and_then(|v| opt_str(v.model_name()))
            .map(str::to_string)
            .ok_or_else(|| {
                ProvisionError::InvalidResponse(format!(
                    "endpoint config {} has no model",
                    config_name
                ))
            })
    }

    async fn delete_endpoint(&self, name: &str) -> Result<(), ProvisionError> {
        self.client
            .delete_endpoint()
            .endpoint_name(name)
            .send()
            .await
            .map_err(|e| api_error("DeleteEndpoint", e))?;
        Ok(())
    }

    async fn delete_endpoint_config(&self, name: &str) -> Result<(), ProvisionError> {
        self.client
            .delete_endpoint_config()
            .endpoint_config_name(name)
            .send()
            .await
            .map_err(|e| api_error("DeleteEndpointConfig", e))?;
        Ok(())
    }

    async fn delete_model(&self, name: &str) -> Result<(), ProvisionError> {
        self.client
            .delete_model()
            .model_name(name)
            .send()
            .await
            .map_err(|e| api_error("DeleteModel", e))?;
        Ok(())
    }

    async fn list_in_service(
        &self,
        name_contains: &str,
    ) -> Result<Vec<EndpointSummary>, ProvisionError> {
        let mut endpoints = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_endpoints()
                .name_contains(name_contains)
                .status_equals(EndpointStatus::InService)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| api_error("ListEndpoints", e))?;

            let page: Option<&[aws_sdk_sagemaker::types::EndpointSummary]> =
                output.endpoints().into();
            for summary in page.unwrap_or_default() {
                let status: Option<&EndpointStatus> = summary.endpoint_status().into();
                endpoints.push(EndpointSummary {
                    name: opt_str(summary.endpoint_name()).unwrap_or_default().to_string(),
                    state: status
                        .map(|s| EndpointState::parse(s.as_str()))
                        .unwrap_or_else(|| EndpointState::Other("Unknown".to_string())),
                });
            }

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(endpoints)
    }
}

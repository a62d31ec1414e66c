//! Hosted endpoint provisioning.
//!
//! Creates the model registration, serving configuration and endpoint that host the
//! inference container, and tears them down again.

mod config;
mod control_plane;
mod deployer;
mod names;
mod sagemaker;

pub use config::DeployConfig;
pub use control_plane::{
    ControlPlane, EndpointConfigSpec, EndpointDescription, EndpointState, EndpointSummary,
    ModelSpec,
};
pub use deployer::{CleanupReport, Deployer, PollPolicy};
pub use names::ResourceNames;
pub use sagemaker::SageMakerControlPlane;

//! Create, list and tear down hosted transcription endpoints.
//!
//! Settings come from `deploy.toml` and `PARAKEET_DEPLOY_*` variables; flags override
//! the region.

use clap::{Parser, Subcommand};
use tracing::error;

use parakeet_endpoint::{
    config::LogFormat,
    provision::{DeployConfig, Deployer, ResourceNames, SageMakerControlPlane},
    reliability::init_tracing,
};

/// Deploy the inference container as a hosted endpoint.
///
/// Examples:
///   parakeet-deploy                       # Deploy a new endpoint
///   parakeet-deploy list                  # List endpoints in service
///   parakeet-deploy cleanup <endpoint>    # Delete an endpoint and its resources
#[derive(Parser)]
#[command(name = "parakeet-deploy", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Cloud region, overrides the deploy settings
    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// List endpoints in service whose names match the configured filter
    List,

    /// Delete an endpoint, its configuration and its model
    Cleanup {
        /// Name of the endpoint to delete
        endpoint_name: String,
    },
}

const RULE: &str = "==================================================";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _ = init_tracing("info", LogFormat::Pretty);

    let mut config = DeployConfig::load()?;
    if let Some(region) = cli.region {
        config.region = region;
    }

    let plane = SageMakerControlPlane::for_region(&config.region).await;
    let deployer = Deployer::new(plane, config);

    match cli.command {
        None => deploy(&deployer).await,
        Some(Command::List) => list(&deployer).await,
        Some(Command::Cleanup { endpoint_name }) => cleanup(&deployer, &endpoint_name).await,
    }
}

async fn deploy(deployer: &Deployer<SageMakerControlPlane>) -> anyhow::Result<()> {
    let config = deployer.config();
    config.validate_for_deploy()?;
    let names = ResourceNames::now(&config.name_prefix);

    println!("{}", RULE);
    println!("Deploying transcription endpoint");
    println!("{}", RULE);
    println!("Region:     {}", config.region);
    println!("Instance:   {}", config.instance_type);
    println!("Image:      {}", config.image()?);
    println!("Model name: {}", names.model);
    println!("Endpoint:   {}", names.endpoint);
    println!("{}", RULE);
    println!("Waiting for the endpoint to reach InService, this usually takes 5-10 minutes...");

    if let Err(e) = deployer.deploy(&names).await {
        error!(error = %e, "Deployment failed");
        return Err(e.into());
    }

    println!();
    println!("{}", RULE);
    println!("Deployment complete");
    println!("{}", RULE);
    println!("Endpoint name: {}", names.endpoint);
    println!();
    println!("Benchmark it with:");
    println!("  parakeet-bench --endpoint {}", names.endpoint);
    println!("{}", RULE);
    Ok(())
}

async fn list(deployer: &Deployer<SageMakerControlPlane>) -> anyhow::Result<()> {
    let endpoints = deployer.list().await?;
    println!("Endpoints in service:");
    for endpoint in endpoints {
        println!("  - {} ({})", endpoint.name, endpoint.state);
    }
    Ok(())
}

async fn cleanup(
    deployer: &Deployer<SageMakerControlPlane>,
    endpoint_name: &str,
) -> anyhow::Result<()> {
    println!("Cleaning up endpoint: {}", endpoint_name);
    match deployer.cleanup(endpoint_name).await {
        Ok(report) => {
            println!("Deleted endpoint:        {}", report.endpoint);
            println!("Deleted endpoint config: {}", report.config);
            println!("Deleted model:           {}", report.model);
            println!("Cleanup complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Cleanup failed");
            Err(e.into())
        }
    }
}

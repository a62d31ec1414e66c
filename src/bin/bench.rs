//! Latency benchmark and smoke tests for a transcription endpoint.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use parakeet_endpoint::{
    bench::{
        inline_payload, invoke_timed, run_benchmark, url_payload, HttpTarget, InvocationTarget,
        LatencySummary, SageMakerRuntimeTarget,
    },
    config::LogFormat,
    reliability::init_tracing,
};

/// Benchmark a deployed transcription endpoint.
///
/// Examples:
///   parakeet-bench --endpoint my-endpoint            # 20-request latency benchmark
///   parakeet-bench --url http://localhost:8080       # same, against a local container
///   parakeet-bench --endpoint my-endpoint timestamps # one request with word timestamps
///   parakeet-bench --endpoint my-endpoint url <audio_url>
#[derive(Parser)]
#[command(name = "parakeet-bench", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Hosted endpoint name
    #[arg(long, global = true, env = "PARAKEET_ENDPOINT_NAME")]
    endpoint: Option<String>,

    /// Base URL of a directly reachable service; takes precedence over --endpoint
    #[arg(long, global = true)]
    url: Option<String>,

    /// Cloud region of the hosted endpoint
    #[arg(long, global = true, env = "AWS_REGION", default_value = "us-east-1")]
    region: String,

    /// Audio file sent with each request
    #[arg(long, global = true, default_value = "test.wav")]
    audio: PathBuf,

    /// Number of benchmark requests
    #[arg(short = 'n', long, default_value_t = 20)]
    iterations: usize,

    /// Per-request timeout in seconds for `--url` targets
    #[arg(long, global = true, default_value_t = 300)]
    timeout: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Send one request asking for word timestamps
    Timestamps,

    /// Send one request that makes the service download the audio
    Url {
        /// Remote audio URL
        audio_url: String,
    },
}

const RULE: &str = "==================================================";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _ = init_tracing("info", LogFormat::Pretty);

    let target: Box<dyn InvocationTarget> = match (&cli.url, &cli.endpoint) {
        (Some(url), _) => Box::new(HttpTarget::new(url, Duration::from_secs(cli.timeout))?),
        (None, Some(endpoint)) => {
            Box::new(SageMakerRuntimeTarget::new(&cli.region, endpoint.clone()).await)
        }
        (None, None) => anyhow::bail!("set --endpoint (or PARAKEET_ENDPOINT_NAME) or --url"),
    };

    match &cli.command {
        None => benchmark(target.as_ref(), &cli.audio, cli.iterations).await,
        Some(Command::Timestamps) => timestamps(target.as_ref(), &cli.audio).await,
        Some(Command::Url { audio_url }) => remote_audio(target.as_ref(), audio_url).await,
    }
}

fn read_audio(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("cannot read audio file {}", path.display()))
}

fn print_summary(label: &str, summary: &LatencySummary, precision: usize) {
    println!("\n{}:", label);
    println!("  mean:   {:.*}s", precision, summary.mean);
    println!("  min:    {:.*}s", precision, summary.min);
    println!("  max:    {:.*}s", precision, summary.max);
    println!("  median: {:.*}s", precision, summary.median);
}

async fn benchmark(
    target: &dyn InvocationTarget,
    audio_path: &Path,
    iterations: usize,
) -> anyhow::Result<()> {
    let audio = read_audio(audio_path)?;
    println!("Audio file: {}", audio_path.display());
    println!(
        "File size:  {} bytes ({:.2} MB)",
        audio.len(),
        audio.len() as f64 / 1024.0 / 1024.0
    );
    println!("\nTarget: {}", target.describe());
    println!("Running {} requests...\n", iterations);

    let payload = inline_payload(&audio, false);
    let report = run_benchmark(target, &payload, iterations).await?;

    let preview: String = report.first_text.chars().take(200).collect();
    println!("\nTranscript: {}...", preview);

    println!("\n{}", RULE);
    println!("Latency summary");
    println!("{}", RULE);
    println!("Successful requests: {}", report.end_to_end.count);
    if report.failures > 0 {
        println!("Failed requests:     {}", report.failures);
    }

    print_summary("End-to-end latency", &report.end_to_end, 2);
    if let Some(server) = &report.server {
        print_summary("Server processing time", server, 3);
    }
    if let Some(stdev) = report.end_to_end.stdev {
        println!("\nStandard deviation: {:.2}s", stdev);
    }
    Ok(())
}

async fn timestamps(target: &dyn InvocationTarget, audio_path: &Path) -> anyhow::Result<()> {
    let audio = read_audio(audio_path)?;
    println!("Requesting word timestamps...\n");

    let response = invoke_timed(target, &inline_payload(&audio, true)).await?;
    if let Some(error) = response.error() {
        anyhow::bail!("endpoint returned an error: {}", error);
    }
    println!("Transcript: {}\n", response.text());

    let words = response.body["timestamps"]["word"]
        .as_array()
        .filter(|words| !words.is_empty());
    match words {
        Some(words) => {
            println!("Word timestamps (first 10):");
            for word in words.iter().take(10) {
                println!(
                    "  [{:.2}s - {:.2}s] {}",
                    word["start"].as_f64().unwrap_or_default(),
                    word["end"].as_f64().unwrap_or_default(),
                    word["word"].as_str().unwrap_or_default()
                );
            }
        }
        None => println!("No timestamp data returned"),
    }
    Ok(())
}

async fn remote_audio(target: &dyn InvocationTarget, audio_url: &str) -> anyhow::Result<()> {
    println!("Requesting transcription of {}\n", audio_url);

    let response = invoke_timed(target, &url_payload(audio_url)).await?;
    if let Some(error) = response.error() {
        anyhow::bail!("endpoint returned an error: {}", error);
    }

    println!("Transcript:      {}", response.text());
    println!("Total time:      {:.2}s", response.elapsed);
    match response.server_time() {
        Some(t) => println!("Server time:     {:.3}s", t),
        None => println!("Server time:     n/a"),
    }
    Ok(())
}

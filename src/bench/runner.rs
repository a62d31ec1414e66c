//! Benchmark and single-request scenarios.

use serde_json::{json, Value};
use std::time::Instant;
use tracing::{info, warn};

use crate::asr::encode_base64;
use crate::bench::stats::LatencySummary;
use crate::bench::target::InvocationTarget;
use crate::error::BenchError;

/// Request body carrying audio inline.
pub fn inline_payload(audio: &[u8], timestamps: bool) -> Value {
    json!({
        "audio": {"data": encode_base64(audio)},
        "timestamps": timestamps,
    })
}

/// Request body pointing the service at a remote file.
pub fn url_payload(url: &str) -> Value {
    json!({
        "audio": {"path": url},
        "timestamps": false,
    })
}

/// Result of one timed request.
#[derive(Debug, Clone)]
pub struct TimedResponse {
    pub body: Value,
    /// Client-observed round trip in seconds.
    pub elapsed: f64,
}

impl TimedResponse {
    pub fn text(&self) -> &str {
        self.body.get("text").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn server_time(&self) -> Option<f64> {
        self.body.get("processing_time").and_then(Value::as_f64)
    }

    pub fn error(&self) -> Option<String> {
        self.body.get("error").map(|e| match e {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Send one request and time it.
pub async fn invoke_timed(
    target: &dyn InvocationTarget,
    payload: &Value,
) -> Result<TimedResponse, BenchError> {
    let start = Instant::now();
    let body = target.invoke(payload).await?;
    Ok(TimedResponse {
        body,
        elapsed: start.elapsed().as_secs_f64(),
    })
}

/// Outcome of a latency benchmark.
#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub iterations: usize,
    /// Transcript of the first successful response.
    pub first_text: String,
    pub end_to_end: LatencySummary,
    /// Server-reported processing time; `None` when no response carried one.
    pub server: Option<LatencySummary>,
    /// Iterations that failed in transport and were skipped.
    pub failures: usize,
}

/// Send `iterations` identical requests and summarize latencies.
///
/// Transport failures are logged and skipped. If the first successful response
/// carries an `error` field the run stops, since every later request would fail too.
pub async fn run_benchmark(
    target: &dyn InvocationTarget,
    payload: &Value,
    iterations: usize,
) -> Result<BenchmarkReport, BenchError> {
    let mut end_to_end = Vec::with_capacity(iterations);
    let mut server = Vec::with_capacity(iterations);
    let mut first_text: Option<String> = None;
    let mut failures = 0;

    for i in 1..=iterations {
        let response = match invoke_timed(target, payload).await {
            Ok(response) => response,
            Err(e) => {
                warn!(iteration = i, error = %e, "Request failed");
                failures += 1;
                continue;
            }
        };

        if first_text.is_none() {
            if let Some(error) = response.error() {
                return Err(BenchError::Endpoint(error));
            }
            first_text = Some(response.text().to_string());
        }

        info!(
            "Request {}/{}: total {:.2}s, server {}",
            i,
            iterations,
            response.elapsed,
            response
                .server_time()
                .map(|t| format!("{:.3}s", t))
                .unwrap_or_else(|| "n/a".to_string())
        );

        end_to_end.push(response.elapsed);
        if let Some(t) = response.server_time() {
            server.push(t);
        }
    }

    let end_to_end = LatencySummary::from_samples(&end_to_end)
        .ok_or(BenchError::NoSuccessfulIterations(iterations))?;

    Ok(BenchmarkReport {
        iterations,
        first_text: first_text.unwrap_or_default(),
        end_to_end,
        server: LatencySummary::from_samples(&server),
        failures,
    })
}

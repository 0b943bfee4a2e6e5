//! resilient-client
//!
//! Sends HTTP requests through the resilience pipeline and prints one JSON
//! summary per call on stdout.
//!
//! # Architecture Overview
//!
//! ```text
//!     CLI args / config.toml
//!            │
//!            ▼
//!   ┌──────────────────────────────────────────────────────────┐
//!   │                  ResiliencePipeline                      │
//!   │                                                          │
//!   │  ┌──────────────┐   ┌───────────┐   ┌────────────────┐   │
//!   │  │ BreakerReg.  │──▶│ deadline  │──▶│ HttpTransport  │───┼──▶ Upstream
//!   │  │ admit/record │   │ (timeout) │   │ (hyper-util)   │   │
//!   │  └──────▲───────┘   └───────────┘   └───────┬────────┘   │
//!   │         │                                   │            │
//!   │  ┌──────┴───────┐   ┌───────────────┐       │            │
//!   │  │ Classifier   │◀──│ attempt       │◀──────┘            │
//!   │  └──────┬───────┘   │ outcome       │                    │
//!   │         ▼           └───────────────┘                    │
//!   │  ┌──────────────┐                                        │
//!   │  │ RetryPolicy  │── retry? sleep(backoff) and loop       │
//!   │  └──────────────┘                                        │
//!   └──────────────────────────────────────────────────────────┘
//!            │
//!            ▼
//!     JSON summary per call (stdout), logs (stderr)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use clap::Parser;
use futures_util::stream::{self, StreamExt};
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Method, Uri};
use serde::Serialize;

use resilient_client::config::loader::load_config;
use resilient_client::config::watcher::ConfigWatcher;
use resilient_client::config::ClientConfig;
use resilient_client::http::{HttpTransport, RequestDescriptor, ResponseSummary};
use resilient_client::observability::{logging, metrics};
use resilient_client::resilience::{Execution, ResiliencePipeline};

#[derive(Parser)]
#[command(name = "resilient-client")]
#[command(about = "Send HTTP requests through a circuit breaker and retry pipeline", long_about = None)]
struct Cli {
    /// Target URL (absolute, http://)
    url: String,

    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Request body
    #[arg(short, long)]
    data: Option<String>,

    /// Extra header, "name: value" (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Logical method name used to partition breakers
    #[arg(long)]
    rpc_method: Option<String>,

    /// Override method-based idempotency
    #[arg(long)]
    idempotent: Option<bool>,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the configuration file on change
    #[arg(short, long, requires = "config")]
    watch: bool,

    /// Number of calls to send
    #[arg(short = 'n', long, default_value_t = 1)]
    repeat: usize,

    /// Calls in flight at once
    #[arg(short = 'j', long, default_value_t = 1)]
    concurrency: usize,
}

#[derive(Serialize)]
struct CallReport {
    call: usize,
    response: Option<ResponseSummary>,
    /// Response-level failure (5xx, partial failure) of a returned response.
    failure: Option<String>,
    error: Option<String>,
    attempts: Vec<AttemptReport>,
}

#[derive(Serialize)]
struct AttemptReport {
    index: u32,
    verdict: &'static str,
    status: Option<u16>,
    elapsed_ms: u64,
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("resilient-client v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let request = build_request(&cli)?;
    let transport = HttpTransport::new(&config.timeouts);
    let pipeline = Arc::new(ResiliencePipeline::new(&config, transport)?);

    tracing::info!(
        minimum_request_threshold = config.breaker.minimum_request_threshold,
        failure_rate_threshold = config.breaker.failure_rate_threshold,
        max_retries = config.retries.max_retries,
        "Configuration loaded"
    );

    // Kept alive for the lifetime of the run.
    let _watcher = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let handle = watcher.with_current(config.clone()).run()?;
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                while let Some(new_config) = updates.recv().await {
                    if let Err(e) = pipeline.reload(&new_config) {
                        tracing::error!(error = %e, "Rejected reloaded configuration");
                    }
                }
            });
            Some(handle)
        }
        _ => None,
    };

    let calls = stream::iter(0..cli.repeat)
        .map(|call| {
            let pipeline = pipeline.clone();
            let request = request.clone();
            async move { (call, pipeline.execute_traced(request).await) }
        })
        .buffer_unordered(cli.concurrency.max(1));

    let run = async {
        let mut calls = std::pin::pin!(calls);
        while let Some((call, execution)) = calls.next().await {
            let report = report(call, execution, &pipeline);
            match serde_json::to_string(&report) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::error!(error = %e, "Failed to serialize call report"),
            }
        }
    };

    tokio::select! {
        _ = run => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, cancelling calls in flight");
        }
    }

    for snapshot in pipeline.breakers().snapshots() {
        tracing::info!(
            breaker = %snapshot.name,
            state = snapshot.state.as_str(),
            success = snapshot.counts.success,
            failure = snapshot.counts.failure,
            "Breaker state at exit"
        );
    }

    Ok(())
}

fn build_request(cli: &Cli) -> Result<RequestDescriptor, Box<dyn std::error::Error>> {
    let method = Method::from_bytes(cli.method.to_uppercase().as_bytes())?;
    let uri: Uri = cli.url.parse()?;

    let mut request = RequestDescriptor::new(method, uri);
    if let Some(data) = &cli.data {
        request = request.with_body(data.clone());
    }
    for header in &cli.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| format!("invalid header '{}', expected 'name: value'", header))?;
        request = request.with_header(
            HeaderName::from_bytes(name.trim().as_bytes())?,
            HeaderValue::from_str(value.trim())?,
        );
    }
    if let Some(rpc_method) = &cli.rpc_method {
        request = request.with_rpc_method(rpc_method.clone());
    }
    if let Some(idempotent) = cli.idempotent {
        request = request.with_idempotency(idempotent);
    }
    Ok(request)
}

fn report(call: usize, execution: Execution, pipeline: &ResiliencePipeline<HttpTransport>) -> CallReport {
    let attempts = execution
        .attempts
        .iter()
        .map(|attempt| AttemptReport {
            index: attempt.index,
            verdict: attempt.verdict.as_str(),
            status: attempt.status.map(|s| s.as_u16()),
            elapsed_ms: attempt.elapsed.as_millis() as u64,
            error: attempt.error.clone(),
        })
        .collect();

    match execution.result {
        Ok(response) => CallReport {
            call,
            failure: pipeline.classifier().failure_of(&response).map(|e| e.to_string()),
            response: Some(response.summary()),
            error: None,
            attempts,
        },
        Err(e) => CallReport {
            call,
            response: None,
            failure: None,
            error: Some(e.to_string()),
            attempts,
        },
    }
}

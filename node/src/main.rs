// Copyright (c) 2026 Helios Contributors. MIT License.
// See LICENSE for details.

//! # Helios Reference Node
//!
//! Entry point for the `helios-node` binary. Parses CLI arguments,
//! initializes logging and metrics, runs the consensus core over an
//! in-memory chain, and serves the HTTP status API.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the consensus node
//! - `status`  — query a running node's status endpoint
//! - `version` — print build version information
//!
//! This is a *reference* node: it carries no peer transport and no
//! persistent storage, so every accepted block comes either from the
//! local forge loop or from whatever drives the consensus core in tests.
//! The full acceptance pipeline still runs on each block.

mod api;
mod cli;
mod logging;
mod metrics;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use ed25519_dalek::SigningKey;
use tokio::signal;

use helios_core::chain::block::{short_id, Block, Transaction};
use helios_core::chain::{slots, MemoryChain};
use helios_core::config::{SLOT_DURATION_SECS, SUPPORTED_BLOCK_VERSION};
use helios_core::consensus::{BlockVerifier, ForkResolver, ReceiveOutcome, Sequencer};
use helios_core::external::{
    BlockStore, ChainMutator, DelegateSlotChecker, ForgingSlotRejected, ForkEvent, ForkEventSink,
    TransactionRejected, TransactionValidator,
};

use cli::{Commands, HeliosNodeCli};
use logging::LogFormat;
use metrics::ConsensusMetrics;

/// Fork events retained for the `/forks` endpoint.
const FORK_LOG_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = HeliosNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Reference collaborators
// ---------------------------------------------------------------------------

/// Accepts every transaction. The reference node carries no account
/// state, so there is nothing to validate against.
struct PermissiveValidator;

#[async_trait]
impl TransactionValidator for PermissiveValidator {
    async fn verify(&self, _tx: &Transaction, _height: u64) -> Result<(), TransactionRejected> {
        Ok(())
    }
}

/// Accepts every forging slot. A single-delegate node owns the whole
/// schedule by definition.
struct OpenSchedule;

#[async_trait]
impl DelegateSlotChecker for OpenSchedule {
    async fn assert_valid_forging_slot(&self, _block: &Block) -> Result<(), ForgingSlotRejected> {
        Ok(())
    }
}

/// Fans fork events out to the API ring buffer and the fork counter.
struct MetricsSink {
    log: Arc<api::ForkLog>,
    metrics: metrics::SharedMetrics,
}

impl ForkEventSink for MetricsSink {
    fn record(&self, event: ForkEvent) {
        self.metrics.forks_detected_total.inc();
        self.log.record(event);
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Starts the consensus node: forge loop, status API, metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "helios_node=info,helios_core=info,tower_http=debug",
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        network = %args.network,
        forge = !args.no_forge,
        "starting helios-node"
    );

    // --- Metrics ---
    let node_metrics =
        Arc::new(ConsensusMetrics::new().context("failed to create prometheus registry")?);

    // --- Chain & consensus core ---
    let chain = Arc::new(MemoryChain::with_genesis());
    let fork_log = Arc::new(api::ForkLog::new(FORK_LOG_CAPACITY));
    let sequencer = Arc::new(Sequencer::new());
    let sink = Arc::new(MetricsSink {
        log: Arc::clone(&fork_log),
        metrics: Arc::clone(&node_metrics),
    });
    let verifier = Arc::new(BlockVerifier::new(
        Arc::clone(&chain) as Arc<dyn BlockStore>,
        Arc::clone(&chain) as Arc<dyn ChainMutator>,
        Arc::new(PermissiveValidator),
        Arc::new(OpenSchedule),
        Arc::clone(&sink) as Arc<dyn ForkEventSink>,
        Arc::clone(&sequencer),
    ));
    let resolver = Arc::new(ForkResolver::new(
        Arc::clone(&chain) as Arc<dyn BlockStore>,
        Arc::clone(&chain) as Arc<dyn ChainMutator>,
        Arc::clone(&verifier),
        sink,
        Arc::clone(&sequencer),
    ));
    node_metrics.tip_height.set(chain.tip().height as i64);
    tracing::info!(genesis = %short_id(&chain.tip().id), "chain initialized");

    // --- Application state ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        network: args.network.clone(),
        chain: Arc::clone(&chain),
        forks: Arc::clone(&fork_log),
        metrics: Arc::clone(&node_metrics),
        started_at: chrono::Utc::now().timestamp(),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("status API listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("metrics server listening on {}", metrics_addr);

    // --- Forge loop ---
    // Forges one empty block per slot and feeds it back through fork
    // resolution, the same path a gossiped block takes. Keeps the whole
    // acceptance pipeline hot even with no peers attached.
    let forge_loop = (!args.no_forge).then(|| {
        let chain = Arc::clone(&chain);
        let resolver = Arc::clone(&resolver);
        let metrics = Arc::clone(&node_metrics);
        tokio::spawn(async move {
            let mut delegate_key = SigningKey::generate(&mut rand::rngs::OsRng);
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(SLOT_DURATION_SECS));
            let mut rollbacks_seen = chain.delete_count();
            loop {
                interval.tick().await;
                let tip = chain.tip();
                let now = slots::now_epoch_seconds();
                if slots::slot_number(now) <= slots::slot_number(tip.timestamp) {
                    continue; // still inside the tip's slot
                }

                let block = Block::forge(&tip, vec![], &delegate_key, now);
                match resolver.on_receive_block(&block).await {
                    Ok(ReceiveOutcome::Applied) => {
                        metrics.blocks_applied_total.inc();
                        metrics.tip_height.set(block.height as i64);
                        tracing::debug!(height = block.height, "block forged");
                    }
                    Ok(outcome) => {
                        tracing::warn!(?outcome, "forged block not applied");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "forged block rejected");
                        // A fresh key for the next slot; the old one may
                        // have produced an equivocation candidate.
                        delegate_key = SigningKey::generate(&mut rand::rngs::OsRng);
                    }
                }

                let rollbacks = chain.delete_count();
                if rollbacks > rollbacks_seen {
                    metrics.rollbacks_total.inc_by(rollbacks - rollbacks_seen);
                    rollbacks_seen = rollbacks;
                }
            }
        })
    });

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining");
        }
    }

    sequencer.begin_shutdown();
    if let Some(handle) = forge_loop {
        handle.abort();
    }
    tracing::info!(height = chain.tip().height, "helios-node stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// status / version
// ---------------------------------------------------------------------------

/// Queries a running node's status endpoint and prints the body.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.api_url.trim_end_matches('/'));
    let body = http_get(&url).await?;
    println!("{}", body);
    Ok(())
}

/// Minimal HTTP/1.1 GET over a raw TCP stream. One endpoint, one caller;
/// not worth a client crate.
async fn http_get(url: &str) -> Result<String> {
    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| anyhow::anyhow!("only http:// URLs are supported: {url}"))?;
    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    let addr = if authority.contains(':') {
        authority.to_string()
    } else {
        format!("{authority}:80")
    };

    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, authority,
    );

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    // Everything after the first blank line is the body.
    Ok(response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_else(|| response.to_string()))
}

/// Prints version information to stdout.
fn print_version() {
    println!("helios-node   {}", env!("CARGO_PKG_VERSION"));
    println!("block version {}", SUPPORTED_BLOCK_VERSION);
    println!("rustc         {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

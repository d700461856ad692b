// DEX cycle arbitrage bot
// Main entry point: config, provider, signal handling, scan loop.

use anyhow::{Context, Result};
use clap::Parser;
use dexcycle_bot::arbitrage::PipelineSettings;
use dexcycle_bot::broadcast::{run_ws_server, BroadcastBus};
use dexcycle_bot::config::load_config;
use dexcycle_bot::engine::{EngineSettings, ScanEngine};
use dexcycle_bot::pool::{PoolScanner, ScannerSettings};
use dexcycle_bot::pricing::UsdQuoteTable;
use dexcycle_bot::{ExecutionGuard, ExecutionPipeline, OpportunityFinder};

use alloy::network::EthereumWallet;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use futures::stream::StreamExt;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "dexcycle-bot", about = "Cross-DEX cycle arbitrage engine")]
struct Args {
    /// Universe file: venues, seed tokens, USD quote table
    #[arg(long, env = "UNIVERSE_FILE", default_value = "universe.toml")]
    universe: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    dotenv::dotenv().ok();
    let args = Args::parse();

    info!("===========================================");
    info!("   DEX Cycle Arbitrage Engine");
    info!("===========================================");

    let config = match load_config(&args.universe) {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e:#}");
            std::process::exit(2);
        }
    };
    info!(
        "universe loaded: {} venues, {} seed tokens",
        config.venues.len(),
        config.tokens.len()
    );

    // Execution keys are checked up front so a misconfigured live bot
    // dies at startup instead of at its first submission.
    let execution = if config.enable_execution {
        match config.require_execution_keys() {
            Ok(keys) => Some(keys),
            Err(e) => {
                error!("{e}");
                std::process::exit(e.exit_code());
            }
        }
    } else {
        None
    };

    let signer: Option<PrivateKeySigner> = match &execution {
        Some(keys) => match keys.private_key.parse() {
            Ok(signer) => Some(signer),
            Err(e) => {
                error!("PRIVATE_KEY is not a valid key: {e}");
                std::process::exit(2);
            }
        },
        None => None,
    };

    let provider = match connect_provider(&config.rpc_url, signer.clone()).await {
        Ok(provider) => provider,
        Err(e) => {
            error!("cannot reach RPC endpoint {}: {e:#}", config.rpc_url);
            std::process::exit(1);
        }
    };

    // Startup connectivity probe — fail fast when the endpoint answers
    // the handshake but not requests.
    match provider.get_block_number().await {
        Ok(block) => info!("connected to RPC at block {}", block),
        Err(e) => {
            error!("RPC endpoint not answering: {e}");
            std::process::exit(1);
        }
    }

    let quotes = Arc::new(UsdQuoteTable::new(&config.tokens, config.usd_prices.clone()));
    let guard = Arc::new(ExecutionGuard::new());
    let bus = BroadcastBus::new(256);

    if let Some(listen_addr) = config.ws_listen_addr.clone() {
        let ws_bus = bus.clone();
        tokio::spawn(async move {
            if let Err(e) = run_ws_server(listen_addr, ws_bus).await {
                error!("dashboard feed stopped: {e:#}");
            }
        });
    }

    let scanner = PoolScanner::new(
        provider.clone(),
        config.venues.clone(),
        config.seed_token_addresses(),
        Arc::clone(&quotes),
        ScannerSettings {
            rpc_batch: config.rpc_batch,
            min_liquidity_usd: config.min_liquidity_usd,
            stale_seconds: config.stale_seconds,
            max_tokens: config.max_tokens,
            default_fee_num: config.fee_num,
        },
    );

    let finder = OpportunityFinder::new(
        config.loan_amount,
        config.min_profit_usd,
        config.max_tokens,
    );

    let pipeline = match (&execution, &signer) {
        (Some(keys), Some(signer)) => {
            info!(
                "live execution ENABLED: executor {:?}, signer {:?}",
                keys.executor,
                signer.address()
            );
            Some(ExecutionPipeline::new(
                provider.clone(),
                keys.executor,
                keys.beneficiary,
                signer.address(),
                PipelineSettings {
                    min_exec_spread_bps: config.min_exec_spread_bps(),
                    max_slippage_bps: config.max_slippage_bps,
                    min_profit_usd: config.min_profit_usd,
                    gas_risk_multiplier: config.gas_risk_multiplier,
                    default_gas_limit: config.default_gas_limit,
                    max_gas_price_gwei: config.max_gas_price_gwei,
                    gas_token: config.gas_token.clone(),
                },
                Arc::clone(&quotes),
                Arc::clone(&guard),
            ))
        }
        _ => {
            info!("live execution disabled — detection only");
            None
        }
    };

    // SIGINT/SIGTERM end the loop between cycles.
    let signals = Signals::new([SIGINT, SIGTERM]).context("failed to install signal handlers")?;
    let signals_handle = signals.handle();
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    let signals_task = tokio::spawn(async move {
        let mut signals = signals;
        if let Some(signal) = signals.next().await {
            info!("received signal {}, shutting down", signal);
            let _ = shutdown_tx.send(()).await;
        }
    });

    let engine = ScanEngine::new(
        scanner,
        finder,
        pipeline,
        guard,
        quotes,
        bus,
        EngineSettings {
            scan_interval_ms: config.scan_interval_ms,
            execution_enabled: config.enable_execution,
        },
    );

    engine.run(shutdown_rx).await?;

    signals_handle.close();
    signals_task.abort();
    info!("shutdown complete");
    Ok(())
}

/// Build the provider, attaching the wallet when execution is live.
/// `connect` accepts ws://, http(s)://, and ipc paths alike.
async fn connect_provider(rpc_url: &str, signer: Option<PrivateKeySigner>) -> Result<DynProvider> {
    let provider = match signer {
        Some(signer) => ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect(rpc_url)
            .await
            .context("provider connect failed")?
            .erased(),
        None => ProviderBuilder::new()
            .connect(rpc_url)
            .await
            .context("provider connect failed")?
            .erased(),
    };
    Ok(provider)
}

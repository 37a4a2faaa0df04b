//! Main entry point for the order management service.
//!
//! Loads the configuration, assembles the order engine from the configured
//! storage backend and payment processor, recovers orders left in
//! `Processing` by a previous run, and then serves the HTTP API next to the
//! engine's background reconciliation loop.

use clap::Parser;
use oms_config::Config;
use oms_core::{OmsBuilder, OmsFactories, OrderEngine};
use std::collections::HashMap;
use std::path::PathBuf;

mod apis;
mod server;

/// Command-line arguments for the order service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, env = "OMS_CONFIG", default_value = "config/oms.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started order service");

	let config_path = args
		.config
		.to_str()
		.ok_or("configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let engine = build_engine(config.clone())?;
	engine.initialize().await?;

	match config.api.clone().filter(|api| api.enabled) {
		Some(api_config) => {
			let api_engine = engine.clone();
			tokio::select! {
				result = engine.run() => {
					tracing::info!("Engine finished");
					result?;
				}
				result = server::start_server(api_config, api_engine) => {
					tracing::info!("API server finished");
					result?;
				}
			}
		},
		None => {
			tracing::info!("API disabled, running engine only");
			engine.run().await?;
		},
	}

	engine.shutdown().await?;
	tracing::info!("Stopped order service");
	Ok(())
}

/// Builds the engine with every registered storage and payment implementation.
fn build_engine(config: Config) -> Result<OrderEngine, oms_core::BuilderError> {
	let storage_factories: HashMap<_, _> = oms_storage::get_all_implementations()
		.into_iter()
		.map(|(name, factory)| (name.to_string(), factory))
		.collect();
	let payment_factories: HashMap<_, _> = oms_payment::get_all_implementations()
		.into_iter()
		.map(|(name, factory)| (name.to_string(), factory))
		.collect();

	tracing::debug!(
		storage = ?storage_factories.keys().collect::<Vec<_>>(),
		payment = ?payment_factories.keys().collect::<Vec<_>>(),
		"Registered implementations"
	);

	OmsBuilder::new(config).build(OmsFactories {
		storage_factories,
		payment_factories,
	})
}

//! dropgate binary entry point.

use clap::Parser;
use dropgate::config::{ConfigLoader, DropgateConfig, LookupConfig};
use dropgate::modules::access_control::lookup::{
    CategorySet, MaxMindGeoResolver, SystemDnsResolver,
};
use dropgate::modules::access_control::{AccessGate, LookupContext};
use dropgate::modules::entry_store::{EntryStore, MemoryStore};
use dropgate::modules::http_handler::{ClientIpResolver, Dispatcher, HttpServer};
use dropgate::modules::logging;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(name = "dropgate", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "dropgate.toml")]
    config: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,

    /// Print the configured entries as JSON and exit
    #[arg(long)]
    dump_entries: bool,
}

/// Build lookup sources; a source that cannot be opened is left out.
fn build_lookups(config: &LookupConfig) -> LookupContext {
    let mut lookups = LookupContext::new().with_timeout(config.timeout());

    if let Some(path) = &config.geo_database {
        match MaxMindGeoResolver::open(path) {
            Ok(geo) => lookups = lookups.with_geo(Arc::new(geo)),
            Err(e) => warn!("Geofence rules will deny every request: {e}"),
        }
    }

    if let Some(path) = &config.ipcat_csv {
        match CategorySet::open(path) {
            Ok(categories) => lookups = lookups.with_categories(Arc::new(categories)),
            Err(e) => warn!("Category rules will deny every request: {e}"),
        }
    }

    if config.dns {
        match SystemDnsResolver::from_system_conf() {
            Ok(dns) => lookups = lookups.with_dns(Arc::new(dns)),
            Err(e) => warn!("Hostname rules will never match: {e}"),
        }
    }

    lookups
}

async fn seed_store(config: &DropgateConfig) -> Result<MemoryStore, BoxError> {
    let store = MemoryStore::new();
    for entry in &config.entries {
        store.insert(entry.to_entry()).await?;
    }
    Ok(store)
}

async fn run(config: DropgateConfig) -> Result<(), BoxError> {
    let store = seed_store(&config).await?;
    info!(entries = store.len(), "Entry store ready");

    let lookups = build_lookups(&config.lookup);
    let gate = AccessGate::new(Arc::new(store), lookups);
    let dispatcher = Dispatcher::new(&config.server.upload_dir);
    let client_ip = ClientIpResolver::new(
        config.server.trust_proxy_headers,
        config.server.trusted_proxy_networks()?,
    );

    let mut server = HttpServer::new(config.server.socket_addr(), gate, dispatcher, client_ip);
    server.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    server.stop().await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ConfigLoader::new().load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("dropgate: {e}");
            std::process::exit(1);
        },
    };

    if cli.check {
        println!("Configuration OK: {} entries", config.entries.len());
        return;
    }

    if cli.dump_entries {
        let entries: Vec<_> = config.entries.iter().map(|e| e.to_entry()).collect();
        match serde_json::to_string_pretty(&entries) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("dropgate: {e}");
                std::process::exit(1);
            },
        }
        return;
    }

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("dropgate: {e}");
        std::process::exit(1);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting dropgate");

    if let Err(e) = run(config).await {
        error!("{e}");
        std::process::exit(1);
    }
}

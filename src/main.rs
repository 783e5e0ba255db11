mod cli;

use cinefeed::{
    config,
    posters::PosterClient,
    provider::{CatalogGateway, HttpCatalogGateway},
    refresh::{RefreshPolicy, RefreshScheduler, RetryPolicy},
    server,
    service::CatalogService,
    store::CatalogStore,
};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::sync::Arc;

async fn start_server(
    host: String,
    port: u16,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    // Load config
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    config.server.host = host;
    config.server.port = port;

    tracing::info!("Starting Cinefeed server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    let config = Arc::new(config);

    let store = Arc::new(CatalogStore::new(config.refresh.chunk_size));
    let gateway: Arc<dyn CatalogGateway> =
        Arc::new(HttpCatalogGateway::new(config.upstream.base_url.clone()));
    let posters = PosterClient::new(config.posters.base_url.clone(), config.posters.workers);

    let scheduler = Arc::new(RefreshScheduler::new(
        gateway.clone(),
        store.clone(),
        RefreshPolicy {
            interval: config.refresh.interval(),
            failure_reschedule: config.refresh.failure_reschedule(),
            retry: RetryPolicy {
                max_retries: config.refresh.max_retries,
                retry_delay: config.refresh.retry_delay(),
            },
        },
    ));
    scheduler.start();

    let supervisor = cinefeed::refresh::spawn_supervisor(
        scheduler.clone(),
        config.refresh.supervisor_interval(),
    );

    let service = Arc::new(CatalogService::new(
        store,
        gateway,
        posters,
        config.app.name.clone(),
        scheduler.last_update_cell(),
    ));

    let server_result = server::start_server(config, service).await;

    // Cleanup
    tracing::info!("Shutting down...");
    supervisor.abort();
    scheduler.stop();

    server_result
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "cinefeed=trace,tower_http=debug".to_string()
        } else {
            "cinefeed=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("cinefeed {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Upstream: {}", config.upstream.base_url);
            println!(
                "  Refresh interval: {}s",
                config.refresh.interval_secs
            );
            println!("  Poster workers: {}", config.posters.workers);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}

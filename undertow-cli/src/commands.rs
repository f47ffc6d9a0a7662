//! CLI command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Subcommand;
use undertow_core::{Gateway, GatewayConfig};
use undertow_sim::{Catalog, SimulatedEngine, SimulationConfig};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the gateway on the simulated engine
    Serve {
        /// Host to bind to (overrides UNDERTOW_HOST)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to (overrides UNDERTOW_PORT)
        #[arg(short, long)]
        port: Option<u16>,
        /// Directory of local videos served as simulated torrents
        #[arg(long)]
        movies_dir: Option<PathBuf>,
        /// Simulated download speed per torrent in bytes/s, 0 for instant
        #[arg(long, default_value_t = 5 * 1024 * 1024)]
        download_speed: u64,
        /// Simulated metadata latency in milliseconds
        #[arg(long, default_value_t = 500)]
        metadata_delay_ms: u64,
        /// Encoder binary used for /transcode (overrides UNDERTOW_ENCODER)
        #[arg(long)]
        encoder: Option<PathBuf>,
    },
    /// List the simulated torrents built from a directory
    Catalog {
        /// Directory of local videos
        #[arg(long)]
        movies_dir: PathBuf,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the first error from scanning, binding or serving.
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve {
            host,
            port,
            movies_dir,
            download_speed,
            metadata_delay_ms,
            encoder,
        } => {
            let mut config = GatewayConfig::from_env();
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(encoder) = encoder {
                config.transcode.program = encoder;
            }

            let simulation = SimulationConfig {
                metadata_delay: Duration::from_millis(metadata_delay_ms),
                download_speed: (download_speed > 0).then_some(download_speed),
                ..SimulationConfig::default()
            };
            serve(config, simulation, movies_dir.as_deref()).await
        }
        Commands::Catalog { movies_dir } => print_catalog(&movies_dir).await,
    }
}

async fn load_catalog(movies_dir: Option<&Path>) -> anyhow::Result<Catalog> {
    match movies_dir {
        Some(dir) => Catalog::scan_directory(dir)
            .await
            .with_context(|| format!("Failed to load movies from {}", dir.display())),
        None => Ok(Catalog::new()),
    }
}

/// Start the gateway and serve until Ctrl-C
///
/// # Errors
/// - Catalog scan failed
/// - Listener could not bind or the server failed
pub async fn serve(
    config: GatewayConfig,
    simulation: SimulationConfig,
    movies_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let catalog = load_catalog(movies_dir).await?;
    for entry in catalog.entries() {
        tracing::info!("Serving {} as {}", entry.name, entry.info_hash);
    }

    let engine = Arc::new(SimulatedEngine::new(catalog, simulation));
    let server_config = config.server.clone();
    let gateway = Arc::new(Gateway::new(engine.clone(), config));

    undertow_web::run_server(gateway, &server_config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await?;

    engine.shutdown();
    Ok(())
}

/// Print every simulated torrent and its files
///
/// # Errors
/// - Catalog scan failed
pub async fn print_catalog(movies_dir: &Path) -> anyhow::Result<()> {
    let catalog = load_catalog(Some(movies_dir)).await?;
    if catalog.is_empty() {
        println!("No video files found in {}", movies_dir.display());
        return Ok(());
    }

    for entry in catalog.entries() {
        println!("{}  {}", entry.info_hash, entry.name);
        for (index, file) in entry.files.iter().enumerate() {
            println!("  [{index}] {} ({} bytes)", file.name, file.length);
        }
    }
    Ok(())
}

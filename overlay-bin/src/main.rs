use clap::{Parser, Subcommand};
use overlay_common::OVAppContext;
use overlay_error::{OVError, OVResult};
use overlay_models::{constants::DEFAULT_CONFIG_FILE_NAME, settings::Settings};
use overlay_storage::OVDbManager;
use overlay_web::OVWebServer;
use std::{env::current_dir, path::PathBuf};

/// Overlay Swapper - broadcast overlay manager
///
/// Serves the admin panel, the browser-source viewer and the overlay API
/// from one process backed by a local SQLite database.
#[derive(Parser)]
#[command(name = "overlay-swapper")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Overlay Swapper", long_about = None)]
struct Cli {
    /// Sets a custom config file with full path
    ///
    /// If not specified, the service looks for 'overlay.toml'
    /// in the current working directory.
    #[arg(short, long, env = "OV_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the server (default)
    Serve,
    /// Print the effective configuration as JSON and exit
    CheckConfig,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> OVResult<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(p) => p,
        None => {
            let dir = current_dir()
                .map_err(|e| OVError::from(format!("Failed to get current directory: {e}")))?;
            dir.join(DEFAULT_CONFIG_FILE_NAME)
        }
    };
    let config_path_str = config_path.to_string_lossy().to_string();

    match cli.command.unwrap_or(Command::Serve) {
        Command::CheckConfig => {
            let settings = Settings::new(config_path_str)?;
            println!("{}", serde_json::to_string_pretty(&*settings)?);
            Ok(())
        }
        Command::Serve => {
            OVAppContext::init::<OVDbManager, OVWebServer>(config_path_str).await?;
            OVAppContext::instance().await?.run().await
        }
    }
}

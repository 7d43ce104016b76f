use anyhow::Context;
use camino::Utf8PathBuf;
use camsync_cli::{commands, logging, Overrides, RunConfig};
use camsync_config::Settings;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "Copy new recordings off a Wi-Fi camera")]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Settings file (defaults to settings.json in the platform config dir)
    #[arg(long, global = true, env = "CAMSYNC_CONFIG")]
    config: Option<Utf8PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct CameraArgs {
    /// Local directory the recordings are copied into
    #[arg(long, env = "CAMSYNC_DEST")]
    dest: Option<Utf8PathBuf>,
    #[arg(long, env = "CAMSYNC_CAMERA_IP")]
    camera_ip: Option<String>,
    #[arg(long, env = "CAMSYNC_BRIDGE_PORT")]
    bridge_port: Option<u16>,
    /// HTTP root to download from (defaults to http://<camera ip>)
    #[arg(long, env = "CAMSYNC_BASE_URL")]
    base_url: Option<String>,
    /// Skip joining the camera network; the host is already on it
    #[arg(long)]
    no_wifi: bool,
    #[arg(long)]
    list_timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every recording not yet in the destination
    Sync {
        #[command(flatten)]
        camera: CameraArgs,
        /// Remove camera copies once the local copy is verified
        #[arg(long)]
        delete_after_download: bool,
    },
    /// Show what a sync would download
    Plan {
        #[command(flatten)]
        camera: CameraArgs,
    },
    /// List visible Wi-Fi networks and mark camera hotspots
    Networks,
}

impl CameraArgs {
    fn into_overrides(self, delete_after_download: bool) -> Overrides {
        Overrides {
            dest: self.dest,
            camera_ip: self.camera_ip,
            bridge_port: self.bridge_port,
            base_url: self.base_url,
            delete_after_download,
            no_wifi: self.no_wifi,
            list_timeout_secs: self.list_timeout,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    let log_file = settings.log_file_path()?;
    let _log_guard = logging::init(
        &settings.logging.log_level,
        cli.verbose,
        log_file.as_deref(),
    )?;

    match cli.command {
        Commands::Sync {
            camera,
            delete_after_download,
        } => {
            let overrides = camera.into_overrides(delete_after_download);
            let cfg = RunConfig::resolve(&settings, &overrides)?;
            commands::cmd_sync(&cfg).await?;
        }
        Commands::Plan { camera } => {
            let cfg = RunConfig::resolve(&settings, &camera.into_overrides(false))?;
            commands::cmd_plan(&cfg).await?;
        }
        Commands::Networks => {
            commands::cmd_networks(settings.camera.ssid_prefixes.clone()).await?;
        }
    }

    Ok(())
}

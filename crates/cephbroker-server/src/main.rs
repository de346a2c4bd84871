use cephbroker_backend::CephClient;
use cephbroker_core::{Broker, CephController};
use cephbroker_server::BrokerConfig;
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tiny_http::Server;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "cephbroker", about = "Service broker for CephFS shares")]
struct Cli {
    /// TOML file with broker settings. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// host:port to serve the broker API on.
    #[arg(long)]
    listen_addr: Option<String>,

    /// host:port of the ceph metadata server.
    #[arg(long)]
    mds: Option<String>,

    /// Keyring file for ceph authentication.
    #[arg(long)]
    keyring_file: Option<PathBuf>,

    /// Directory to store book-keeping state in.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Name of the service advertised in the catalog.
    #[arg(long)]
    service_name: Option<String>,

    /// ID of the service advertised in the catalog.
    #[arg(long)]
    service_id: Option<String>,

    /// Name of the service plan.
    #[arg(long)]
    plan_name: Option<String>,

    /// ID of the service plan.
    #[arg(long)]
    plan_id: Option<String>,

    /// Description of the service plan.
    #[arg(long)]
    plan_desc: Option<String>,

    /// Local directory to mount the filesystem at on the broker host.
    #[arg(long)]
    base_mount_path: Option<PathBuf>,

    /// Directory on the ceph filesystem to mount.
    #[arg(long)]
    base_remote_mount_path: Option<String>,

    /// Number of HTTP worker threads.
    #[arg(long)]
    workers: Option<usize>,
}

impl Cli {
    /// Overwrite `config` with every flag given on the command line.
    fn apply(self, config: &mut BrokerConfig) {
        if let Some(v) = self.listen_addr {
            config.listen_addr = v;
        }
        if let Some(v) = self.mds {
            config.mds = v;
        }
        if let Some(v) = self.keyring_file {
            config.keyring_file = v;
        }
        if let Some(v) = self.data_dir {
            config.data_dir = v;
        }
        if let Some(v) = self.service_name {
            config.service_name = v;
        }
        if let Some(v) = self.service_id {
            config.service_id = v;
        }
        if let Some(v) = self.plan_name {
            config.plan_name = v;
        }
        if let Some(v) = self.plan_id {
            config.plan_id = v;
        }
        if let Some(v) = self.plan_desc {
            config.plan_desc = v;
        }
        if let Some(v) = self.base_mount_path {
            config.base_mount_path = v;
        }
        if let Some(v) = self.base_remote_mount_path {
            config.base_remote_mount_path = v;
        }
        if let Some(v) = self.workers {
            config.workers = v;
        }
    }
}

fn load_config(cli: Cli) -> Result<BrokerConfig, cephbroker_server::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => BrokerConfig::load(path)?,
        None => BrokerConfig::default(),
    };
    cli.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match load_config(Cli::parse()) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = fs::create_dir_all(&config.data_dir) {
        error!(
            "failed to create data directory {}: {e}",
            config.data_dir.display()
        );
        return ExitCode::FAILURE;
    }

    info!("starting cephbroker on {}", config.listen_addr);
    info!("data directory: {}", config.data_dir.display());
    info!("mds: {}, mount path: {}", config.mds, config.base_mount_path.display());

    let client = CephClient::new(config.client_config());
    let controller = Arc::new(CephController::new(Arc::new(client)));
    let broker = Arc::new(Broker::new(controller, &config.catalog(), &config.data_dir));

    let server = match Server::http(&config.listen_addr) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("failed to bind {}: {e}", config.listen_addr);
            return ExitCode::FAILURE;
        }
    };

    let workers = config.workers;
    let srv = Arc::clone(&server);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("shutdown requested");
        for _ in 0..workers {
            srv.unblock();
        }
    }) {
        warn!("failed to install signal handler: {e}");
    }

    cephbroker_server::run_server(&server, &broker, workers);
    info!("cephbroker stopped");
    ExitCode::SUCCESS
}

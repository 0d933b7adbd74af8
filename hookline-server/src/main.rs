use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

mod api;
mod context;
mod server;

#[derive(Parser, Debug, Clone)]
#[command(name = "hookline")]
#[command(author, version, about = "Hookline - multi-session messaging gateway with webhook fan-out")]
pub struct Args {
    /// Address the REST API binds to
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:3000")]
    pub server_addr: String,

    /// Postgres connection URL.
    #[arg(long, env = "DATABASE_URL", default_value = "postgres://hookline@localhost:5432/hookline")]
    pub database_url: String,

    /// Root directory for per-session auth state
    #[arg(long, env = "AUTH_DATA_DIR", default_value = ".hookline_auth")]
    pub auth_data_dir: String,

    /// Root directory for downloaded media
    #[arg(long, env = "MEDIA_DIR", default_value = "media")]
    pub media_dir: String,

    /// Base URL of the protocol bridge
    #[arg(long, env = "BRIDGE_URL", default_value = "http://127.0.0.1:3100")]
    pub bridge_url: String,

    #[arg(long, env = "WEBHOOK_TIMEOUT_SECS", default_value_t = 30)]
    pub webhook_timeout_secs: u64,

    /// Largest auth snapshot stored per session, in bytes
    #[arg(long, env = "MAX_SNAPSHOT_BYTES", default_value_t = 8 * 1024 * 1024)]
    pub max_snapshot_bytes: usize,

    /// Do not reconnect sessions that were active at last shutdown
    #[arg(long, env = "SKIP_AUTOSTART", default_value = "false")]
    pub skip_autostart: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hookline=info,hookline_core=info,hookline_server=info,tower_http=info"));
    let sub = fmt().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(sub) {
        eprintln!("Failed to set global subscriber: {}", e);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    info!(
        "Hookline starting. addr={}, bridge={}, autostart={}",
        args.server_addr, args.bridge_url, !args.skip_autostart
    );

    if let Err(e) = server::run_server(args).await {
        error!("Server error: {:?}", e);
        return Err(e.into());
    }
    info!("Main finished. Goodbye!");
    Ok(())
}

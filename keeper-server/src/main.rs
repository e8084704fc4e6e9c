use clap::Parser;
use keeper_server::config::ENV_CONFIG;
use keeper_server::store::StoreKind;
use keeper_server::{ConfigOverrides, ServerConfig};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "keeper-server", version, about = "Keeper vault server")]
struct ServerArgs {
    /// JSON config file
    #[arg(long, env = ENV_CONFIG)]
    config: Option<PathBuf>,
    /// Override bind address
    #[arg(long)]
    bind: Option<String>,
    /// Override database url
    #[arg(long)]
    database_url: Option<String>,
    /// Storage backend (sqlite or memory)
    #[arg(long)]
    store: Option<StoreKind>,
    /// Verbose output
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    if let Err(err) = real_main().await {
        eprintln!("server exited with error: {err:#}");
        process::exit(1);
    }
}

async fn real_main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    let overrides = ConfigOverrides {
        config_path: args.config,
        bind: args.bind,
        store: args.store,
        database_url: args.database_url,
    };
    let config = ServerConfig::load(&overrides)?;

    let level = if args.verbose {
        "debug"
    } else {
        config.log_level.as_str()
    };
    keeper_server::telemetry::init(level)?;
    if args.verbose {
        eprintln!("config loaded: {config:?}");
    }

    keeper_server::run(config).await
}

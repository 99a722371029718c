use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gembot")]
#[command(about = "Gembot: Telegram relay and Dialogflow fulfillment webhook", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the Telegram chat relay (webhook endpoint, or getUpdates long-poll when no webhook URL is configured).
    Relay {
        /// Config file path (default: GEMBOT_CONFIG_PATH or ~/.gembot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default: PORT env, then config, then 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Run the Dialogflow CX fulfillment webhook (bq_webhook / ds_webhook).
    Fulfillment {
        /// Config file path (default: GEMBOT_CONFIG_PATH or ~/.gembot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default: PORT env, then config, then 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("gembot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Relay { config, port }) => {
            if let Err(e) = run_relay(config, port).await {
                log::error!("relay failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Fulfillment { config, port }) => {
            if let Err(e) = run_fulfillment(config, port).await {
                log::error!("fulfillment failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

/// `--port` wins over PORT, which wins over the config file.
fn effective_port(flag: Option<u16>, configured: u16) -> u16 {
    flag.or_else(lib::config::port_from_env).unwrap_or(configured)
}

async fn run_relay(config_path: Option<std::path::PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    config.relay.port = effective_port(port, config.relay.port);
    log::info!(
        "starting relay on {}:{} (config {})",
        config.relay.bind,
        config.relay.port,
        path.display()
    );
    lib::relay::run_relay(config).await
}

async fn run_fulfillment(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    config.fulfillment.port = effective_port(port, config.fulfillment.port);
    log::info!(
        "starting fulfillment webhook on {}:{} (config {})",
        config.fulfillment.bind,
        config.fulfillment.port,
        path.display()
    );
    lib::fulfillment::run_fulfillment(config).await
}

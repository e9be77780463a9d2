mod config_commands;
mod doctor_commands;
mod fetch_commands;
mod render;

use std::{path::PathBuf, process::ExitCode};

use {
    anyhow::Context,
    chainscope_config::ChainscopeConfig,
    clap::{Parser, Subcommand},
    tracing::{debug, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Debug, Parser)]
#[command(
    name = "chainscope",
    version,
    about = "Chainscope: options quotes, expirations and chains from a browser-driven scraper"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of ./chainscope.toml and ~/.config/chainscope/).
    #[arg(long, global = true, env = "CHAINSCOPE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scrape (or serve from cache) one or more records.
    Fetch(fetch_commands::FetchArgs),
    /// Configuration inspection.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Check the local installation: config, browser binary, optional launch.
    Doctor {
        /// Also launch one browser session to prove it starts.
        #[arg(long)]
        launch: bool,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays clean for JSON/CSV output.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Load the explicit config file if one was given, otherwise discover one,
/// then apply `CHAINSCOPE_*` environment overrides.
pub(crate) fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<ChainscopeConfig> {
    let mut config = match path {
        Some(path) => chainscope_config::load_config(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => chainscope_config::discover_and_load(),
    };
    chainscope_config::apply_env_overrides(&mut config);
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "chainscope starting");

    match cli.command {
        Commands::Fetch(args) => {
            let config = load_config(cli.config.as_deref())?;
            let code = fetch_commands::handle_fetch(&config, args).await?;
            info!(exit_code = code, "fetch finished");
            Ok(ExitCode::from(code))
        },
        Commands::Config { action } => {
            config_commands::handle_config(action, cli.config.as_deref())
        },
        Commands::Doctor { launch } => {
            doctor_commands::handle_doctor(cli.config.as_deref(), launch).await
        },
    }
}

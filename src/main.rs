//! netcli - multi-host interactive shell
//!
//! ## Modes
//!
//! **Default** (no subcommand): Loads a topology config and runs the primary
//! CLI on this terminal. Without a terminal (or with `--window`) it opens a
//! secondary window instead and serves it until interrupted.
//!
//! **Client mode** (`netcli client <socket>`): Acts purely as a socket client
//! of a running session. This is what secondary windows run.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser as ClapParser, Subcommand};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use netcli::{cli, client, config, input::LineReader, terminal};

const DEFAULT_CONFIG: &str = "netcli.toml";

/// netcli - drive commands across a set of emulated network hosts
#[derive(ClapParser, Debug)]
#[command(name = "netcli", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Topology config file
    #[arg(short = 'c', long, env = "NETCLI_CONFIG", default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// History file (overrides the config)
    #[arg(long)]
    histfile: Option<PathBuf>,

    /// Prompt string (overrides the config)
    #[arg(long)]
    prompt: Option<String>,

    /// Open the CLI in a new window even when attached to a terminal
    #[arg(long)]
    window: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, env = "NETCLI_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to a running session's control socket
    Client {
        /// File to append command history to
        #[arg(long)]
        histfile: Option<PathBuf>,

        /// Prompt string
        #[arg(long)]
        prompt: Option<String>,

        /// Path to the session's control socket
        socket: PathBuf,
    },
}

#[derive(Error, Debug)]
pub enum NetcliError {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("config file not found: {0}")]
    NoConfig(PathBuf),

    #[error("window error: {0}")]
    Window(#[from] cli::WindowError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), NetcliError> {
    let mut cli = Cli::parse();
    init_tracing(cli.log_file.as_deref())?;

    let result = match cli.command.take() {
        Some(Commands::Client {
            histfile,
            prompt,
            socket,
        }) => run_client(histfile, prompt, socket).await,
        None => run_local(cli).await,
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, details = ?e, "cli: fatal error");
    }
    result
}

fn init_tracing(log_file: Option<&std::path::Path>) -> Result<(), NetcliError> {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "netcli=info".into()),
    );

    let (file_layer, stderr_layer) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file));
            (Some(layer), None)
        }
        None => (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

// ── Primary session ────────────────────────────────────────────────

async fn run_local(cli: Cli) -> Result<(), NetcliError> {
    let mut config = config::NetConfig::load(&cli.config)?
        .ok_or_else(|| NetcliError::NoConfig(cli.config.clone()))?;
    if let Some(histfile) = cli.histfile {
        config.histfile = Some(histfile);
    }
    let prompt = cli
        .prompt
        .unwrap_or_else(|| config.prompt().to_string());
    let background = config.background;
    let histfile = config.histfile();

    let session = Arc::new(config.into_session());
    tracing::info!(instance = session.instance(), hosts = ?session.host_names(), "session ready");

    if cli.window || !terminal::stdin_is_tty() {
        cli::remote_cli(&session, &prompt, "NetCLI", background).await?;
        tracing::info!("serving secondary cli until interrupted");
        tokio::signal::ctrl_c().await?;
        return Ok(());
    }

    let mut input = LineReader::stdin(histfile)?;
    let mut stdout = std::io::stdout();
    cli::local_cli(&session, &mut input, &mut stdout, &prompt, background).await?;
    tracing::info!("netcli exiting");
    Ok(())
}

// ── Client mode ────────────────────────────────────────────────────

async fn run_client(
    histfile: Option<PathBuf>,
    prompt: Option<String>,
    socket: PathBuf,
) -> Result<(), NetcliError> {
    tracing::debug!(socket = %socket.display(), "client cli using socket");
    let prompt = prompt.unwrap_or_else(|| cli::DEFAULT_PROMPT.to_string());

    let c = client::Client::connect(&socket).await.map_err(|e| {
        eprintln!("netcli: failed to connect to {}: {}", socket.display(), e);
        NetcliError::Io(e)
    })?;
    let mut input = LineReader::stdin(histfile)?;
    let mut stdout = std::io::stdout();
    c.run(&mut input, &prompt, &mut stdout).await?;
    Ok(())
}

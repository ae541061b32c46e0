//! NetStorage CLI: command line access to a NetStorage account
//!
//! Usage:
//!   netstorage-cli stat <path>              Show metadata as JSON
//!   netstorage-cli ls [path] [-r]           List a directory
//!   netstorage-cli get <remote> [local]     Download a file
//!   netstorage-cli put <local> [remote]     Upload a file
//!   netstorage-cli prefix                   Create the configured path prefix
//!   netstorage-cli config init|show         Manage the settings file
//!
//! Settings come from the config file and `NETSTORAGE_*` variables.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use futures_util::{StreamExt, TryStreamExt};
use netstorage::config::{self, NetStorageSettings};
use netstorage::providers::{EnsureOutcome, NetStorageConfig, NetStorageProvider, ProviderError, StorageProvider, StoreKind};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "netstorage-cli",
    about = "NetStorage CLI: ACS file operations",
    version,
    long_about = "Signed NetStorage ACS operations.\nSettings are read from the config file and NETSTORAGE_* environment variables."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show metadata of a file or directory
    Stat {
        /// Remote path
        path: String,
    },
    /// List a directory
    Ls {
        /// Remote path (default: /)
        #[arg(default_value = "/")]
        path: String,
        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
    },
    /// Download a file
    Get {
        /// Remote file path
        remote: String,
        /// Local destination (default: remote file name)
        local: Option<String>,
    },
    /// Upload a file
    Put {
        /// Local file path
        local: String,
        /// Remote destination path (default: local file name)
        remote: Option<String>,
    },
    /// Delete a file
    Rm {
        /// Remote path
        path: String,
    },
    /// Create a directory (and missing parents)
    Mkdir {
        /// Remote path
        path: String,
    },
    /// Delete a directory recursively
    Rmdir {
        /// Remote path
        path: String,
    },
    /// Rename or move a file
    Mv {
        /// Current path
        from: String,
        /// New path
        to: String,
    },
    /// Create the configured path prefix directories on the server
    Prefix,
    /// Show file count and bytes used below a directory
    Du {
        /// Remote path (default: /)
        #[arg(default_value = "/")]
        path: String,
    },
    /// Manage the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a settings file
    Init {
        #[arg(long)]
        host: String,
        #[arg(long)]
        cp_code: String,
        #[arg(long)]
        key_name: String,
        /// Upload key; omit to supply it via NETSTORAGE_KEY
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        path_prefix: Option<String>,
        /// filestore or objectstore
        #[arg(long, default_value = "objectstore")]
        store_kind: String,
    },
    /// Print the effective settings (key masked)
    Show,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn build_provider() -> Result<NetStorageProvider> {
    let settings = config::load_settings().map_err(|e| anyhow!(e))?;
    let runtime = NetStorageConfig::from_settings(&settings)
        .map_err(|e| anyhow!("{} (config file: {})", e, config::config_path().display()))?;
    NetStorageProvider::new(&runtime).context("Failed to create NetStorage provider")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn file_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("download")
}

async fn download(provider: &NetStorageProvider, remote: &str, local: &str) -> Result<u64> {
    let mut stream = provider.read_stream(remote).await?;
    let mut file = tokio::fs::File::create(local)
        .await
        .with_context(|| format!("Failed to create {}", local))?;

    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

async fn upload(provider: &NetStorageProvider, local: &str, remote: &str) -> Result<()> {
    let file = tokio::fs::File::open(local)
        .await
        .with_context(|| format!("Failed to open {}", local))?;
    let length = file.metadata().await?.len();

    let stream = ReaderStream::new(file).map_err(ProviderError::from).boxed();
    let record = provider.write_stream(remote, stream, length).await?;
    print_json(&record)
}

fn run_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init {
            host,
            cp_code,
            key_name,
            key,
            path_prefix,
            store_kind,
        } => {
            let settings = NetStorageSettings {
                host,
                cp_code,
                key_name,
                key: key.unwrap_or_default(),
                path_prefix,
                store_kind: StoreKind::parse(&store_kind)
                    .ok_or_else(|| anyhow!("Unknown store kind '{}'", store_kind))?,
                ..Default::default()
            };
            // the key may be supplied later through NETSTORAGE_KEY
            let mut check = settings.clone();
            if check.key.is_empty() {
                check.key = "unset".to_string();
            }
            config::validate_settings(&check).map_err(|e| anyhow!(e))?;
            config::save_settings(&settings).map_err(|e| anyhow!(e))?;
            println!("Saved {}", config::config_path().display());
            Ok(())
        }
        ConfigAction::Show => {
            let settings = config::load_settings().map_err(|e| anyhow!(e))?;
            print_json(&settings.redacted())
        }
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let connect = || build_provider().map(|provider| provider.with_cancellation(cancel.clone()));

    match cli.command {
        Commands::Stat { path } => print_json(&connect()?.stat(&path).await?)?,
        Commands::Ls { path, recursive } => print_json(&connect()?.list_contents(&path, recursive).await?)?,
        Commands::Get { remote, local } => {
            let local = local.unwrap_or_else(|| file_name(&remote).to_string());
            let bytes = download(&connect()?, &remote, &local).await?;
            eprintln!("Downloaded {} to {} ({} bytes)", remote, local, bytes);
        }
        Commands::Put { local, remote } => {
            let remote = remote.unwrap_or_else(|| format!("/{}", file_name(&local)));
            upload(&connect()?, &local, &remote).await?;
        }
        Commands::Rm { path } => connect()?.delete(&path).await?,
        Commands::Mkdir { path } => print_json(&connect()?.create_dir(&path).await?)?,
        Commands::Rmdir { path } => connect()?.delete_dir(&path).await?,
        Commands::Mv { from, to } => connect()?.rename(&from, &to).await?,
        Commands::Prefix => {
            let provider = connect()?;
            let outcomes = provider.prepare_prefix().await?;
            if outcomes.is_empty() {
                eprintln!("No path prefix configured");
            }
            for outcome in outcomes {
                match outcome {
                    EnsureOutcome::Created(path) => eprintln!("Created {}", path),
                    EnsureOutcome::AlreadyExisted(path) => eprintln!("Exists  {}", path),
                }
            }
        }
        Commands::Du { path } => print_json(&connect()?.disk_usage(&path).await?)?,
        Commands::Config { action } => run_config(action)?,
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    if let Err(e) = run(cli, cancel).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

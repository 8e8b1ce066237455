//! kvsweep - inspect and delete keys by pattern on Redis-protocol stores.

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod progress;

use commands::{
    ConfigCommand, DelCommand, DeleteCommand, FlushCommand, GetCommand, KeysCommand,
    PingCommand, SetCommand,
};

/// kvsweep - inspect and delete keys by pattern on Redis-protocol stores.
///
/// Keys are enumerated with cursor-based SCAN (never KEYS), shown in full,
/// and deleted only after confirmation.
///
/// Connection profiles are stored in ~/.kvsweep/config.yaml and managed
/// like kubectl contexts. Pass --host for an ad-hoc connection instead.
#[derive(Parser)]
#[command(name = "kvsweep")]
#[command(about = "Safe pattern-based key inspection and deletion")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.kvsweep/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Context name to use
    #[arg(short = 'c', long, global = true)]
    pub context: Option<String>,

    /// Output file for reports (default: stdout)
    #[arg(short = 'o', long, global = true)]
    pub output: Option<String>,

    /// Output as JSON (for piping)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub conn: ConnectionArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Ad-hoc connection, used instead of a profile when --host is given.
#[derive(Args, Debug, Default)]
pub struct ConnectionArgs {
    /// Server host (ad-hoc connection)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Database index
    #[arg(long, global = true)]
    pub db: Option<u32>,

    /// ACL username
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Password (also overrides the selected context's password)
    #[arg(long, global = true, env = "KVSWEEP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Connect with TLS
    #[arg(long, global = true)]
    pub tls: bool,

    /// Do not verify the server certificate (implies --tls)
    #[arg(long, global = true)]
    pub insecure: bool,

    /// PEM bundle of trusted CAs (implies --tls)
    #[arg(long, global = true)]
    pub ca_bundle: Option<String>,

    /// Use the legacy RESP2 protocol
    #[arg(long, global = true)]
    pub legacy: bool,

    /// Command timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage connection profiles
    Config(ConfigCommand),
    /// Connect and report the negotiated session
    Ping(PingCommand),
    /// List keys matching a pattern
    Keys(KeysCommand),
    /// Delete every key matching a pattern, after confirmation
    Delete(DeleteCommand),
    /// Get the value of one key
    Get(GetCommand),
    /// Set the value of one key
    Set(SetCommand),
    /// Delete one key by exact name
    Del(DelCommand),
    /// Remove every key in the selected database
    Flush(FlushCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    if cli.verbose || std::env::var_os("RUST_LOG").is_some() {
        let filter = if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::from_default_env()
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match &cli.command {
        Commands::Config(cmd) => cmd.run(&cli).await,
        Commands::Ping(cmd) => cmd.run(&cli).await,
        Commands::Keys(cmd) => cmd.run(&cli).await,
        Commands::Delete(cmd) => cmd.run(&cli).await,
        Commands::Get(cmd) => cmd.run(&cli).await,
        Commands::Set(cmd) => cmd.run(&cli).await,
        Commands::Del(cmd) => cmd.run(&cli).await,
        Commands::Flush(cmd) => cmd.run(&cli).await,
    }
}

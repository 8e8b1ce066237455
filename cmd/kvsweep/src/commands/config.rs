//! Connection profile commands.

use std::collections::BTreeMap;

use clap::{Args, Subcommand};

use kvsweep_cli::config::{Profile, mask_secret};

use super::{get_config, get_output, get_profile, print_success};
use crate::Cli;

/// Manage connection profiles.
///
/// Contexts let you keep several named instances (dev, staging, prod)
/// and switch between them, similar to kubectl's context management.
///
/// Configuration is stored in ~/.kvsweep/config.yaml
#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Subcommand)]
enum ConfigSubcommand {
    /// Add or replace a context from the connection flags
    ///
    /// Example: kvsweep config add-context prod --host cache.internal --tls --password ...
    #[command(name = "add-context")]
    AddContext {
        /// Context name
        name: String,
    },
    /// Delete a context
    #[command(name = "delete-context")]
    DeleteContext {
        /// Context name
        name: String,
    },
    /// Set the current context
    #[command(name = "use-context")]
    UseContext {
        /// Context name
        name: String,
    },
    /// Display the current context
    #[command(name = "get-context")]
    GetContext,
    /// List all contexts
    #[command(name = "list-contexts", alias = "get-contexts")]
    ListContexts,
    /// View the current configuration
    View,
}

impl ConfigCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.command {
            ConfigSubcommand::AddContext { name } => {
                if cli.conn.host.is_none() {
                    anyhow::bail!("add-context requires --host");
                }
                let mut cfg = get_config(cli)?;

                let mut profile = get_profile(cli)?;
                profile.name = name.clone();
                profile.to_intent().validate()?;

                cfg.add_context(name, profile)?;
                print_success(&format!("Context \"{}\" added successfully", name));
                Ok(())
            }

            ConfigSubcommand::DeleteContext { name } => {
                let mut cfg = get_config(cli)?;
                cfg.delete_context(name)?;
                print_success(&format!("Context \"{}\" deleted", name));
                Ok(())
            }

            ConfigSubcommand::UseContext { name } => {
                let mut cfg = get_config(cli)?;
                cfg.use_context(name)?;
                print_success(&format!("Switched to context \"{}\"", name));
                Ok(())
            }

            ConfigSubcommand::GetContext => {
                let cfg = get_config(cli)?;
                if cfg.current_context.is_empty() {
                    println!("No current context set");
                } else {
                    println!("{}", cfg.current_context);
                }
                Ok(())
            }

            ConfigSubcommand::ListContexts => {
                let cfg = get_config(cli)?;

                if cfg.contexts.is_empty() {
                    println!("No contexts configured");
                    return Ok(());
                }

                println!("{:<8} {:<16} {:<32} {:<4} {}", "CURRENT", "NAME", "ENDPOINT", "DB", "TRANSPORT");
                for name in cfg.list_contexts() {
                    let Some(profile) = cfg.get_context(name) else {
                        continue;
                    };
                    let current = if name == cfg.current_context { "*" } else { "" };
                    let endpoint = format!("{}:{}", profile.host, profile.port);
                    let transport = match (profile.tls, profile.tls_verify) {
                        (false, _) => "plaintext",
                        (true, true) => "tls",
                        (true, false) => "tls (unverified)",
                    };
                    println!(
                        "{:<8} {:<16} {:<32} {:<4} {}",
                        current, name, endpoint, profile.db, transport
                    );
                }

                Ok(())
            }

            ConfigSubcommand::View => {
                let cfg = get_config(cli)?;

                if cli.json {
                    let masked: BTreeMap<&str, Profile> = cfg
                        .contexts
                        .iter()
                        .map(|(name, profile)| (name.as_str(), profile.masked()))
                        .collect();
                    return get_output(cli).write(&masked);
                }

                println!("Config file: {}", cfg.path().display());
                println!("Current context: {}", cfg.current_context);
                println!("Contexts: {}", cfg.contexts.len());

                for (name, profile) in &cfg.contexts {
                    println!("\n  {}:", name);
                    println!("    Endpoint: {}:{}", profile.host, profile.port);
                    println!("    Database: {}", profile.db);
                    if !profile.username.is_empty() {
                        println!("    Username: {}", profile.username);
                    }
                    if !profile.password.is_empty() {
                        println!("    Password: {}", mask_secret(&profile.password));
                    }
                    if profile.tls {
                        println!("    TLS verify: {}", profile.tls_verify);
                        if !profile.ca_bundle_path.is_empty() {
                            println!("    CA bundle: {}", profile.ca_bundle_path);
                        }
                    }
                    if profile.legacy_protocol {
                        println!("    Protocol: RESP2 (legacy)");
                    }
                    if profile.timeout > 0 {
                        println!("    Timeout: {}s", profile.timeout);
                    }
                }

                Ok(())
            }
        }
    }
}

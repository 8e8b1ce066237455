//! Single-key commands.

use clap::Args;

use kvsweep_cli::config::Profile;
use kvsweep_session::Session;

use super::{print_info, print_success, with_connection};
use crate::Cli;

/// Print the value of one key.
#[derive(Args)]
pub struct GetCommand {
    /// Exact key name
    key: String,
}

impl GetCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let value = with_connection(cli, async |session: &mut Session, _profile: &Profile| {
            Ok(session.get(&self.key).await?)
        })
        .await?;

        match value {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        }
        Ok(())
    }
}

/// Set the value of one key.
#[derive(Args)]
pub struct SetCommand {
    /// Exact key name
    key: String,
    /// Value
    value: String,
}

impl SetCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        with_connection(cli, async |session: &mut Session, _profile: &Profile| {
            Ok(session.set(&self.key, &self.value).await?)
        })
        .await?;
        print_success(&format!("Set \"{}\"", self.key));
        Ok(())
    }
}

/// Delete one key by its exact name. Glob characters are not expanded.
#[derive(Args)]
pub struct DelCommand {
    /// Exact key name
    key: String,
}

impl DelCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let deleted = with_connection(cli, async |session: &mut Session, _profile: &Profile| {
            Ok(session.delete_key(&self.key).await?)
        })
        .await?;

        if deleted {
            print_success(&format!("Deleted \"{}\"", self.key));
        } else {
            print_info(&format!("Key \"{}\" does not exist", self.key));
        }
        Ok(())
    }
}

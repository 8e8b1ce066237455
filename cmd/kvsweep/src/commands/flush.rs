//! Database flush command.

use clap::Args;

use kvsweep_cli::config::Profile;
use kvsweep_session::Session;

use super::{confirm_typed, print_info, print_success, print_warning, with_connection};
use crate::Cli;
use crate::progress::spin;

/// Remove every key in the selected database.
///
/// Asks you to type the target's name back unless --yes is given.
#[derive(Args)]
pub struct FlushCommand {
    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    yes: bool,
}

impl FlushCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        with_connection(cli, async |session: &mut Session, profile: &Profile| {
            let name = profile.display_name();
            let size = session.dbsize().await?;
            print_info(&format!("{} holds {} key(s) in db {}", name, size, session.db()));

            let prompt = format!("DANGER! This will delete all keys in {}.", name);
            if !self.yes && !confirm_typed(&prompt, &name)? {
                print_warning("Flush cancelled");
                return Ok(());
            }

            let message = format!("Flushing database for {}...", name);
            spin(&message, session.flush_db()).await?;
            print_success(&format!("Database for {} flushed", name));
            Ok(())
        })
        .await
    }
}

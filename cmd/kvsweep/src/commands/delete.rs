//! Bulk delete-by-pattern command.

use clap::Args;

use kvsweep_cli::config::Profile;
use kvsweep_session::{DEFAULT_SCAN_COUNT, ScanOptions, Session, collect_matches, delete_matches};

use super::{
    confirm, get_output, print_error, print_info, print_success, print_warning, structured_output,
    with_connection,
};
use crate::Cli;
use crate::progress::spin;

/// Delete every key matching a glob pattern.
///
/// The full match set is collected and printed first. Only those keys are
/// deleted, and only after confirmation.
#[derive(Args)]
pub struct DeleteCommand {
    /// Glob pattern (`*`, `?`, `[abc]`, `\` escapes)
    pattern: String,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    yes: bool,

    /// SCAN COUNT hint per step
    #[arg(long, default_value_t = DEFAULT_SCAN_COUNT)]
    count: usize,
}

impl DeleteCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let options = ScanOptions::default().with_count(self.count);

        let report = with_connection(cli, async |session: &mut Session, profile: &Profile| {
            let message = format!("Scanning for \"{}\"...", self.pattern);
            let matches = spin(&message, collect_matches(session, &self.pattern, options)).await?;

            if matches.is_empty() {
                print_info(&format!("No keys match \"{}\"", self.pattern));
                return Ok(None);
            }

            println!("Keys matching \"{}\":", self.pattern);
            for key in matches.keys() {
                println!("  {}", key);
            }

            let prompt = format!(
                "Delete {} key(s) from {}?",
                matches.len(),
                profile.display_name()
            );
            if !self.yes && !confirm(&prompt)? {
                print_warning("Deletion cancelled");
                return Ok(None);
            }

            let message = format!("Deleting {} key(s)...", matches.len());
            let report = spin(&message, delete_matches(session, matches.confirm())).await;
            Ok(Some(report))
        })
        .await?;

        let Some(report) = report else {
            return Ok(());
        };

        if report.is_clean() {
            print_success(&format!(
                "Deleted {} of {} key(s)",
                report.deleted_count, report.requested_count
            ));
        } else {
            print_warning(&format!(
                "Deleted {} of {} key(s), {} failed",
                report.deleted_count,
                report.requested_count,
                report.errors.len()
            ));
        }
        if report.missing_count > 0 {
            print_info(&format!(
                "{} key(s) were already gone",
                report.missing_count
            ));
        }

        if structured_output(cli) {
            get_output(cli).write(&report)?;
        } else {
            for error in &report.errors {
                print_error(&error.to_string());
            }
        }
        if !report.is_clean() {
            anyhow::bail!("{} deletion(s) failed", report.errors.len());
        }
        Ok(())
    }
}

//! Key listing command.

use clap::Args;
use futures::TryStreamExt;

use kvsweep_cli::config::Profile;
use kvsweep_session::{DEFAULT_SCAN_COUNT, ScanOptions, Session, collect_matches, scan};

use super::{get_output, print_info, structured_output, with_connection};
use crate::Cli;

/// List keys matching a glob pattern.
///
/// Uses cursor-based SCAN, so it is safe on busy production instances.
/// Keys are printed as they arrive. A key the store reports twice during
/// the pass may be printed twice; structured output lists each key once.
#[derive(Args)]
pub struct KeysCommand {
    /// Glob pattern (`*`, `?`, `[abc]`, `\` escapes)
    #[arg(default_value = "*")]
    pattern: String,

    /// SCAN COUNT hint per step
    #[arg(long, default_value_t = DEFAULT_SCAN_COUNT)]
    count: usize,
}

impl KeysCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let options = ScanOptions::default().with_count(self.count);
        let streaming = !structured_output(cli);

        if !streaming {
            let set = with_connection(cli, async |session: &mut Session, _profile: &Profile| {
                Ok(collect_matches(session, &self.pattern, options).await?)
            })
            .await?;
            get_output(cli).write(&set.keys())?;
            print_info(&format!("{} key(s) match \"{}\"", set.len(), self.pattern));
            return Ok(());
        }

        let count = with_connection(cli, async |session: &mut Session, _profile: &Profile| {
            let mut count = 0usize;
            let stream = scan(session, &self.pattern, options);
            futures::pin_mut!(stream);
            while let Some(key) = stream.try_next().await? {
                println!("{}", key);
                count += 1;
            }
            Ok(count)
        })
        .await?;

        print_info(&format!("{} key(s) match \"{}\"", count, self.pattern));
        Ok(())
    }
}

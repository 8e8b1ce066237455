//! Session check command.

use std::time::Instant;

use clap::Args;
use serde::Serialize;

use kvsweep_cli::config::Profile;
use kvsweep_session::{ProtocolVersion, ServerInfo, Session, SessionWarning, TransportSecurity};

use super::{format_elapsed, get_output, print_success, with_connection};
use crate::Cli;

/// Connect, run a round-trip and report what was negotiated.
#[derive(Args)]
pub struct PingCommand {}

#[derive(Serialize)]
struct PingReport {
    target: String,
    endpoint: String,
    db: u32,
    protocol: ProtocolVersion,
    security: TransportSecurity,
    encrypted: bool,
    server: Option<ServerInfo>,
    warnings: Vec<SessionWarning>,
    round_trip: String,
}

impl PingCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let report = with_connection(cli, async |session: &mut Session, profile: &Profile| {
            let started = Instant::now();
            session.ping().await?;
            let round_trip = format_elapsed(started.elapsed());
            print_success(&format!("PONG in {}", round_trip));

            Ok(PingReport {
                target: profile.display_name(),
                endpoint: session.endpoint().to_string(),
                db: session.db(),
                protocol: session.protocol(),
                security: session.security().clone(),
                encrypted: session.security().is_encrypted(),
                server: session.server_info().cloned(),
                warnings: session.warnings().to_vec(),
                round_trip,
            })
        })
        .await?;

        get_output(cli).write(&report)
    }
}

//! Utility functions for CLI commands.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use kvsweep_cli::config::{Config, Profile, load_config};
use kvsweep_cli::output::Output;
use kvsweep_session::{NegotiationError, Session, negotiate};

use crate::Cli;
use crate::progress::spin;

/// Gets the global configuration.
pub fn get_config(cli: &Cli) -> anyhow::Result<Config> {
    load_config(cli.config.as_deref())
}

/// Output selected by the global flags.
pub fn get_output(cli: &Cli) -> Output {
    Output::from_flags(cli.json, cli.output.as_deref())
}

/// Returns true when the global flags ask for a structured (YAML/JSON) report
/// rather than human-readable lines.
pub fn structured_output(cli: &Cli) -> bool {
    cli.json || cli.output.is_some()
}

/// Resolves the profile to connect with: ad-hoc flags when `--host` is
/// given, otherwise the named or current context.
pub fn get_profile(cli: &Cli) -> anyhow::Result<Profile> {
    let conn = &cli.conn;

    if let Some(host) = &conn.host {
        let tls = conn.tls || conn.insecure || conn.ca_bundle.is_some();
        return Ok(Profile {
            name: String::new(),
            host: host.clone(),
            port: conn.port.unwrap_or(kvsweep_session::DEFAULT_PORT),
            db: conn.db.unwrap_or(0),
            username: conn.user.clone().unwrap_or_default(),
            password: conn.password.clone().unwrap_or_default(),
            tls,
            tls_verify: !conn.insecure,
            ca_bundle_path: conn.ca_bundle.clone().unwrap_or_default(),
            legacy_protocol: conn.legacy,
            timeout: conn.timeout.unwrap_or(0),
        });
    }

    if conn.port.is_some()
        || conn.db.is_some()
        || conn.user.is_some()
        || conn.tls
        || conn.insecure
        || conn.ca_bundle.is_some()
        || conn.legacy
        || conn.timeout.is_some()
    {
        anyhow::bail!("connection flags require --host; edit the context to change a profile");
    }

    let cfg = get_config(cli)?;
    match cfg.resolve_context(cli.context.as_deref()) {
        Some(profile) => {
            let mut profile = profile.clone();
            if let Some(password) = &conn.password {
                profile.password = password.clone();
            }
            Ok(profile)
        }
        None => match cli.context.as_deref() {
            Some(name) => anyhow::bail!("context '{}' not found", name),
            None => anyhow::bail!(
                "no context specified. Use -c, --host, or set a default context with 'kvsweep config use-context'"
            ),
        },
    }
}

/// Negotiates a session for `profile`, reporting progress and warnings.
pub async fn connect(profile: &Profile) -> anyhow::Result<Session> {
    let display = profile.display_name();
    let message = format!("Connecting to {}...", display);

    match spin(&message, negotiate(profile.to_intent())).await {
        Ok(session) => {
            print_success(&format!(
                "Connected to {} ({}, {}, db {})",
                display,
                session.protocol(),
                session.security(),
                session.db()
            ));
            for warning in session.warnings() {
                print_warning(&warning.to_string());
            }
            Ok(session)
        }
        Err(e) => {
            print_error(&format!("Failed to connect to {}: {}", display, e));
            if let Some(hint) = cli_hint(&e) {
                print_info(hint);
            }
            Err(e.into())
        }
    }
}

/// Runs `f` on a session for the selected profile and closes it afterwards.
pub async fn with_connection<T>(
    cli: &Cli,
    f: impl AsyncFnOnce(&mut Session, &Profile) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let profile = get_profile(cli)?;
    let mut session = connect(&profile).await?;
    let result = f(&mut session, &profile).await;
    session.close().await;
    result
}

/// Operator hint for a negotiation failure, phrased with this CLI's flags.
pub fn cli_hint(err: &NegotiationError) -> Option<&'static str> {
    match err {
        NegotiationError::ProtocolIncompatible { .. } => {
            Some("the server does not speak RESP3; retry with --legacy (or legacy_protocol: true in the context)")
        }
        NegotiationError::TlsVerification { .. } => Some(
            "pass the issuing CA with --ca-bundle, or --insecure if you accept an unauthenticated server",
        ),
        _ => err.hint(),
    }
}

/// Asks a yes/no question on stderr. Anything but `y`/`yes` is a no.
pub fn confirm(prompt: &str) -> anyhow::Result<bool> {
    let answer = prompt_line(&format!("{} [y/N]: ", prompt))?;
    Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
}

/// Asks the operator to type `expected` back exactly.
pub fn confirm_typed(prompt: &str, expected: &str) -> anyhow::Result<bool> {
    let answer = prompt_line(&format!("{} Type '{}' to confirm: ", prompt, expected))?;
    Ok(answer == expected)
}

fn prompt_line(prompt: &str) -> anyhow::Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "{}", prompt)?;
    stderr.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Formats a duration as seconds with millisecond precision.
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.3}s", elapsed.as_secs_f64())
}

/// Prints success message.
pub fn print_success(msg: &str) {
    eprintln!("\x1b[32m✓\x1b[0m {}", msg);
}

/// Prints error message.
pub fn print_error(msg: &str) {
    eprintln!("\x1b[31m✗\x1b[0m {}", msg);
}

/// Prints info message.
pub fn print_info(msg: &str) {
    eprintln!("\x1b[34mℹ\x1b[0m {}", msg);
}

/// Prints warning message.
pub fn print_warning(msg: &str) {
    eprintln!("\x1b[33m⚠\x1b[0m {}", msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_structured_output_flags() {
        assert!(!structured_output(&parse(&["kvsweep", "delete", "a*"])));
        assert!(structured_output(&parse(&["kvsweep", "delete", "a*", "--json"])));
        assert!(structured_output(&parse(&["kvsweep", "-o", "report.yaml", "delete", "a*"])));
    }

    #[test]
    fn test_ad_hoc_profile() {
        let cli = parse(&["kvsweep", "--host", "10.0.0.5", "--insecure", "--db", "3", "ping"]);
        let profile = get_profile(&cli).unwrap();
        assert_eq!(profile.host, "10.0.0.5");
        assert_eq!(profile.db, 3);
        assert!(profile.tls);
        assert!(!profile.tls_verify);
    }

    #[test]
    fn test_connection_flags_need_host() {
        let cli = parse(&["kvsweep", "--db", "3", "ping"]);
        assert!(get_profile(&cli).is_err());
    }
}

//! sashimi-link: URL handler and account commands for Sashimi.
//!
//! Registered as the handler for `sashimi://` links. The Slack sign-in flow
//! redirects to `sashimi://auth?token=...`, the OS launches
//! `sashimi-link open-url <URL>`, and the URL is passed on to the running
//! daemon, which owns the Slack client.
//!
//! ## Subcommands
//!
//! - `open-url`: Deliver a sign-in redirect URL
//! - `authorise`: Open the Slack authorisation page in the browser
//! - `sign-out`: Forget the stored token
//! - `health`: Report daemon status

mod daemon_client;
mod logging;

use clap::{Parser, Subcommand};
use daemon_client::ClientError;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "sashimi-link")]
#[command(about = "Sashimi sign-in and account commands")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deliver a sashimi:// redirect URL to the daemon
    OpenUrl {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Open the Slack authorisation page
    Authorise {
        /// OAuth scope to request (defaults to the configured scope)
        #[arg(long)]
        scope: Option<String>,
    },

    /// Remove the stored Slack token
    SignOut,

    /// Print daemon health
    Health,
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::OpenUrl { url } => daemon_client::ingest_redirect(&url).map(|data| sign_in_message(&data)),
        Commands::Authorise { scope } => daemon_client::authorise(scope.as_deref())
            .map(|_| "Continue signing in to Slack in your browser.".to_string()),
        Commands::SignOut => daemon_client::sign_out().map(|data| sign_out_message(&data)),
        Commands::Health => daemon_client::health().map(|data| health_message(&data)),
    };

    match result {
        Ok(message) => println!("{}", message),
        Err(err) => {
            report_error(&err);
            std::process::exit(1);
        }
    }
}

fn report_error(err: &ClientError) {
    tracing::error!(error = %err, code = ?err.code(), "sashimi-link command failed");
    eprintln!("{}", err);
}

/// The session-only warning is the one users need to act on, so it wins
/// over a route mismatch note.
fn sign_in_message(data: &Value) -> String {
    let warnings: Vec<&str> = data
        .get("warnings")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let stored = data.get("stored").and_then(Value::as_bool).unwrap_or(false);

    for warning in &warnings {
        tracing::warn!(warning = %warning, "Sign-in completed with warning");
    }

    if !stored {
        if let Some(last) = warnings.last() {
            return (*last).to_string();
        }
    }
    "Signed in to Slack.".to_string()
}

fn sign_out_message(data: &Value) -> String {
    match data.get("vault_error").and_then(Value::as_str) {
        Some(err) => format!("Signed out. The saved token could not be removed: {}", err),
        None => "Signed out of Slack.".to_string(),
    }
}

fn health_message(data: &Value) -> String {
    let signed_in = data.get("has_token").and_then(Value::as_bool).unwrap_or(false);
    let watching = data.get("watching").and_then(Value::as_bool).unwrap_or(false);
    let watched = data
        .get("watched_file")
        .and_then(Value::as_str)
        .unwrap_or("none");
    format!(
        "daemon ok (pid {}), signed in: {}, watching: {} ({})",
        data.get("pid").and_then(Value::as_u64).unwrap_or_default(),
        if signed_in { "yes" } else { "no" },
        if watching { "yes" } else { "no" },
        watched
    )
}

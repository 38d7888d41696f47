//! Interactive Dengon chat client.
//!
//! Reads the stored session (token and current user), connects to the
//! broker over STOMP/WebSocket when a token is present, and sends commands
//! typed at the prompt. Lost connections are retried every 5 seconds until
//! the user quits.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin dengon-client -- --session ~/.dengon/session.json
//! DENGON_AUTH_TOKEN=... DENGON_USER_ID=7 cargo run --bin dengon-client
//! ```

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use dengon_client::{
    config::{DEFAULT_ENDPOINT, RECONNECT_INTERVAL_SECS},
    credential::{CurrentUser, StoredSession},
    runner::{RunOptions, run_client},
    types::UserId,
};
use dengon_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "dengon-client")]
#[command(about = "Realtime chat client over STOMP/WebSocket", long_about = None)]
struct Args {
    /// WebSocket broker endpoint
    #[arg(short = 'u', long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// JSON session file with `authToken` and `currentUser`
    #[arg(short = 's', long)]
    session: Option<PathBuf>,

    /// Bearer token (overrides the session file and environment)
    #[arg(short = 't', long)]
    token: Option<String>,

    /// Current user id (overrides the session file and environment)
    #[arg(short = 'i', long)]
    user_id: Option<i64>,

    /// Seconds between reconnection attempts
    #[arg(long, default_value_t = RECONNECT_INTERVAL_SECS)]
    retry_secs: u64,
}

fn resolve_session(args: &Args) -> Result<StoredSession, Box<dyn std::error::Error>> {
    let from_args = StoredSession {
        auth_token: args.token.clone(),
        current_user: args.user_id.map(|id| CurrentUser {
            id: UserId::new(id),
            username: None,
            full_name: None,
        }),
    };
    let from_file = match &args.session {
        Some(path) => StoredSession::load(path)?,
        None => StoredSession::default(),
    };
    Ok(from_args.or(StoredSession::from_env()?).or(from_file))
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    let session = match resolve_session(&args) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("Failed to load session: {}", e);
            std::process::exit(1);
        }
    };

    let options = RunOptions {
        endpoint: args.endpoint,
        session,
        retry_delay: Duration::from_secs(args.retry_secs),
    };

    if let Err(e) = run_client(options).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}

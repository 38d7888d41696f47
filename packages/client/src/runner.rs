//! Interactive client execution: load the session, connect, read commands.

use std::{sync::Arc, time::Duration};

use dengon_shared::time::{SystemClock, format_clock_time};
use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::mpsc;

use crate::{
    client::MessagingClient,
    command::{HELP, UserCommand, parse_command},
    config::ClientConfig,
    credential::{CurrentUser, StoredSession},
    error::CredentialError,
    formatter::MessageFormatter,
    transport::WebSocketConnector,
    types::UserId,
    ui::{ConsoleHandler, prompt_for},
};

/// Options of the interactive client
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub endpoint: String,
    pub session: StoredSession,
    pub retry_delay: Duration,
}

/// What the client does right after start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Startup {
    Connect,
    StayOffline,
}

/// Build the client configuration from the stored session and decide
/// whether to go online. Only a session with a token connects.
fn prepare(options: &RunOptions) -> Result<(CurrentUser, ClientConfig, Startup), CredentialError> {
    let user = options
        .session
        .current_user()
        .cloned()
        .ok_or(CredentialError::MissingUser)?;

    let config =
        ClientConfig::new(options.endpoint.clone(), user.id).with_retry_delay(options.retry_delay);
    let (config, startup) = match options.session.auth_token() {
        Some(token) => (config.with_auth_token(token), Startup::Connect),
        None => (config, Startup::StayOffline),
    };
    Ok((user, config, startup))
}

/// Run the interactive client until the user quits.
///
/// Connects on start when the session holds a token, and always
/// disconnects before returning.
pub async fn run_client(options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let (user, config, startup) = prepare(&options)?;
    let user_id = user.id;

    let client = MessagingClient::new(
        config,
        Arc::new(WebSocketConnector),
        Arc::new(ConsoleHandler::new(user_id)),
    );

    match startup {
        Startup::Connect => client.connect(),
        Startup::StayOffline => {
            tracing::warn!("No auth token in the stored session, staying offline")
        }
    }

    println!(
        "\nSigned in as {} (user {}). Type /help for commands. Press Ctrl+C to exit.\n",
        user.username.as_deref().unwrap_or("unknown"),
        user_id
    );

    let mut input_rx = spawn_readline(prompt_for(user_id));
    while let Some(line) = input_rx.recv().await {
        match parse_command(&line) {
            Ok(UserCommand::Quit) => break,
            Ok(command) => execute(&client, user_id, command).await,
            Err(e) => println!("{}", e),
        }
    }

    client.disconnect();
    client.dispose().await;
    tracing::info!("Client session ended");
    Ok(())
}

async fn execute(client: &MessagingClient, me: UserId, command: UserCommand) {
    match command {
        UserCommand::DirectMessage {
            receiver_id,
            kind,
            content,
        } => {
            client.send_message(me, receiver_id, content, kind);
            print_sent_confirmation();
        }
        UserCommand::GroupMessage {
            group_id,
            kind,
            content,
        } => {
            client.send_group_message(group_id, me, content, kind);
            print_sent_confirmation();
        }
        UserCommand::Typing {
            receiver_id,
            is_typing,
        } => client.send_typing(me, receiver_id, is_typing),
        UserCommand::RefreshGroups(group_ids) => client.refresh_group_subscriptions(group_ids),
        UserCommand::Status => {
            let groups = client.group_subscriptions().await.unwrap_or_default();
            print!("{}", MessageFormatter::format_status(client.state(), &groups));
        }
        UserCommand::Help => println!("{}", HELP),
        UserCommand::Quit => {}
    }
}

fn print_sent_confirmation() {
    print!(
        "{}",
        MessageFormatter::format_sent_confirmation(&format_clock_time(&SystemClock))
    );
}

/// Read lines on a blocking thread, since rustyline is synchronous.
/// The channel closes on Ctrl+C, Ctrl+D or a readline error.
fn spawn_readline(prompt: String) -> mpsc::UnboundedReceiver<String> {
    let (input_tx, input_rx) = mpsc::unbounded_channel::<String>();

    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                tracing::error!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line).ok();
                    if input_tx.send(line.to_string()).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    input_rx
}

#![deny(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use ssh_shell_bot::chat::stdio::{self, StdioSettings};
use ssh_shell_bot::chat::{Dispatcher, Reply, ShellBot};
use ssh_shell_bot::shell::{ConnectSettings, RusshTransport, SessionConfig, SessionRegistry};

/// How long to wait for the last replies to be printed on exit
const REPLY_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Logs go to stderr; stdout carries replies only
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().expect("valid directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    let connect_settings = ConnectSettings::from_env();
    let session_config = SessionConfig::from_env();
    let stdio_settings = StdioSettings::from_env();
    info!(
        "Connect timeout {:?}, command timeout {:?}, {} retries",
        connect_settings.connect_timeout,
        session_config.command_timeout,
        connect_settings.max_retries
    );

    let transport = Arc::new(RusshTransport::new(connect_settings));
    let registry = Arc::new(SessionRegistry::new(transport, session_config));
    let bot = Arc::new(ShellBot::new(registry.clone()));

    let (reply_tx, reply_rx) = mpsc::unbounded_channel::<Reply>();
    let printer = tokio::spawn(print_replies(reply_rx, stdio_settings.format));
    let dispatcher = Dispatcher::new(bot, reply_tx);

    info!(
        "SSH shell bot ready, reading messages from stdin (default user '{}')",
        stdio_settings.default_user
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let interrupted = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break true;
            }

            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(message) = stdio::parse_line(&line, &stdio_settings.default_user) {
                        dispatcher.dispatch(&message.user_id, message.text);
                    }
                }
                Ok(None) => {
                    info!("End of input, shutting down");
                    break false;
                }
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break false;
                }
            }
        }
    };

    // On Ctrl-C pending polls are cut short; on end of input queued work
    // finishes first
    if interrupted {
        registry.shutdown().await;
        dispatcher.close().await;
    } else {
        dispatcher.close().await;
        registry.shutdown().await;
    }
    drop(dispatcher);

    if tokio::time::timeout(REPLY_FLUSH_TIMEOUT, printer).await.is_err() {
        warn!("Timed out flushing replies");
    }

    Ok(())
}

async fn print_replies(mut replies: mpsc::UnboundedReceiver<Reply>, format: stdio::OutputFormat) {
    let mut stdout = tokio::io::stdout();
    while let Some(reply) = replies.recv().await {
        let line = format!("{}\n", stdio::render(&reply, format));
        if let Err(e) = stdout.write_all(line.as_bytes()).await {
            error!("Failed to write reply: {}", e);
            break;
        }
        let _ = stdout.flush().await;
    }
}

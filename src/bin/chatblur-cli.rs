//! ChatBlur CLI client (test harness).
//!
//! Non-interactive CLI for exercising the SDK: signs in, connects, prints
//! every friend and message event it receives, and can optionally open a
//! conversation and send one message.

use anyhow::Result;
use chatblur_sdk_core::chat::error::ChatError;
use chatblur_sdk_core::chat::friend::{FriendListener, FriendSections};
use chatblur_sdk_core::chat::message::{ChatListener, ChatMessage};
use chatblur_sdk_core::{ChatClient, ChatUser, ClientConfig};
use clap::Parser;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};
use uuid::Uuid;

/// ChatBlur CLI client
#[derive(Parser, Debug)]
#[command(name = "chatblur-cli")]
#[command(about = "ChatBlur CLI client - exercises sync against a live backend", long_about = None)]
struct Args {
    /// Backend project base URL
    #[arg(long, default_value = "http://localhost:54321")]
    base_url: String,

    /// Project API key
    #[arg(long, env = "CHATBLUR_API_KEY")]
    api_key: String,

    /// Account email
    #[arg(short, long)]
    email: String,

    /// Account password
    #[arg(short, long, env = "CHATBLUR_PASSWORD")]
    password: String,

    /// Peer user id: open this conversation after connecting
    #[arg(long)]
    peer: Option<Uuid>,

    /// Text to send to the peer once the conversation is open
    #[arg(long)]
    send: Option<String>,

    /// Add a friend by email before listening
    #[arg(long)]
    add_friend: Option<String>,

    /// Run duration in seconds, 0 keeps running
    #[arg(short, long, default_value = "0")]
    duration: u64,

    /// Log filter
    #[arg(long, default_value = "info,chatblur_sdk_core=debug")]
    log_level: String,
}

/// Logger writing to stdout and to debug.log.
fn init_logger(log_level: &str) {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .expect("cannot open debug.log");

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_target(false)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

fn setup_listeners(client: &mut ChatClient) {
    struct CliFriendListener;
    #[async_trait::async_trait]
    impl FriendListener for CliFriendListener {
        async fn on_friends_changed(&self, sections: FriendSections) {
            info!("[CLI/Friends] me: {}", sections.me.username);
            for friend in &sections.friends {
                info!("[CLI/Friends]   - {} ({})", friend.username, friend.id);
            }
        }

        async fn on_friend_added(&self, friend: ChatUser) {
            info!("[CLI/Friends] added {} ({})", friend.username, friend.id);
        }

        async fn on_error(&self, e: ChatError) {
            if matches!(e, ChatError::NotFound(_)) {
                error!("[CLI/Friends] no such user: {e}");
            } else {
                error!("[CLI/Friends] error: {e}");
            }
        }
    }
    client.set_friend_listener(Arc::new(CliFriendListener));

    struct CliChatListener;
    #[async_trait::async_trait]
    impl ChatListener for CliChatListener {
        async fn on_messages_changed(&self, messages: Vec<ChatMessage>) {
            info!("[CLI/Chat] thread now has {} messages", messages.len());
            if let Some(last) = messages.last() {
                info!("[CLI/Chat]   last: {} -> {}", last.sender, last.message);
            }
        }

        async fn on_message_sent(&self, message: ChatMessage) {
            info!("[CLI/Chat] sent {}", message.id);
        }

        async fn on_error(&self, e: ChatError) {
            error!("[CLI/Chat] error: {e}");
        }
    }
    client.set_chat_listener(Arc::new(CliChatListener));
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level);

    info!("[CLI] ChatBlur CLI client");

    let config = ClientConfig::new(args.base_url.clone(), args.api_key.clone());
    let mut client = ChatClient::new(config)?;
    setup_listeners(&mut client);

    info!("[CLI] signing in as {}", args.email);
    let session = client.sign_in(&args.email, &args.password).await?;
    info!("[CLI] signed in, user id {}", session.user.id);

    client.connect().await?;
    info!("[CLI] connected, listening for changes");

    if let Some(email) = &args.add_friend {
        match client.friends()?.add_friend(email).await {
            Ok(friend) => info!("[CLI] friend added: {}", friend.username),
            Err(e) => error!("[CLI] add friend failed: {e}"),
        }
    }

    if let Some(peer) = args.peer {
        let chat = client.open_chat(peer).await?;
        info!(
            "[CLI] conversation with {} open ({} messages)",
            peer,
            chat.messages().await.len()
        );
        if let Some(text) = &args.send {
            chat.send(text).await?;
        }
    }

    if args.duration > 0 {
        info!("[CLI] running for {} seconds", args.duration);
        sleep(Duration::from_secs(args.duration)).await;
    } else {
        info!("[CLI] running until Ctrl+C");
        tokio::signal::ctrl_c().await?;
    }

    client.shutdown().await;
    Ok(())
}

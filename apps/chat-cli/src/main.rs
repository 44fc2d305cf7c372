use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use parley_client::{
    ChatClient, ClientError, ClientNotice, ConnectionStatus, Conversation, ConversationEntry,
    DriverOptions, OnlineUsers, Origin, RestClient, ServerEvent, TypingDebouncer,
    TypingIndicator,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "parley-chat")]
#[command(about = "Chat with one peer over a Parley server")]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:4001")]
    api_url: String,

    #[arg(long)]
    email: String,

    #[arg(long)]
    password: String,

    /// User id of the person to chat with
    #[arg(long)]
    peer: String,

    /// Create the account before signing in
    #[arg(long)]
    register: bool,

    #[arg(long, requires = "register")]
    display_name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr and stay quiet unless asked for, so they do not
    // interleave with the conversation.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut rest = RestClient::new(&cli.api_url);
    let session = if cli.register {
        rest.register(&cli.email, &cli.password, cli.display_name.as_deref())
            .await
            .context("registration failed")?
    } else {
        rest.login(&cli.email, &cli.password)
            .await
            .context("login failed")?
    };
    println!(
        "Signed in as {} ({})",
        session.user.email.green(),
        session.user.id.dimmed()
    );

    let (client, mut events) = ChatClient::connect(rest, DriverOptions::default())
        .await
        .context("failed to start relay connection")?;

    let chat = client
        .open_chat(&cli.peer)
        .await
        .with_context(|| format!("failed to open chat with {}", cli.peer))?;
    let mut conversation = client
        .load_conversation(&chat.id)
        .await
        .context("failed to load history")?;

    println!("Chat {} with {}", chat.id.yellow(), cli.peer.cyan());
    println!("Type a message and press enter. /help lists commands.");
    println!("{}", "-".repeat(60));
    print_history(&client, &conversation);

    let mut online = OnlineUsers::new();
    let mut typing = TypingIndicator::new();
    typing.open(cli.peer.clone());
    let mut debouncer = TypingDebouncer::default();
    let mut status = client.relay().watch_status();
    let mut notices = client.subscribe_notices();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match line.trim() {
                    "/quit" => break,
                    "/help" => print_help(),
                    "/who" => print_online(&online, &cli.peer),
                    "/history" => print_history(&client, &conversation),
                    text => {
                        if let Some(signal) = debouncer.on_input(text) {
                            client.send_typing(&cli.peer, signal);
                        }
                        if let Some(signal) = debouncer.on_send() {
                            client.send_typing(&cli.peer, signal);
                        }
                        send(&client, &mut conversation, &cli.peer, text).await;
                    }
                }
            }
            event = events.recv() => {
                let Some(event) = event else {
                    println!("{}", "relay connection closed".red());
                    break;
                };
                handle_event(&event, &cli.peer, &mut conversation, &mut online, &mut typing);
            }
            notice = notices.recv() => match notice {
                Ok(ClientNotice::AppendFailed { error, .. }) => {
                    println!("{} {}", "message was not saved:".red(), error);
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "missed notices"),
                Err(RecvError::Closed) => {}
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                print_status(current, client.relay().queued().await);
            }
        }
    }

    client.shutdown();
    if let Err(err) = client.rest().clone().logout().await {
        debug!(error = %err, "logout failed");
    }
    println!("Bye.");
    Ok(())
}

async fn send(client: &ChatClient, conversation: &mut Conversation, peer: &str, text: &str) {
    match client.send_message(conversation.chat_id(), peer, text).await {
        Ok(message) => {
            conversation.merge_stored([&message]);
            print_entry(client, &ConversationEntry::stored(&message));
        }
        Err(ClientError::EmptyMessage) => {}
        // Already reported through the notice channel.
        Err(ClientError::Api { .. }) => {}
        Err(err) => println!("{} {}", "send failed:".red(), err),
    }
}

fn handle_event(
    event: &ServerEvent,
    peer: &str,
    conversation: &mut Conversation,
    online: &mut OnlineUsers,
    typing: &mut TypingIndicator,
) {
    match event {
        ServerEvent::Message(delivered) if delivered.sender_id == peer => {
            let entry = ConversationEntry::relayed(delivered);
            if conversation.apply_relayed(delivered) {
                print_peer_entry(peer, &entry);
            }
        }
        ServerEvent::Message(delivered) => {
            println!(
                "{} {}",
                "new message from".dimmed(),
                delivered.sender_id.cyan()
            );
        }
        ServerEvent::TypingStart(_) | ServerEvent::TypingStop(_) => {
            if typing.apply(event) {
                if typing.is_typing() {
                    println!("{}", format!("{peer} is typing...").dimmed());
                } else {
                    debug!(peer, "peer stopped typing");
                }
            }
        }
        ServerEvent::Presence(_) => {
            let was_online = online.is_online(peer);
            online.apply(event);
            match (was_online, online.is_online(peer)) {
                (false, true) => println!("{} {}", peer.cyan(), "is online".green()),
                (true, false) => println!("{} {}", peer.cyan(), "went offline".red()),
                _ => {}
            }
        }
    }
}

fn print_history(client: &ChatClient, conversation: &Conversation) {
    if conversation.is_empty() {
        println!("{}", "(no messages yet)".dimmed());
        return;
    }
    for entry in conversation.entries() {
        print_entry(client, entry);
    }
}

fn print_entry(client: &ChatClient, entry: &ConversationEntry) {
    if entry.sender_id == client.user().id {
        let marker = match entry.origin {
            Origin::Stored => "",
            Origin::Relayed | Origin::Pending => " (unsaved)",
        };
        println!(
            "{} {}: {}{}",
            entry.created_at.format("%H:%M").to_string().dimmed(),
            "you".green(),
            entry.content,
            marker.dimmed()
        );
    } else {
        print_peer_entry(&entry.sender_id, entry);
    }
}

fn print_peer_entry(peer: &str, entry: &ConversationEntry) {
    println!(
        "{} {}: {}",
        entry.created_at.format("%H:%M").to_string().dimmed(),
        peer.cyan(),
        entry.content
    );
}

fn print_online(online: &OnlineUsers, peer: &str) {
    if online.is_empty() {
        println!("{}", "nobody is online".dimmed());
        return;
    }
    println!("Online ({}):", online.len());
    for user in online.users() {
        if user == peer {
            println!("  {}", user.cyan());
        } else {
            println!("  {user}");
        }
    }
}

fn print_status(status: ConnectionStatus, queued: usize) {
    match status {
        ConnectionStatus::Connected => println!("{}", "connected to relay".green()),
        ConnectionStatus::Connecting => println!("{}", "connecting...".yellow()),
        ConnectionStatus::Disconnected if queued > 0 => println!(
            "{} ({queued} message(s) will be sent on reconnect)",
            "disconnected".red()
        ),
        ConnectionStatus::Disconnected => println!("{}", "disconnected, retrying".red()),
    }
}

fn print_help() {
    println!("/who      list online users");
    println!("/history  show the conversation again");
    println!("/quit     leave");
}

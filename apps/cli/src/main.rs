use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chatify_chats::entities::{formatted_size, FileSelection, Message, MessageBody};
use chatify_chats::services::{
    ChatSession, ConversationDirectory, MembershipService, ReactionService, ScriptedCaptureDevice,
    SessionEvent, TracingNotifier,
};
use chatify_config::load as load_config;
use chatify_runtime::{shutdown_signal, telemetry, ClientServices};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Parser)]
#[command(name = "chatify")]
#[command(about = "Chatify conversations from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List conversations with their last message
    List,
    /// Print the history of a conversation
    History { conversation: String },
    /// Follow a conversation; lines typed on stdin are sent
    Watch { conversation: String },
    /// Send a text message
    Send { conversation: String, text: String },
    /// Upload files and send one message per file
    SendFiles {
        conversation: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Search text messages of a conversation
    Search { conversation: String, query: String },
    /// React to a message, replacing an identical reaction
    React { message: String, emoji: String },
    /// Accept a conversation request
    Accept { conversation: String },
    /// Reject a conversation request
    Reject { conversation: String },
    /// Block the other member of a conversation
    Block { conversation: String },
    /// Ask a user for a new conversation
    Request { username: String },
    /// Delete a conversation with all its messages
    Delete { conversation: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing().context("failed to initialise tracing")?;
    let config = load_config().context("failed to load configuration")?;
    let services = ClientServices::initialise(&config).context("failed to initialise client")?;
    let user_id = services.user_id()?.to_string();

    match cli.command {
        Commands::List => list(&services, &user_id).await,
        Commands::History { conversation } => history(&services, &conversation, &user_id).await,
        Commands::Watch { conversation } => watch(&services, &conversation, &user_id).await,
        Commands::Send { conversation, text } => {
            let mut session = open_session(&services, &conversation, &user_id).await?;
            session.composer_mut().set_draft(text);
            let message = session.send_text().await?;
            println!("sent {}", message.id);
            Ok(())
        }
        Commands::SendFiles { conversation, paths } => {
            send_files(&services, &conversation, &user_id, &paths).await
        }
        Commands::Search { conversation, query } => {
            let session = open_session(&services, &conversation, &user_id).await?;
            let results = session.search(&query);
            if results.is_empty() {
                println!("No messages match \"{query}\"");
            }
            for message in results {
                print_message(message, &user_id);
            }
            Ok(())
        }
        Commands::React { message, emoji } => {
            let reactions = ReactionService::new(services.backend.reactions.clone(), user_id);
            let reaction = reactions.react(&message, &emoji).await?;
            println!("reacted {} to {}", reaction.emoji, reaction.message_id);
            Ok(())
        }
        Commands::Accept { conversation } => {
            let memberships = MembershipService::new(services.backend.memberships.clone());
            memberships.accept(&conversation, &user_id).await?;
            println!("accepted {conversation}");
            Ok(())
        }
        Commands::Reject { conversation } => {
            let memberships = MembershipService::new(services.backend.memberships.clone());
            memberships.reject(&conversation, &user_id).await?;
            println!("rejected {conversation}");
            Ok(())
        }
        Commands::Block { conversation } => {
            let memberships = MembershipService::new(services.backend.memberships.clone());
            let blocked = memberships.block_other(&conversation, &user_id).await?;
            println!("blocked {}", blocked.user_id);
            Ok(())
        }
        Commands::Request { username } => {
            let directory = directory(&services, &user_id);
            let profile = directory.find_by_username(&username).await?;
            let conversation = directory.request(&profile.id).await?;
            println!("requested conversation {conversation} with {}", profile.label());
            Ok(())
        }
        Commands::Delete { conversation } => {
            directory(&services, &user_id).delete(&conversation).await?;
            println!("deleted {conversation}");
            Ok(())
        }
    }
}

fn directory(services: &ClientServices, user_id: &str) -> ConversationDirectory {
    ConversationDirectory::new(services.backend.conversations.clone(), user_id)
}

async fn open_session(
    services: &ClientServices,
    conversation: &str,
    user_id: &str,
) -> anyhow::Result<ChatSession> {
    ChatSession::open(
        &services.backend,
        &services.config,
        conversation,
        user_id,
        Arc::new(ScriptedCaptureDevice::missing()),
        Arc::new(TracingNotifier),
    )
    .await
    .with_context(|| format!("failed to open conversation {conversation}"))
}

async fn list(services: &ClientServices, user_id: &str) -> anyhow::Result<()> {
    let listings = directory(services, user_id).list().await?;
    if listings.is_empty() {
        println!("No conversations yet");
        return Ok(());
    }

    println!("{:<28} {:<24} {:<10} LAST MESSAGE", "CONVERSATION", "WITH", "STATUS");
    for listing in listings {
        let status = if listing.incoming_request {
            "request".to_string()
        } else {
            listing.status.to_string()
        };
        println!(
            "{:<28} {:<24} {:<10} {}",
            listing.conversation_id,
            listing.other.label(),
            status,
            listing.last_message.unwrap_or_default()
        );
    }
    Ok(())
}

async fn history(services: &ClientServices, conversation: &str, user_id: &str) -> anyhow::Result<()> {
    MembershipService::new(services.backend.memberships.clone())
        .ensure_accepted(conversation, user_id)
        .await?;
    let messages = services.backend.messages.history(conversation).await?;
    for message in &messages {
        print_message(message, user_id);
    }
    Ok(())
}

async fn watch(services: &ClientServices, conversation: &str, user_id: &str) -> anyhow::Result<()> {
    let mut session = open_session(services, conversation, user_id).await?;
    for message in session.messages() {
        print_message(message, user_id);
    }
    info!(conversation, "watching; type a line to send it, /quit to leave");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = session.next_event() => match event {
                Some(SessionEvent::Appended { update, .. }) => {
                    if !update.message.is_from(user_id) {
                        print_message(&update.message, user_id);
                    }
                }
                Some(SessionEvent::Notice { id }) => {
                    if let Some(notice) = session.notices().iter().find(|n| n.id == id) {
                        eprintln!("! {}", notice.message);
                    }
                }
                None => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim() == "/quit" {
                    break;
                }
                if line.trim().is_empty() {
                    continue;
                }
                session.composer_mut().set_draft(line);
                match session.send_text().await {
                    Ok(message) => print_message(&message, user_id),
                    Err(error) => eprintln!("! {error}"),
                }
            }
        }
    }

    session.close();
    Ok(())
}

async fn send_files(
    services: &ClientServices,
    conversation: &str,
    user_id: &str,
    paths: &[PathBuf],
) -> anyhow::Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", path.display()))?;
        files.push(FileSelection::new(name, content_type_for(path), bytes));
    }

    let mut session = open_session(services, conversation, user_id).await?;
    let staged = session.stage_files(files).await?;
    for failure in &staged.failures {
        eprintln!("! upload of {} failed: {}", failure.file_name, failure.error);
    }
    if staged.staged.is_empty() {
        bail!("no file could be uploaded");
    }

    let report = session.send_staged().await?;
    for message in &report.sent {
        print_message(message, user_id);
    }
    for failure in &report.failures {
        eprintln!("! sending {} failed: {}", failure.file_name, failure.error);
    }
    if !report.is_complete() {
        if let Err(error) = session.cancel().await {
            eprintln!("! could not discard unsent files: {error}");
        }
        bail!("{} of {} files were not sent", report.failures.len(), paths.len());
    }
    Ok(())
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "audio/webm",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "csv" => "text/csv",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "txt" | "md" => "text/plain",
        _ => "application/octet-stream",
    }
}

fn print_message(message: &Message, user_id: &str) {
    let who = if message.is_from(user_id) { "you" } else { message.sender_id.as_str() };
    let when = message.created_at.format("%Y-%m-%d %H:%M");
    match &message.body {
        MessageBody::Text { content } => println!("[{when}] {who}: {content}"),
        MessageBody::Audio { url } => println!("[{when}] {who}: voice message {url}"),
        MessageBody::File(file) => println!(
            "[{when}] {who}: {} ({}) {}",
            file.name,
            formatted_size(file.size_bytes),
            file.url
        ),
    }
    println!("    id {}", message.id);
}

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notewise::config::{Config, EnvConfigSource};
use notewise::db::{
    index_notes, load_notes_file, load_styles_file, InMemoryNoteStore, InMemoryStyleRegistry,
};
use notewise::embeddings::EmbeddingProvider;
use notewise::error::ChatError;
use notewise::llm::LlmProvider;
use notewise::models::{ChatMessage, ExecutionResult, TurnRequest};
use notewise::services::ChatService;
use notewise::sessions::InMemorySessionStore;

#[derive(Parser)]
#[command(name = "notewise")]
#[command(about = "Chat with your notes from the terminal")]
struct Args {
    /// JSON array of notes to index before the first turn
    #[arg(long)]
    notes: Option<PathBuf>,

    /// JSON array of styles; the built-in styles are used when omitted
    #[arg(long)]
    styles: Option<PathBuf>,

    #[arg(long, default_value = "local-user")]
    user: String,

    /// Conversation id; a fresh one is generated when omitted
    #[arg(long)]
    session: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notewise=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();

    tracing::info!("Loading embedding model: {}...", config.embeddings.model);
    let embeddings = Arc::new(EmbeddingProvider::new(&config.embeddings)?);

    let notes = Arc::new(InMemoryNoteStore::new());
    if let Some(path) = &args.notes {
        let records = load_notes_file(path).await?;
        let indexed = index_notes(&notes, embeddings.as_ref(), records).await?;
        tracing::info!("Indexed {} notes from {}", indexed, path.display());
    }

    let styles = match &args.styles {
        Some(path) => InMemoryStyleRegistry::new(load_styles_file(path).await?),
        None => InMemoryStyleRegistry::with_defaults(),
    };
    tracing::info!("Styles available: {}", styles.keys().join(", "));

    if let Some(llm_config) = &config.llm {
        tracing::info!("Initializing LLM provider: {}...", llm_config.model);
    }
    let llm = LlmProvider::new(config.llm.as_ref());
    if !llm.is_available() {
        tracing::warn!("LLM unavailable - every turn that needs generation will fail. Set LLM_MODEL.");
    }

    let chat = ChatService::new(
        notes,
        Arc::new(styles),
        Arc::new(InMemorySessionStore::new()),
        embeddings,
        Arc::new(llm),
        Arc::new(EnvConfigSource),
        &config,
    );

    let session_id = args.session.unwrap_or_else(|| nanoid::nanoid!());
    tracing::info!(session_id = %session_id, user_id = %args.user, "Conversation started");

    let mut transcript: Vec<ChatMessage> = Vec::new();
    let mut sticky_mode: Option<String> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(line) = line else { break };

        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text.eq_ignore_ascii_case("/quit") || text.eq_ignore_ascii_case("/exit") {
            break;
        }

        let mut request =
            TurnRequest::new(&args.user, &session_id, text).with_history(transcript.clone());
        if let Some(mode) = &sticky_mode {
            request = request.with_session_mode(mode.clone());
        }

        // Ctrl-C during a turn cancels that turn only
        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };
        let outcome = chat.execute(request, &cancel).await;
        watcher.abort();

        match outcome {
            Ok(result) => {
                transcript.push(ChatMessage::user(text));
                transcript.push(ChatMessage::assistant(&result.reply));
                sticky_mode = result.sticky_mode.clone();

                stdout.write_all(render(&result).as_bytes()).await?;
                stdout.flush().await?;
            }
            Err(ChatError::Cancelled) => tracing::warn!("Turn cancelled"),
            Err(e) => tracing::error!("Turn failed: {}", e),
        }
    }

    chat.end_session(&session_id).await;
    tracing::info!("Goodbye");

    Ok(())
}

fn render(result: &ExecutionResult) -> String {
    let mut lines = vec![format!("[{}] {}", result.mode, result.reply)];

    lines.extend(
        result
            .citations
            .iter()
            .enumerate()
            .map(|(i, c)| format!("  [{}] {}", i + 1, c.title)),
    );
    lines.extend(
        result
            .resolved_references
            .iter()
            .filter(|r| !r.found)
            .map(|r| {
                format!(
                    "  ! {}: {}",
                    r.requested,
                    r.error_reason.as_deref().unwrap_or("not found")
                )
            }),
    );

    lines.join("\n") + "\n\n"
}

//! CLI entry points for the `rag` binary.
//!
//! Each `run_*` function opens the service from configuration, performs
//! one command, and prints human-readable output to stdout. Diagnostics go
//! to stderr through `tracing`.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;
use walkdir::WalkDir;

use rag_assistant_core::greeter::greet;
use rag_assistant_core::models::format_file_size;
use rag_assistant_core::session::ChatSession;
use rag_assistant_core::validate::extension_of;

use crate::config::Config;
use crate::migrate;
use crate::rag::RagService;

const EXCERPT_CHARS: usize = 200;

fn excerpt(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() > EXCERPT_CHARS {
        let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
        format!("{}...", cut)
    } else {
        flat.to_string()
    }
}

/// `rag init`
pub async fn run_init(config: &Config) -> Result<()> {
    match config.store.backend.as_str() {
        "sqlite" => {
            migrate::run_migrations(config).await?;
            println!("Database initialized at {}", config.store.path.display());
        }
        "supabase" => {
            println!("Apply sql/supabase_schema.sql in the Supabase SQL editor to create the schema.");
        }
        _ => println!("The memory store needs no initialization."),
    }
    Ok(())
}

/// `rag status`
pub async fn run_status(config: &Config) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let status = service.status().await?;

    println!("store:      {}", status.store);
    println!("documents:  {}", status.documents);
    println!(
        "embedding:  {} ({}, {} dims)",
        status.embedding_provider, status.embedding_model, status.embedding_dims
    );
    println!("llm:        {} ({})", status.llm_provider, status.llm_model);
    if !status.missing_keys.is_empty() {
        println!();
        println!("Missing environment variables (falling back to mock behaviour):");
        for key in &status.missing_keys {
            println!("  {}", key);
        }
    }
    Ok(())
}

/// Files named on the command line, plus every file with an allowed
/// extension under named directories.
fn collect_upload_paths(paths: &[PathBuf], allowed: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        let mut found: Vec<PathBuf> = WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                let name = p.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                extension_of(name)
                    .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)))
                    .unwrap_or(false)
            })
            .collect();
        found.sort();
        files.extend(found);
    }
    files
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `rag upload <paths..>`
pub async fn run_upload(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let limits = config.upload.limits();
    let files = collect_upload_paths(paths, &limits.allowed_extensions);

    if files.is_empty() {
        bail!("no uploadable files found");
    }

    let mut failed = 0usize;
    for path in &files {
        let filename = display_name(path);
        let result = match std::fs::read(path) {
            Ok(bytes) => service
                .upload_file(&filename, &bytes)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(format!("failed to read {}: {}", path.display(), e)),
        };
        match result {
            Ok(outcome) => println!(
                "uploaded {} ({}, {} chunks) id={}",
                outcome.filename,
                format_file_size(outcome.size),
                outcome.chunks,
                outcome.document_id
            ),
            Err(message) => {
                failed += 1;
                println!("failed   {}: {}", filename, message);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} uploads failed", failed, files.len());
    }
    Ok(())
}

/// `rag documents`
pub async fn run_documents(config: &Config) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let documents = service.list_documents().await?;

    if documents.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    for doc in &documents {
        println!(
            "{}  {}  {}  {}",
            doc.id,
            doc.filename,
            format_file_size(doc.size),
            doc.uploaded_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

/// `rag get <id>`
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let Some(doc) = service.get_document(id).await? else {
        bail!("document not found: {}", id);
    };

    println!("--- Document ---");
    println!("id:          {}", doc.id);
    println!("filename:    {}", doc.filename);
    println!("file_type:   {}", doc.file_type);
    println!("size:        {}", format_file_size(doc.size));
    println!("uploaded_at: {}", doc.uploaded_at.to_rfc3339());
    println!();

    println!("--- Content ---");
    println!("{}", doc.content);
    println!();

    println!("--- Chunks ({}) ---", doc.chunks.len());
    for chunk in &doc.chunks {
        println!("[{}] {}", chunk.chunk_index, excerpt(&chunk.content));
    }
    Ok(())
}

/// `rag delete <id>`
pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let service = RagService::from_config(config).await?;
    if !service.delete_document(id).await? {
        bail!("document not found: {}", id);
    }
    println!("Deleted {}", id);
    Ok(())
}

/// `rag search <query>`
pub async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    threshold: Option<f32>,
) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }
    let service = RagService::from_config(config).await?;
    let limit = limit.unwrap_or(config.retrieval.limit);
    let threshold = threshold.unwrap_or(config.retrieval.threshold);

    let results = service.search_similar(query.trim(), limit, threshold).await?;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} (chunk {})",
            i + 1,
            result.similarity,
            result.document.filename,
            result.chunk.chunk_index
        );
        println!("    excerpt: \"{}\"", excerpt(&result.chunk.content));
        println!("    id: {}", result.document.id);
        println!();
    }
    Ok(())
}

/// `rag ask <question>`
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    if question.trim().is_empty() {
        bail!("question must not be empty");
    }
    let service = RagService::from_config(config).await?;
    let answer = service.answer(question.trim()).await?;

    println!("{}", answer.content);
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &answer.sources {
            println!(
                "  - {} (chunk {})",
                source.filename().unwrap_or("Document"),
                source.chunk_index
            );
        }
    }
    Ok(())
}

/// `rag chat`: line-based conversation on stdin until `/quit` or EOF.
pub async fn run_chat(config: &Config) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let mut session = ChatSession::new();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if let Some(greeting) = session.last() {
        println!("assistant> {}", greeting.content);
    }

    loop {
        stdout.write_all(b"you> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line == "/quit" || line == "/exit" {
            break;
        }
        if line.is_empty() {
            continue;
        }

        // a failed turn already left the apology in the session
        if let Err(e) = service.chat(&mut session, line).await {
            warn!(error = %e, "Chat turn failed");
        }
        if let Some(reply) = session.last() {
            println!("assistant> {}", reply.content);
            if let Some(sources) = &reply.sources {
                let names: Vec<&str> = sources
                    .iter()
                    .map(|s| s.filename().unwrap_or("Document"))
                    .collect();
                println!("           sources: {}", names.join(", "));
            }
        }
    }
    Ok(())
}

/// `rag greet <text>`
pub fn run_greet(text: &str) -> Result<()> {
    match greet(text) {
        Some(reply) => {
            println!("{}", reply);
            Ok(())
        }
        None => bail!("message must not be empty"),
    }
}

/// `rag history`
pub async fn run_history(config: &Config, limit: Option<usize>) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let messages = service
        .history(limit.unwrap_or(config.chat.history_limit))
        .await?;

    if messages.is_empty() {
        println!("No chat history.");
        return Ok(());
    }

    for message in &messages {
        let who = if message.is_user { "you" } else { "assistant" };
        println!(
            "[{}] {}: {}",
            message.timestamp.format("%Y-%m-%d %H:%M:%S"),
            who,
            message.content
        );
    }
    Ok(())
}

use console::style;
use dialoguer::Input;
use std::path::Path;
use tracing::info;

use crate::chat::{Answer, ChatSession};
use crate::chunking;
use crate::config::Config;
use crate::ingest;
use crate::metadata::MetadataResolver;
use crate::ollama::OllamaClient;
use crate::store::VectorStore;
use crate::{QaError, Result};

/// Build the vector index from a directory of scraped archive pages.
#[inline]
pub async fn ingest(config: &Config, source_dir: &Path, export_csv: Option<&Path>) -> Result<()> {
    let summary = ingest::run(config, source_dir, export_csv).await?;

    println!();
    println!("{}", "=".repeat(60));
    println!("INGESTION SUMMARY");
    println!("{}", "=".repeat(60));
    println!("Total documents loaded: {}", summary.documents);
    println!("Total chunks created: {}", summary.chunks);
    println!("Average chunk size: {} characters", summary.average_chunk_chars);
    println!();
    println!("Content breakdown:");
    for (content_type, count) in &summary.documents_by_type {
        println!("  {}: {} documents", content_type, count);
    }
    println!("{}", "=".repeat(60));
    println!();
    println!("✅ Index written to {}", config.vector_store_path().display());

    Ok(())
}

/// Dump extracted chunks to CSV without embedding anything. Useful for
/// inspecting what the pipeline would index.
#[inline]
pub fn export(config: &Config, source_dir: &Path, output: &Path) -> Result<()> {
    let pages = ingest::discover_pages(source_dir)?;
    let resolver = MetadataResolver::new(&config.archive.base_url);
    let documents = ingest::load_documents(&pages, &resolver);

    if documents.is_empty() {
        return Err(QaError::EmptyCorpus(source_dir.display().to_string()));
    }

    let chunks = chunking::split_documents(&documents, &config.chunking);
    ingest::export_csv(&chunks, output)?;

    println!(
        "Exported {} chunks from {} documents to {}",
        chunks.len(),
        documents.len(),
        output.display()
    );
    Ok(())
}

/// Answer a single question with no prior history.
#[inline]
pub async fn ask(config: &Config, question: &str) -> Result<()> {
    let mut session = open_session(config).await?;
    let answer = session.ask(question).await?;
    print_answer(&answer);
    Ok(())
}

/// Interactive multi-turn chat over the index.
#[inline]
pub async fn chat(config: &Config) -> Result<()> {
    let mut session = open_session(config).await?;

    println!("Satoshi ₿ot — ask about the archive (empty line or 'exit' to quit)");
    loop {
        let question: String = Input::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()
            .map_err(|e| QaError::Config(format!("Failed to read input: {}", e)))?;

        let question = question.trim().to_string();
        if question.is_empty() || question == "exit" || question == "quit" {
            break;
        }

        match session.ask(&question).await {
            Ok(answer) => print_answer(&answer),
            Err(e) => {
                // Service failures are not answers; the turn is dropped and
                // the session stays usable. A model reply saying the context
                // is insufficient arrives as a normal answer instead.
                println!("{} {}", style("Could not answer:").red().bold(), e);
            }
        }
        println!();
    }

    info!("Chat session ended with {} turns", session.history().len());
    Ok(())
}

/// Show connectivity and index status.
#[inline]
pub async fn status(config: &Config) -> Result<()> {
    println!("Satoshi QA status");
    println!("{}", "=".repeat(40));

    println!("Ollama:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "  ✅ Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("  Embedding model: {}", config.ollama.embedding_model);
                println!("  Chat model: {}", config.ollama.chat_model);
            }
            Err(e) => println!("  ⚠️  Reachable but unhealthy: {}", e),
        },
        Err(e) => println!("  ❌ Failed to connect: {}", e),
    }

    println!("Index:");
    match VectorStore::open(&config.vector_store_path()).await {
        Ok(store) => {
            if store.is_initialized().await? {
                let count = store.count().await?;
                println!(
                    "  ✅ {} chunks at {}",
                    count,
                    config.vector_store_path().display()
                );
            } else {
                println!("  ❌ No index yet — run 'satoshi-qa ingest <dir>'");
            }
        }
        Err(e) => println!("  ❌ Failed to open: {}", e),
    }

    println!("Config file: {}", config.config_file_path().display());
    Ok(())
}

/// Print the active configuration, or write a starter config file.
#[inline]
pub fn show_config(config: &Config, show: bool) -> Result<()> {
    if show {
        let rendered = toml::to_string_pretty(config)
            .map_err(|e| QaError::Config(format!("Failed to render config: {}", e)))?;
        println!("# {}", config.config_file_path().display());
        print!("{}", rendered);
    } else {
        config.save()?;
        println!("Wrote config to {}", config.config_file_path().display());
    }
    Ok(())
}

async fn open_session(config: &Config) -> Result<ChatSession> {
    let store = VectorStore::open(&config.vector_store_path()).await?;
    if !store.is_initialized().await? {
        return Err(QaError::Store(
            "No index found — run 'satoshi-qa ingest <dir>' first".to_string(),
        ));
    }
    let ollama = OllamaClient::new(&config.ollama)?;
    Ok(ChatSession::new(store, ollama, &config.retrieval))
}

fn print_answer(answer: &Answer) {
    println!();
    println!("{} {}", style("Answer:").bold(), answer.text);

    let sources = answer.source_list();
    if !sources.is_empty() {
        println!();
        println!("{}", style("Sources:").bold());
        for (i, (name, url)) in sources.iter().enumerate() {
            match url {
                Some(url) => println!("  {}. {} ({})", i + 1, name, url),
                None => println!("  {}. {}", i + 1, name),
            }
        }
    }
}

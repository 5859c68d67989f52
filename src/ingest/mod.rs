//! Offline batch ingestion: corpus files in, persisted vector index out.
//!
//! Documents are independent of one another; the index write happens once,
//! after every chunk has been embedded, so an embedding failure aborts the
//! whole run instead of persisting a truncated index. Per-document extraction
//! failures are logged and the document is dropped; they never reach the
//! query path.


use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunking::{self, Chunk};
use crate::config::Config;
use crate::extractor::{self, ContentFamily};
use crate::metadata::{DocumentMetadata, MetadataResolver};
use crate::ollama::OllamaClient;
use crate::store::{EmbeddingRecord, VectorStore};
use crate::{QaError, Result};

/// Subdirectories of the corpus holding one content family each.
const COLLECTION_DIRS: &[(&str, ContentFamily)] = &[
    ("emails", ContentFamily::Email),
    ("posts", ContentFamily::Post),
    ("quotes", ContentFamily::Quote),
];

/// An unprocessed corpus file, tagged with the family its directory declares.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub family: ContentFamily,
    pub path: PathBuf,
    pub html: String,
}

/// What an ingestion run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionSummary {
    pub documents: usize,
    pub chunks: usize,
    pub documents_by_type: BTreeMap<String, usize>,
    pub average_chunk_chars: usize,
}

/// Run the full ingestion pipeline over `source_dir` and persist the index at
/// the configured store location. Optionally dumps every chunk to CSV first.
#[inline]
pub async fn run(
    config: &Config,
    source_dir: &Path,
    csv_export: Option<&Path>,
) -> Result<IngestionSummary> {
    info!("Starting ingestion from {}", source_dir.display());

    let pages = discover_pages(source_dir)?;
    info!("Found {} HTML files to process", pages.len());

    let resolver = MetadataResolver::new(&config.archive.base_url);
    let documents = load_documents(&pages, &resolver);

    if documents.is_empty() {
        return Err(QaError::EmptyCorpus(source_dir.display().to_string()));
    }
    info!("Loaded {} documents", documents.len());

    let chunks = chunking::split_documents(&documents, &config.chunking);

    if let Some(path) = csv_export {
        export_csv(&chunks, path)?;
    }

    let client = OllamaClient::new(&config.ollama)?;
    let records = embed_chunks(&client, &chunks, config.ollama.batch_size as usize)?;

    let mut store = VectorStore::open(&config.vector_store_path()).await?;
    store.rebuild(records).await?;

    Ok(summarize(&documents, &chunks))
}

/// Enumerate corpus files under the collection subdirectories, in a stable
/// order. Unreadable files are logged and skipped.
#[inline]
pub fn discover_pages(source_dir: &Path) -> Result<Vec<RawPage>> {
    let mut pages = Vec::new();

    for (collection, family) in COLLECTION_DIRS {
        let dir = source_dir.join(collection);
        if !dir.is_dir() {
            debug!("Skipping missing collection directory {}", dir.display());
            continue;
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("html"))
            })
            .collect();
        paths.sort();

        for path in paths {
            match fs::read_to_string(&path) {
                Ok(html) => pages.push(RawPage {
                    family: *family,
                    path,
                    html,
                }),
                Err(e) => warn!("Failed to read {}: {}", path.display(), e),
            }
        }
    }

    Ok(pages)
}

/// Extract and resolve every page. Pages that yield no usable content are
/// dropped here (the extractor has already logged them).
#[inline]
pub fn load_documents(
    pages: &[RawPage],
    resolver: &MetadataResolver,
) -> Vec<(String, DocumentMetadata)> {
    pages
        .iter()
        .filter_map(|page| {
            let source = page.path.display().to_string();
            debug!("Loading: {}", source);
            let doc = extractor::extract(&page.html, page.family, &source)?;
            let metadata = resolver.resolve(&page.path, &doc.text);
            Some((doc.text, metadata))
        })
        .collect()
}

fn embed_chunks(
    client: &OllamaClient,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<Vec<EmbeddingRecord>> {
    info!("Embedding {} chunks", chunks.len());

    let progress = ProgressBar::new(chunks.len() as u64).with_style(
        ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding chunks")
            .expect("valid progress template"),
    );

    let mut records = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
        let vectors = client
            .embed_batch(&texts)
            .map_err(|e| QaError::Embedding(format!("{:#}", e)))?;

        for (chunk, vector) in batch.iter().zip(vectors) {
            records.push(EmbeddingRecord {
                id: Uuid::new_v4().to_string(),
                vector,
                chunk: chunk.clone(),
            });
        }
        progress.inc(batch.len() as u64);
    }
    progress.finish_and_clear();

    Ok(records)
}

/// Flatten every chunk to one CSV row: a `content` column plus the sorted
/// union of metadata keys present across the batch. Diagnostic output only.
#[inline]
pub fn export_csv(chunks: &[Chunk], path: &Path) -> Result<()> {
    let mut keys: BTreeSet<&'static str> = BTreeSet::new();
    for chunk in chunks {
        for (key, _) in chunk.metadata.to_key_values() {
            keys.insert(key);
        }
        keys.insert("chunk_index");
        keys.insert("total_chunks");
    }

    let columns: Vec<&str> = std::iter::once("content").chain(keys.iter().copied()).collect();

    let mut out = String::new();
    out.push_str(&columns.join(","));
    out.push('\n');

    for chunk in chunks {
        let mut values: BTreeMap<&str, String> = chunk.metadata.to_key_values().into_iter().collect();
        values.insert("chunk_index", chunk.chunk_index.to_string());
        values.insert("total_chunks", chunk.total_chunks.to_string());

        let row: Vec<String> = columns
            .iter()
            .map(|&column| {
                if column == "content" {
                    csv_escape(&chunk.content)
                } else {
                    values.get(column).map(|v| csv_escape(v)).unwrap_or_default()
                }
            })
            .collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }

    fs::write(path, out)?;
    info!("Exported {} rows to {}", chunks.len(), path.display());
    Ok(())
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn summarize(documents: &[(String, DocumentMetadata)], chunks: &[Chunk]) -> IngestionSummary {
    let mut documents_by_type = BTreeMap::new();
    for (_, metadata) in documents {
        *documents_by_type
            .entry(metadata.content_type.as_str().to_string())
            .or_insert(0) += 1;
    }

    let total_chars: usize = chunks.iter().map(|c| c.content.chars().count()).sum();
    let average_chunk_chars = total_chars / chunks.len().max(1);

    IngestionSummary {
        documents: documents.len(),
        chunks: chunks.len(),
        documents_by_type,
        average_chunk_chars,
    }
}

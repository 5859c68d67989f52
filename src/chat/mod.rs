//! Conversational retrieval and answer composition.
//!
//! Per question the pipeline is strictly sequential: rewrite (skipped when
//! there is no history), retrieve, compose. The session returns to idle
//! whatever happens; a failed stage surfaces its error and the in-progress
//! turn is not appended, so history only ever contains completed turns.


use itertools::Itertools;
use tracing::{debug, info};

use crate::config::RetrievalConfig;
use crate::ollama::OllamaClient;
use crate::store::{ScoredChunk, VectorStore};
use crate::{QaError, Result};

/// One completed question/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

/// A generated answer plus the chunks it was grounded in. Sources are the
/// full retrieved set, not narrowed to the chunks the prose actually cites.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<ScoredChunk>,
}

impl Answer {
    /// (display name, canonical URL) per source, for citation rendering.
    #[inline]
    pub fn source_list(&self) -> Vec<(String, Option<String>)> {
        self.sources
            .iter()
            .map(|source| {
                (
                    source.chunk.metadata.filename.clone(),
                    source.chunk.metadata.source_url.clone(),
                )
            })
            .collect()
    }
}

/// Rewrites follow-up questions against history and fetches the top-k
/// nearest chunks for the standalone form.
pub struct ConversationalRetriever {
    store: VectorStore,
    ollama: OllamaClient,
    top_k: usize,
    min_similarity: Option<f32>,
}

impl ConversationalRetriever {
    #[inline]
    pub fn new(store: VectorStore, ollama: OllamaClient, retrieval: &RetrievalConfig) -> Self {
        Self {
            store,
            ollama,
            top_k: retrieval.top_k,
            min_similarity: retrieval.min_similarity,
        }
    }

    /// Resolve `question` into a standalone query and retrieve the configured
    /// number of chunks for it.
    ///
    /// With empty history the question is already standalone, so no rewrite
    /// call is made and the question passes through unchanged.
    #[inline]
    pub async fn retrieve(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<(String, Vec<ScoredChunk>)> {
        self.retrieve_top_k(question, history, self.top_k).await
    }

    /// Like [`retrieve`](Self::retrieve), with `k` supplied per call.
    #[inline]
    pub async fn retrieve_top_k(
        &self,
        question: &str,
        history: &[ConversationTurn],
        k: usize,
    ) -> Result<(String, Vec<ScoredChunk>)> {
        let standalone = if history.is_empty() {
            question.to_string()
        } else {
            let prompt = build_rewrite_prompt(history, question);
            let rewritten = self
                .ollama
                .generate(&prompt)
                .map_err(|e| QaError::Generation(format!("{:#}", e)))?;
            debug!("Rewrote {:?} into {:?}", question, rewritten);
            rewritten
        };

        let query_vector = self
            .ollama
            .embed(&standalone)
            .map_err(|e| QaError::Embedding(format!("{:#}", e)))?;

        let mut chunks = self.store.search(&query_vector, k).await?;
        if let Some(threshold) = self.min_similarity {
            chunks.retain(|chunk| chunk.similarity >= threshold);
        }

        debug!("Retrieved {} chunks for {:?}", chunks.len(), standalone);
        Ok((standalone, chunks))
    }
}

/// Produces a grounded answer from retrieved chunks.
pub struct AnswerComposer {
    ollama: OllamaClient,
}

impl AnswerComposer {
    #[inline]
    pub fn new(ollama: OllamaClient) -> Self {
        Self { ollama }
    }

    #[inline]
    pub fn compose(&self, standalone_question: &str, chunks: &[ScoredChunk]) -> Result<Answer> {
        let prompt = build_answer_prompt(standalone_question, chunks);
        let text = self
            .ollama
            .generate(&prompt)
            .map_err(|e| QaError::Generation(format!("{:#}", e)))?;

        Ok(Answer {
            text,
            sources: chunks.to_vec(),
        })
    }
}

/// A question-answering session over the persisted index. History is
/// append-only and read, never mutated, by the retrieval pipeline.
pub struct ChatSession {
    retriever: ConversationalRetriever,
    composer: AnswerComposer,
    history: Vec<ConversationTurn>,
}

impl ChatSession {
    #[inline]
    pub fn new(store: VectorStore, ollama: OllamaClient, retrieval: &RetrievalConfig) -> Self {
        Self {
            retriever: ConversationalRetriever::new(store, ollama.clone(), retrieval),
            composer: AnswerComposer::new(ollama),
            history: Vec::new(),
        }
    }

    #[inline]
    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// Answer one question. On success the turn is appended to history; on
    /// failure history is left untouched and the session stays usable.
    #[inline]
    pub async fn ask(&mut self, question: &str) -> Result<Answer> {
        let (standalone, chunks) = self.retriever.retrieve(question, &self.history).await?;
        let answer = self.composer.compose(&standalone, &chunks)?;

        info!(
            "Answered {:?} with {} sources",
            question,
            answer.sources.len()
        );

        self.history.push(ConversationTurn {
            question: question.to_string(),
            answer: answer.text.clone(),
        });

        Ok(answer)
    }
}

/// Prompt that turns a follow-up question plus history into a standalone
/// question resolvable without the conversation.
pub(crate) fn build_rewrite_prompt(history: &[ConversationTurn], question: &str) -> String {
    let mut prompt = String::from(
        "Given the following conversation and a follow up question, rephrase the \
follow up question to be a standalone question.\n\nChat History:\n",
    );
    for turn in history {
        prompt.push_str("Human: ");
        prompt.push_str(&turn.question);
        prompt.push_str("\nAssistant: ");
        prompt.push_str(&turn.answer);
        prompt.push('\n');
    }
    prompt.push_str("\nFollow Up Input: ");
    prompt.push_str(question);
    prompt.push_str("\nStandalone Question:");
    prompt
}

/// Prompt binding every retrieved chunk as context, with the citation and
/// no-speculation instructions the archive bot has always used.
pub(crate) fn build_answer_prompt(question: &str, chunks: &[ScoredChunk]) -> String {
    let context = chunks
        .iter()
        .map(|chunk| chunk.chunk.content.as_str())
        .join("\n\n");

    format!(
        "Use the provided context (Satoshi Nakamoto's emails, quotes, and forum posts) \
to answer the question. Cite specific sources (e.g., email date, forum post title) \
when referencing context. If the question refers to an unspecified person, assume it \
is Satoshi Nakamoto. If the context is insufficient or contradictory, state this \
clearly and do not speculate. Provide a concise, factual, and neutral answer.\n\n\
Context: {}\n\nQuestion: {}\n\nAnswer:",
        context, question
    )
}

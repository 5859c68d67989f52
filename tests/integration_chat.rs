#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Conversational pipeline tests against mocked embedding and generation
// services and a seeded temporary index.

use std::path::Path;

use satoshi_qa::QaError;
use satoshi_qa::chat::{ChatSession, ConversationalRetriever};
use satoshi_qa::chunking::Chunk;
use satoshi_qa::config::{OllamaConfig, RetrievalConfig};
use satoshi_qa::metadata::{ContentType, DocumentMetadata};
use satoshi_qa::ollama::OllamaClient;
use satoshi_qa::store::{EmbeddingRecord, VectorStore};
use tempfile::TempDir;
use wiremock::matchers::{method, path as url_path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const DIM: usize = 8;

const CONTENT_INFLATION: &str = "Bitcoin's fixed issuance schedule is its defense against inflation.";
const CONTENT_GOLD: &str = "Gold mining is a waste, but that waste is far less than the utility it provides.";
const CONTENT_TRUST: &str = "Conventional currency requires trust that is routinely breached.";

const CANNED_ANSWER: &str =
    "Satoshi viewed predetermined issuance as protection against debasement.";
const CANNED_REWRITE: &str = "What is Satoshi Nakamoto's view on gold compared to inflation?";

/// Length-keyed fake embedding: distinct texts of distinct lengths map to
/// clearly separated vectors, and identical texts always collide.
fn fake_embedding(text: &str) -> Vec<f32> {
    (0..DIM)
        .map(|i| ((text.len() % 97) as f32).mul_add(0.1, i as f32))
        .collect()
}

struct EmbedResponder;

impl Respond for EmbedResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value =
            serde_json::from_slice(&request.body).expect("embed request is JSON");
        let prompt = body
            .get("prompt")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embedding": fake_embedding(prompt)
        }))
    }
}

/// Returns the canned rewrite for rewrite prompts and the canned answer for
/// everything else, mirroring the two generate calls per multi-turn query.
struct GenerateResponder;

impl Respond for GenerateResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value =
            serde_json::from_slice(&request.body).expect("generate request is JSON");
        let prompt = body
            .get("prompt")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let response = if prompt.contains("Standalone Question:") {
            CANNED_REWRITE
        } else {
            CANNED_ANSWER
        };
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "response": response }))
    }
}

fn ollama_config(server: &MockServer) -> OllamaConfig {
    OllamaConfig {
        host: "127.0.0.1".to_string(),
        port: server.address().port(),
        ..OllamaConfig::default()
    }
}

fn seed_record(id: &str, content: &str, content_type: ContentType) -> EmbeddingRecord {
    let collection = match content_type {
        ContentType::Email => "emails",
        ContentType::Post => "posts",
        ContentType::Quote => "quotes",
        ContentType::Main => "main",
    };
    EmbeddingRecord {
        id: id.to_string(),
        vector: fake_embedding(content),
        chunk: Chunk {
            content: content.to_string(),
            metadata: DocumentMetadata {
                source_file: format!("files/{}/{}_{}_Seed.html", collection, content_type, id),
                filename: format!("{}_{}_Seed", content_type, id),
                content_type,
                collection: collection.to_string(),
                sequence_number: Some(id.to_string()),
                title: Some("Seed".to_string()),
                source_url: Some(format!(
                    "https://satoshi.nakamotoinstitute.org/{}/{}/",
                    collection, id
                )),
                date: None,
            },
            chunk_index: 0,
            total_chunks: 1,
        },
    }
}

async fn seed_store(path: &Path) -> VectorStore {
    let mut store = VectorStore::open(path).await.expect("should open store");
    store
        .rebuild(vec![
            seed_record("001", CONTENT_INFLATION, ContentType::Email),
            seed_record("002", CONTENT_GOLD, ContentType::Post),
            seed_record("003", CONTENT_TRUST, ContentType::Quote),
        ])
        .await
        .expect("should seed store");
    store
}

#[tokio::test(flavor = "multi_thread")]
async fn single_turn_skips_rewrite_and_cites_retrieved_chunks() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(url_path("/api/embed"))
        .respond_with(EmbedResponder)
        .expect(1)
        .mount(&server)
        .await;
    // One generate call only: compose. No rewrite happens without history.
    Mock::given(method("POST"))
        .and(url_path("/api/generate"))
        .respond_with(GenerateResponder)
        .expect(1)
        .mount(&server)
        .await;

    let store = seed_store(&temp_dir.path().join("vectors")).await;
    let ollama = OllamaClient::new(&ollama_config(&server)).expect("should create client");
    let retrieval = RetrievalConfig {
        top_k: 3,
        min_similarity: None,
    };
    let mut session = ChatSession::new(store, ollama, &retrieval);

    let answer = session
        .ask("What is Satoshi's view on inflation?")
        .await
        .expect("should answer");

    assert_eq!(answer.text, CANNED_ANSWER);
    assert_eq!(answer.sources.len(), 3);

    // Cited sources are a subset of the seeded chunks.
    let seeded = ["email_001_Seed", "post_002_Seed", "quote_003_Seed"];
    for (filename, url) in answer.source_list() {
        assert!(seeded.contains(&filename.as_str()));
        assert!(url.expect("seeded chunks carry URLs").starts_with("https://"));
    }

    assert_eq!(session.history().len(), 1);
    assert_eq!(
        session.history()[0].question,
        "What is Satoshi's view on inflation?"
    );
    assert_eq!(session.history()[0].answer, CANNED_ANSWER);
}

#[tokio::test(flavor = "multi_thread")]
async fn follow_up_retrieves_with_the_rewritten_question() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(url_path("/api/embed"))
        .respond_with(EmbedResponder)
        .mount(&server)
        .await;
    // compose, then rewrite + compose for the follow-up.
    Mock::given(method("POST"))
        .and(url_path("/api/generate"))
        .respond_with(GenerateResponder)
        .expect(3)
        .mount(&server)
        .await;

    let store = seed_store(&temp_dir.path().join("vectors")).await;
    let ollama = OllamaClient::new(&ollama_config(&server)).expect("should create client");
    let retrieval = RetrievalConfig {
        top_k: 2,
        min_similarity: None,
    };
    let mut session = ChatSession::new(store, ollama, &retrieval);

    session
        .ask("What is Satoshi's view on inflation?")
        .await
        .expect("first turn should answer");
    session
        .ask("What about gold instead?")
        .await
        .expect("follow-up should answer");

    assert_eq!(session.history().len(), 2);
    // History records the user's question, not the rewritten form.
    assert_eq!(session.history()[1].question, "What about gold instead?");

    // The follow-up retrieval embedded the standalone rewrite, not the
    // elliptical original.
    let embed_prompts: Vec<String> = server
        .received_requests()
        .await
        .expect("requests recorded")
        .into_iter()
        .filter(|r| r.url.path() == "/api/embed")
        .map(|r| {
            let body: serde_json::Value =
                serde_json::from_slice(&r.body).expect("embed request is JSON");
            body["prompt"].as_str().unwrap_or_default().to_string()
        })
        .collect();
    assert_eq!(embed_prompts.len(), 2);
    assert_eq!(embed_prompts[1], CANNED_REWRITE);
}

#[tokio::test(flavor = "multi_thread")]
async fn retriever_passes_question_through_with_empty_history() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(url_path("/api/embed"))
        .respond_with(EmbedResponder)
        .mount(&server)
        .await;
    // The rewrite call must never happen.
    Mock::given(method("POST"))
        .and(url_path("/api/generate"))
        .respond_with(GenerateResponder)
        .expect(0)
        .mount(&server)
        .await;

    let store = seed_store(&temp_dir.path().join("vectors")).await;
    let ollama = OllamaClient::new(&ollama_config(&server)).expect("should create client");
    let retrieval = RetrievalConfig {
        top_k: 2,
        min_similarity: None,
    };
    let retriever = ConversationalRetriever::new(store, ollama, &retrieval);

    let (standalone, chunks) = retriever
        .retrieve("What is Satoshi's view on inflation?", &[])
        .await
        .expect("should retrieve");

    assert_eq!(standalone, "What is Satoshi's view on inflation?");
    assert_eq!(chunks.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn similarity_floor_filters_weak_matches() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(url_path("/api/embed"))
        .respond_with(EmbedResponder)
        .mount(&server)
        .await;

    let store = seed_store(&temp_dir.path().join("vectors")).await;
    let ollama = OllamaClient::new(&ollama_config(&server)).expect("should create client");
    let retrieval = RetrievalConfig {
        top_k: 3,
        min_similarity: Some(0.95),
    };
    let retriever = ConversationalRetriever::new(store, ollama, &retrieval);

    // Querying with a chunk's exact text embeds identically, so only that
    // chunk clears the floor.
    let (_, chunks) = retriever
        .retrieve(CONTENT_GOLD, &[])
        .await
        .expect("should retrieve");

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].chunk.content, CONTENT_GOLD);
    assert!(chunks[0].similarity >= 0.95);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_generation_is_not_appended_to_history() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(url_path("/api/embed"))
        .respond_with(EmbedResponder)
        .mount(&server)
        .await;
    // First generate call fails outright, later ones succeed.
    Mock::given(method("POST"))
        .and(url_path("/api/generate"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(url_path("/api/generate"))
        .respond_with(GenerateResponder)
        .mount(&server)
        .await;

    let store = seed_store(&temp_dir.path().join("vectors")).await;
    let ollama = OllamaClient::new(&ollama_config(&server)).expect("should create client");
    let retrieval = RetrievalConfig {
        top_k: 2,
        min_similarity: None,
    };
    let mut session = ChatSession::new(store, ollama, &retrieval);

    let result = session.ask("What is Satoshi's view on inflation?").await;
    assert!(matches!(result, Err(QaError::Generation(_))));
    assert!(session.history().is_empty());

    // The session stays idle and usable; the next question completes.
    let answer = session
        .ask("What is Satoshi's view on inflation?")
        .await
        .expect("retry should answer");
    assert_eq!(answer.text, CANNED_ANSWER);
    assert_eq!(session.history().len(), 1);
}

use super::*;

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        host: "test-host".to_string(),
        port: 1234,
        embedding_model: "test-embed".to_string(),
        chat_model: "test-chat".to_string(),
        batch_size: 128,
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.embedding_model, "test-embed");
    assert_eq!(client.chat_model, "test-chat");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let config = OllamaConfig::default();
    let client = OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(client.retry_attempts, 5);
}

#[test]
fn embed_batch_empty_input_is_a_no_op() {
    let client = OllamaClient::new(&OllamaConfig::default()).expect("Failed to create client");

    let results = client.embed_batch(&[]).expect("empty batch should succeed");
    assert!(results.is_empty());
}

#[test]
fn generate_request_serialization() {
    let request = GenerateRequest {
        model: "llama3.2:1b".to_string(),
        prompt: "Standalone question:".to_string(),
        stream: false,
        options: GenerateOptions { temperature: 0.0 },
    };

    let json = serde_json::to_value(&request).expect("should serialize");
    assert_eq!(json["model"], "llama3.2:1b");
    assert_eq!(json["stream"], false);
    assert_eq!(json["options"]["temperature"], 0.0);
}

#[test]
fn batch_embed_request_uses_input_key() {
    let request = BatchEmbedRequest {
        model: "granite-embedding:30m".to_string(),
        inputs: vec!["one".to_string(), "two".to_string()],
    };

    let json = serde_json::to_value(&request).expect("should serialize");
    assert!(json.get("input").is_some());
    assert!(json.get("inputs").is_none());
}

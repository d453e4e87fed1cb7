use super::*;

#[test]
fn client_configuration() {
    let config = EmbeddingConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
        ..EmbeddingConfig::default()
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry.attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let config = EmbeddingConfig::default();
    let client = OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(client.retry.attempts, 5);

    let client = client.with_retry_attempts(0);
    assert_eq!(client.retry.attempts, 1);
}

#[test]
fn model_identity_includes_model_name() {
    let client = OllamaClient::new(&EmbeddingConfig::default()).expect("Failed to create client");

    assert_eq!(client.model_id(), "ollama:nomic-embed-text:latest");
    assert_eq!(Embedder::batch_size(&client), 16);
}

#[test]
fn empty_batch_skips_the_server() {
    // Port 9 is discard; no request should be attempted for empty input
    let config = EmbeddingConfig {
        port: 9,
        ..EmbeddingConfig::default()
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    let vectors = client
        .embed_batch(&[])
        .expect("empty batch should succeed");
    assert!(vectors.is_empty());
}

#[test]
fn request_serializes_batch_input() {
    let texts = vec!["first".to_string(), "second".to_string()];
    let request = EmbedRequest {
        model: "nomic-embed-text:latest",
        input: &texts,
    };

    let json = serde_json::to_value(&request).expect("request should serialize");
    assert_eq!(json["model"], "nomic-embed-text:latest");
    assert_eq!(json["input"][1], "second");
}

#[test]
fn retry_delay_doubles_per_attempt() {
    let policy = RetryPolicy {
        attempts: 4,
        delay: Duration::from_millis(100),
    };

    assert_eq!(policy.delay_after(1), Duration::from_millis(100));
    assert_eq!(policy.delay_after(2), Duration::from_millis(200));
    assert_eq!(policy.delay_after(3), Duration::from_millis(400));
}

#[test]
fn only_server_and_transport_errors_are_transient() {
    assert!(is_transient(&ureq::Error::StatusCode(503)));
    assert!(is_transient(&ureq::Error::ConnectionFailed));
    assert!(!is_transient(&ureq::Error::StatusCode(404)));
    assert!(!is_transient(&ureq::Error::BadUri("nope".to_string())));
}

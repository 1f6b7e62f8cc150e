//! HTTP embedding providers against mock endpoints.

use std::time::Duration;

use httpmock::{Method::POST, MockServer};
use serde_json::json;
use vectorloom::embed::{
    EmbedError, Embedder, EmbedderFactory, OllamaEmbedder, OpenAiEmbedder, ProviderKind,
    ProviderSettings,
};
use vectorloom::types::EmbeddingDescriptor;

const TIMEOUT: Duration = Duration::from_secs(2);

fn openai(server: &MockServer, dimension: usize) -> OpenAiEmbedder {
    OpenAiEmbedder::new(
        server.base_url(),
        "sk-test".to_string(),
        "text-embedding-3-small".to_string(),
        dimension,
        TIMEOUT,
    )
}

#[tokio::test]
async fn openai_orders_responses_by_index() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/embeddings")
                .header("authorization", "Bearer sk-test")
                .json_body_includes(r#"{"model": "text-embedding-3-small"}"#);
            then.status(200).json_body(json!({
                "data": [
                    { "index": 1, "embedding": [1.0, 1.0, 1.0] },
                    { "index": 0, "embedding": [0.5, 0.5, 0.5] }
                ]
            }));
        })
        .await;

    let embedder = openai(&server, 3);
    let vectors = embedder
        .embed(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(vectors, vec![vec![0.5, 0.5, 0.5], vec![1.0, 1.0, 1.0]]);
}

#[tokio::test]
async fn openai_rejects_wrong_dimension() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(200).json_body(json!({
                "data": [{ "index": 0, "embedding": [0.1, 0.2] }]
            }));
        })
        .await;

    let embedder = openai(&server, 3);
    assert!(matches!(
        embedder.embed(&["text".to_string()]).await,
        Err(EmbedError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
}

#[tokio::test]
async fn openai_surfaces_http_failures() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(429).body("rate limited");
        })
        .await;

    let embedder = openai(&server, 3);
    match embedder.embed(&["text".to_string()]).await {
        Err(EmbedError::Http { status, message, .. }) => {
            assert_eq!(status, 429);
            assert!(message.contains("rate limited"));
        }
        other => panic!("expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn ollama_embeds_batches() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/embed")
                .json_body_includes(r#"{"model": "nomic-embed-text"}"#);
            then.status(200).json_body(json!({
                "embeddings": [[0.1, 0.2], [0.3, 0.4]]
            }));
        })
        .await;

    let embedder = OllamaEmbedder::new(
        server.base_url(),
        "nomic-embed-text".to_string(),
        2,
        TIMEOUT,
    );
    let vectors = embedder
        .embed(&["one".to_string(), "two".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
}

#[tokio::test]
async fn ollama_rejects_count_mismatch() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/embed");
            then.status(200).json_body(json!({ "embeddings": [[0.1, 0.2]] }));
        })
        .await;

    let embedder = OllamaEmbedder::new(server.base_url(), "m".to_string(), 2, TIMEOUT);
    assert!(matches!(
        embedder.embed(&["a".to_string(), "b".to_string()]).await,
        Err(EmbedError::CountMismatch {
            expected: 2,
            actual: 1
        })
    ));
}

#[tokio::test]
async fn xinference_tag_uses_openai_wire_format() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(200).json_body(json!({
                "data": [{ "index": 0, "embedding": [0.9, 0.8] }]
            }));
        })
        .await;

    let mut factory = EmbedderFactory::new();
    factory.configure(
        ProviderKind::Xinference,
        ProviderSettings::new(server.base_url()),
    );
    let embedder = factory
        .create(&EmbeddingDescriptor {
            provider: "xinference".to_string(),
            model: "bge-small".to_string(),
            dimension: 2,
        })
        .unwrap();

    let vectors = embedder.embed(&["text".to_string()]).await.unwrap();
    mock.assert_async().await;
    assert_eq!(vectors, vec![vec![0.9, 0.8]]);
}

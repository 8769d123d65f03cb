//! Tests for the embedding client against a mocked OpenAI-compatible API

use ragstore::embedding::{EmbeddingProvider, OpenAiEmbeddingClient};
use ragstore::error::RagError;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn embedding_response(count: usize, dimensions: usize) -> serde_json::Value {
    let data: Vec<serde_json::Value> = (0..count)
        .map(|index| {
            json!({
                "object": "embedding",
                "index": index,
                "embedding": vec![index as f32; dimensions],
            })
        })
        .collect();
    json!({"object": "list", "data": data, "model": "test-embed"})
}

#[tokio::test]
async fn test_embed_preserves_order_and_cardinality() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(move |request: &Request| {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let inputs = body["input"].as_array().unwrap().len();
            ResponseTemplate::new(200).set_body_json(embedding_response(inputs, 4))
        })
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiEmbeddingClient::new(&server.uri(), "test-key", "test-embed");
    let texts: Vec<String> = (0..3).map(|i| format!("text {}", i)).collect();
    let vectors = client.embed(&texts).await.unwrap();

    assert_eq!(vectors.len(), 3);
    for (index, vector) in vectors.iter().enumerate() {
        assert_eq!(vector.len(), 4);
        assert_eq!(vector[0], index as f32);
    }
}

#[tokio::test]
async fn test_embed_reorders_shuffled_response() {
    let server = MockServer::start().await;
    // Entries deliberately out of order; index must restore input order.
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"index": 1, "embedding": [1.0]},
                {"index": 0, "embedding": [0.0]},
            ]
        })))
        .mount(&server)
        .await;

    let client = OpenAiEmbeddingClient::new(&server.uri(), "", "test-embed");
    let vectors = client
        .embed(&["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![0.0], vec![1.0]]);
}

#[tokio::test]
async fn test_embed_empty_input_skips_remote() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = OpenAiEmbeddingClient::new(&server.uri(), "key", "test-embed");
    let vectors = client.embed(&[]).await.unwrap();
    assert!(vectors.is_empty());
}

#[tokio::test]
async fn test_embed_sends_model_and_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("authorization", "Bearer secret-key"))
        .and(body_partial_json(json!({"model": "test-embed"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_response(1, 2)))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiEmbeddingClient::new(&server.uri(), "secret-key", "test-embed");
    client.embed(&["hello".to_string()]).await.unwrap();
}

#[tokio::test]
async fn test_embed_splits_large_batches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(move |request: &Request| {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let inputs = body["input"].as_array().unwrap().len();
            assert!(inputs <= 100, "batch exceeded the per-request limit");
            ResponseTemplate::new(200).set_body_json(embedding_response(inputs, 2))
        })
        .expect(2)
        .mount(&server)
        .await;

    let client = OpenAiEmbeddingClient::new(&server.uri(), "", "test-embed");
    let texts: Vec<String> = (0..150).map(|i| format!("t{}", i)).collect();
    let vectors = client.embed(&texts).await.unwrap();
    assert_eq!(vectors.len(), 150);
}

#[tokio::test]
async fn test_embed_surfaces_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({"error": "rate limited"})),
        )
        .mount(&server)
        .await;

    let client = OpenAiEmbeddingClient::new(&server.uri(), "", "test-embed");
    let err = client.embed(&["x".to_string()]).await.unwrap_err();
    match err {
        RagError::Upstream(message) => {
            assert!(message.contains("429"));
        }
        other => panic!("expected Upstream, got {:?}", other),
    }
}

#[tokio::test]
async fn test_embed_rejects_cardinality_mismatch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_response(1, 2)))
        .mount(&server)
        .await;

    let client = OpenAiEmbeddingClient::new(&server.uri(), "", "test-embed");
    let err = client
        .embed(&["a".to_string(), "b".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Upstream(_)));
}

#[tokio::test]
async fn test_list_models_filters_and_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "test-embed-large", "dimensions": 1024},
                {"id": "gpt-chat-model"},
            ]
        })))
        .mount(&server)
        .await;

    let client = OpenAiEmbeddingClient::new(&server.uri(), "", "test-embed-large");
    let models = client.list_models().await;

    // chat models are filtered out
    assert!(models.iter().all(|m| m.id.contains("embed")));
    let large = models.iter().find(|m| m.id == "test-embed-large").unwrap();
    assert_eq!(large.dimensions, 1024);
}

#[tokio::test]
async fn test_list_models_unreachable_remote_uses_known_table() {
    // No server at all: connection refused
    let client = OpenAiEmbeddingClient::new("http://127.0.0.1:1", "", "text-embedding-3-small");
    let models = client.list_models().await;

    assert!(!models.is_empty());
    assert!(models.iter().any(|m| m.id == "text-embedding-3-small"));
}

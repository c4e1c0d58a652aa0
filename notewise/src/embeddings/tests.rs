//! Embedding API client and provider tests against a mock OpenAI-compatible
//! server.

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::EmbeddingsConfig;
use crate::embeddings::api::{ApiConfig, EmbeddingApiClient, InputStyle};
use crate::embeddings::{Embedder, EmbeddingProvider, EmbeddingPurpose};
use crate::error::ChatError;

fn test_config(base_url: &str) -> ApiConfig {
    ApiConfig {
        base_url: base_url.to_string(),
        api_key: Some("test-api-key".to_string()),
        model: "text-embedding-3-small".to_string(),
        timeout_secs: 10,
        max_retries: 3,
        input_style: InputStyle::Plain,
    }
}

fn embeddings_config(model: &str, base_url: Option<String>) -> EmbeddingsConfig {
    EmbeddingsConfig {
        model: model.to_string(),
        api_key: None,
        base_url,
        dimensions: 2,
        batch_size: 16,
        timeout_secs: 5,
        max_retries: 0,
        input_style: None,
        query_prefix: None,
        document_prefix: None,
    }
}

fn embedding_response(embeddings: Vec<Vec<f32>>) -> serde_json::Value {
    json!({
        "data": embeddings.into_iter().map(|e| json!({ "embedding": e })).collect::<Vec<_>>()
    })
}

#[tokio::test]
async fn test_api_client_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("authorization", "Bearer test-api-key"))
        .and(body_json(json!({
            "model": "text-embedding-3-small",
            "input": ["first", "second"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_response(vec![
            vec![0.1, 0.2, 0.3],
            vec![0.4, 0.5, 0.6],
        ])))
        .mount(&mock_server)
        .await;

    let client = EmbeddingApiClient::new(test_config(&mock_server.uri())).unwrap();
    let embeddings = client
        .embed(&["first", "second"], EmbeddingPurpose::Document)
        .await
        .unwrap();

    assert_eq!(embeddings.len(), 2);
    assert_eq!(embeddings[1], vec![0.4, 0.5, 0.6]);
}

#[tokio::test]
async fn test_api_client_empty_input_skips_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = EmbeddingApiClient::new(test_config(&mock_server.uri())).unwrap();
    assert!(client.embed(&[], EmbeddingPurpose::Query).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_api_client_count_mismatch_is_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(embedding_response(vec![vec![0.1]])),
        )
        .mount(&mock_server)
        .await;

    let client = EmbeddingApiClient::new(test_config(&mock_server.uri())).unwrap();
    let result = client.embed(&["a", "b"], EmbeddingPurpose::Document).await;
    assert!(matches!(result, Err(ChatError::Embedding(_))));
}

#[tokio::test]
async fn test_api_client_rate_limit_retry() {
    let mock_server = MockServer::start().await;
    let attempt_count = Arc::new(AtomicUsize::new(0));

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with({
            let count = Arc::clone(&attempt_count);
            move |_: &wiremock::Request| {
                let attempt = count.fetch_add(1, Ordering::SeqCst);
                if attempt < 2 {
                    ResponseTemplate::new(429).insert_header("retry-after", "0")
                } else {
                    ResponseTemplate::new(200)
                        .set_body_json(embedding_response(vec![vec![0.1, 0.2, 0.3]]))
                }
            }
        })
        .mount(&mock_server)
        .await;

    let client = EmbeddingApiClient::new(test_config(&mock_server.uri())).unwrap();
    let result = client.embed(&["test"], EmbeddingPurpose::Query).await;

    assert!(result.is_ok(), "Should succeed after retry");
    assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_api_client_rate_limit_exhausts_retries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&mock_server)
        .await;

    let config = ApiConfig {
        max_retries: 2,
        ..test_config(&mock_server.uri())
    };
    let client = EmbeddingApiClient::new(config).unwrap();
    let err = client
        .embed(&["test"], EmbeddingPurpose::Query)
        .await
        .unwrap_err();

    assert!(matches!(err, ChatError::ApiRateLimit { .. }));
    assert!(err.is_upstream());
}

#[tokio::test]
async fn test_api_client_server_error_retry() {
    let mock_server = MockServer::start().await;
    let attempt_count = Arc::new(AtomicUsize::new(0));

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with({
            let count = Arc::clone(&attempt_count);
            move |_: &wiremock::Request| {
                if count.fetch_add(1, Ordering::SeqCst) == 0 {
                    ResponseTemplate::new(503).set_body_string("warming up")
                } else {
                    ResponseTemplate::new(200).set_body_json(embedding_response(vec![vec![1.0]]))
                }
            }
        })
        .mount(&mock_server)
        .await;

    let client = EmbeddingApiClient::new(test_config(&mock_server.uri())).unwrap();
    let embeddings = client.embed(&["x"], EmbeddingPurpose::Query).await.unwrap();
    assert_eq!(embeddings, vec![vec![1.0]]);
    assert_eq!(attempt_count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_api_client_auth_error_no_retry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = EmbeddingApiClient::new(test_config(&mock_server.uri())).unwrap();
    let err = client.embed(&["x"], EmbeddingPurpose::Query).await.unwrap_err();
    assert!(matches!(err, ChatError::ApiAuth(body) if body == "bad key"));
}

#[tokio::test]
async fn test_api_client_restores_request_order() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        })))
        .mount(&mock_server)
        .await;

    let client = EmbeddingApiClient::new(test_config(&mock_server.uri())).unwrap();
    let embeddings = client
        .embed(&["rent", "travel"], EmbeddingPurpose::Document)
        .await
        .unwrap();
    assert_eq!(embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
}

// ── Provider: embedding purpose ──────────────────────────────────────────

#[tokio::test]
async fn test_provider_prefixes_nomic_queries_and_documents() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(body_json(json!({
            "model": "nomic-embed-text",
            "input": ["search_query: budget review"]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(embedding_response(vec![vec![0.5, 0.5]])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(body_json(json!({
            "model": "nomic-embed-text",
            "input": ["search_document: Budget for Q1"]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(embedding_response(vec![vec![0.6, 0.4]])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider =
        EmbeddingProvider::new(&embeddings_config("ollama/nomic-embed-text", Some(mock_server.uri())))
            .unwrap();

    let query = provider
        .embed("budget review", EmbeddingPurpose::Query)
        .await
        .unwrap();
    let document = provider
        .embed_batch(vec!["Budget for Q1".to_string()], EmbeddingPurpose::Document)
        .await
        .unwrap();

    assert_eq!(query, vec![0.5, 0.5]);
    assert_eq!(document, vec![vec![0.6, 0.4]]);
    assert_eq!(provider.dimensions(), 2);
}

#[tokio::test]
async fn test_provider_sends_input_type_when_configured() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(body_json(json!({
            "model": "voyage-3",
            "input": ["rent"],
            "input_type": "query"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(embedding_response(vec![vec![1.0, 0.0]])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = EmbeddingProvider::new(&EmbeddingsConfig {
        input_style: Some("input_type".to_string()),
        ..embeddings_config("lmstudio/voyage-3", Some(mock_server.uri()))
    })
    .unwrap();

    let embedding = provider.embed("rent", EmbeddingPurpose::Query).await.unwrap();
    assert_eq!(embedding, vec![1.0, 0.0]);
}

#[tokio::test]
async fn test_provider_plain_style_sends_text_unchanged() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(body_json(json!({
            "model": "nomic-embed-text",
            "input": ["budget review"]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(embedding_response(vec![vec![0.5, 0.5]])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = EmbeddingProvider::new(&EmbeddingsConfig {
        input_style: Some("plain".to_string()),
        ..embeddings_config("ollama/nomic-embed-text", Some(mock_server.uri()))
    })
    .unwrap();

    provider
        .embed("budget review", EmbeddingPurpose::Query)
        .await
        .unwrap();
}

#[test]
fn test_provider_requires_key_for_hosted_api() {
    let result = EmbeddingProvider::new(&EmbeddingsConfig {
        dimensions: 1536,
        ..embeddings_config("openai/text-embedding-3-small", None)
    });
    assert!(matches!(result, Err(ChatError::Embedding(_))));
}

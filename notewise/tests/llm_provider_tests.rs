use serde_json::json;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use notewise::config::LlmConfig;
use notewise::error::ChatError;
use notewise::llm::{ChatModel, ChatOptions, LlmBackend, LlmProvider};
use notewise::models::ChatMessage;

fn llm_config(model: &str) -> LlmConfig {
    LlmConfig {
        model: model.to_string(),
        api_key: Some("test-key".to_string()),
        base_url: None,
        timeout_secs: 30,
        max_retries: 3,
        temperature: None,
    }
}

fn llm_config_with_base_url(model: &str, base_url: String, max_retries: u32) -> LlmConfig {
    LlmConfig {
        base_url: Some(base_url),
        timeout_secs: 5,
        max_retries,
        ..llm_config(model)
    }
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1,
        "model": "gpt-4o-mini",
        "choices": [
            {
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": content
                },
                "finish_reason": "stop"
            }
        ],
        "usage": {
            "prompt_tokens": 1,
            "completion_tokens": 1,
            "total_tokens": 2
        }
    })
}

fn api_error_body(message: &str, error_type: &str, code: &str) -> serde_json::Value {
    json!({
        "error": {
            "message": message,
            "type": error_type,
            "param": serde_json::Value::Null,
            "code": code
        }
    })
}

#[test]
fn test_provider_detection() {
    let openai = LlmProvider::new(Some(&llm_config("openai/gpt-4o")));
    assert!(matches!(openai.backend(), LlmBackend::OpenAI));

    let openrouter = LlmProvider::new(Some(&llm_config("openrouter/openai/gpt-4o")));
    assert!(matches!(openrouter.backend(), LlmBackend::OpenRouter));

    let ollama = LlmProvider::new(Some(&llm_config("ollama/llama3.2")));
    assert!(matches!(ollama.backend(), LlmBackend::Ollama));
}

#[test]
fn test_unknown_provider_without_base_url_is_unavailable() {
    let provider = LlmProvider::new(Some(&llm_config("mystery-model")));
    assert!(!provider.is_available());
    assert!(matches!(provider.backend(), LlmBackend::Unavailable { .. }));
}

#[test]
fn test_custom_base_url_is_openai_compatible() {
    let config = LlmConfig {
        base_url: Some("http://gateway.internal/v1".to_string()),
        ..llm_config("mystery-model")
    };
    let provider = LlmProvider::new(Some(&config));
    assert!(provider.is_available());
    assert_eq!(
        provider.backend(),
        &LlmBackend::OpenAICompatible {
            base_url: "http://gateway.internal/v1".to_string()
        }
    );
}

#[tokio::test]
async fn test_unavailable_provider_fails_fast() {
    let provider = LlmProvider::new(None);
    let result = provider.generate("Hello", None).await;
    assert!(matches!(result, Err(ChatError::LlmUnavailable(_))));
}

#[tokio::test]
async fn test_missing_api_key_makes_provider_unavailable() {
    let mut config = llm_config("openai/gpt-4o");
    config.api_key = None;
    let provider = LlmProvider::new(Some(&config));

    assert!(!provider.is_available());
    let result = provider.chat(&[ChatMessage::user("hi")], None).await;
    assert!(matches!(result, Err(ChatError::LlmUnavailable(_))));
}

#[tokio::test]
async fn test_chat_returns_response_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "Hello"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Hello from mock")))
        .expect(1)
        .mount(&server)
        .await;

    let config = llm_config_with_base_url("openai/gpt-4o-mini", format!("{}/v1", server.uri()), 1);
    let provider = LlmProvider::new(Some(&config));

    let reply = provider
        .chat(
            &[ChatMessage::system("be brief"), ChatMessage::user("Hello")],
            None,
        )
        .await
        .unwrap();
    assert_eq!(reply, "Hello from mock");
}

#[tokio::test]
async fn test_model_override_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({ "model": "gpt-4o" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("styled")))
        .expect(1)
        .mount(&server)
        .await;

    let config = llm_config_with_base_url("openai/gpt-4o-mini", format!("{}/v1", server.uri()), 0);
    let provider = LlmProvider::new(Some(&config));
    let options = ChatOptions {
        model: Some("gpt-4o".to_string()),
        ..Default::default()
    };

    let reply = provider.generate("Hello", Some(&options)).await.unwrap();
    assert_eq!(reply, "styled");
}

#[tokio::test]
async fn test_retry_on_server_error() {
    let server = MockServer::start().await;
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_for_mock = Arc::clone(&attempts);

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(move |_request: &Request| {
            if attempts_for_mock.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(500).set_body_string("upstream temporary failure")
            } else {
                ResponseTemplate::new(200).set_body_json(completion_body("Recovered response"))
            }
        })
        .mount(&server)
        .await;

    let config = llm_config_with_base_url("openai/gpt-4o-mini", format!("{}/v1", server.uri()), 2);
    let provider = LlmProvider::new(Some(&config));

    let reply = provider.generate("Retry test", None).await.unwrap();
    assert_eq!(reply, "Recovered response");
    assert!(attempts.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_rate_limit_handling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "7")
                .set_body_json(api_error_body(
                    "Rate limit exceeded",
                    "insufficient_quota",
                    "insufficient_quota",
                )),
        )
        .mount(&server)
        .await;

    let config = llm_config_with_base_url("openai/gpt-4o-mini", format!("{}/v1", server.uri()), 1);
    let provider = LlmProvider::new(Some(&config));

    let result = provider.generate("Rate limit test", None).await;
    let err = result.unwrap_err();
    assert!(matches!(err, ChatError::LlmRateLimit { retry_after: None }));
    assert!(err.is_upstream());
}

#[tokio::test]
async fn test_auth_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(api_error_body(
            "Invalid API key",
            "invalid_request_error",
            "invalid_api_key",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let config = llm_config_with_base_url("openai/gpt-4o-mini", format!("{}/v1", server.uri()), 3);
    let provider = LlmProvider::new(Some(&config));

    match provider.generate("Auth test", None).await {
        Err(ChatError::ApiAuth(message)) => {
            assert!(message.to_lowercase().contains("authentication failed"));
        }
        other => panic!("Expected auth error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_blank_transcript_is_validation_error() {
    let provider = LlmProvider::new(Some(&llm_config("openai/gpt-4o-mini")));

    match provider.generate("   ", None).await {
        Err(ChatError::Validation(message)) => assert!(message.contains("cannot be empty")),
        other => panic!("Expected Validation error, got: {other:?}"),
    }
}

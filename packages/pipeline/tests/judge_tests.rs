use citeguard_engine::{Confidence, InMemoryFileCache, VerificationMethod};
use citeguard_pipeline::{
    AnthropicClient, Evaluator, Judge, JudgeConfig, JudgeItem, JudgeSettings, LlmJudge,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AUTH_PY: &str = "def login(username, password):\n    user = find_user(username)\n    return check_password(user, password)\n";

fn anthropic_response(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "content": [
            {
                "type": "text",
                "text": content
            }
        ],
        "model": "claude-sonnet-4-5-20250929",
        "usage": {
            "input_tokens": 500,
            "output_tokens": 300
        }
    })
}

fn item(claim: &str) -> JudgeItem {
    JudgeItem {
        citation: "[src/auth.py:1-3]".into(),
        claim: claim.into(),
        context: claim.into(),
        cited_content: AUTH_PY.trim_end().into(),
    }
}

#[tokio::test]
async fn test_batch_judge_over_http() {
    let mock_server = MockServer::start().await;

    let verdicts = "The first claim matches; the code has no OAuth.\n\n```json\n[\
        {\"id\": 1, \"supports\": true, \"reasoning\": \"checks the password\", \"confidence\": \"high\"},\
        {\"id\": 2, \"supports\": false, \"reasoning\": \"no OAuth anywhere\", \"confidence\": \"high\"}]\n```";

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_response(verdicts)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = JudgeConfig::builder("test-key")
        .api_base_url(mock_server.uri())
        .build();
    let client = AnthropicClient::new(&config).expect("client creation");
    let judge = LlmJudge::new(&client, &config);

    let reply = judge
        .batch_judge(&[
            item("Login checks the password."),
            item("The API uses OAuth 2.0."),
        ])
        .await
        .expect("judge");

    assert_eq!(reply.llm_calls, 1);
    assert_eq!(reply.llm_tokens, 800);
    let second = reply.verdicts[1].as_ref().expect("verdict");
    assert!(!second.supports);
    assert_eq!(second.confidence, Confidence::High);
}

#[tokio::test]
async fn test_escalation_requests_stronger_model() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(serde_json::json!({ "model": "escalation-model" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_response(
            r#"[{"id": 1, "supports": true, "reasoning": "ok", "confidence": "high"}]"#,
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = JudgeConfig::builder("test-key")
        .api_base_url(mock_server.uri())
        .escalation_model("escalation-model")
        .build();
    let client = AnthropicClient::new(&config).expect("client creation");
    let judge = LlmJudge::new(&client, &config);

    let reply = judge
        .single_judge_high_tier(&item("Login checks the password."))
        .await
        .expect("judge");
    assert!(reply.verdicts[0].as_ref().is_some_and(|v| v.supports));
}

#[tokio::test]
async fn test_api_error_handling() {
    let mock_server = MockServer::start().await;

    let error_resp = serde_json::json!({
        "error": {
            "type": "invalid_request_error",
            "message": "Invalid model specified"
        }
    });

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(400).set_body_json(&error_resp))
        .mount(&mock_server)
        .await;

    let config = JudgeConfig::builder("test-key")
        .api_base_url(mock_server.uri())
        .build();
    let client = AnthropicClient::new(&config).expect("client creation");
    let judge = LlmJudge::new(&client, &config);

    let result = judge.batch_judge(&[item("Login checks the password.")]).await;

    let err_str = result.expect_err("should be an error").to_string();
    assert!(
        err_str.contains("Invalid model"),
        "Error should contain API message: {err_str}"
    );
}

#[tokio::test]
async fn test_transient_server_error_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_response(
            r#"[{"id": 1, "supports": true, "reasoning": "checks it", "confidence": "high"}]"#,
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = JudgeConfig::builder("test-key")
        .api_base_url(mock_server.uri())
        .build();
    let client = AnthropicClient::new(&config).expect("client creation");
    let judge = LlmJudge::new(&client, &config);

    let reply = judge
        .batch_judge(&[item("Login checks the password.")])
        .await
        .expect("judge after retry");

    assert_eq!(reply.llm_calls, 1);
    assert!(reply.verdicts[0].as_ref().is_some_and(|v| v.supports));
}

#[tokio::test]
async fn test_rejected_key_leaves_claims_unverified() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": { "type": "authentication_error", "message": "invalid x-api-key" }
        })))
        .mount(&mock_server)
        .await;

    let config = JudgeConfig::builder("bad-key")
        .api_base_url(mock_server.uri())
        .build();
    let client = AnthropicClient::new(&config).expect("client creation");
    let judge = LlmJudge::new(&client, &config);
    let cache = InMemoryFileCache::new().with_text("src/auth.py", AUTH_PY);

    let result = Evaluator::new(&cache)
        .with_judge(&judge)
        .with_settings(JudgeSettings::from(&config))
        .evaluate("The login flow manages user sessions [src/auth.py:1-3].")
        .await;

    assert!(result.judge_unavailable);
    assert_eq!(result.unverified, 1);
    assert_eq!(result.results[0].method, VerificationMethod::Abstractive);
    assert!(result.results[0].unverified);
}

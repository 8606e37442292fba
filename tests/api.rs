//! End-to-end through the HTTP surface, with every upstream stubbed.

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sherlog_api::AppState;
use sherlog_api::config::SherlogConfig;
use sherlog_api::factory;
use sherlog_api::llm::OpenAiCompatibleClient;
use sherlog_api::orchestrator::Orchestrator;
use sherlog_api::slack::SlackBot;

async fn mount_llm(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("LogQL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "{service=\"checkout\"} |= \"error\"" } }]
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "```promql\nsum(rate(http_requests_total{service=\"checkout\"}[5m]))\n```" } }]
        })))
        .mount(server)
        .await;
}

async fn spawn_app(upstream: &MockServer) -> String {
    spawn_app_with_slack(upstream, None).await
}

async fn spawn_app_with_slack(upstream: &MockServer, slack: Option<SlackBot>) -> String {
    let mut config = SherlogConfig::default();
    config.llm.base_url = upstream.uri();
    config.llm.api_key = Some("test-key".to_string());
    config.backend.prometheus.url = Some(upstream.uri());
    config.backend.loki.url = Some(upstream.uri());
    config.backend.loki.max_retries = 0;

    let llm = Arc::new(OpenAiCompatibleClient::new(&config.llm).unwrap());
    let stack = factory::create_backend("combined", llm, &config).unwrap();
    let state = AppState {
        orchestrator: Arc::new(Orchestrator::new(stack)),
        relay: None,
        slack,
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, sherlog_api::router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn combined_chat_returns_partial_success() {
    let upstream = MockServer::start().await;
    mount_llm(&upstream).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [{ "metric": { "service": "checkout" }, "value": [1700000000, "42.0"] }]
            }
        })))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/loki/api/v1/query_range"))
        .respond_with(ResponseTemplate::new(500).set_body_string("loki is down"))
        .mount(&upstream)
        .await;

    let base = spawn_app(&upstream).await;
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/v1/chat"))
        .json(&json!({ "query": "checkout errors", "scope": "combined" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "partial");
    assert_eq!(body["metrics"]["status"], "success");
    assert_eq!(
        body["metrics"]["query"],
        "sum(rate(http_requests_total{service=\"checkout\"}[5m]))"
    );
    assert_eq!(body["metrics"]["result"]["data"]["results"][0]["value"], 42.0);
    assert_eq!(body["logs"]["status"], "error");
    assert_eq!(body["logs"]["kind"], "query");
    assert_eq!(body["logs"]["query"], "{service=\"checkout\"} |= \"error\"");
}

#[tokio::test]
async fn translation_failure_maps_to_unprocessable_entity() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "Sorry, I can't turn that into a query." } }]
        })))
        .mount(&upstream)
        .await;

    let base = spawn_app(&upstream).await;
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/v1/chat"))
        .json(&json!({ "query": "how are things", "scope": "metrics" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "failed");
    assert_eq!(body["metrics"]["kind"], "translation");
    assert_eq!(body["metrics"]["phase"], "translating");
    assert!(body.get("logs").is_none());
}

#[tokio::test]
async fn translate_endpoint_returns_the_cleaned_query() {
    let upstream = MockServer::start().await;
    mount_llm(&upstream).await;

    let base = spawn_app(&upstream).await;
    let body: Value = reqwest::Client::new()
        .get(format!("{base}/api/v1/translate"))
        .query(&[("query", "checkout errors"), ("language", "logql")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["text"], "{service=\"checkout\"} |= \"error\"");
    assert_eq!(body["language"], "logql");
}

#[tokio::test]
async fn backends_endpoint_lists_supported_types() {
    let upstream = MockServer::start().await;
    let base = spawn_app(&upstream).await;
    let body: Value = reqwest::get(format!("{base}/api/v1/backends"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["active"], "combined");
    assert_eq!(body["configured"], json!(["prometheus", "loki"]));
    assert_eq!(body["supported"].as_array().unwrap().len(), 3);
    assert_eq!(body["supported"][0]["type"], "metrics-only");
}

#[tokio::test]
async fn readyz_reports_degraded_backends() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/-/ready"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/ready"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&upstream)
        .await;

    let base = spawn_app(&upstream).await;
    let resp = reqwest::get(format!("{base}/readyz")).await.unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["backends"][0]["ready"], true);
    assert_eq!(body["backends"][1]["ready"], false);

    let health = reqwest::get(format!("{base}/healthz")).await.unwrap();
    assert_eq!(health.status(), 200);
}

#[tokio::test]
async fn explain_endpoint_returns_plain_language() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "  Per-second rate of HTTP requests over five minutes.\n" } }]
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let base = spawn_app(&upstream).await;
    let body: Value = reqwest::Client::new()
        .post(format!("{base}/api/v1/explain"))
        .json(&json!({ "query": "rate(http_requests_total[5m])" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["query"], "rate(http_requests_total[5m])");
    assert_eq!(body["language"], "promql");
    assert_eq!(
        body["explanation"],
        "Per-second rate of HTTP requests over five minutes."
    );
}

#[tokio::test]
async fn empty_question_is_rejected_without_upstream_calls() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&upstream)
        .await;

    let base = spawn_app(&upstream).await;
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/v1/chat"))
        .json(&json!({ "query": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

fn slack_bot(upstream: &MockServer) -> SlackBot {
    SlackBot::new("signing-secret", "xoxb-test", upstream.uri()).unwrap()
}

async fn post_slack_event(base: &str, bot: &SlackBot, body: &Value) -> reqwest::Response {
    let raw = serde_json::to_vec(body).unwrap();
    let ts = chrono::Utc::now().timestamp().to_string();
    reqwest::Client::new()
        .post(format!("{base}/api/v1/slack/events"))
        .header("X-Slack-Request-Timestamp", &ts)
        .header("X-Slack-Signature", bot.sign(&ts, &raw))
        .header("content-type", "application/json")
        .body(raw)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn slack_url_verification_echoes_the_challenge() {
    let upstream = MockServer::start().await;
    let bot = slack_bot(&upstream);
    let base = spawn_app_with_slack(&upstream, Some(bot.clone())).await;

    let resp = post_slack_event(
        &base,
        &bot,
        &json!({ "type": "url_verification", "challenge": "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P" }),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["challenge"], "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P");
}

#[tokio::test]
async fn slack_requests_with_bad_signatures_are_rejected() {
    let upstream = MockServer::start().await;
    let bot = slack_bot(&upstream);
    let base = spawn_app_with_slack(&upstream, Some(bot)).await;

    let forged = SlackBot::new("wrong-secret", "xoxb-test", upstream.uri()).unwrap();
    let resp = post_slack_event(&base, &forged, &json!({ "type": "url_verification", "challenge": "c" })).await;
    assert_eq!(resp.status(), 401);

    let unsigned = reqwest::Client::new()
        .post(format!("{base}/api/v1/slack/events"))
        .json(&json!({ "type": "url_verification", "challenge": "c" }))
        .send()
        .await
        .unwrap();
    assert_eq!(unsigned.status(), 401);
}

#[tokio::test]
async fn slack_events_are_not_found_without_a_bot() {
    let upstream = MockServer::start().await;
    let base = spawn_app(&upstream).await;
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/v1/slack/events"))
        .json(&json!({ "type": "url_verification", "challenge": "c" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn slack_mentions_are_answered_in_thread() {
    let upstream = MockServer::start().await;
    mount_llm(&upstream).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [{ "metric": { "service": "checkout" }, "value": [1700000000, "42.0"] }]
            }
        })))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/loki/api/v1/query_range"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": { "resultType": "streams", "result": [] }
        })))
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat.postMessage"))
        .and(header("authorization", "Bearer xoxb-test"))
        .and(body_partial_json(json!({ "channel": "C024BE91L", "thread_ts": "1700000000.000200" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&upstream)
        .await;

    let bot = slack_bot(&upstream);
    let base = spawn_app_with_slack(&upstream, Some(bot.clone())).await;
    let resp = post_slack_event(
        &base,
        &bot,
        &json!({
            "type": "event_callback",
            "event": {
                "type": "app_mention",
                "text": "<@U0LAN0Z89> checkout errors",
                "channel": "C024BE91L",
                "ts": "1700000000.000200"
            }
        }),
    )
    .await;
    assert_eq!(resp.status(), 200);

    // The answer is posted from a background task.
    let mut reply = None;
    for _ in 0..100 {
        let requests = upstream.received_requests().await.unwrap_or_default();
        reply = requests.into_iter().find(|r| r.url.path() == "/chat.postMessage");
        if reply.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let reply: Value = serde_json::from_slice(&reply.expect("slack reply").body).unwrap();
    let text = reply["text"].as_str().unwrap();
    assert!(text.contains("*Question:* checkout errors"));
    assert!(text.contains("service=checkout: 42.00"));
}

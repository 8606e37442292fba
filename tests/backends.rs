use chrono::{TimeZone, Utc};
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sherlog_api::backend::{Backend, LokiBackend, PrometheusBackend};
use sherlog_api::config::BackendConfig;
use sherlog_api::error::QueryErrorKind;
use sherlog_api::models::envelope::QueryResult;
use sherlog_api::models::metrics::MetricsResult;
use sherlog_api::models::query::{TimeRange, TranslatedQuery};

fn fast_config(url: String) -> BackendConfig {
    BackendConfig {
        initial_retry_delay_ms: 10,
        max_retry_delay_ms: 100,
        ..BackendConfig::with_url(url)
    }
}

fn vector_body() -> serde_json::Value {
    json!({
        "status": "success",
        "data": {
            "resultType": "vector",
            "result": [{ "metric": { "service": "checkout" }, "value": [1700000000, "42.0"] }]
        }
    })
}

#[tokio::test]
async fn prometheus_retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .and(query_param("query", "up"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vector_body()))
        .expect(1)
        .mount(&server)
        .await;

    let backend = PrometheusBackend::new(&fast_config(server.uri())).unwrap();
    let result = backend
        .query(&TranslatedQuery::promql("up"), &CancellationToken::new())
        .await
        .unwrap();

    let QueryResult::Metrics(MetricsResult::Vector(samples)) = result else {
        panic!("expected a vector");
    };
    assert_eq!(samples[0].value, 42.0);
}

#[tokio::test]
async fn prometheus_does_not_retry_client_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": "error",
            "errorType": "bad_data",
            "error": "parse error at char 5"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = PrometheusBackend::new(&fast_config(server.uri())).unwrap();
    let err = backend
        .query(&TranslatedQuery::promql("sum(("), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, QueryErrorKind::Status(400));
    assert_eq!(err.backend, "prometheus");
    assert_eq!(err.query, "sum((");
    assert!(err.message.contains("parse error at char 5"));
}

#[tokio::test]
async fn prometheus_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let config = BackendConfig {
        max_retries: 2,
        ..fast_config(server.uri())
    };
    let backend = PrometheusBackend::new(&config).unwrap();
    let err = backend
        .query(&TranslatedQuery::promql("up"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, QueryErrorKind::Status(502));
}

#[tokio::test]
async fn prometheus_range_query_sends_unix_seconds_and_step() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query_range"))
        .and(query_param("start", "1700000000.000"))
        .and(query_param("end", "1700003600.000"))
        .and(query_param("step", "60"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {
                "resultType": "matrix",
                "result": [{ "metric": { "job": "api" }, "values": [[1700000000, "1"], [1700000060, "2"]] }]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = PrometheusBackend::new(&fast_config(server.uri())).unwrap();
    let range = TimeRange::new(
        Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        Utc.timestamp_opt(1_700_003_600, 0).unwrap(),
    )
    .with_step(Duration::from_secs(60));
    let result = backend
        .query_range(&TranslatedQuery::promql("rate(x[5m])"), &range, &CancellationToken::new())
        .await
        .unwrap();
    assert!(backend.generate_graph(&result, "x").into_graph().is_some());
}

#[tokio::test]
async fn inverted_range_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vector_body()))
        .expect(0)
        .mount(&server)
        .await;

    let backend = LokiBackend::new(&fast_config(server.uri())).unwrap();
    let range = TimeRange::new(
        Utc.timestamp_opt(1_700_003_600, 0).unwrap(),
        Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    );
    let err = backend
        .query_range(&TranslatedQuery::logql("{app=\"api\"}"), &range, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, QueryErrorKind::InvalidInput);
}

#[tokio::test]
async fn loki_range_query_groups_streams() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loki/api/v1/query_range"))
        .and(query_param("start", "1700000000000000000"))
        .and(query_param("end", "1700003600000000000"))
        .and(query_param("direction", "forward"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {
                "resultType": "streams",
                "result": [
                    { "stream": { "service": "checkout", "level": "error" },
                      "values": [["1700000300000000000", "timeout"], ["1700000100000000000", "retrying"]] },
                    { "stream": { "service": "cart" },
                      "values": [["1700000200000000000", "ok"]] }
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = LokiBackend::new(&fast_config(server.uri())).unwrap();
    let range = TimeRange::new(
        Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        Utc.timestamp_opt(1_700_003_600, 0).unwrap(),
    );
    let result = backend
        .query_range(&TranslatedQuery::logql("{service=~\".+\"}"), &range, &CancellationToken::new())
        .await
        .unwrap();

    let logs = result.as_logs().unwrap();
    assert_eq!(logs.streams.len(), 2);
    for stream in &logs.streams {
        assert!(stream.entries.windows(2).all(|w| w[0].timestamp_ns <= w[1].timestamp_ns));
    }
    assert!(backend.generate_graph(&result, "logs").into_graph().is_none());
}

#[tokio::test]
async fn cancellation_aborts_an_in_flight_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vector_body())
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let backend = PrometheusBackend::new(&fast_config(server.uri())).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        backend.query(&TranslatedQuery::promql("up"), &cancel),
    )
    .await
    .expect("cancellation should end the call promptly")
    .unwrap_err();
    assert_eq!(err.kind, QueryErrorKind::Cancelled);
}

#[tokio::test]
async fn readiness_checks_hit_each_backend_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/-/ready"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ready"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Ingester not ready"))
        .expect(1)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let prom = PrometheusBackend::new(&fast_config(server.uri())).unwrap();
    let loki = LokiBackend::new(&fast_config(server.uri())).unwrap();
    assert!(prom.ping(&cancel).await.is_ok());
    let err = loki.ping(&cancel).await.unwrap_err();
    assert_eq!(err.kind, QueryErrorKind::Status(503));
}

#[tokio::test]
async fn slow_backends_time_out_after_retrying() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vector_body())
                .set_delay(Duration::from_secs(3)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let config = BackendConfig {
        timeout_secs: 1,
        max_retries: 1,
        ..fast_config(server.uri())
    };
    let backend = PrometheusBackend::new(&config).unwrap();
    let err = backend
        .query(&TranslatedQuery::promql("up"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, QueryErrorKind::Timeout);
}

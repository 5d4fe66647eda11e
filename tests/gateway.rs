//! End-to-end tests through the full middleware stack.

use api_gateway::routing::ServiceName;
use reqwest::StatusCode;

mod common;

#[tokio::test]
async fn missing_credentials_are_rejected() {
    let backend = common::start_ok_backend().await;
    let (addr, shutdown) =
        common::start_gateway(common::gateway_config(&[(ServiceName::Nin, backend.url())])).await;

    let res = common::client()
        .get(format!("http://{}/api/v1/nin/verify", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers()["www-authenticate"], "Bearer");
    assert!(res.headers().contains_key("x-request-id"));
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Authentication required");
    assert_eq!(backend.hits(), 0);

    let res = common::client()
        .get(format!("http://{}/api/v1/nin/verify", addr))
        .header("authorization", "Token abc")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    shutdown.trigger();
}

#[tokio::test]
async fn generated_request_id_reaches_backend_and_response() {
    let backend = common::start_ok_backend().await;
    let (addr, shutdown) =
        common::start_gateway(common::gateway_config(&[(ServiceName::Nin, backend.url())])).await;
    let token = common::token("user-42");

    let mut issued = Vec::new();
    for _ in 0..2 {
        let res = common::client()
            .get(format!("http://{}/api/v1/nin/verify", addr))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let echoed = res.headers()["x-request-id"].to_str().unwrap().to_string();
        assert!(uuid::Uuid::parse_str(&echoed).is_ok(), "not a uuid: {echoed}");
        assert_eq!(backend.last_request().headers["x-request-id"], echoed.as_str());
        issued.push(echoed);
    }
    assert_ne!(issued[0], issued[1]);

    shutdown.trigger();
}

#[tokio::test]
async fn authenticated_request_reaches_backend_with_identity() {
    let backend = common::start_ok_backend().await;
    let (addr, shutdown) =
        common::start_gateway(common::gateway_config(&[(ServiceName::Nin, backend.url())])).await;
    let token = common::token("user-42");

    let res = common::client()
        .get(format!("http://{}/api/v1/nin/verify?id=1", addr))
        .bearer_auth(&token)
        .header("x-request-id", "trace-me")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-request-id"], "trace-me");
    assert!(res.headers().contains_key("x-process-time"));

    let seen = backend.last_request();
    assert_eq!(seen.path_and_query, "/api/v1/nin/verify?id=1");
    assert_eq!(seen.headers["authorization"], format!("Bearer {}", token).as_str());
    assert_eq!(seen.headers["x-user-id"], "user-42");
    assert_eq!(seen.headers["x-request-id"], "trace-me");
    assert_eq!(seen.headers["x-forwarded-for"], "127.0.0.1");
    assert_eq!(seen.headers["x-forwarded-proto"], "http");
    assert_eq!(seen.headers["x-forwarded-host"], addr.to_string().as_str());

    shutdown.trigger();
}

#[tokio::test]
async fn api_key_is_accepted() {
    let backend = common::start_ok_backend().await;
    let (addr, shutdown) =
        common::start_gateway(common::gateway_config(&[(ServiceName::Sms, backend.url())])).await;

    let res = common::client()
        .post(format!("http://{}/api/v1/sms/send", addr))
        .header("x-api-key", "sk-0123456789abcdefghij")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = common::client()
        .post(format!("http://{}/api/v1/sms/send", addr))
        .header("x-api-key", "sk-short")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(backend.hits(), 1);

    shutdown.trigger();
}

#[tokio::test]
async fn rate_limit_rejects_after_quota() {
    let backend = common::start_ok_backend().await;
    let mut config = common::gateway_config(&[(ServiceName::Config, backend.url())]);
    config.rate_limit.enabled = true;
    config.rate_limit.requests = 2;
    config.rate_limit.window_secs = 60;
    let (addr, shutdown) = common::start_gateway(config).await;
    let token = common::token("limited-user");
    let client = common::client();
    let url = format!("http://{}/api/v1/config/keys", addr);

    let first = client.get(&url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-ratelimit-limit"], "2");
    assert_eq!(first.headers()["x-ratelimit-remaining"], "1");

    let second = client.get(&url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    let third = client.get(&url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(third.headers().contains_key("retry-after"));
    let body: serde_json::Value = third.json().await.unwrap();
    assert_eq!(body["error"], "Rate limit exceeded");
    assert_eq!(body["message"], "Maximum 2 requests per 60 seconds");
    assert_eq!(backend.hits(), 2);

    // Quotas are per identity.
    let other = client
        .get(&url)
        .bearer_auth(common::token("other-user"))
        .send()
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);

    shutdown.trigger();
}

#[tokio::test]
async fn gateway_health_is_public() {
    let backend = common::start_ok_backend().await;
    let (addr, shutdown) =
        common::start_gateway(common::gateway_config(&[(ServiceName::Bvn, backend.url())])).await;

    let res = common::client()
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["services"]["services"]["bvn"]["status"], "healthy");
    assert!(body["circuit_breakers"].is_array());

    shutdown.trigger();
}

#[tokio::test]
async fn metrics_endpoint_is_404_when_disabled() {
    let backend = common::start_ok_backend().await;
    let (addr, shutdown) =
        common::start_gateway(common::gateway_config(&[(ServiceName::Bvn, backend.url())])).await;

    let res = common::client()
        .get(format!("http://{}/metrics", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Metrics not enabled");

    shutdown.trigger();
}

#[tokio::test]
async fn service_observability_endpoints() {
    let backend = common::start_ok_backend().await;
    let (addr, shutdown) =
        common::start_gateway(common::gateway_config(&[(ServiceName::Ai, backend.url())])).await;
    let client = common::client();
    let token = common::token("operator");

    let res = client
        .get(format!("http://{}/services/ai/health", addr))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["status_code"], 200);

    let res = client
        .get(format!("http://{}/services/llm/metrics", addr))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["state"], "closed");
    assert_eq!(body["failure_count"], 0);

    let res = client
        .get(format!("http://{}/services/sms/health", addr))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(format!("http://{}/services/status", addr))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["services"]["ai"]["total_instances"], 1);
    assert_eq!(body["services"]["ai"]["healthy_instances"], 1);

    shutdown.trigger();
}

mod common;

use common::{config_for, start_gateway, unreachable_backend};
use medgate_server::RouteConfig;
use medgate_server::config::PATIENT_SERVICE;
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn proxied_get_keeps_path_and_query() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/patients/42"))
        .and(query_param("include", "history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "42", "name": "Ada"})))
        .expect(1)
        .mount(&backend)
        .await;

    let gw = start_gateway(config_for(&backend.uri())).await;
    let resp = reqwest::get(gw.url("/api/patients/42?include=history"))
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"id": "42", "name": "Ada"}));
    gw.stop().await;
}

#[tokio::test]
async fn every_default_prefix_is_forwarded_unchanged() {
    let backend = MockServer::start().await;
    let prefixes = [
        "/api/patients",
        "/api/appointments",
        "/api/medications",
        "/api/medical-records",
        "/api/auth",
    ];
    for prefix in prefixes {
        Mock::given(method("GET"))
            .and(path(format!("{prefix}/anything/7")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"echo": prefix})))
            .expect(1)
            .mount(&backend)
            .await;
    }

    let gw = start_gateway(config_for(&backend.uri())).await;
    let client = reqwest::Client::new();
    for prefix in prefixes {
        let resp = client
            .get(gw.url(&format!("{prefix}/anything/7")))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "{prefix}");
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["echo"], prefix);
    }
    gw.stop().await;
}

#[tokio::test]
async fn proxied_post_relays_body_headers_and_status() {
    let backend = MockServer::start().await;
    let payload = json!({"patientId": "7", "date": "2025-03-01T10:00:00Z"});
    Mock::given(method("POST"))
        .and(path("/api/appointments"))
        .and(header("authorization", "Bearer token-1"))
        .and(body_json(&payload))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-backend", "appointments")
                .set_body_json(json!({"id": "a-1"})),
        )
        .expect(1)
        .mount(&backend)
        .await;

    let gw = start_gateway(config_for(&backend.uri())).await;
    let resp = reqwest::Client::new()
        .post(gw.url("/api/appointments"))
        .bearer_auth("token-1")
        .json(&payload)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 201);
    assert_eq!(resp.headers()["x-backend"], "appointments");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["id"], "a-1");
    gw.stop().await;
}

#[tokio::test]
async fn backend_errors_pass_through_unchanged() {
    let backend = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/medications/9"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Medication not found"})))
        .mount(&backend)
        .await;

    let gw = start_gateway(config_for(&backend.uri())).await;
    let resp = reqwest::Client::new()
        .delete(gw.url("/api/medications/9"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"message": "Medication not found"}));
    gw.stop().await;
}

#[tokio::test]
async fn unreachable_backend_yields_service_unavailable() {
    let gw = start_gateway(config_for(&unreachable_backend().await)).await;
    let client = reqwest::Client::new();

    for (uri, service) in [
        ("/api/patients/1", "patient"),
        ("/api/medical-records", "medical records"),
        ("/api/auth/login", "authentication"),
    ] {
        let resp = client.get(gw.url(uri)).send().await.unwrap();
        assert_eq!(resp.status(), 503, "{uri}");
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Service Unavailable");
        assert_eq!(
            body["message"],
            format!("The {service} service is currently unavailable. Please try again later.")
        );
        assert!(body["timestamp"].is_string());
    }
    gw.stop().await;
}

#[tokio::test]
async fn unmatched_paths_get_not_found_envelope() {
    let backend = MockServer::start().await;
    let gw = start_gateway(config_for(&backend.uri())).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(gw.url("/api/unknown-resource?page=2"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Not Found");
    assert_eq!(
        body["message"],
        "The requested resource at /api/unknown-resource?page=2 was not found."
    );

    // Prefix matching respects segment boundaries
    let resp = client.get(gw.url("/api/patients-archive")).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    // Only GET is served locally
    let resp = client.post(gw.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "The requested resource at /health was not found.");

    assert!(backend.received_requests().await.unwrap().is_empty());
    gw.stop().await;
}

#[tokio::test]
async fn rewritten_route_replaces_prefix() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/people/5"))
        .respond_with(ResponseTemplate::new(200).set_body_string("rewritten"))
        .expect(1)
        .mount(&backend)
        .await;

    let mut cfg = config_for(&backend.uri());
    cfg.routes.insert(
        0,
        RouteConfig {
            prefix: "/api/people".into(),
            service: PATIENT_SERVICE.into(),
            display_name: "people".into(),
            rewrite: Some("/v2/people".into()),
        },
    );
    let gw = start_gateway(cfg).await;

    let resp = reqwest::get(gw.url("/api/people/5")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "rewritten");
    gw.stop().await;
}

#[tokio::test]
async fn api_docs_and_common_headers() {
    let backend = MockServer::start().await;
    let gw = start_gateway(config_for(&backend.uri())).await;

    let resp = reqwest::Client::new()
        .get(gw.url("/api-docs"))
        .header("origin", "http://localhost:8080")
        .header("x-request-id", "req-123")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert_eq!(resp.headers()["x-request-id"], "req-123");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["apiName"], "Healthcare Management System API");
    assert_eq!(body["services"].as_array().unwrap().len(), 4);
    gw.stop().await;
}

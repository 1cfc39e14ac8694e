use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use tempfile::TempDir;

use expertise_graph::app::App;
use expertise_graph::config::Config;
use expertise_graph::server::router;
use expertise_graph_core::vector::DistanceMetric;

const ADA: &str = "6f1c2d1e-8a4b-4c3d-9e2f-0a1b2c3d4e5f";
const BOB: &str = "7a2b3c4d-5e6f-4a1b-8c2d-3e4f5a6b7c8d";

async fn create_test_server() -> (TestServer, TempDir) {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::minimal(tmp.path().join("xg.sqlite"));
    config.retrieval.distance = DistanceMetric::Cosine;
    let app = App::open(config).await.unwrap();
    let server = TestServer::new(router(Arc::new(app))).unwrap();
    (server, tmp)
}

async fn ingest(server: &TestServer, person: &str, title: &str, text: &str) -> Value {
    let response = server
        .post("/api/ingest")
        .json(&json!({
            "personId": person,
            "title": title,
            "text": text,
            "visibility": "team",
        }))
        .await;
    response.assert_status_ok();
    response.json()
}

#[tokio::test]
async fn test_healthz() {
    let (server, _tmp) = create_test_server().await;
    let response = server.get("/healthz").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(body["embedModel"], "mock");
    assert_eq!(body["dim"], 256);
}

#[tokio::test]
async fn test_ingest_and_search() {
    let (server, _tmp) = create_test_server().await;
    let text = "Kubernetes operators reconcile Kubernetes clusters.";
    let out = ingest(&server, ADA, "Operators", text).await;
    assert_eq!(out["chunkCount"], 1);
    assert!(out["docId"].as_str().is_some());

    let response = server
        .post("/api/search")
        .json(&json!({ "queryText": text, "topK": 3 }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["snippets"][0]["source"], "Operators");
    assert_eq!(body["snippets"][0]["docId"], out["docId"]);
    assert!(body["candidateTopics"]
        .as_array()
        .unwrap()
        .iter()
        .any(|t| t["name"] == "Kubernetes"));
    assert_eq!(body["experts"][0]["employeeId"], ADA);
    assert!(body["experts"][0]["freshnessDays"].is_i64());
}

#[tokio::test]
async fn test_search_validation_is_400() {
    let (server, _tmp) = create_test_server().await;
    let response = server
        .post("/api/search")
        .json(&json!({ "queryText": "kafka", "topK": 50 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "invalid_input");
    assert!(body["error"]["message"].as_str().unwrap().contains("topK"));

    let response = server.post("/api/search").json(&json!({ "topK": 5 })).await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ingest_validation() {
    let (server, _tmp) = create_test_server().await;
    let response = server
        .post("/api/ingest")
        .json(&json!({ "personId": "ada", "title": "x", "text": "y" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post("/api/ingest")
        .json(&json!({ "personId": ADA, "title": "x" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post("/api/ingest")
        .json(&json!({ "personId": ADA, "title": "x", "text": "y", "visibility": "public" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_interview_expertise_and_graph() {
    let (server, _tmp) = create_test_server().await;
    server
        .post("/api/people")
        .json(&json!({ "id": ADA, "name": "Ada" }))
        .await
        .assert_status_ok();

    for person in [ADA, BOB] {
        let response = server
            .post("/api/interview")
            .json(&json!({
                "personId": person,
                "answers": [{ "q": "Focus", "a": "Postgres replication and Postgres tuning" }],
            }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["topicsUpdated"][0]["name"], "Postgres");
    }

    let response = server
        .get("/api/expertise")
        .add_query_param("personId", ADA)
        .await;
    response.assert_status_ok();
    let scores: Value = response.json();
    assert_eq!(scores[0]["topic"], "Postgres");
    assert_eq!(scores[0]["freshnessDays"], 0);

    let response = server
        .get("/api/graph")
        .add_query_param("topic", "postgres")
        .await;
    response.assert_status_ok();
    let graph: Value = response.json();
    assert_eq!(graph["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(graph["edges"].as_array().unwrap().len(), 1);
    assert_eq!(graph["busFactor"], 1.0);
    let labels: Vec<&str> = graph["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|n| n["label"].as_str())
        .collect();
    assert!(labels.contains(&"Ada"));
    assert!(labels.contains(&BOB));

    let response = server
        .post("/api/agent/match")
        .json(&json!({ "problem": "Postgres replication is lagging", "topK": 1 }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["experts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_match_validation() {
    let (server, _tmp) = create_test_server().await;
    let response = server
        .post("/api/agent/match")
        .json(&json!({ "problem": "help", "topK": 11 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let response = server
        .post("/api/agent/match")
        .json(&json!({ "problem": "help", "minScore": 1.5 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_privacy_export_and_delete() {
    let (server, _tmp) = create_test_server().await;
    let out = ingest(&server, ADA, "Runbook", "Grafana alerts for latency budgets.").await;

    let response = server
        .get("/api/privacy/export")
        .add_query_param("personId", ADA)
        .await;
    response.assert_status_ok();
    let export: Value = response.json();
    assert_eq!(export["documents"][0]["id"], out["docId"]);
    assert_eq!(export["snippets"].as_array().unwrap().len(), 1);

    let response = server
        .delete("/api/privacy/delete")
        .add_query_param("personId", ADA)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(body["chunksDeleted"], 1);
    assert_eq!(body["documentsAnonymized"], 1);

    let response = server
        .get("/api/privacy/export")
        .add_query_param("personId", ADA)
        .await;
    let export: Value = response.json();
    assert!(export["documents"].as_array().unwrap().is_empty());

    let response = server.get("/api/privacy/export").await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

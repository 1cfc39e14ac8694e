use axum::{response::Html, routing::get, Router};
use tempfile::TempDir;

use expertise_graph::app::App;
use expertise_graph::config::Config;
use expertise_graph::expertise::{self, InterviewAnswer, InterviewRequest};
use expertise_graph::ingest::{self, IngestRequest};
use expertise_graph::privacy;
use expertise_graph_core::models::Visibility;
use expertise_graph_core::search::MatchFilter;
use expertise_graph_core::vector::DistanceMetric;

const ADA: &str = "6f1c2d1e-8a4b-4c3d-9e2f-0a1b2c3d4e5f";
const BOB: &str = "7a2b3c4d-5e6f-4a1b-8c2d-3e4f5a6b7c8d";

async fn open_app() -> (TempDir, App) {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::minimal(tmp.path().join("data/xg.sqlite"));
    config.retrieval.distance = DistanceMetric::Cosine;
    let app = App::open(config).await.unwrap();
    (tmp, app)
}

fn text_request(person: &str, title: &str, text: &str) -> IngestRequest {
    IngestRequest {
        person_id: person.to_string(),
        title: title.to_string(),
        text: Some(text.to_string()),
        url: None,
        visibility: Visibility::Team,
    }
}

/// Serve `html` on an ephemeral port and return the base URL.
async fn serve_html(html: &'static str) -> String {
    let router = Router::new().route("/page", get(move || async move { Html(html) }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_ingest_then_search_finds_document_and_expert() {
    let (tmp, app) = open_app().await;
    let kube = "Kubernetes operators reconcile Kubernetes clusters.";
    ingest::ingest_document(&app, text_request(ADA, "Operators", kube))
        .await
        .unwrap();
    ingest::ingest_document(
        &app,
        text_request(BOB, "Billing", "Invoices are generated nightly from usage ledgers."),
    )
    .await
    .unwrap();

    let response = app.engine.search_with_experts(kube, 1).await.unwrap();
    assert_eq!(response.snippets.len(), 1);
    assert_eq!(response.snippets[0].source, "Operators");
    assert!(response
        .candidate_topics
        .iter()
        .any(|t| t.name == "Kubernetes"));
    assert_eq!(response.experts[0].employee_id, ADA);

    // The first embedding pinned the width next to the database.
    let marker = std::fs::read_to_string(tmp.path().join("data/.embed_dim")).unwrap();
    assert_eq!(marker.trim(), "256");
    assert_eq!(app.store().vector_dim().await.unwrap(), Some(256));
}

#[tokio::test]
async fn test_search_on_empty_store() {
    let (_tmp, app) = open_app().await;
    let response = app
        .engine
        .search_with_experts("postgres replication lag", 5)
        .await
        .unwrap();
    assert!(response.snippets.is_empty());
    assert!(!response.candidate_topics.is_empty());
    assert!(response.experts.is_empty());

    let err = app.engine.search_with_experts("   ", 5).await.unwrap_err();
    assert_eq!(err.category(), "input_error");
    let err = app.engine.search_with_experts("x", 21).await.unwrap_err();
    assert_eq!(err.category(), "input_error");
}

#[tokio::test]
async fn test_ingest_from_url_strips_markup() {
    let (_tmp, app) = open_app().await;
    let base = serve_html(
        "<html><head><script>var secret = 1;</script></head>\
         <body><h1>Terraform</h1><p>Terraform modules provision networks.</p></body></html>",
    )
    .await;

    let out = ingest::ingest_document(
        &app,
        IngestRequest {
            person_id: ADA.to_string(),
            title: "Infra".to_string(),
            text: None,
            url: Some(format!("{}/page", base)),
            visibility: Visibility::Org,
        },
    )
    .await
    .unwrap();
    assert_eq!(out.chunk_count, 1);

    let export = privacy::export_person(&app, ADA).await.unwrap();
    assert_eq!(export.documents[0].source_url, Some(format!("{}/page", base)));
    assert!(export.snippets[0].text.contains("Terraform modules"));
    assert!(!export.snippets[0].text.contains("secret"));
    assert!(!export.snippets[0].text.contains('<'));
}

#[tokio::test]
async fn test_ingest_url_not_found_is_provider_error() {
    let (_tmp, app) = open_app().await;
    let base = serve_html("<p>unused</p>").await;
    let err = ingest::ingest_document(
        &app,
        IngestRequest {
            person_id: ADA.to_string(),
            title: "Missing".to_string(),
            text: None,
            url: Some(format!("{}/missing", base)),
            visibility: Visibility::Private,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.category(), "provider_error");
    assert_eq!(app.store().chunk_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_interview_feeds_matchmaking() {
    let (_tmp, app) = open_app().await;
    expertise::ingest_interview(
        &app,
        InterviewRequest {
            person_id: BOB.to_string(),
            answers: vec![InterviewAnswer {
                q: "What do you work on".to_string(),
                a: "Kafka consumers and Kafka partitions".to_string(),
            }],
        },
    )
    .await
    .unwrap();

    let out = app
        .engine
        .match_experts("Our Kafka consumers are lagging", &MatchFilter::default())
        .await
        .unwrap();
    assert!(out.topics.iter().any(|t| t.name == "Kafka"));
    assert_eq!(out.experts.len(), 1);
    assert_eq!(out.experts[0].employee_id, BOB);

    let strict = MatchFilter {
        min_score: Some(0.99),
        ..MatchFilter::default()
    };
    let out = app
        .engine
        .match_experts("Our Kafka consumers are lagging", &strict)
        .await
        .unwrap();
    assert!(out.experts.is_empty());
}

#[tokio::test]
async fn test_audit_log_records_ingest() {
    let tmp = TempDir::new().unwrap();
    let config = Config::minimal(tmp.path().join("xg.sqlite"));
    let pool_config = config.clone();
    let app = App::open(config).await.unwrap();
    ingest::ingest_document(&app, text_request(ADA, "Notes", "Grafana dashboards for latency."))
        .await
        .unwrap();

    let pool = expertise_graph::db::connect(&pool_config).await.unwrap();
    let actions: Vec<String> = sqlx::query_scalar("SELECT action FROM audit_log ORDER BY id")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert!(actions.contains(&"ingest".to_string()));
}

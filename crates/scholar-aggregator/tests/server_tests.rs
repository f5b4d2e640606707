//! HTTP API tests through the router, without a listening socket.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scholar_aggregator::config::Config;
use scholar_aggregator::llm::LlmClient;
use scholar_aggregator::search::SearchService;
use scholar_aggregator::server::{AppState, create_router};

fn router(mock_server: &MockServer, with_llm: bool) -> axum::Router {
    let config = Config::for_testing(&mock_server.uri());
    let search = SearchService::from_config(&config).unwrap();
    let llm = if with_llm { LlmClient::from_config(&config).unwrap() } else { None };
    create_router(Arc::new(AppState::new(search, llm)))
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let mock_server = MockServer::start().await;
    let response = router(&mock_server, false).oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["llm"], false);
    assert_eq!(body["sources"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_search_returns_merged_records() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/graph/v1/paper/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::s2_page(vec![
            common::s2_paper("a", "Low", 2020, 1),
            common::s2_paper("b", "High", 2020, 100),
        ])))
        .mount(&mock_server)
        .await;

    let body = serde_json::json!({
        "query": "anything",
        "filters": {"sources": ["semanticscholar"], "papers_limit": 10}
    });
    let response = router(&mock_server, false).oneshot(post_json("/api/search", &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let papers = body["papers"].as_array().unwrap();
    assert_eq!(papers.len(), 2);
    assert_eq!(papers[0]["id"], "b");
    assert_eq!(body["sentences"][0]["sources"][0]["status"], "success");
}

#[tokio::test]
async fn test_search_invalid_filter_is_400() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&mock_server).await;

    let body = serde_json::json!({"query": "x", "filters": {"jcr_quartile": ["Q7"]}});
    let response = router(&mock_server, false).oneshot(post_json("/api/search", &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("jcr_quartile"));
}

#[tokio::test]
async fn test_paper_detail_status_codes() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/graph/v1/paper/known"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::s2_paper("known", "Known", 2019, 5)))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/graph/v1/paper/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/graph/v1/paper/broken"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&mock_server)
        .await;

    let app = router(&mock_server, false);

    let ok = app.clone().oneshot(get("/api/paper/known?source=semanticscholar")).await.unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(body_json(ok).await["title"], "Known");

    let missing = app.clone().oneshot(get("/api/paper/gone?source=semanticscholar")).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let unknown = app.clone().oneshot(get("/api/paper/known?source=scopus")).await.unwrap();
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    let upstream = app.oneshot(get("/api/paper/broken?source=semanticscholar")).await.unwrap();
    assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_export_csv_endpoint() {
    let mock_server = MockServer::start().await;
    let body = serde_json::json!({
        "papers": [{
            "id": "1", "source": "pubmed", "title": "A title", "authors": ["X", "Y"], "year": 2020,
            "citation_count": 3
        }]
    });

    let response = router(&mock_server, false).oneshot(post_json("/api/export/csv", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/csv"));

    let text = body_text(response).await;
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("title,authors,year,venue,citations,impact_factor,jcr_quartile,cas_quartile,source,pdf_url")
    );
    assert_eq!(lines.next(), Some("A title,X; Y,2020,,3,N/A,N/A,N/A,pubmed,"));
}

#[tokio::test]
async fn test_strategy_requires_llm() {
    let mock_server = MockServer::start().await;
    let body = serde_json::json!({"query": "protein folding"});

    let response = router(&mock_server, false).oneshot(post_json("/api/strategy", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_strategy_with_llm() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llm/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant",
                "content": "1. Core keywords:\n- protein folding\n- AlphaFold\n2. Search strategy:\nprotein folding AlphaFold"}}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let body = serde_json::json!({"query": "how do proteins fold"});
    let response = router(&mock_server, true).oneshot(post_json("/api/strategy", &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["suggested_query"], "protein folding AlphaFold");
    assert_eq!(body["keywords"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_citation_graph_routes() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/graph/v1/paper/p1/citations"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"citingPaper": common::s2_paper("c1", "Citing", 2021, 2)}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/graph/v1/paper/p1/references"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = router(&mock_server, false);

    let citing = app.clone().oneshot(get("/api/citations/p1?source=semanticscholar&limit=5")).await.unwrap();
    assert_eq!(citing.status(), StatusCode::OK);
    let body = body_json(citing).await;
    assert_eq!(body[0]["id"], "c1");

    let cited = app.clone().oneshot(get("/api/references/p1?source=semanticscholar")).await.unwrap();
    assert_eq!(cited.status(), StatusCode::OK);
    assert_eq!(body_json(cited).await.as_array().unwrap().len(), 0);

    let arxiv = app.clone().oneshot(get("/api/citations/hep-th/9711200?source=arxiv")).await.unwrap();
    assert_eq!(arxiv.status(), StatusCode::OK);
    assert!(body_json(arxiv).await.as_array().unwrap().is_empty());

    let unknown = app.oneshot(get("/api/citations/p1?source=scopus")).await.unwrap();
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analyze_endpoint() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llm/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "## Summary\nA short paper."}}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let without_llm = router(&mock_server, false)
        .oneshot(post_json("/api/analyze", &serde_json::json!({"content": "text"})))
        .await
        .unwrap();
    assert_eq!(without_llm.status(), StatusCode::SERVICE_UNAVAILABLE);

    let app = router(&mock_server, true);
    let empty = app.clone().oneshot(post_json("/api/analyze", &serde_json::json!({"content": "  "}))).await.unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let response =
        app.oneshot(post_json("/api/analyze", &serde_json::json!({"content": "Full paper text"}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/markdown"));
    let text = body_text(response).await;
    assert!(text.starts_with("# Paper Summary"));
    assert!(text.contains("## Summary\nA short paper."));
}

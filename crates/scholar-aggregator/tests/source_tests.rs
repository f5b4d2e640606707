//! Mock-based tests for the source adapters.

mod common;

use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scholar_aggregator::config::Config;
use scholar_aggregator::error::SourceError;
use scholar_aggregator::models::{Filter, SourceKind, YearRange};
use scholar_aggregator::sources::{ArxivSource, PaperSource, PubMedSource, SemanticScholarSource};

// =============================================================================
// arXiv
// =============================================================================

#[tokio::test]
async fn test_arxiv_search_parses_feed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/arxiv/api/query"))
        .and(query_param("search_query", "(ti:transformer OR abs:transformer)"))
        .and(query_param("max_results", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_string(common::arxiv_feed(&[
            ("1706.03762v7", "Attention Is All You Need", "2017-06-12T17:57:34Z"),
            ("2005.14165v4", "Language Models are Few-Shot Learners", "2020-05-28T17:29:03Z"),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let source = ArxivSource::new(&Config::for_testing(&mock_server.uri())).unwrap();
    let filter = Filter { papers_limit: 5, ..Filter::default() };
    let records = source.search("transformer", &filter).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].source, SourceKind::Arxiv);
    assert_eq!(records[0].id, "1706.03762v7");
    assert_eq!(records[0].year, Some(2017));
    assert_eq!(records[1].pdf_url.as_deref(), Some("http://arxiv.org/pdf/2005.14165v4"));
}

#[tokio::test]
async fn test_arxiv_detail_missing_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/arxiv/api/query"))
        .and(query_param("id_list", "9999.99999"))
        .respond_with(ResponseTemplate::new(200).set_body_string(common::arxiv_feed(&[])))
        .mount(&mock_server)
        .await;

    let source = ArxivSource::new(&Config::for_testing(&mock_server.uri())).unwrap();
    let err = source.fetch_detail("9999.99999").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_empty_query_sends_nothing() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&mock_server).await;

    let config = Config::for_testing(&mock_server.uri());
    let filter = Filter::default();
    assert!(ArxivSource::new(&config).unwrap().search("   ", &filter).await.unwrap().is_empty());
    assert!(PubMedSource::new(&config).unwrap().search("", &filter).await.unwrap().is_empty());
    assert!(SemanticScholarSource::new(&config).unwrap().search(" ", &filter).await.unwrap().is_empty());
}

// =============================================================================
// PubMed
// =============================================================================

#[tokio::test]
async fn test_pubmed_search_keeps_esearch_order() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pubmed/esearch.fcgi"))
        .and(query_param("db", "pubmed"))
        .and(query_param("term", "crispr AND 2019:2021[dp]"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::esearch(&["222", "111"])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/pubmed/efetch.fcgi"))
        .and(query_param("id", "222,111"))
        .respond_with(ResponseTemplate::new(200).set_body_string(common::efetch(&[
            ("111", "First indexed", 2019),
            ("222", "Most relevant", 2021),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let source = PubMedSource::new(&Config::for_testing(&mock_server.uri())).unwrap();
    let filter = Filter { year_range: Some(YearRange::new(2019, 2021)), ..Filter::default() };
    let records = source.search("crispr", &filter).await.unwrap();

    let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["222", "111"]);
    assert_eq!(records[0].authors, vec!["Smith Jane"]);
    assert_eq!(records[0].issn.as_deref(), Some("0028-0836"));
}

#[tokio::test]
async fn test_pubmed_no_hits_skips_efetch() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pubmed/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::esearch(&[])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pubmed/efetch.fcgi"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let source = PubMedSource::new(&Config::for_testing(&mock_server.uri())).unwrap();
    assert!(source.search("nothing here", &Filter::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pubmed_sends_api_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pubmed/efetch.fcgi"))
        .and(query_param("api_key", "ncbi-key"))
        .respond_with(ResponseTemplate::new(200).set_body_string(common::efetch(&[("42", "Answer", 2001)])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = Config::for_testing(&mock_server.uri());
    config.pubmed.api_key = Some("ncbi-key".to_string());
    let record = PubMedSource::new(&config).unwrap().fetch_detail("42").await.unwrap();
    assert_eq!(record.title, "Answer");
}

// =============================================================================
// Semantic Scholar
// =============================================================================

#[tokio::test]
async fn test_semantic_scholar_search_with_pushdown() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/graph/v1/paper/search"))
        .and(query_param("query", "graph neural networks"))
        .and(query_param("year", "2018-2022"))
        .and(query_param("minCitationCount", "50"))
        .and(header("x-api-key", "s2-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::s2_page(vec![
            common::s2_paper("p1", "Graph Attention Networks", 2018, 9000),
            serde_json::json!({"paperId": null, "title": "dropped"}),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = Config::for_testing(&mock_server.uri());
    config.semantic_scholar.api_key = Some("s2-key".to_string());
    let source = SemanticScholarSource::new(&config).unwrap();
    let filter = Filter {
        year_range: Some(YearRange::new(2018, 2022)),
        min_citations: Some(50),
        ..Filter::default()
    };

    let records = source.search("graph neural networks", &filter).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].citation_count, Some(9000));
    assert_eq!(records[0].doi.as_deref(), Some("10.1234/p1"));
}

#[tokio::test]
async fn test_semantic_scholar_detail_404() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/graph/v1/paper/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({"error": "Paper not found"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let source = SemanticScholarSource::new(&Config::for_testing(&mock_server.uri())).unwrap();
    let err = source.fetch_detail("missing").await.unwrap_err();
    assert!(matches!(err, SourceError::NotFound { .. }));
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/graph/v1/paper/search"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&mock_server)
        .await;

    let source = SemanticScholarSource::new(&Config::for_testing(&mock_server.uri())).unwrap();
    let err = source.search("x", &Filter::default()).await.unwrap_err();
    assert!(matches!(err, SourceError::Unauthorized { status: 403 }));
}

// =============================================================================
// Citation graph
// =============================================================================

#[tokio::test]
async fn test_semantic_scholar_citations_and_references() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/graph/v1/paper/p1/citations"))
        .and(query_param("limit", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "offset": 0,
            "data": [
                {"citingPaper": common::s2_paper("c1", "Follow-up work", 2022, 3)},
                {"citingPaper": {"paperId": null, "title": "Unresolved"}}
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/graph/v1/paper/p1/references"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {"citedPaper": common::s2_paper("r1", "Prior work", 2015, 900)},
                {"citedPaper": common::s2_paper("r2", "Older work", 2010, 50)}
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let source = SemanticScholarSource::new(&Config::for_testing(&mock_server.uri())).unwrap();

    let citing = source.citations("p1", 5000).await.unwrap();
    assert_eq!(citing.len(), 1);
    assert_eq!(citing[0].id, "c1");
    assert_eq!(citing[0].source, SourceKind::SemanticScholar);

    let cited = source.references("p1", 2).await.unwrap();
    let ids: Vec<&str> = cited.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["r1", "r2"]);
}

#[tokio::test]
async fn test_semantic_scholar_citations_unknown_paper() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/graph/v1/paper/missing/citations"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let source = SemanticScholarSource::new(&Config::for_testing(&mock_server.uri())).unwrap();
    let err = source.citations("missing", 10).await.unwrap_err();
    assert!(matches!(err, SourceError::NotFound { .. }));
}

#[tokio::test]
async fn test_arxiv_and_pubmed_have_no_citation_graph() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&mock_server).await;

    let config = Config::for_testing(&mock_server.uri());
    let arxiv = ArxivSource::new(&config).unwrap();
    let pubmed = PubMedSource::new(&config).unwrap();

    assert!(arxiv.citations("1706.03762", 10).await.unwrap().is_empty());
    assert!(pubmed.references("34265844", 10).await.unwrap().is_empty());
}

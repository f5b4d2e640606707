//! Shared fixtures for integration tests.
#![allow(dead_code)]

use serde_json::json;

/// Semantic Scholar paper JSON.
pub fn s2_paper(id: &str, title: &str, year: i32, citations: u32) -> serde_json::Value {
    json!({
        "paperId": id,
        "title": title,
        "abstract": format!("Abstract about {title}"),
        "year": year,
        "citationCount": citations,
        "authors": [
            {"authorId": "a1", "name": "Alice Researcher"},
            {"authorId": "a2", "name": "Bob Scientist"}
        ],
        "venue": "Nature",
        "openAccessPdf": null,
        "externalIds": {"DOI": format!("10.1234/{id}")},
        "url": format!("https://www.semanticscholar.org/paper/{id}")
    })
}

/// Semantic Scholar search page.
pub fn s2_page(papers: Vec<serde_json::Value>) -> serde_json::Value {
    json!({"total": papers.len(), "offset": 0, "data": papers})
}

/// PubMed esearch JSON for the given PMIDs.
pub fn esearch(pmids: &[&str]) -> serde_json::Value {
    json!({
        "header": {"type": "esearch", "version": "0.3"},
        "esearchresult": {"count": pmids.len().to_string(), "retmax": "20", "idlist": pmids}
    })
}

/// PubMed efetch XML with one article per `(pmid, title, year)`.
pub fn efetch(articles: &[(&str, &str, i32)]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<PubmedArticleSet>\n");
    for (pmid, title, year) in articles {
        xml.push_str(&format!(
            "<PubmedArticle><MedlineCitation><PMID>{pmid}</PMID><Article>\
             <Journal><ISSN>0028-0836</ISSN><JournalIssue><PubDate><Year>{year}</Year></PubDate></JournalIssue>\
             <Title>Nature</Title></Journal>\
             <ArticleTitle>{title}</ArticleTitle>\
             <AuthorList><Author><LastName>Smith</LastName><ForeName>Jane</ForeName></Author></AuthorList>\
             </Article></MedlineCitation></PubmedArticle>\n"
        ));
    }
    xml.push_str("</PubmedArticleSet>");
    xml
}

/// arXiv Atom feed with one entry per `(id, title, published)`.
pub fn arxiv_feed(entries: &[(&str, &str, &str)]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<feed xmlns=\"http://www.w3.org/2005/Atom\" xmlns:arxiv=\"http://arxiv.org/schemas/atom\">\n",
    );
    for (id, title, published) in entries {
        xml.push_str(&format!(
            "<entry><id>http://arxiv.org/abs/{id}</id><published>{published}</published>\
             <title>{title}</title><summary>Summary of {title}</summary>\
             <author><name>Carol Theorist</name></author>\
             <link title=\"pdf\" href=\"http://arxiv.org/pdf/{id}\" rel=\"related\" type=\"application/pdf\"/>\
             </entry>\n"
        ));
    }
    xml.push_str("</feed>");
    xml
}

//! Query assistant backed by an OpenAI-compatible chat completions API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::SourceClient;
use crate::config::Config;
use crate::error::LlmError;
use crate::models::PaperRecord;

const SEARCH_EXPERT_PROMPT: &str = "As an academic literature search expert, design a search strategy for the research topic below.

Research topic: {topic}

Requirements:
1. Extract the 2-3 most essential English keywords or phrases
2. Keep keywords short and precise
3. Prefer established terminology of the field
4. Do not use boolean operators such as AND or OR

Answer in exactly this format:

1. Core keywords:
- keyword one
- keyword two
2. Search strategy:
combined search phrase";

const PAPER_ANALYSIS_PROMPT: &str = "# Role
You are a research assistant who reads papers, summarizes them and proposes improvements.

# Goal
Read and understand the paper below, then write a report in markdown covering:
- the structure and content of the paper
- the key techniques and how the described methods are implemented; write formulas in LaTeX and diagrams in mermaid
- the results the authors achieve
- a critique of the paper and a concrete, feasible improvement plan with its theoretical justification

Output raw markdown only.

# Paper content
{content}";

const TEMPERATURE: f32 = 0.7;
const STRATEGY_MAX_TOKENS: u32 = 2000;
const ANALYSIS_MAX_TOKENS: u32 = 4000;
const JUDGE_MAX_TOKENS: u32 = 16;

/// Keywords and a combined query suggested for a research topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStrategy {
    /// Full completion text.
    pub raw: String,
    /// Bullet items of the answer.
    pub keywords: Vec<String>,
    /// Phrase to feed into a search.
    pub suggested_query: String,
}

impl SearchStrategy {
    /// Extract keywords and the suggested query from a completion.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let keywords: Vec<String> = raw
            .lines()
            .map(str::trim)
            .filter_map(|line| line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")))
            .map(|item| item.trim().trim_matches(|c| c == '[' || c == ']').trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();

        let mut lines = raw.lines().map(str::trim);
        let mut suggested = None;
        while let Some(line) = lines.next() {
            if line.to_lowercase().contains("search strategy") {
                let inline = line.split_once(':').map(|(_, rest)| rest.trim()).unwrap_or_default();
                suggested = if inline.is_empty() {
                    lines.find(|l| !l.is_empty()).map(str::to_string)
                } else {
                    Some(inline.to_string())
                };
                break;
            }
        }

        let suggested_query = suggested
            .map(|q| q.trim_matches(|c| c == '[' || c == ']' || c == '"').trim().to_string())
            .filter(|q| !q.is_empty())
            .unwrap_or_else(|| keywords.join(" "));

        Self { raw: raw.to_string(), keywords, suggested_query }
    }
}

/// Decides whether a paper belongs to a research domain.
#[async_trait::async_trait]
pub trait RelevanceJudge: Send + Sync {
    /// True when `record` belongs to `domain`.
    async fn judge(&self, record: &PaperRecord, domain: &str) -> Result<bool, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Chat completions client.
#[derive(Clone)]
pub struct LlmClient {
    client: SourceClient,
    url: String,
    model: String,
    api_key: String,
}

impl LlmClient {
    /// Create a client, or `Ok(None)` when no API key is configured.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn from_config(config: &Config) -> anyhow::Result<Option<Self>> {
        let settings = &config.llm;
        let Some(api_key) = settings.endpoint.api_key.clone() else {
            return Ok(None);
        };

        let mut llm_config = config.clone();
        llm_config.request_timeout = config.llm_timeout;

        Ok(Some(Self {
            client: SourceClient::new("llm", &settings.endpoint, &llm_config)?,
            url: format!("{}/chat/completions", settings.endpoint.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key,
        }))
    }

    /// Model name sent with each request.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one user message and return the reply text.
    pub async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            temperature: TEMPERATURE,
            max_tokens,
        };

        let response: ChatResponse = self.client.post_json(&self.url, &request, Some(&self.api_key)).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    /// Ask for keywords and a combined search phrase for `topic`.
    pub async fn generate_search_strategy(&self, topic: &str) -> Result<SearchStrategy, LlmError> {
        let prompt = SEARCH_EXPERT_PROMPT.replace("{topic}", topic.trim());
        let raw = self.complete(&prompt, STRATEGY_MAX_TOKENS).await?;
        let strategy = SearchStrategy::parse(&raw);
        tracing::info!(keywords = strategy.keywords.len(), query = %strategy.suggested_query, "Generated search strategy");
        Ok(strategy)
    }

    /// Summarize and critique a paper's full text as a markdown report.
    pub async fn analyze_paper(&self, content: &str) -> Result<String, LlmError> {
        if content.trim().is_empty() {
            return Err(LlmError::EmptyInput);
        }

        let prompt = PAPER_ANALYSIS_PROMPT.replace("{content}", content.trim());
        let raw = self.complete(&prompt, ANALYSIS_MAX_TOKENS).await?;
        let report = format_analysis(&raw, Utc::now());
        tracing::info!(input_chars = content.len(), report_chars = report.len(), "Analyzed paper");
        Ok(report)
    }
}

/// Strip a surrounding markdown code fence and prepend the report header.
#[must_use]
pub fn format_analysis(raw: &str, generated_at: DateTime<Utc>) -> String {
    let mut body = raw.trim();
    for fence in ["```markdown", "```md", "```"] {
        if let Some(rest) = body.strip_prefix(fence) {
            if rest.starts_with('\n') || rest.starts_with("\r\n") {
                body = rest.trim_start();
                break;
            }
        }
    }
    body = body.strip_suffix("```").map_or(body, str::trim_end);

    format!(
        "# Paper Summary\n\n> Generated: {}\n\n{}\n",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        body
    )
}

fn judge_prompt(record: &PaperRecord, domain: &str) -> String {
    format!(
        "Decide whether the following paper belongs to the field of {domain}.\n\
         Title: {}\n\
         Authors: {}\n\
         Abstract: {}\n\
         Year: {}\n\
         Venue: {}\n\
         Answer with only True or False.",
        record.title,
        record.author_names(),
        record.abstract_text.as_deref().unwrap_or_default(),
        record.year.map(|y| y.to_string()).unwrap_or_default(),
        record.venue.as_deref().unwrap_or_default(),
    )
}

/// True iff the reply is `true`, ignoring case and surrounding whitespace.
#[must_use]
pub fn parse_verdict(reply: &str) -> bool {
    reply.trim().eq_ignore_ascii_case("true")
}

#[async_trait::async_trait]
impl RelevanceJudge for LlmClient {
    async fn judge(&self, record: &PaperRecord, domain: &str) -> Result<bool, LlmError> {
        let reply = self.complete(&judge_prompt(record, domain), JUDGE_MAX_TOKENS).await?;
        let verdict = parse_verdict(&reply);
        tracing::debug!(title = %record.title, domain, verdict, "Judged relevance");
        Ok(verdict)
    }
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient").field("url", &self.url).field("model", &self.model).finish()
    }
}

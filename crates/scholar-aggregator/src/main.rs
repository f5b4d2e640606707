//! Scholar Aggregator - Entry Point
//!
//! Runs the HTTP API or one-shot search, export and validation commands.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use scholar_aggregator::{
    Config, DomainValidator, ExportOptions, Exporter, Filter, LlmClient, PaperRecord, SearchRequest,
    SearchResponse, SearchService, SourceKind, YearRange,
    config::api,
    search::{CitationDirection, ProgressEvent},
    server::ApiServer,
};

#[derive(Parser, Debug)]
#[command(name = "scholar-aggregator")]
#[command(about = "Search arXiv, PubMed and Semantic Scholar at once")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: std::net::IpAddr,

        #[arg(long, default_value = "8000", env = "PORT")]
        port: u16,
    },

    /// Search every enabled source and print the merged results
    Search {
        /// Free-text query; sentences are searched separately
        query: String,

        #[command(flatten)]
        filter: FilterArgs,

        /// Write the results to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Also download PDFs (requires --csv)
        #[arg(long, requires = "csv")]
        download: bool,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch one paper by id
    Paper {
        id: String,

        /// arxiv, pubmed or semanticscholar
        #[arg(long)]
        source: SourceKind,
    },

    /// List papers citing one paper, or the papers it references
    Citations {
        id: String,

        /// arxiv, pubmed or semanticscholar
        #[arg(long, default_value = "semanticscholar")]
        source: SourceKind,

        /// Follow references instead of citations
        #[arg(long)]
        references: bool,

        /// Maximum papers returned
        #[arg(long, default_value_t = api::DEFAULT_CITATION_LIMIT)]
        limit: usize,

        /// Print the records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export papers saved with `search --json` to CSV and download their PDFs
    Export {
        /// JSON file holding a search response or an array of papers
        input: PathBuf,

        /// CSV destination
        #[arg(long, default_value = "papers.csv")]
        csv: PathBuf,

        /// Skip PDF downloads
        #[arg(long)]
        no_pdfs: bool,
    },

    /// Split a CSV into in-domain and excluded rows using the LLM
    Validate {
        csv: PathBuf,

        /// Research domain the papers should belong to
        #[arg(long)]
        domain: String,
    },

    /// Ask the LLM for keywords and a search phrase
    Strategy { topic: String },

    /// Summarize and critique a paper's extracted text with the LLM
    Analyze {
        /// Plain-text file holding the paper content
        input: PathBuf,

        /// Write the markdown report here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct FilterArgs {
    /// Maximum papers kept per sentence
    #[arg(long, default_value = "100")]
    limit: usize,

    /// Minimum journal impact factor
    #[arg(long)]
    min_if: Option<f64>,

    /// First publication year (inclusive)
    #[arg(long, requires = "year_to")]
    year_from: Option<i32>,

    /// Last publication year (inclusive)
    #[arg(long, requires = "year_from")]
    year_to: Option<i32>,

    /// Accepted JCR quartiles, e.g. Q1
    #[arg(long = "jcr", value_delimiter = ',')]
    jcr_quartile: Vec<String>,

    /// Accepted CAS divisions, e.g. B1
    #[arg(long = "cas", value_delimiter = ',')]
    cas_quartile: Vec<String>,

    /// Minimum citation count
    #[arg(long)]
    min_citations: Option<u32>,

    /// Sources to query
    #[arg(long, value_delimiter = ',', default_value = "pubmed,semanticscholar")]
    sources: Vec<SourceKind>,
}

impl From<FilterArgs> for Filter {
    fn from(args: FilterArgs) -> Self {
        Self {
            papers_limit: args.limit,
            min_if: args.min_if,
            year_range: args.year_from.zip(args.year_to).map(|(a, b)| YearRange::new(a, b)),
            jcr_quartile: args.jcr_quartile,
            cas_quartile: args.cas_quartile,
            min_citations: args.min_citations,
            sources: args.sources,
        }
    }
}

/// Input accepted by the export command.
#[derive(Deserialize)]
#[serde(untagged)]
enum SavedPapers {
    Response(SearchResponse),
    Papers(Vec<PaperRecord>),
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr)).init();
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, stopping");
            token.cancel();
        }
    });
    cancel
}

fn print_papers(papers: &[PaperRecord]) {
    for (rank, paper) in papers.iter().enumerate() {
        println!(
            "{:>3}. [{}] {} ({}) - {} citations",
            rank + 1,
            paper.source.display_name(),
            paper.title,
            paper.year.map(|y| y.to_string()).unwrap_or_else(|| "n.d.".to_string()),
            paper.citations(),
        );
        if let Some(venue) = &paper.venue {
            println!("     {venue}");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting scholar-aggregator");

    let config = Config::from_env()?;
    let cancel = cancel_on_ctrl_c();

    match cli.command {
        Command::Serve { host, port } => {
            let server = ApiServer::from_config(&config)?;
            server.run_http(SocketAddr::new(host, port), cancel).await?;
        }
        Command::Search { query, filter, csv, download, json } => {
            let service = SearchService::from_config(&config)?;
            let request = SearchRequest::new(query, filter.into());

            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let progress = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    match event {
                        ProgressEvent::SentenceStarted { index, total, sentence } => {
                            tracing::info!(sentence = %sentence, "Searching sentence {}/{}", index + 1, total);
                        }
                        ProgressEvent::SourceCompleted { source, count, .. } => {
                            tracing::info!(source = source.display_name(), count, "Source answered");
                        }
                        ProgressEvent::SourceFailed { source, reason, .. } => {
                            tracing::warn!(source = source.display_name(), %reason, "Source failed");
                        }
                        ProgressEvent::SentenceFinished { kept, .. } => {
                            tracing::info!(kept, "Sentence merged");
                        }
                    }
                }
            });

            let response = service
                .search(&request, Some(&tx), &cancel)
                .await
                .map_err(|e| anyhow::anyhow!(e.to_user_message()))?;
            drop(tx);
            let _ = progress.await;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_papers(&response.papers);
                for (kind, summary) in &response.sources {
                    if let Some(error) = &summary.last_error {
                        eprintln!("{} failed {} time(s): {error}", kind.display_name(), summary.failed);
                    }
                }
            }

            if let Some(csv_path) = csv {
                let exporter = Exporter::new(&config)?;
                let mut options = ExportOptions::from_config(&config, csv_path);
                options.download_pdfs = download;
                let summary = exporter.run(&response.papers, &options, &cancel).await?;
                eprintln!("{}", serde_json::to_string_pretty(&summary)?);
            }
        }
        Command::Paper { id, source } => {
            let service = SearchService::from_config(&config)?;
            let record =
                service.fetch_detail(source, &id).await.map_err(|e| anyhow::anyhow!(e.to_user_message()))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Citations { id, source, references, limit, json } => {
            let service = SearchService::from_config(&config)?;
            let direction = if references { CitationDirection::References } else { CitationDirection::Citations };
            let records = service
                .citation_graph(source, &id, direction, limit)
                .await
                .map_err(|e| anyhow::anyhow!(e.to_user_message()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                eprintln!("No {direction} found for {} paper {id}", source.display_name());
            } else {
                print_papers(&records);
            }
        }
        Command::Export { input, csv, no_pdfs } => {
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let papers = match serde_json::from_str::<SavedPapers>(&raw)
                .with_context(|| format!("parsing {}", input.display()))?
            {
                SavedPapers::Response(response) => response.papers,
                SavedPapers::Papers(papers) => papers,
            };

            let exporter = Exporter::new(&config)?;
            let mut options = ExportOptions::from_config(&config, csv);
            options.download_pdfs = !no_pdfs;
            let summary = exporter.run(&papers, &options, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Validate { csv, domain } => {
            let llm = LlmClient::from_config(&config)?.context("LLM_API_KEY is not set")?;
            let validator = DomainValidator::new(Arc::new(llm), config.validate_workers);
            let report = validator.validate_csv(&csv, &domain, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Strategy { topic } => {
            let llm = LlmClient::from_config(&config)?.context("LLM_API_KEY is not set")?;
            let strategy = llm.generate_search_strategy(&topic).await?;
            println!("{}", strategy.raw.trim());
            println!();
            println!("Suggested query: {}", strategy.suggested_query);
        }
        Command::Analyze { input, output } => {
            let llm = LlmClient::from_config(&config)?.context("LLM_API_KEY is not set")?;
            let content = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let report = llm.analyze_paper(&content).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &report).with_context(|| format!("writing {}", path.display()))?;
                    tracing::info!(path = %path.display(), "Wrote analysis report");
                }
                None => println!("{report}"),
            }
        }
    }

    Ok(())
}

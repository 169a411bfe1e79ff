//! CLI parsing and orchestration. Parses args, merges recipe, config and flags into a crawl
//! request, runs both crawl stages and assembles the output. Maps errors to exit codes.

use crate::assemble::assemble;
use crate::config::{self, Config};
use crate::crawler::{crawl, crawl_toc, CrawlError, HttpFetcher, PageFetcher};
use crate::epub::EpubError;
use crate::model::TableOfContents;
use crate::progress::ProgressSink;
use crate::recipe::{load_recipe, Recipe, RecipeError};
use crate::request::{ConfigError, CrawlRequest, DEFAULT_CHARSET};
use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Recipe(#[from] RecipeError),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Crawl(#[from] CrawlError),

    #[error("{0}")]
    Epub(#[from] EpubError),

    #[error("{0}")]
    Output(String),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) | CliRunError::Recipe(_) | CliRunError::Config(_) => 1,
            CliRunError::Crawl(_) => 2,
            CliRunError::Epub(_) | CliRunError::Output(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "serialscrape")]
#[command(about = "Crawl a web-serialized book with CSS extraction rules and write EPUB")]
#[command(
    after_help = "Config file keys (output_dir, user_agent, timeout_secs, concurrency, charset, markdown, front_matter, ncx) are read from ./serialscrape.toml or the user config directory. Recipe values override config; CLI flags override both."
)]
pub struct Args {
    /// Recipe file (TOML) with book metadata and extraction rules.
    pub recipe: PathBuf,

    /// Listing page URL. Repeat for multi-page listings; replaces the recipe's urls.
    #[arg(long = "url", value_name = "URL")]
    pub urls: Vec<String>,

    /// Book title (overrides recipe).
    #[arg(long)]
    pub title: Option<String>,

    /// Book author (overrides recipe).
    #[arg(long)]
    pub author: Option<String>,

    /// Cover image URL (overrides recipe).
    #[arg(long)]
    pub cover: Option<String>,

    /// Output directory. Default: config output_dir, else the current directory.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Charset of fetched pages, e.g. gbk (overrides recipe and config; default utf-8).
    #[arg(long)]
    pub charset: Option<String>,

    /// Maximum requests in flight per stage (overrides config; default 50).
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Request timeout in seconds (overrides config; default 20).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Also write a markdown summary and one markdown file per chapter.
    #[arg(long)]
    pub markdown: bool,

    /// Prefix the markdown summary with YAML front matter.
    #[arg(long)]
    pub front_matter: bool,

    /// Include toc.ncx in the EPUB for legacy readers.
    #[arg(long)]
    pub ncx: bool,

    /// Fetch the table of contents only and print it without writing.
    #[arg(long)]
    pub dry_run: bool,

    /// With --dry-run, print the table of contents as JSON.
    #[arg(long, requires = "dry_run")]
    pub json: bool,

    /// Suppress progress output (warnings and errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug logging and the full error chain.
    #[arg(long)]
    pub verbose: bool,
}

/// Merge flags over recipe over config into a validated request.
fn build_request(
    args: &Args,
    recipe: &Recipe,
    config: Option<&Config>,
) -> Result<CrawlRequest, CliRunError> {
    let urls = if args.urls.is_empty() {
        recipe.urls.clone()
    } else {
        args.urls.clone()
    };
    let charset = args
        .charset
        .clone()
        .or_else(|| recipe.charset.clone())
        .or_else(|| config.and_then(|c| c.charset.clone()))
        .unwrap_or_else(|| DEFAULT_CHARSET.to_string());
    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| config.and_then(|c| c.output_dir.clone()))
        .unwrap_or_else(|| PathBuf::from("."));

    let mut builder = CrawlRequest::builder()
        .listing_urls(urls)
        .extractor(recipe.extractor()?)
        .output_dir(output_dir)
        .charset(charset)
        .emit_markdown(args.markdown || config.and_then(|c| c.markdown).unwrap_or(false))
        .emit_front_matter(
            args.front_matter || config.and_then(|c| c.front_matter).unwrap_or(false),
        )
        .epub_ncx(args.ncx || config.and_then(|c| c.ncx).unwrap_or(false));

    if let Some(title) = args.title.as_ref().or(recipe.title.as_ref()) {
        builder = builder.title(title.as_str());
    }
    if let Some(author) = args.author.as_ref().or(recipe.author.as_ref()) {
        builder = builder.author(author.as_str());
    }
    if let Some(cover) = args.cover.as_ref().or(recipe.cover.as_ref()) {
        builder = builder.cover_url(cover.as_str());
    }
    if let Some(n) = args.concurrency.or_else(|| config.and_then(|c| c.concurrency)) {
        builder = builder.concurrency(n);
    }
    if let Some(secs) = args.timeout.or_else(|| config.and_then(|c| c.timeout_secs)) {
        builder = builder.timeout_secs(secs);
    }
    if let Some(ua) = args
        .user_agent
        .clone()
        .or_else(|| config.and_then(|c| c.user_agent.clone()))
    {
        builder = builder.user_agent(ua);
    }
    Ok(builder.build()?)
}

fn build_fetcher(request: &CrawlRequest) -> Result<HttpFetcher, CliRunError> {
    let mut builder = HttpFetcher::builder(request.encoding()).timeout_secs(request.timeout_secs());
    if let Some(ua) = request.user_agent() {
        builder = builder.user_agent(ua);
    }
    builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
}

/// Dry-run listing: one `title<TAB>url` line per chapter, indented by level, or a JSON array.
fn render_toc(toc: &TableOfContents, json: bool) -> Result<String, CliRunError> {
    if json {
        return serde_json::to_string_pretty(toc)
            .map_err(|e| CliRunError::Output(format!("Failed to serialize table of contents: {}", e)));
    }
    let mut out = String::new();
    for chapter in &toc.chapters {
        out.push_str(&"  ".repeat(chapter.level as usize));
        out.push_str(&format!("{}\t{}\n", chapter.title, chapter.url));
    }
    Ok(out)
}

async fn execute(
    args: &Args,
    request: &CrawlRequest,
    fetcher: &dyn PageFetcher,
    sink: &dyn ProgressSink,
) -> Result<(), CliRunError> {
    if args.dry_run {
        let toc = crawl_toc(request, fetcher).await?;
        print!("{}", render_toc(&toc, args.json)?);
        if !args.json {
            eprintln!("Chapters: {}", toc.len());
            eprintln!("Output: {}", request.output_path("epub").display());
        }
        return Ok(());
    }

    let toc = crawl(request, fetcher, sink).await?;
    let report = assemble(request, &toc, fetcher).await;
    let failed_writes = report.write_errors.len();
    report.epub?;
    if failed_writes > 0 {
        return Err(CliRunError::Output(format!(
            "{} markdown file(s) could not be written",
            failed_writes
        )));
    }
    if !args.quiet {
        eprintln!(
            "Wrote {} ({} chapters, {} missing)",
            report.epub_path.display(),
            report.manifest.chapters.len(),
            toc.missing_count()
        );
    }
    Ok(())
}

/// Entry point for the CLI. `sink` receives chapter progress. Returns Ok(()) on success; Err
/// with exit code and message on failure.
pub fn run(args: &Args, sink: &dyn ProgressSink) -> Result<(), CliRunError> {
    let recipe = load_recipe(&args.recipe)?;
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let request = build_request(args, &recipe, config.as_ref())?;
    tracing::debug!(?request, "crawl request");
    let fetcher = build_fetcher(&request)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to start async runtime: {}", e)))?;

    runtime.block_on(execute(args, &request, &fetcher, sink))
}

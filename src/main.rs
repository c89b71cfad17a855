//! Vantage main entry point
//!
//! Command-line surface for the crawl engine: option parsing, startup
//! validation, session bookkeeping and exit codes. Configuration and
//! usage problems exit non-zero before any crawling starts; a user
//! interrupt is a graceful stop, not a failure.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use url::Url;
use vantage::config::{self, generate_random_seed, Options, OutputMode, ScopeMode};
use vantage::crawler::{self, adjust_requests, is_crawlable, SeedContext};
use vantage::fetch;
use vantage::model::{Request, RequestType};
use vantage::storage::{CrawlStore, SessionInfo};

/// Vantage: rendering-probe driven web reconnaissance crawler
#[derive(Parser, Debug)]
#[command(name = "vantage")]
#[command(version)]
#[command(about = "Crawl a web application through a rendering probe", long_about = None)]
struct Cli {
    /// Start URL
    url: String,

    /// Output crawl store (SQLite file)
    outfile: PathBuf,

    /// Behavior when OUTFILE exists: rename, overwrite, resume, complete
    #[arg(short = 'o', long, default_value = "rename")]
    output_mode: String,

    /// Crawl mode: passive, active, aggressive
    #[arg(short = 'm', long, default_value = "aggressive")]
    mode: String,

    /// Crawl scope: domain, directory, url
    #[arg(short = 's', long, default_value = "domain")]
    scope: String,

    /// Maximum crawl depth
    #[arg(short = 'D', long, default_value_t = 100)]
    max_depth: u32,

    /// Maximum crawl depth for consecutive forms
    #[arg(short = 'P', long, default_value_t = 10)]
    max_post_depth: u32,

    /// Maximum number of redirects to follow
    #[arg(short = 'R', long, default_value_t = 10)]
    max_redirects: u32,

    /// Even in aggressive mode, do not crawl forms
    #[arg(short = 'F', long)]
    no_forms: bool,

    /// Comma separated list of allowed domains (e.g. *.target.com)
    #[arg(short = 'd', long)]
    domains: Option<String>,

    /// Cookies as JSON or name=value pairs separated by semicolon
    #[arg(short = 'c', long)]
    cookies: Option<String>,

    /// Path to a file containing cookies
    #[arg(short = 'C', long)]
    cookie_file: Option<PathBuf>,

    /// Initial referer
    #[arg(short = 'r', long)]
    referer: Option<String>,

    /// Comma separated list of url regexes to exclude (e.g. logout urls)
    #[arg(short = 'x', long)]
    excluded: Option<String>,

    /// Proxy string proto:host:port (http or socks5)
    #[arg(short = 'p', long)]
    proxy: Option<String>,

    /// Number of parallel workers
    #[arg(short = 'n', long, default_value_t = 10)]
    workers: usize,

    /// Username and password for HTTP authentication, colon separated
    #[arg(short = 'A', long)]
    http_auth: Option<String>,

    /// User agent
    #[arg(short = 'U', long)]
    user_agent: Option<String>,

    /// Maximum seconds spent to analyze a page
    #[arg(short = 't', long, default_value_t = 300)]
    timeout: u64,

    /// Skip the initial seed checks
    #[arg(short = 'S', long)]
    skip_checks: bool,

    /// Group query-string parameters with the same name ('[]' names excluded)
    #[arg(short = 'G', long)]
    group_qs: bool,

    /// Do not read robots.txt of the start url
    #[arg(short = 'I', long)]
    ignore_robots: bool,

    /// Don't override page timer functions (setTimeout, setInterval)
    #[arg(short = 'O', long)]
    keep_timers: bool,

    /// Seed used to generate strings during the crawl
    #[arg(short = 'e', long)]
    seed: Option<String>,

    /// Suppress children of near-duplicate pages
    #[arg(long)]
    skip_duplicates: bool,

    /// Disable the direct-fetch fallback on probe failure
    #[arg(long)]
    no_probe_fallback: bool,

    /// Probe command: binary plus fixed arguments
    #[arg(long, default_value = "node probe/index.js")]
    probe: String,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };

    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

/// Sets up the tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("vantage=info,warn"),
            1 => EnvFilter::new("vantage=debug,info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let commandline = std::env::args().skip(1).collect::<Vec<_>>().join(" ");

    let seed_url = normalize_seed_url(&cli.url)?;
    let options = Arc::new(build_options(&cli, &seed_url)?);
    options.validate()?;

    if !cli.domains.as_deref().unwrap_or("").is_empty() && options.scope != ScopeMode::Domain {
        tracing::warn!("option -d is only meaningful with domain scope");
    }

    // cookie input: -c string or -C file, file problems are fatal
    let cookie_string = match (&cli.cookies, &cli.cookie_file) {
        (Some(s), _) => Some(s.clone()),
        (None, Some(path)) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("error reading cookie file {}", path.display()))?,
        ),
        (None, None) => None,
    };
    let mut start_cookies = match cookie_string {
        Some(s) => config::parse_cookie_string(&s, seed_url.as_str())
            .context("error decoding cookie string")?,
        None => Vec::new(),
    };

    let store = CrawlStore::prepare(&cli.outfile, options.output_mode)
        .context("unable to prepare crawl store")?;
    tracing::info!("crawl store: {}", store.path().display());

    // session bookkeeping; a reopened store passes its previous seed and
    // cookies on so fuzz values and auth state stay stable
    let session_id = store.save_session(&SessionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        target: seed_url.to_string(),
        commandline,
        user_agent: options.user_agent.clone(),
        random_seed: cli.seed.clone().unwrap_or_default(),
        start_cookies: start_cookies.clone(),
    })?;

    let mut random_seed = cli.seed.clone().unwrap_or_default();
    if session_id > 1 {
        let inherited = store.inherited_session(session_id - 1)?;
        if random_seed.is_empty() {
            random_seed = inherited.random_seed.unwrap_or_default();
        }
        if start_cookies.is_empty() {
            if let Some(cookies) = inherited.end_cookies {
                if cookies != "[]" && !cookies.is_empty() {
                    start_cookies = config::parse_cookie_string(&cookies, seed_url.as_str())
                        .context("error decoding inherited cookies")?;
                }
            }
        }
    }
    if random_seed.is_empty() {
        random_seed = generate_random_seed();
    }
    let options = Arc::new(Options {
        random_seed,
        ..(*options).clone()
    });

    let mut seed_request = Request::root(RequestType::Link, "GET", seed_url.to_string())
        .with_cookies(start_cookies);
    seed_request.http_auth = cli.http_auth.clone();
    seed_request.referer = cli.referer.clone();

    // the seed must resolve and serve html; anything else aborts the run
    let check_client = fetch::build_client(&options, true)?;
    if !cli.skip_checks {
        fetch::seed_check(&check_client, &seed_request).await?;
    }

    let seed_ctx = Arc::new(SeedContext::new(seed_url));
    let (start_requests, done_requests) =
        assemble_start_requests(&cli, &options, &store, &seed_ctx, seed_request, &check_client)
            .await?;

    tracing::info!(
        "{} starting url(s), {} url(s) already crawled",
        start_requests.len(),
        done_requests.len()
    );
    tracing::info!("crawl starting with {} workers", options.num_workers);

    let summary = crawler::run_crawl(
        Arc::clone(&options),
        &store,
        seed_ctx,
        start_requests,
        done_requests,
    )
    .await?;

    store.finalize_session(session_id, &options.random_seed, &summary.end_cookies)?;

    println!(
        "Crawl {}: {} pages analyzed, store written to {}",
        if summary.interrupted { "interrupted" } else { "finished" },
        summary.completed,
        store.path().display()
    );
    Ok(())
}

/// Builds the immutable option set from the CLI.
fn build_options(cli: &Cli, seed_url: &Url) -> anyhow::Result<Options> {
    let mut allowed_domains: Vec<String> = cli
        .domains
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect();
    if let Some(host) = seed_url.host_str() {
        allowed_domains.push(host.to_string());
    }

    let mut excluded_urls = Vec::new();
    for pattern in cli
        .excluded
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        excluded_urls.push(
            regex::Regex::new(pattern)
                .with_context(|| format!("invalid excluded-url pattern '{pattern}'"))?,
        );
    }

    let probe_cmd: Vec<String> = cli.probe.split_whitespace().map(str::to_string).collect();

    Ok(Options {
        probe_cmd,
        scope: cli.scope.parse()?,
        mode: cli.mode.parse()?,
        output_mode: cli.output_mode.parse()?,
        max_depth: cli.max_depth,
        max_post_depth: cli.max_post_depth,
        max_redirects: cli.max_redirects,
        process_timeout: cli.timeout,
        num_workers: cli.workers,
        allowed_domains,
        excluded_urls,
        proxy: cli
            .proxy
            .as_deref()
            .map(|p| p.parse::<config::Proxy>())
            .transpose()?,
        user_agent: cli
            .user_agent
            .clone()
            .unwrap_or_else(|| config::DEFAULT_USER_AGENT.to_string()),
        group_qs: cli.group_qs,
        crawl_forms: !cli.no_forms,
        override_timeout_functions: !cli.keep_timers,
        fallback_fetch: !cli.no_probe_fallback,
        set_referer: true,
        random_seed: String::new(),
        skip_duplicate_content: cli.skip_duplicates,
        http_auth: cli.http_auth.clone(),
    })
}

/// Computes the initial request set according to the output mode, plus the
/// already-crawled set used for dedup preloading.
async fn assemble_start_requests(
    cli: &Cli,
    options: &Arc<Options>,
    store: &CrawlStore,
    seed_ctx: &Arc<SeedContext>,
    seed_request: Request,
    client: &reqwest::Client,
) -> anyhow::Result<(Vec<Request>, Vec<Request>)> {
    let mut start_requests = Vec::new();
    let mut done_requests = Vec::new();

    if matches!(
        options.output_mode,
        OutputMode::Resume | OutputMode::Complete
    ) {
        (start_requests, done_requests) =
            crawler::reopen_start_set(store, options.output_mode, seed_request.clone())?;
    } else {
        start_requests.push(seed_request.clone());
    }

    if !cli.ignore_robots {
        match fetch::robots_requests(client, &seed_request).await {
            Ok(found) => {
                let found = adjust_requests(found, options, seed_ctx);
                for request in found {
                    let dup = start_requests.iter().any(|s| *s == request)
                        || done_requests.iter().any(|d| *d == request);
                    if is_crawlable(&request, options) && !dup {
                        start_requests.push(request);
                    }
                }
            }
            Err(e) => tracing::debug!("robots.txt not available: {}", e),
        }
    }

    Ok((start_requests, done_requests))
}

/// Accepts a bare hostname or URL and normalizes it to an absolute URL.
fn normalize_seed_url(raw: &str) -> anyhow::Result<Url> {
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    Url::parse(&with_scheme).with_context(|| format!("invalid start url '{raw}'"))
}

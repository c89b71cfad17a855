//! Crawl configuration
//!
//! All recognized options live in one immutable [`Options`] structure,
//! built from the CLI once at startup and validated before any crawling
//! begins. Workers and the coordinator receive it behind an `Arc`; nothing
//! reads configuration from ambient state.

mod cookies;

pub use cookies::parse_cookie_string;

use crate::VantageError;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use std::str::FromStr;

/// Policy restricting which discovered requests are eligible for crawling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    /// Limit crawling to the allowed domain patterns (default).
    Domain,
    /// Limit crawling to the seed directory and its descendants.
    Directory,
    /// Analyze the seed page only; everything else is out of scope.
    Url,
}

impl FromStr for ScopeMode {
    type Err = VantageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "domain" => Ok(Self::Domain),
            "directory" => Ok(Self::Directory),
            "url" => Ok(Self::Url),
            other => Err(VantageError::Config(format!("wrong scope '{other}'"))),
        }
    }
}

/// How aggressively the probe interacts with a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlMode {
    /// Do not interact with the page.
    Passive,
    /// Trigger events but do not fill input values.
    Active,
    /// Fill values and crawl forms (default).
    Aggressive,
}

impl FromStr for CrawlMode {
    type Err = VantageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passive" => Ok(Self::Passive),
            "active" => Ok(Self::Active),
            "aggressive" => Ok(Self::Aggressive),
            other => Err(VantageError::Config(format!("wrong mode '{other}'"))),
        }
    }
}

/// Behavior when the output store already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Never touch an existing store; write to a uniquely suffixed name.
    Rename,
    /// Delete and recreate.
    Overwrite,
    /// Reopen, re-open the seed and re-seed every not-yet-crawled in-scope
    /// request from the store.
    Resume,
    /// Reopen without re-seeding previously discovered requests.
    Complete,
}

impl FromStr for OutputMode {
    type Err = VantageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rename" => Ok(Self::Rename),
            "overwrite" => Ok(Self::Overwrite),
            "resume" => Ok(Self::Resume),
            "complete" => Ok(Self::Complete),
            other => Err(VantageError::Config(format!("wrong output mode '{other}'"))),
        }
    }
}

/// Outbound proxy for both the probe and the fallback fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxy {
    pub proto: String,
    pub host: String,
    pub port: u16,
}

impl FromStr for Proxy {
    type Err = VantageError;

    /// Parses the `proto:host:port` form; only `http` and `socks5` proxies
    /// are supported.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 {
            return Err(VantageError::Config(format!("invalid proxy string '{s}'")));
        }
        let (proto, host, port) = (parts[0], parts[1], parts[2]);
        if proto != "http" && proto != "socks5" {
            return Err(VantageError::Config(
                "only http and socks5 proxies are supported".to_string(),
            ));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| VantageError::Config(format!("invalid proxy port '{port}'")))?;
        Ok(Self {
            proto: proto.to_string(),
            host: host.to_string(),
            port,
        })
    }
}

impl Proxy {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.1; WOW64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/53.0.2785.143 Safari/537.36";

/// Immutable crawl configuration, fully resolved at startup.
#[derive(Debug, Clone)]
pub struct Options {
    /// Command used to launch the rendering probe (binary plus fixed
    /// leading arguments, e.g. `node /path/to/probe.js`).
    pub probe_cmd: Vec<String>,
    pub scope: ScopeMode,
    pub mode: CrawlMode,
    pub output_mode: OutputMode,
    /// Maximum link-type crawl depth.
    pub max_depth: u32,
    /// Maximum consecutive form-submission depth.
    pub max_post_depth: u32,
    pub max_redirects: u32,
    /// Page-processing budget handed to the probe, in seconds.
    pub process_timeout: u64,
    pub num_workers: usize,
    /// Allowed-domain patterns; `*.example.com` matches the bare domain
    /// and any subdomain.
    pub allowed_domains: Vec<String>,
    /// Discovered URLs matching any of these are out of scope.
    pub excluded_urls: Vec<Regex>,
    pub proxy: Option<Proxy>,
    pub user_agent: String,
    /// Collapse requests differing only in query-string values.
    pub group_qs: bool,
    pub crawl_forms: bool,
    /// Let the probe override page timer functions.
    pub override_timeout_functions: bool,
    /// On probe failure, fall back to a direct non-rendering fetch.
    pub fallback_fetch: bool,
    pub set_referer: bool,
    /// Seed for deterministic fuzz-value generation across sessions.
    pub random_seed: String,
    /// Suppress children of near-duplicate pages.
    pub skip_duplicate_content: bool,
    pub http_auth: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            probe_cmd: vec!["node".to_string()],
            scope: ScopeMode::Domain,
            mode: CrawlMode::Aggressive,
            output_mode: OutputMode::Rename,
            max_depth: 100,
            max_post_depth: 10,
            max_redirects: 10,
            process_timeout: 300,
            num_workers: 10,
            allowed_domains: Vec::new(),
            excluded_urls: Vec::new(),
            proxy: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            group_qs: false,
            crawl_forms: true,
            override_timeout_functions: true,
            fallback_fetch: true,
            set_referer: true,
            random_seed: String::new(),
            skip_duplicate_content: false,
            http_auth: None,
        }
    }
}

impl Options {
    /// Validates cross-field constraints once, before any crawling starts.
    pub fn validate(&self) -> crate::Result<()> {
        if self.probe_cmd.is_empty() {
            return Err(VantageError::Config("unable to find probe".to_string()));
        }
        if self.num_workers == 0 {
            return Err(VantageError::Config(
                "at least one worker is required".to_string(),
            ));
        }
        if self.process_timeout == 0 {
            return Err(VantageError::Config(
                "process timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Generates the random session seed used for deterministic fuzz values
/// when none is supplied or inherited.
pub fn generate_random_seed() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(20)
        .map(char::from)
        .collect()
}

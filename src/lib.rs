//! Vantage: a rendering-probe driven crawl engine for web reconnaissance
//!
//! This crate implements the orchestration core of a security crawler: a
//! worker pool dispatches discovered requests to an external rendering
//! probe, every request the page generates (links, forms, XHR, WebSocket,
//! JSONP, redirects) is filtered through scope/depth/dedup admission
//! control, and the whole request graph is persisted so a crawl can be
//! resumed or completed later.

pub mod config;
pub mod crawler;
pub mod dedup;
pub mod fetch;
pub mod model;
pub mod probe;
pub mod storage;

use thiserror::Error;

/// Main error type for Vantage operations
#[derive(Debug, Error)]
pub enum VantageError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cookie parse error: {0}")]
    CookieParse(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Document at {url} is not html")]
    NotHtml { url: String },

    #[error("Unable to open seed url {url}: {message}")]
    SeedUnreachable { url: String, message: String },

    #[error("Probe output decode error: {0}")]
    ProbeDecode(#[from] serde_json::Error),

    #[error("Probe process error: {0}")]
    ProbeProcess(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Vantage operations
pub type Result<T> = std::result::Result<T, VantageError>;

// Re-export commonly used types
pub use config::{CrawlMode, Options, OutputMode, ScopeMode};
pub use model::{Cookie, CrawlErrorCode, CrawlResult, Request, RequestType};
pub use storage::CrawlStore;

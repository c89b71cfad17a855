//! Per-dispatch crawl outcome, handed from a worker to the coordinator.

use crate::model::{Cookie, Request};
use serde_json::Value;
use std::sync::Arc;

/// Error codes recorded against a request's crawl result.
///
/// These are admission/probe outcomes, not process errors; they are
/// serialized as strings into the store's error-list column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlErrorCode {
    /// The page was not an acceptable content type.
    ContentType,
    /// Navigation-level timeout reported by the probe.
    Timeout,
    /// The probe hit its own page-processing deadline.
    ProbeTimeout,
    /// The page failed to load inside the probe.
    LoadError,
    /// The probe process was killed after exceeding the wall-clock budget.
    ProbeKilled,
    /// The probe produced no usable output after the retry budget.
    ProbeFailure,
    ForceStop,
    TooManyRedirects,
    DepthLimit,
    /// Direct-fetch fallback error, with transport detail.
    Fetch(String),
    /// Error code reported by the probe that we do not model.
    Other(String),
}

impl CrawlErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ContentType => "contentType",
            Self::Timeout => "timeout",
            Self::ProbeTimeout => "probe_timeout",
            Self::LoadError => "loaderror",
            Self::ProbeKilled => "probe_killed",
            Self::ProbeFailure => "probe_failure",
            Self::ForceStop => "force_stop",
            Self::TooManyRedirects => "too_many_redirects",
            Self::DepthLimit => "crawler_depth_limit_reached",
            Self::Fetch(msg) => msg,
            Self::Other(code) => code,
        }
    }

    pub fn parse(code: &str) -> Self {
        match code {
            "contentType" => Self::ContentType,
            "timeout" => Self::Timeout,
            "probe_timeout" => Self::ProbeTimeout,
            "loaderror" => Self::LoadError,
            "probe_killed" => Self::ProbeKilled,
            "probe_failure" => Self::ProbeFailure,
            "force_stop" => Self::ForceStop,
            "too_many_redirects" => Self::TooManyRedirects,
            "crawler_depth_limit_reached" => Self::DepthLimit,
            other => Self::Other(other.to_string()),
        }
    }

    /// Terminal probe errors short-circuit the gateway's retry loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ContentType | Self::ProbeTimeout | Self::ForceStop)
    }
}

impl std::fmt::Display for CrawlErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one dispatch: the originating request, everything the page
/// generated, and any error codes collected along the way.
///
/// Produced exactly once per dispatch by a worker, consumed exactly once by
/// the coordinator, then discarded.
#[derive(Debug)]
pub struct CrawlResult {
    pub request: Arc<Request>,
    pub found_requests: Vec<Request>,
    pub errors: Vec<CrawlErrorCode>,
    /// Opaque probe-emitted annotations to surface to the operator.
    pub user_output: Vec<Value>,
    /// Similarity fingerprint of the rendered page, when available.
    pub page_fingerprint: Option<u64>,
    /// Cookie set after rendering, used to finalize the session.
    pub end_cookies: Vec<Cookie>,
}

impl CrawlResult {
    pub fn new(request: Arc<Request>) -> Self {
        Self {
            request,
            found_requests: Vec::new(),
            errors: Vec::new(),
            user_output: Vec::new(),
            page_fingerprint: None,
            end_cookies: Vec::new(),
        }
    }

    pub fn with_errors(request: Arc<Request>, errors: Vec<CrawlErrorCode>) -> Self {
        Self {
            errors,
            ..Self::new(request)
        }
    }

    pub fn serialized_errors(&self) -> String {
        let codes: Vec<&str> = self.errors.iter().map(|e| e.as_str()).collect();
        serde_json::to_string(&codes).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn serialized_user_output(&self) -> String {
        if self.user_output.is_empty() {
            return String::new();
        }
        serde_json::to_string(&self.user_output).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RequestType;

    #[test]
    fn test_error_code_roundtrip() {
        for code in [
            CrawlErrorCode::ContentType,
            CrawlErrorCode::Timeout,
            CrawlErrorCode::ProbeTimeout,
            CrawlErrorCode::LoadError,
            CrawlErrorCode::ProbeKilled,
            CrawlErrorCode::ProbeFailure,
            CrawlErrorCode::ForceStop,
            CrawlErrorCode::TooManyRedirects,
            CrawlErrorCode::DepthLimit,
        ] {
            assert_eq!(CrawlErrorCode::parse(code.as_str()), code);
        }
    }

    #[test]
    fn test_unmodeled_code_is_preserved() {
        let code = CrawlErrorCode::parse("ssl_handshake");
        assert_eq!(code, CrawlErrorCode::Other("ssl_handshake".to_string()));
        assert!(!code.is_terminal());
    }

    #[test]
    fn test_serialized_errors() {
        let req = Arc::new(Request::root(RequestType::Link, "GET", "https://a/"));
        let result = CrawlResult::with_errors(
            req,
            vec![CrawlErrorCode::ProbeKilled, CrawlErrorCode::ProbeFailure],
        );
        assert_eq!(
            result.serialized_errors(),
            r#"["probe_killed","probe_failure"]"#
        );
    }
}

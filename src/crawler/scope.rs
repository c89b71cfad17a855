//! Request normalization and scope policy
//!
//! Every freshly discovered request passes through here before it reaches
//! the coordinator: scope tagging, excluded-URL filtering and optional
//! query-string grouping.

use crate::config::{Options, ScopeMode};
use crate::model::{Request, RequestType};
use url::Url;

/// Scope reference derived from the seed URL, shared by all workers.
#[derive(Debug, Clone)]
pub struct SeedContext {
    seed_url: Url,
    /// Directory of the seed path, with trailing slash.
    seed_dir: String,
}

impl SeedContext {
    pub fn new(seed_url: Url) -> Self {
        let path = seed_url.path();
        let seed_dir = match path.rfind('/') {
            Some(idx) => path[..=idx].to_string(),
            None => "/".to_string(),
        };
        Self { seed_url, seed_dir }
    }

    pub fn url(&self) -> &Url {
        &self.seed_url
    }
}

/// Checks a host against an allowed-domain pattern.
///
/// `*.example.com` matches the bare domain and any subdomain depth;
/// anything else is an exact match.
pub fn domain_matches(pattern: &str, host: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        host == base || host.ends_with(&format!(".{base}"))
    } else {
        host == pattern
    }
}

/// Tags `request.out_of_scope` according to the configured scope mode and
/// the excluded-URL patterns.
pub fn apply_scope(request: &mut Request, options: &Options, seed: &SeedContext) {
    let Ok(url) = Url::parse(&request.url) else {
        request.out_of_scope = true;
        return;
    };

    let in_scope = match options.scope {
        ScopeMode::Domain => url
            .host_str()
            .map(|host| {
                options
                    .allowed_domains
                    .iter()
                    .any(|pattern| domain_matches(pattern, host))
            })
            .unwrap_or(false),
        ScopeMode::Directory => {
            url.host_str() == seed.seed_url.host_str() && url.path().starts_with(&seed.seed_dir)
        }
        // analyze the seed page only
        ScopeMode::Url => request.url == seed.seed_url.as_str(),
    };

    let excluded = options
        .excluded_urls
        .iter()
        .any(|pattern| pattern.is_match(&request.url));

    request.out_of_scope = !in_scope || excluded;
}

/// Whether the coordinator may enqueue this request at all: only
/// navigable types are dispatched, forms only when form crawling is on.
pub fn is_crawlable(request: &Request, options: &Options) -> bool {
    if request.out_of_scope || !request.request_type.is_navigable() {
        return false;
    }
    if request.request_type == RequestType::Form && !options.crawl_forms {
        return false;
    }
    true
}

/// Applies scope tagging and, when enabled, query-string grouping to a
/// batch of freshly discovered requests.
pub fn adjust_requests(
    mut requests: Vec<Request>,
    options: &Options,
    seed: &SeedContext,
) -> Vec<Request> {
    for request in &mut requests {
        apply_scope(request, options, seed);
    }
    if options.group_qs {
        requests = group_query_string(requests);
    }
    requests
}

/// Collapses requests whose URLs differ only in the *values* of their
/// query parameters to one representative, keeping the first seen.
///
/// Parameter names still count, and array-style names (ending in `[]`)
/// keep their values, so faceted navigation collapses while genuinely
/// distinct multi-value submissions survive.
fn group_query_string(requests: Vec<Request>) -> Vec<Request> {
    let mut seen_keys: Vec<String> = Vec::new();
    let mut kept = Vec::new();

    for request in requests {
        let key = grouping_key(&request);
        if seen_keys.contains(&key) {
            continue;
        }
        seen_keys.push(key);
        kept.push(request);
    }
    kept
}

fn grouping_key(request: &Request) -> String {
    let Ok(url) = Url::parse(&request.url) else {
        return request.url.clone();
    };
    if url.query().is_none() {
        // no query string, nothing to group on
        return format!("{}|{}|{}", request.request_type, request.method, request.url);
    }

    let mut params: Vec<String> = url
        .query_pairs()
        .map(|(name, value)| {
            if name.ends_with("[]") {
                format!("{name}={value}")
            } else {
                format!("{name}=")
            }
        })
        .collect();
    params.sort();

    format!(
        "{}|{}|{}://{}{}?{}",
        request.request_type,
        request.method,
        url.scheme(),
        url.host_str().unwrap_or(""),
        url.path(),
        params.join("&")
    )
}

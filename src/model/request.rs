//! The crawl request: unit of work and node of the request graph.

use crate::model::Cookie;
use serde_json::Value;
use std::hash::{Hash, Hasher};

/// Kind of navigation or programmatic request a page can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Link,
    Xhr,
    Websocket,
    Jsonp,
    Form,
    Redirect,
    Unknown,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Xhr => "xhr",
            Self::Websocket => "websocket",
            Self::Jsonp => "jsonp",
            Self::Form => "form",
            Self::Redirect => "redirect",
            Self::Unknown => "unknown",
        }
    }

    /// Anything the probe reports that we do not recognize maps to
    /// `Unknown` rather than being dropped.
    pub fn parse(s: &str) -> Self {
        match s {
            "link" => Self::Link,
            "xhr" => Self::Xhr,
            "websocket" => Self::Websocket,
            "jsonp" => Self::Jsonp,
            "form" => Self::Form,
            "redirect" => Self::Redirect,
            _ => Self::Unknown,
        }
    }

    /// Only these types are ever dispatched to the probe; the rest are
    /// recorded for downstream scanners but not navigated.
    pub fn is_navigable(&self) -> bool {
        matches!(self, Self::Link | Self::Redirect | Self::Form)
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered request.
///
/// Two requests are the *same crawl unit* iff their
/// `(type, method, url, http_auth, data, trigger)` tuples match; this is
/// the dedup key used both in memory and in the store, and it deliberately
/// includes the trigger so the same URL reached through a different DOM
/// event stays a distinct unit.
#[derive(Debug, Clone)]
pub struct Request {
    pub request_type: RequestType,
    pub method: String,
    pub url: String,
    /// Request body for POST-like requests; empty string when absent.
    pub data: String,
    pub referer: Option<String>,
    pub cookies: Vec<Cookie>,
    pub http_auth: Option<String>,
    /// DOM event that produced this request, as reported by the probe.
    pub trigger: Option<Value>,
    /// Redirect hops already followed to reach this request.
    pub redirects: u32,
    pub out_of_scope: bool,
    /// Identity once persisted.
    pub db_id: Option<i64>,
    /// Lineage pointer; `None` only for roots.
    pub parent_db_id: Option<i64>,
    /// Link-type hops from the nearest root.
    pub depth: u32,
    /// Consecutive form-submission hops.
    pub post_depth: u32,
}

impl Request {
    /// Creates a root request (seed or robots.txt derived).
    pub fn root(
        request_type: RequestType,
        method: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            request_type,
            method: method.into(),
            url: url.into(),
            data: String::new(),
            referer: None,
            cookies: Vec::new(),
            http_auth: None,
            trigger: None,
            redirects: 0,
            out_of_scope: false,
            db_id: None,
            parent_db_id: None,
            depth: 0,
            post_depth: 0,
        }
    }

    /// Creates a child request discovered while crawling `parent`.
    ///
    /// Depth bookkeeping: a form submission extends the consecutive-form
    /// counter and leaves the link depth alone; every other type advances
    /// the link depth and resets the form counter. A redirect additionally
    /// inherits and increments the parent's redirect count.
    pub fn child(
        parent: &Request,
        request_type: RequestType,
        method: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        let (depth, post_depth) = if request_type == RequestType::Form {
            (parent.depth, parent.post_depth + 1)
        } else {
            (parent.depth + 1, 0)
        };
        let redirects = if request_type == RequestType::Redirect {
            parent.redirects + 1
        } else {
            0
        };

        Self {
            request_type,
            method: method.into(),
            url: url.into(),
            data: String::new(),
            referer: Some(parent.url.clone()),
            cookies: parent.cookies.clone(),
            http_auth: parent.http_auth.clone(),
            trigger: None,
            redirects,
            out_of_scope: false,
            db_id: None,
            parent_db_id: parent.db_id,
            depth,
            post_depth,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_trigger(mut self, trigger: Option<Value>) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_cookies(mut self, cookies: Vec<Cookie>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Serialized trigger as stored in the dedup key column; empty string
    /// when the request has no trigger.
    pub fn trigger_json(&self) -> String {
        self.trigger
            .as_ref()
            .map(|t| t.to_string())
            .unwrap_or_default()
    }

    /// The auth component of the dedup key; empty string when absent.
    pub fn auth_key(&self) -> &str {
        self.http_auth.as_deref().unwrap_or("")
    }

    pub fn serialized_cookies(&self) -> String {
        serde_json::to_string(&self.cookies).unwrap_or_else(|_| "[]".to_string())
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.request_type == other.request_type
            && self.method == other.method
            && self.url == other.url
            && self.auth_key() == other.auth_key()
            && self.data == other.data
            && self.trigger_json() == other.trigger_json()
    }
}

impl Eq for Request {}

impl Hash for Request {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.request_type.hash(state);
        self.method.hash(state);
        self.url.hash(state);
        self.auth_key().hash(state);
        self.data.hash(state);
        self.trigger_json().hash(state);
    }
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} {}", self.request_type, self.method, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equality_ignores_referer_and_cookies() {
        let mut a = Request::root(RequestType::Link, "GET", "https://example.com/a");
        let mut b = a.clone();
        a.referer = Some("https://example.com/".to_string());
        b.cookies.push(crate::model::Cookie::new("s", "1"));

        assert_eq!(a, b);
    }

    #[test]
    fn test_trigger_distinguishes_requests() {
        let base = Request::root(RequestType::Link, "GET", "https://example.com/a");
        let clicked = base
            .clone()
            .with_trigger(Some(json!({"event": "click", "element": "#btn"})));

        assert_ne!(base, clicked);
    }

    #[test]
    fn test_link_child_depth() {
        let root = Request::root(RequestType::Link, "GET", "https://example.com/");
        let child = Request::child(&root, RequestType::Link, "GET", "https://example.com/a");
        let grandchild = Request::child(&child, RequestType::Xhr, "GET", "https://example.com/b");

        assert_eq!(child.depth, 1);
        assert_eq!(grandchild.depth, 2);
        assert_eq!(grandchild.post_depth, 0);
    }

    #[test]
    fn test_form_chain_counts_separately() {
        let root = Request::root(RequestType::Link, "GET", "https://example.com/");
        let form1 = Request::child(&root, RequestType::Form, "POST", "https://example.com/f1");
        let form2 = Request::child(&form1, RequestType::Form, "POST", "https://example.com/f2");
        let link = Request::child(&form2, RequestType::Link, "GET", "https://example.com/out");

        assert_eq!(form1.post_depth, 1);
        assert_eq!(form2.post_depth, 2);
        // link depth is untouched by the form hops
        assert_eq!(form2.depth, 0);
        // a non-form child breaks the consecutive chain
        assert_eq!(link.post_depth, 0);
        assert_eq!(link.depth, 1);
    }

    #[test]
    fn test_redirect_counter_increments_along_chain() {
        let root = Request::root(RequestType::Link, "GET", "https://example.com/");
        let r1 = Request::child(&root, RequestType::Redirect, "GET", "https://example.com/r1");
        let r2 = Request::child(&r1, RequestType::Redirect, "GET", "https://example.com/r2");
        let link = Request::child(&r2, RequestType::Link, "GET", "https://example.com/done");

        assert_eq!(r1.redirects, 1);
        assert_eq!(r2.redirects, 2);
        assert_eq!(link.redirects, 0);
    }

    #[test]
    fn test_unknown_type_fallback() {
        assert_eq!(RequestType::parse("fetch_stream"), RequestType::Unknown);
        assert_eq!(RequestType::parse("websocket"), RequestType::Websocket);
    }
}

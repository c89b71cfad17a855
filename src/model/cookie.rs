//! Cookie representation shared between the CLI input, the probe exchange
//! file and the store's serialized cookie columns.

use serde::{Deserialize, Serialize};
use url::Url;

/// A single cookie, as produced by the probe or supplied by the operator.
///
/// `domain` and `path` default from the URL the cookie was set against when
/// the probe (or the user) did not provide them explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub expires: Option<i64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, rename = "httponly")]
    pub http_only: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            expires: None,
            secure: false,
            http_only: false,
        }
    }

    /// Fills in default `domain` and `path` from the URL the cookie was set
    /// against, leaving explicit values untouched.
    pub fn resolve_defaults(&mut self, setter_url: &str) {
        let Ok(url) = Url::parse(setter_url) else {
            return;
        };
        if self.domain.is_none() {
            self.domain = url.host_str().map(|h| h.to_string());
        }
        if self.path.is_none() {
            let path = url.path();
            let parent = match path.rfind('/') {
                Some(0) | None => "/",
                Some(idx) => &path[..idx],
            };
            self.path = Some(parent.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_setter_url() {
        let mut cookie = Cookie::new("sid", "abc");
        cookie.resolve_defaults("https://app.example.com/account/login");

        assert_eq!(cookie.domain.as_deref(), Some("app.example.com"));
        assert_eq!(cookie.path.as_deref(), Some("/account"));
    }

    #[test]
    fn test_defaults_root_path() {
        let mut cookie = Cookie::new("sid", "abc");
        cookie.resolve_defaults("https://example.com/");
        assert_eq!(cookie.path.as_deref(), Some("/"));
    }

    #[test]
    fn test_explicit_values_kept() {
        let mut cookie = Cookie::new("sid", "abc");
        cookie.domain = Some(".example.com".to_string());
        cookie.path = Some("/".to_string());
        cookie.resolve_defaults("https://sub.example.com/a/b");

        assert_eq!(cookie.domain.as_deref(), Some(".example.com"));
        assert_eq!(cookie.path.as_deref(), Some("/"));
    }

    #[test]
    fn test_json_roundtrip_with_partial_fields() {
        let json = r#"{"name":"tok","value":"1","secure":true}"#;
        let cookie: Cookie = serde_json::from_str(json).unwrap();
        assert_eq!(cookie.name, "tok");
        assert!(cookie.secure);
        assert!(cookie.domain.is_none());
    }
}

//! Probe output protocol
//!
//! The rendering probe writes a JSON array of tagged records on stdout:
//! `["cookies", [...]]`, `["html", "..."]`, `["request", {...}]`,
//! `["user", ...]`, terminated by one status object
//! `{"status":"ok"|"error", ...}`. Records stream out as the page is
//! processed, so a crashed probe leaves a truncated array; decoding
//! repairs that case into an explicit partial-content outcome instead of
//! discarding what was already reported.

use crate::model::{Cookie, CrawlErrorCode, Request, RequestType};
use crate::Result;
use serde::Deserialize;
use serde_json::Value;

/// A child request as reported by the probe.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveredRequest {
    #[serde(rename = "type")]
    pub request_type: String,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub trigger: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct StatusRecord {
    status: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    redirect: Option<String>,
    #[serde(default)]
    partialcontent: Option<bool>,
}

/// Decoded result of one probe run.
#[derive(Debug, Default)]
pub struct ProbeOutcome {
    pub ok: bool,
    pub error_code: Option<CrawlErrorCode>,
    /// The stream was truncated but everything parsed before the cut was
    /// kept.
    pub partial_content: bool,
    pub redirect: Option<String>,
    pub cookies: Vec<Cookie>,
    /// Rendered DOM serialization; only consumed by the dedup oracle.
    pub html: Option<String>,
    pub requests: Vec<DiscoveredRequest>,
    pub user_output: Vec<Value>,
}

impl ProbeOutcome {
    /// A usable outcome still carries discovered requests when the probe
    /// ended with its own page deadline.
    pub fn has_usable_requests(&self) -> bool {
        self.ok || self.error_code == Some(CrawlErrorCode::ProbeTimeout)
    }

    /// Materializes the discovered children as requests of `parent`,
    /// cookies resolved against the parent URL. The redirect reported in
    /// the status record becomes a redirect-typed child ahead of the rest.
    pub fn to_requests(&self, parent: &Request) -> Vec<Request> {
        let mut cookies = self.cookies.clone();
        for cookie in &mut cookies {
            cookie.resolve_defaults(&parent.url);
        }

        let mut requests = Vec::new();
        if let Some(target) = &self.redirect {
            requests.push(
                Request::child(parent, RequestType::Redirect, "GET", target.clone())
                    .with_cookies(cookies.clone()),
            );
        }
        for found in &self.requests {
            requests.push(
                Request::child(
                    parent,
                    RequestType::parse(&found.request_type),
                    found.method.clone(),
                    found.url.clone(),
                )
                .with_data(found.data.clone().unwrap_or_default())
                .with_trigger(found.trigger.clone())
                .with_cookies(cookies.clone()),
            );
        }
        requests
    }
}

/// Decodes raw probe stdout into a [`ProbeOutcome`].
///
/// A stream missing its terminal status record gets one synthesized
/// (`status: ok`, `partialcontent: true`); a stream truncated mid-record is
/// a decode error and left to the gateway's retry accounting.
pub fn decode_probe_output(raw: &str) -> Result<ProbeOutcome> {
    let repaired = repair_truncated(raw);
    let records: Vec<Value> = serde_json::from_str(&repaired)?;

    let mut outcome = ProbeOutcome {
        ok: true,
        ..ProbeOutcome::default()
    };

    for record in records {
        if record.is_object() {
            let status: StatusRecord = serde_json::from_value(record)?;
            if status.status == "error" {
                outcome.ok = false;
                outcome.error_code = status.code.as_deref().map(CrawlErrorCode::parse);
            }
            if status.partialcontent.unwrap_or(false) {
                outcome.partial_content = true;
            }
            outcome.redirect = status.redirect;
            continue;
        }

        let Value::Array(pair) = record else {
            continue;
        };
        let mut pair = pair.into_iter();
        let (Some(tag), Some(value)) = (pair.next(), pair.next()) else {
            continue;
        };
        match tag.as_str() {
            Some("cookies") => {
                let cookies: Vec<Cookie> = serde_json::from_value(value)?;
                outcome.cookies.extend(cookies);
            }
            Some("html") => {
                if let Value::String(html) = value {
                    outcome.html = Some(html);
                }
            }
            Some("request") => {
                outcome.requests.push(serde_json::from_value(value)?);
            }
            Some("user") => outcome.user_output.push(value),
            // unknown tags are skipped, not fatal
            _ => {}
        }
    }

    Ok(outcome)
}

/// Appends the synthesized terminator to a stream that is missing it.
fn repair_truncated(raw: &str) -> String {
    const TERMINATOR: &str = r#"{"status":"ok","partialcontent":true}"#;

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return format!("[{TERMINATOR}]");
    }
    if trimmed.ends_with(']') {
        return trimmed.to_string();
    }
    if trimmed.ends_with(',') || trimmed.ends_with('[') {
        format!("{trimmed}{TERMINATOR}]")
    } else {
        format!("{trimmed},{TERMINATOR}]")
    }
}

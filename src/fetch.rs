//! Direct HTTP access
//!
//! Three non-rendering paths share one client: the initial seed check, the
//! robots.txt retrieval that feeds extra start requests, and the fallback
//! fetch a worker uses when the probe burns its retry budget. Redirects
//! are never followed implicitly; a 3xx becomes a redirect-typed child so
//! the chain stays visible to admission control.

use crate::config::Options;
use crate::model::{Request, RequestType};
use crate::{Result, VantageError};
use reqwest::{redirect::Policy, Client, Method};
use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

/// Builds the HTTP client used for all direct fetches.
pub fn build_client(options: &Options, follow_redirects: bool) -> Result<Client> {
    let redirect_policy = if follow_redirects {
        Policy::limited(options.max_redirects as usize)
    } else {
        Policy::none()
    };

    let mut builder = Client::builder()
        .user_agent(options.user_agent.clone())
        .timeout(Duration::from_secs(options.process_timeout))
        .connect_timeout(Duration::from_secs(10))
        .redirect(redirect_policy)
        .gzip(true)
        .brotli(true)
        .danger_accept_invalid_certs(true);

    if let Some(proxy) = &options.proxy {
        let scheme = match proxy.proto.as_str() {
            "socks5" => "socks5h",
            other => other,
        };
        builder = builder.proxy(reqwest::Proxy::all(format!(
            "{scheme}://{}",
            proxy.address()
        ))?);
    }

    Ok(builder.build()?)
}

/// Validates that the seed URL resolves and serves HTML.
///
/// Failure here is fatal for the whole run; for any other request a
/// transport problem is just an error code on its result.
pub async fn seed_check(client: &Client, request: &Request) -> Result<()> {
    let response = client
        .get(&request.url)
        .send()
        .await
        .map_err(|e| VantageError::SeedUnreachable {
            url: request.url.clone(),
            message: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(VantageError::SeedUnreachable {
            url: request.url.clone(),
            message: format!("HTTP {status}"),
        });
    }

    if !content_type_is_html(&response) {
        return Err(VantageError::NotHtml {
            url: request.url.clone(),
        });
    }
    Ok(())
}

/// Non-rendering fallback: fetches the page directly and discovers what
/// static HTML alone can reveal (anchors, frames, forms, one redirect
/// hop).
pub async fn direct_fetch(client: &Client, parent: &Request) -> Result<Vec<Request>> {
    let method = Method::from_bytes(parent.method.as_bytes()).unwrap_or(Method::GET);
    let mut builder = client.request(method, &parent.url);
    if !parent.data.is_empty() {
        builder = builder
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(parent.data.clone());
    }
    if let Some(referer) = &parent.referer {
        builder = builder.header("Referer", referer.clone());
    }

    let response = builder.send().await?;

    if response.status().is_redirection() {
        let target = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .and_then(|loc| resolve(&parent.url, loc));
        return Ok(target
            .map(|url| vec![Request::child(parent, RequestType::Redirect, "GET", url)])
            .unwrap_or_default());
    }

    if !content_type_is_html(&response) {
        return Ok(Vec::new());
    }

    let base = response.url().clone();
    let body = response.text().await?;
    Ok(extract_requests(parent, &body, &base))
}

/// Pulls link and form targets out of static HTML. Kept synchronous so
/// the parsed DOM never lives across an await point.
fn extract_requests(parent: &Request, body: &str, base: &Url) -> Vec<Request> {
    let document = Html::parse_document(body);
    let mut found = Vec::new();

    let anchors = Selector::parse("a[href], frame[src], iframe[src]").expect("static selector");
    for element in document.select(&anchors) {
        let target = element
            .value()
            .attr("href")
            .or_else(|| element.value().attr("src"));
        if let Some(url) = target.and_then(|t| resolve_relative(base, t)) {
            found.push(Request::child(parent, RequestType::Link, "GET", url));
        }
    }

    let forms = Selector::parse("form").expect("static selector");
    for element in document.select(&forms) {
        let action = element.value().attr("action").unwrap_or("").trim();
        // an action-less form submits back to the page itself
        let target = if action.is_empty() {
            Some(base.to_string())
        } else {
            resolve_relative(base, action)
        };
        let Some(url) = target else {
            continue;
        };
        let method = element
            .value()
            .attr("method")
            .map(|m| m.to_uppercase())
            .unwrap_or_else(|| "GET".to_string());
        found.push(Request::child(parent, RequestType::Form, method, url));
    }

    found
}

/// Reads robots.txt for the seed's origin and turns every Allow/Disallow
/// path into a candidate start request (a child of the seed).
pub async fn robots_requests(client: &Client, seed: &Request) -> Result<Vec<Request>> {
    let seed_url = Url::parse(&seed.url)?;
    let mut robots_url = seed_url.clone();
    robots_url.set_path("/robots.txt");
    robots_url.set_query(None);
    robots_url.set_fragment(None);

    let response = client
        .get(robots_url)
        .header("User-Agent", "Googlebot")
        .timeout(Duration::from_secs(10))
        .send()
        .await?;
    if !response.status().is_success() {
        return Ok(Vec::new());
    }
    let body = response.text().await?;

    let mut requests = Vec::new();
    for line in body.lines() {
        let line = line.split('#').next().unwrap_or("");
        let Some((directive, value)) = line.split_once(':') else {
            continue;
        };
        let directive = directive.trim().to_ascii_lowercase();
        if directive != "allow" && directive != "disallow" {
            continue;
        }
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if let Some(url) = resolve_relative(&seed_url, value) {
            requests.push(Request::child(seed, RequestType::Link, "GET", url));
        }
    }
    Ok(requests)
}

fn content_type_is_html(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("text/html"))
        .unwrap_or(false)
}

fn resolve(base: &str, target: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    resolve_relative(&base, target)
}

/// Joins a discovered target against its base URL, dropping non-web
/// schemes and bare fragments.
fn resolve_relative(base: &Url, target: &str) -> Option<String> {
    let target = target.trim();
    if target.is_empty() || target.starts_with('#') {
        return None;
    }
    let url = base.join(target).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    Some(url.to_string())
}

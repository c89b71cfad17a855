//! Crawl worker
//!
//! Each worker loops: claim one frontier entry, drive the probe gateway,
//! normalize whatever the page generated, publish exactly one crawl
//! result. Shutdown is observed only at the claim point, never
//! mid-dispatch. A worker owns one private cookie-exchange file for its
//! whole lifetime and removes it on clean exit.

use crate::config::Options;
use crate::crawler::frontier::Frontier;
use crate::crawler::scope::{adjust_requests, SeedContext};
use crate::dedup;
use crate::fetch;
use crate::model::{CrawlErrorCode, CrawlResult, Request};
use crate::probe::ProbeGateway;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

pub struct Worker {
    id: usize,
    options: Arc<Options>,
    frontier: Arc<Frontier>,
    gateway: Arc<ProbeGateway>,
    seed: Arc<SeedContext>,
    fallback_client: reqwest::Client,
    results_tx: UnboundedSender<CrawlResult>,
    cookie_file: PathBuf,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        options: Arc<Options>,
        frontier: Arc<Frontier>,
        gateway: Arc<ProbeGateway>,
        seed: Arc<SeedContext>,
        fallback_client: reqwest::Client,
        results_tx: UnboundedSender<CrawlResult>,
    ) -> Self {
        let cookie_file = std::env::temp_dir().join(format!(
            "vantage-cookies-{}-{}-{:08x}.json",
            std::process::id(),
            id,
            rand::random::<u32>()
        ));
        Self {
            id,
            options,
            frontier,
            gateway,
            seed,
            fallback_client,
            results_tx,
            cookie_file,
        }
    }

    pub async fn run(self) {
        loop {
            let Some(request) = self.frontier.claim(self.id).await else {
                break;
            };
            tracing::debug!(worker = self.id, "dispatching {}", request);

            let result = self.dispatch(request).await;
            if self.results_tx.send(result).is_err() {
                // coordinator is gone; nothing left to publish to
                break;
            }
        }

        if let Err(e) = std::fs::remove_file(&self.cookie_file) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(worker = self.id, "cookie file cleanup failed: {}", e);
            }
        }
    }

    async fn dispatch(&self, request: Arc<Request>) -> CrawlResult {
        let mut result = CrawlResult::new(Arc::clone(&request));
        let mut errors = Vec::new();

        if !request.cookies.is_empty() {
            if let Err(e) = self.write_cookie_file(&request) {
                tracing::warn!(worker = self.id, "cookie exchange file write failed: {}", e);
            }
        }

        let outcome = self
            .gateway
            .render(&request, &self.cookie_file, &mut errors)
            .await;

        match outcome {
            Some(outcome) if outcome.has_usable_requests() => {
                result.found_requests = outcome.to_requests(&request);
                result.user_output = outcome.user_output;

                let mut end_cookies = outcome.cookies;
                for cookie in &mut end_cookies {
                    cookie.resolve_defaults(&request.url);
                }
                result.end_cookies = end_cookies;

                if self.options.skip_duplicate_content {
                    result.page_fingerprint =
                        outcome.html.as_deref().map(dedup::fingerprint);
                }
            }
            // terminal probe error: the codes are already recorded
            Some(_) => {}
            None => {
                errors.push(CrawlErrorCode::ProbeFailure);
                if self.options.fallback_fetch {
                    match fetch::direct_fetch(&self.fallback_client, &request).await {
                        Ok(found) => result.found_requests = found,
                        Err(e) => errors.push(CrawlErrorCode::Fetch(e.to_string())),
                    }
                }
            }
        }

        result.found_requests =
            adjust_requests(result.found_requests, &self.options, &self.seed);
        result.errors = errors;
        result
    }

    fn write_cookie_file(&self, request: &Request) -> std::io::Result<()> {
        std::fs::write(&self.cookie_file, request.serialized_cookies())
    }
}

//! Crawl coordinator
//!
//! The coordinator seeds the frontier, drains worker results with a
//! bounded poll, applies admission control (scope, depth, redirect count,
//! dedup) to every discovered child, persists each drained batch inside a
//! single store transaction and detects quiescence to end the crawl.

use crate::config::Options;
use crate::crawler::frontier::Frontier;
use crate::crawler::scope;
use crate::dedup::FingerprintBucket;
use crate::model::{Cookie, CrawlErrorCode, CrawlResult, Request};
use crate::storage::CrawlStore;
use crate::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;

/// Bounded wait between drain passes, so progress reporting and the
/// termination check run even with zero traffic.
const RESULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Final crawl statistics handed back to the caller.
#[derive(Debug)]
pub struct CrawlSummary {
    pub completed: usize,
    pub interrupted: bool,
    /// Last cookie set reported by any probe; persisted into the session.
    pub end_cookies: Vec<Cookie>,
}

pub struct Coordinator<'a> {
    options: Arc<Options>,
    store: &'a CrawlStore,
    frontier: Arc<Frontier>,
    results_rx: UnboundedReceiver<CrawlResult>,
    /// Dispatched but not yet resulted.
    pending: usize,
    completed: usize,
    bucket: FingerprintBucket,
    end_cookies: Vec<Cookie>,
}

impl<'a> Coordinator<'a> {
    pub fn new(
        options: Arc<Options>,
        store: &'a CrawlStore,
        frontier: Arc<Frontier>,
        results_rx: UnboundedReceiver<CrawlResult>,
    ) -> Self {
        Self {
            options,
            store,
            frontier,
            results_rx,
            pending: 0,
            completed: 0,
            bucket: FingerprintBucket::new(),
            end_cookies: Vec::new(),
        }
    }

    /// Feeds requests that are already crawled into the dedup set without
    /// dispatching them (resume/complete modes).
    pub fn preload_done(&mut self, requests: Vec<Request>) {
        self.frontier.preload_done(requests);
    }

    /// Persists and enqueues the initial request set.
    pub fn seed(&mut self, requests: Vec<Request>) -> Result<()> {
        let mut admitted: Vec<Request> = Vec::new();
        let batch = self.store.batch()?;
        for mut request in requests {
            if self.frontier.contains(&request) || admitted.iter().any(|r| *r == request) {
                continue;
            }
            batch.save_request(&mut request)?;
            admitted.push(request);
        }
        batch.commit()?;

        self.pending += admitted.len();
        self.frontier.append(admitted);
        Ok(())
    }

    /// Runs the main loop until the crawl is quiescent or interrupted.
    ///
    /// Quiescence needs both conditions: zero pending results *and* no
    /// worker actively dispatching; checking pending alone races against a
    /// worker that has claimed an entry but not yet posted its result.
    pub async fn run(&mut self) -> Result<CrawlSummary> {
        let started = Instant::now();
        let mut interrupted = false;

        loop {
            if self.pending == 0 && self.frontier.all_workers_waiting() {
                break;
            }

            let mut drained = Vec::new();
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    interrupted = true;
                }
                received = self.results_rx.recv() => {
                    match received {
                        Some(result) => drained.push(result),
                        // all workers dropped their senders
                        None => break,
                    }
                }
                _ = tokio::time::sleep(RESULT_POLL_INTERVAL) => {}
            }

            if interrupted {
                tracing::info!("interrupt received, stopping crawl");
                break;
            }

            while let Ok(result) = self.results_rx.try_recv() {
                drained.push(result);
            }

            if !drained.is_empty() {
                self.apply_results(drained)?;
                let elapsed = started.elapsed().as_secs_f64().max(0.001);
                tracing::info!(
                    "progress: {} crawled, {} pending, {} known, {:.2} pages/sec",
                    self.completed,
                    self.pending,
                    self.frontier.len(),
                    self.completed as f64 / elapsed,
                );
            }
        }

        self.frontier.request_shutdown();

        Ok(CrawlSummary {
            completed: self.completed,
            interrupted,
            end_cookies: std::mem::take(&mut self.end_cookies),
        })
    }

    /// Applies one drained batch of results inside a single transaction:
    /// persist the result, then run every child through admission control.
    fn apply_results(&mut self, results: Vec<CrawlResult>) -> Result<()> {
        let mut to_enqueue: Vec<Request> = Vec::new();
        let batch = self.store.batch()?;

        for mut result in results {
            self.pending -= 1;
            self.completed += 1;

            if !result.errors.is_empty() {
                tracing::debug!("crawl errors for {}: {:?}", result.request, result.errors);
            }
            if !result.end_cookies.is_empty() {
                self.end_cookies = result.end_cookies.clone();
            }

            // near-duplicate page: keep the result, cut the branch
            let mut children = std::mem::take(&mut result.found_requests);
            if let Some(fp) = result.page_fingerprint {
                if self.bucket.is_duplicate(fp) {
                    tracing::debug!("near-duplicate page, suppressing {} children", children.len());
                    children.clear();
                }
            }

            batch.save_result(&result, true)?;

            for mut child in children {
                // every discovery is recorded, crawlable or not
                batch.save_request(&mut child)?;

                if !scope::is_crawlable(&child, &self.options) {
                    continue;
                }
                if self.frontier.contains(&child) || to_enqueue.iter().any(|r| *r == child) {
                    continue;
                }

                if child.depth > self.options.max_depth
                    || child.post_depth > self.options.max_post_depth
                {
                    tracing::debug!("cannot crawl {}: depth limit reached", child);
                    let rejection = CrawlResult::with_errors(
                        Arc::new(child),
                        vec![CrawlErrorCode::DepthLimit],
                    );
                    batch.save_result(&rejection, false)?;
                    continue;
                }

                if child.redirects > self.options.max_redirects {
                    tracing::debug!("cannot crawl {}: too many redirects", child);
                    let rejection = CrawlResult::with_errors(
                        Arc::new(child),
                        vec![CrawlErrorCode::TooManyRedirects],
                    );
                    batch.save_result(&rejection, false)?;
                    continue;
                }

                self.pending += 1;
                to_enqueue.push(child);
            }
        }

        batch.commit()?;
        self.frontier.append(to_enqueue);
        Ok(())
    }
}

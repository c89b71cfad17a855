//! Probe gateway: spawns the external rendering process per request,
//! enforces the wall-clock budget and retries transient failures.

use crate::config::{CrawlMode, Options};
use crate::model::{CrawlErrorCode, Request};
use crate::probe::protocol::{decode_probe_output, ProbeOutcome};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Attempts per dispatch before giving up on the probe.
const PROCESS_RETRIES: u32 = 2;
/// Backoff between attempts.
const RETRY_INTERVAL: Duration = Duration::from_millis(500);
/// Slack on top of the probe's own page-processing budget before the
/// process is killed from outside.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Drives the external rendering probe.
pub struct ProbeGateway {
    options: Arc<Options>,
    /// argv prefix: probe command plus the options shared by every
    /// dispatch, assembled once.
    base_cmd: Vec<String>,
}

impl ProbeGateway {
    pub fn new(options: Arc<Options>) -> Self {
        let base_cmd = build_base_cmd(&options);
        Self { options, base_cmd }
    }

    /// Renders one request, retrying per the gateway budget.
    ///
    /// Returns `None` when no attempt produced decodable output; every
    /// failed attempt leaves its code in `errors`. A terminal probe error
    /// (content-type rejection, probe-level timeout, forced stop) stops
    /// the retry loop immediately and the outcome is still returned so the
    /// caller can persist it.
    pub async fn render(
        &self,
        request: &Request,
        cookie_file: &Path,
        errors: &mut Vec<CrawlErrorCode>,
    ) -> Option<ProbeOutcome> {
        let args = self.request_args(request, cookie_file);
        let deadline = Duration::from_secs(self.options.process_timeout) + KILL_GRACE;

        let mut retries = PROCESS_RETRIES;
        while retries > 0 {
            let raw = match self.execute(&args, deadline).await {
                Some(raw) => raw,
                None => {
                    errors.push(CrawlErrorCode::ProbeKilled);
                    retries -= 1;
                    tokio::time::sleep(RETRY_INTERVAL).await;
                    continue;
                }
            };

            match decode_probe_output(&raw) {
                Ok(outcome) => {
                    if outcome.ok {
                        return Some(outcome);
                    }
                    let code = outcome
                        .error_code
                        .clone()
                        .unwrap_or(CrawlErrorCode::LoadError);
                    errors.push(code.clone());
                    if code.is_terminal() {
                        return Some(outcome);
                    }
                }
                Err(e) => {
                    tracing::debug!("probe output decode failed for {}: {}", request.url, e);
                }
            }

            retries -= 1;
            tokio::time::sleep(RETRY_INTERVAL).await;
        }

        None
    }

    /// Runs the probe once; `None` means the process was killed on the
    /// wall-clock deadline or could not be spawned.
    async fn execute(&self, request_args: &[String], deadline: Duration) -> Option<String> {
        let mut command = Command::new(&self.base_cmd[0]);
        command
            .args(&self.base_cmd[1..])
            .args(request_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("failed to spawn probe: {}", e);
                return None;
            }
        };

        // on timeout the future is dropped, which kills the process
        match tokio::time::timeout(deadline, child.wait_with_output()).await {
            Ok(Ok(output)) => Some(String::from_utf8_lossy(&output.stdout).into_owned()),
            Ok(Err(e)) => {
                tracing::warn!("probe wait failed: {}", e);
                None
            }
            Err(_elapsed) => None,
        }
    }

    /// Per-request argv suffix: method, body, cookie exchange file, auth,
    /// referer and finally the URL.
    fn request_args(&self, request: &Request, cookie_file: &Path) -> Vec<String> {
        let mut args = Vec::new();

        if request.method == "POST" {
            args.push("-P".to_string());
            if !request.data.is_empty() {
                args.push("-D".to_string());
                args.push(request.data.clone());
            }
        }

        if !request.cookies.is_empty() {
            args.push("-c".to_string());
            args.push(cookie_file.to_string_lossy().into_owned());
        }

        if let Some(auth) = &request.http_auth {
            args.push("-p".to_string());
            args.push(auth.clone());
        }

        if self.options.set_referer {
            if let Some(referer) = &request.referer {
                args.push("-r".to_string());
                args.push(referer.clone());
            }
        }

        args.push(request.url.clone());
        args
    }
}

/// Assembles the probe command and the dispatch-independent options:
/// random seed, interaction-mode flags, proxy, excluded patterns, page
/// budget, user agent and the timer-override toggle.
fn build_base_cmd(options: &Options) -> Vec<String> {
    let mut cmd = options.probe_cmd.clone();

    cmd.push("-R".to_string());
    cmd.push(options.random_seed.clone());

    if options.mode != CrawlMode::Aggressive {
        cmd.push("-f".to_string()); // don't fill values
    }
    if options.mode == CrawlMode::Passive {
        cmd.push("-t".to_string()); // don't trigger events
    }

    if let Some(proxy) = &options.proxy {
        cmd.push(format!("--proxy-type={}", proxy.proto));
        cmd.push(format!("--proxy={}", proxy.address()));
    }

    if !options.excluded_urls.is_empty() {
        cmd.push("-X".to_string());
        cmd.push(
            options
                .excluded_urls
                .iter()
                .map(|r| r.as_str())
                .collect::<Vec<_>>()
                .join(","),
        );
    }

    cmd.push("-x".to_string());
    cmd.push(options.process_timeout.to_string());
    cmd.push("-A".to_string());
    cmd.push(options.user_agent.clone());

    if !options.override_timeout_functions {
        cmd.push("-O".to_string());
    }

    cmd
}

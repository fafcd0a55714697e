use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{ClientConfig, load_config};
use crate::error::format_api_error;
use crate::query::{JobStatus, QuerySpec, ResultLocationReply, StatusReply, SubmitReply, TokenReply};
use crate::util::{basic_auth_header, timestamped_filename, urljoin};

/// Default wait between status polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Default prefix for downloaded result files.
const DEFAULT_FILE_PREFIX: &str = "gardin_query_api_results_";

/// Blocking client for the Gardin query API.
///
/// Drives the full workflow: OAuth2 client-credentials token, query
/// submission, status polling, and result download. All I/O is synchronous
/// and runs on the calling thread.
#[derive(Debug, Clone)]
pub struct Client {
    auth_url: String,
    api_url: String,
    client_id: String,
    client_secret: String,

    poll_interval: Duration,
    max_wait: Option<Duration>,
    output_dir: PathBuf,
    file_prefix: String,
    progress: bool,

    http: HttpClient,
}

impl Client {
    /// Creates a client using environment variables and/or `.gardinrc`.
    ///
    /// This is equivalent to `Client::new(None, None, None, None)`.
    pub fn from_env() -> Result<Self> {
        Self::new(None, None, None, None)
    }

    /// Creates a client using (in order of precedence):
    /// - explicit arguments
    /// - environment variables `GARDIN_AUTH_URL` / `GARDIN_API_URL` /
    ///   `GARDIN_CLIENT_ID` / `GARDIN_CLIENT_SECRET`
    /// - config file from `GARDIN_RC` or `.gardinrc`
    pub fn new(
        auth_url: Option<String>,
        api_url: Option<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Result<Self> {
        let cfg = load_config(auth_url, api_url, client_id, client_secret)?;
        Self::from_config(cfg)
    }

    /// Creates a client from an already-resolved configuration.
    pub fn from_config(cfg: ClientConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gardin-query-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("gardin-query-rs")),
        );

        // Per-request timeouts are left at the HTTP client's defaults.
        let mut builder = HttpClient::builder().default_headers(default_headers);

        if !cfg.verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().context("failed to build HTTP client")?;

        Ok(Self {
            auth_url: cfg.auth_url,
            api_url: cfg.api_url,
            client_id: cfg.client_id,
            client_secret: cfg.client_secret,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
            output_dir: PathBuf::from("."),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            progress: true,
            http,
        })
    }

    /// Wait between status polls (default 10 seconds).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Upper bound on total polling time. The default is no bound: a job
    /// that never reaches a terminal state is polled forever.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Directory result files are written into (default: current directory).
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Result filename prefix (default `gardin_query_api_results_`).
    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Submits a query and downloads its results.
    ///
    /// Sequences the whole workflow: authenticate, submit, poll until the
    /// job is terminal, then fetch the signed result URI and save the file.
    /// Fails without downloading when the job ends in any state other than
    /// `COMPLETED`.
    pub fn retrieve(&self, query: &QuerySpec) -> Result<PathBuf> {
        let token = self.authenticate()?;
        let query_id = self.submit(&token, query)?;
        eprintln!("Query submitted with id: {}", query_id);

        let status = self.wait_until_terminal(&token, &query_id)?;
        if !status.is_complete() {
            bail!(
                "query {} did not complete (terminal status: {})",
                query_id,
                status
            );
        }

        let uri = self.result_location(&token, &query_id)?;
        self.save_results(&uri)
    }

    /// Exchanges the client credentials for a bearer token.
    ///
    /// A 2xx reply without an `access_token` field yields an empty string;
    /// that is the documented API contract, not an error here.
    pub fn authenticate(&self) -> Result<String> {
        let url = urljoin(&self.auth_url, "/oauth2/token");
        let resp = self
            .http
            .post(&url)
            .header(
                AUTHORIZATION,
                basic_auth_header(&self.client_id, &self.client_secret),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .context("token request could not be sent")?;

        let reply: TokenReply = self.expect_json("authentication", &url, resp)?;
        Ok(reply.access_token)
    }

    /// Posts a query specification and returns the opaque job id.
    pub fn submit(&self, token: &str, query: &QuerySpec) -> Result<String> {
        let url = urljoin(&self.api_url, "/v1/query");
        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(query)
            .send()
            .context("query submission could not be sent")?;

        let reply: SubmitReply = self.expect_json("query submission", &url, resp)?;
        Ok(reply.query_id)
    }

    /// Fetches the current status of a submitted query.
    pub fn query_status(&self, token: &str, query_id: &str) -> Result<JobStatus> {
        // Trailing slash is part of the API contract.
        let url = urljoin(&self.api_url, &format!("/v1/query/{}/status/", query_id));
        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .context("status request could not be sent")?;

        let reply: StatusReply = self.expect_json("status check", &url, resp)?;
        Ok(reply.into_status())
    }

    /// Polls the job on a fixed interval until it reaches a terminal state
    /// and returns that state.
    ///
    /// Only "still pending" is waited out; an HTTP failure during polling
    /// aborts immediately. Blocks the calling thread for the whole wait.
    pub fn wait_until_terminal(&self, token: &str, query_id: &str) -> Result<JobStatus> {
        poll_until_terminal(self.poll_interval, self.max_wait, || {
            self.query_status(token, query_id)
        })
    }

    /// Requests the short-lived signed download URI for a completed query.
    ///
    /// The URI is returned verbatim; expiry and well-formedness are the
    /// caller's problem. Missing `uri` on a 2xx yields an empty string.
    pub fn result_location(&self, token: &str, query_id: &str) -> Result<String> {
        let url = urljoin(
            &self.api_url,
            &format!("/v1/query/{}/result/download", query_id),
        );
        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .context("result location request could not be sent")?;

        let reply: ResultLocationReply = self.expect_json("result location", &url, resp)?;
        Ok(reply.uri)
    }

    /// Downloads the signed URI (unauthenticated) into
    /// `<output_dir>/<prefix><unix-seconds>.csv`.
    ///
    /// The body is streamed to a `.part` file which is renamed into place
    /// after a successful flush, so a final file only ever holds a complete
    /// download.
    pub fn save_results(&self, signed_uri: &str) -> Result<PathBuf> {
        let target = self
            .output_dir
            .join(timestamped_filename(&self.file_prefix));
        eprintln!("Downloading results to {}", target.display());

        let resp = self
            .http
            .get(signed_uri)
            .send()
            .context("download request could not be sent")?;
        let mut resp = resp.error_for_status().context("download request failed")?;

        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create directory {}", parent.display()))?;
            }
        }

        let pb = if self.progress {
            Some(download_progress(resp.content_length()))
        } else {
            None
        };

        let part = target.with_extension("csv.part");
        let mut out = File::create(&part)
            .with_context(|| format!("failed to create {}", part.display()))?;

        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = resp.read(&mut buf).context("download interrupted")?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])
                .with_context(|| format!("failed to write {}", part.display()))?;
            if let Some(pb) = &pb {
                pb.inc(n as u64);
            }
        }

        out.flush()
            .with_context(|| format!("failed to flush {}", part.display()))?;
        drop(out);

        std::fs::rename(&part, &target)
            .with_context(|| format!("failed to move {} into place", part.display()))?;

        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }
        eprintln!("Download completed");
        Ok(target)
    }

    fn expect_json<T: DeserializeOwned>(
        &self,
        action: &str,
        url: &str,
        resp: Response,
    ) -> Result<T> {
        let status = resp.status();
        eprintln!("{}: HTTP {}", action, status);

        let text = resp.text().unwrap_or_default();
        if !status.is_success() {
            return Err(format_api_error(action, status, url, &text));
        }

        serde_json::from_str::<T>(&text)
            .with_context(|| format!("failed to parse API JSON (url={}, status={})", url, status))
    }
}

fn download_progress(content_length: Option<u64>) -> ProgressBar {
    match content_length {
        Some(len) => {
            let pb = ProgressBar::new(len);
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} {bytes}/{total_bytes} ({bytes_per_sec}) {wide_bar} {eta}",
                )
                .unwrap()
                .progress_chars("=>-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    }
}

/// The polling loop: fetch, sleep the fixed interval while pending, stop on
/// the first terminal status. Unbounded unless `max_wait` is set.
fn poll_until_terminal<F>(
    interval: Duration,
    max_wait: Option<Duration>,
    mut fetch: F,
) -> Result<JobStatus>
where
    F: FnMut() -> Result<JobStatus>,
{
    let started = Instant::now();
    loop {
        let status = fetch()?;

        if status.is_pending() {
            if let Some(max) = max_wait {
                if started.elapsed() >= max {
                    bail!(
                        "query still pending after {:.0?} (last status: {})",
                        max,
                        status
                    );
                }
            }
            eprintln!(
                "Waiting {:.0?} for query to complete, current status: {}",
                interval, status
            );
            thread::sleep(interval);
            continue;
        }

        match &status {
            JobStatus::Completed => eprintln!("Query completed with status: {}", status),
            JobStatus::Unknown(raw) => eprintln!("Unknown query status: {}", raw),
            _ => eprintln!("Query failed with status: {}", status),
        }
        return Ok(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn scripted(statuses: &[&'static str]) -> (impl FnMut() -> Result<JobStatus>, &'static Cell<usize>) {
        // Leaked cell keeps the borrow checker out of the test's way.
        let calls: &'static Cell<usize> = Box::leak(Box::new(Cell::new(0)));
        let statuses: Vec<&'static str> = statuses.to_vec();
        let fetch = move || {
            let i = calls.get();
            calls.set(i + 1);
            Ok(JobStatus::from(statuses[i].to_string()))
        };
        (fetch, calls)
    }

    #[test]
    fn pending_statuses_are_polled_until_completed() {
        let (fetch, calls) = scripted(&["SUBMITTED", "RUNNING", "COMPLETED"]);
        let interval = Duration::from_millis(10);

        let started = Instant::now();
        let status = poll_until_terminal(interval, None, fetch).unwrap();

        assert_eq!(status, JobStatus::Completed);
        assert_eq!(calls.get(), 3);
        // One sleep after each of the two pending statuses.
        assert!(started.elapsed() >= interval * 2);
    }

    #[test]
    fn failed_is_terminal_without_sleeping() {
        let (fetch, calls) = scripted(&["FAILED"]);
        let status = poll_until_terminal(Duration::from_secs(60), None, fetch).unwrap();
        assert_eq!(status, JobStatus::Failed);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn cancelled_is_terminal() {
        let (fetch, _) = scripted(&["IN_PROGRESS", "CANCELLED"]);
        let status = poll_until_terminal(Duration::from_millis(1), None, fetch).unwrap();
        assert_eq!(status, JobStatus::Cancelled);
    }

    #[test]
    fn unrecognized_status_is_terminal_failure() {
        let (fetch, calls) = scripted(&["WEIRD"]);
        let status = poll_until_terminal(Duration::from_secs(60), None, fetch).unwrap();
        assert_eq!(status, JobStatus::Unknown("WEIRD".to_string()));
        assert_eq!(calls.get(), 1);
        assert!(!status.is_complete());
    }

    #[test]
    fn fetch_error_aborts_polling() {
        let err = poll_until_terminal(Duration::from_millis(1), None, || {
            anyhow::bail!("status check failed: HTTP 500 Internal Server Error")
        })
        .unwrap_err();
        assert!(err.to_string().contains("status check failed"));
    }

    #[test]
    fn max_wait_gives_up_on_forever_pending_jobs() {
        let err = poll_until_terminal(
            Duration::from_millis(1),
            Some(Duration::from_millis(20)),
            || Ok(JobStatus::Running),
        )
        .unwrap_err();
        assert!(err.to_string().contains("still pending"));
    }
}

//! GitHub contents API adapter
//!
//! Sync HTTP via ureq, one request per read or write, no async runtime.
//! Revisions are blob shas: reads return the sha of the fetched file,
//! conditional writes send it back and the API rejects the update when the
//! file moved on. Transient failures (transport errors, 5xx) are retried
//! with exponential backoff; conflicts and 4xx are not.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{RemoteBlob, SnapshotStore, StoreError, StoreResult};

const API_ROOT: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("netpulse/", env!("CARGO_PKG_VERSION"));
const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Store backed by the GitHub contents API, scoped to one repo + branch.
pub struct GithubStore {
    agent: ureq::Agent,
    token: String,
    owner: String,
    repo: String,
    branch: String,
}

fn make_agent() -> ureq::Agent {
    ureq::config::Config::builder()
        .http_status_as_error(false) // statuses are part of the store contract, handled below
        .timeout_global(Some(CALL_TIMEOUT))
        .build()
        .new_agent()
}

impl GithubStore {
    pub fn new(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            agent: make_agent(),
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
        }
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{API_ROOT}/repos/{}/{}/contents/{}",
            self.owner, self.repo, path
        )
    }

    /// Run a request, retrying transport failures and 5xx responses.
    fn with_retry<F>(&self, path: &str, mut call: F) -> StoreResult<ureq::http::Response<ureq::Body>>
    where
        F: FnMut() -> Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call() {
                Ok(response) if response.status().is_server_error() && attempt < MAX_ATTEMPTS => {
                    warn!(
                        path,
                        status = response.status().as_u16(),
                        attempt,
                        "transient store error, retrying"
                    );
                }
                Ok(response) => return Ok(response),
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!(path, error = %e, attempt, "transport failure, retrying");
                }
                Err(e) => {
                    return Err(StoreError::Transport {
                        path: path.to_string(),
                        message: e.to_string(),
                    })
                }
            }
            std::thread::sleep(BACKOFF_BASE * 2u32.pow(attempt - 1));
        }
    }

    fn api_error(&self, path: &str, response: ureq::http::Response<ureq::Body>) -> StoreError {
        let status = response.status().as_u16();
        let message = response.into_body().read_to_string().unwrap_or_default();
        StoreError::Api {
            path: path.to_string(),
            status,
            message,
        }
    }
}

impl SnapshotStore for GithubStore {
    fn read(&self, path: &str) -> StoreResult<RemoteBlob> {
        let url = format!("{}?ref={}", self.contents_url(path), self.branch);
        let response = self.with_retry(path, || {
            self.agent
                .get(&url)
                .header("Authorization", &format!("Bearer {}", self.token))
                .header("Accept", "application/vnd.github+json")
                .header("User-Agent", USER_AGENT)
                .call()
        })?;

        match response.status().as_u16() {
            200 => {}
            404 => {
                return Err(StoreError::NotFound {
                    path: path.to_string(),
                })
            }
            _ => return Err(self.api_error(path, response)),
        }

        let file: ContentsFile =
            response
                .into_body()
                .read_json()
                .map_err(|e| StoreError::Decode {
                    path: path.to_string(),
                    message: e.to_string(),
                })?;
        let content = decode_content(path, &file.content)?;
        debug!(path, revision = %file.sha, bytes = content.len(), "read blob");
        Ok(RemoteBlob {
            content,
            revision: file.sha,
        })
    }

    fn write(
        &self,
        path: &str,
        content: &str,
        revision: Option<&str>,
        message: &str,
    ) -> StoreResult<String> {
        let url = self.contents_url(path);
        let body = UpdateRequest {
            message,
            content: BASE64.encode(content.as_bytes()),
            branch: &self.branch,
            sha: revision,
        };
        let response = self.with_retry(path, || {
            self.agent
                .put(&url)
                .header("Authorization", &format!("Bearer {}", self.token))
                .header("Accept", "application/vnd.github+json")
                .header("User-Agent", USER_AGENT)
                .send_json(&body)
        })?;

        match response.status().as_u16() {
            200 | 201 => {}
            404 => {
                return Err(StoreError::NotFound {
                    path: path.to_string(),
                })
            }
            // A stale sha comes back as 409; a missing sha for an existing
            // file as 422.
            409 | 422 => {
                return Err(StoreError::Conflict {
                    path: path.to_string(),
                })
            }
            _ => return Err(self.api_error(path, response)),
        }

        let update: UpdateResponse =
            response
                .into_body()
                .read_json()
                .map_err(|e| StoreError::Decode {
                    path: path.to_string(),
                    message: e.to_string(),
                })?;
        debug!(path, revision = %update.content.sha, "wrote blob");
        Ok(update.content.sha)
    }
}

/// The API wraps base64 payloads at 60 columns; strip the line breaks
/// before decoding.
fn decode_content(path: &str, raw: &str) -> StoreResult<String> {
    let stripped: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = BASE64.decode(stripped.as_bytes()).map_err(|e| StoreError::Decode {
        path: path.to_string(),
        message: format!("invalid base64 content: {e}"),
    })?;
    String::from_utf8(bytes).map_err(|e| StoreError::Decode {
        path: path.to_string(),
        message: format!("content is not UTF-8: {e}"),
    })
}

#[derive(Deserialize)]
struct ContentsFile {
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Serialize)]
struct UpdateRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Deserialize)]
struct UpdateResponse {
    content: ContentsFile,
}

//! Pull-request creation against a remote forge.
//!
//! The trait seam exists so the publish transaction can be exercised in
//! tests without network access.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const GITHUB_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("relink/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Everything needed to open a pull request.
#[derive(Debug, Clone, Serialize)]
pub struct PullRequestSpec {
    pub branch: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

/// A created pull request, as reported by the forge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: String,
}

pub trait RemotePublisher {
    fn create_pull_request(&self, spec: &PullRequestSpec) -> Result<PullRequestRef>;
}

/// Publishes pull requests through the GitHub REST API.
pub struct GithubPublisher {
    slug: String,
    token: String,
}

impl GithubPublisher {
    pub fn new(slug: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            token: token.into(),
        }
    }
}

#[derive(Serialize)]
struct CreatePullRequestBody<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

#[derive(Deserialize)]
struct PullRequestResponse {
    number: u64,
    html_url: String,
}

impl RemotePublisher for GithubPublisher {
    fn create_pull_request(&self, spec: &PullRequestSpec) -> Result<PullRequestRef> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::publish_failed(format!("Failed to build HTTP client: {}", e)))?;

        let url = format!("{}/repos/{}/pulls", GITHUB_API_BASE, self.slug);
        let response = client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&CreatePullRequestBody {
                title: &spec.title,
                body: &spec.body,
                head: &spec.branch,
                base: &spec.base,
            })
            .send()
            .map_err(|e| Error::publish_failed(format!("Pull request creation failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::publish_failed(format!(
                "GitHub rejected the pull request ({}): {}",
                status,
                body.trim()
            )));
        }

        let created: PullRequestResponse = response
            .json()
            .map_err(|e| Error::publish_failed(format!("Malformed pull request response: {}", e)))?;

        Ok(PullRequestRef {
            number: created.number,
            url: created.html_url,
        })
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::cell::RefCell;

    /// Records every request and answers with a fixed PR reference.
    #[derive(Default)]
    pub struct RecordingPublisher {
        pub requests: RefCell<Vec<PullRequestSpec>>,
        pub fail: bool,
    }

    impl RemotePublisher for RecordingPublisher {
        fn create_pull_request(&self, spec: &PullRequestSpec) -> Result<PullRequestRef> {
            self.requests.borrow_mut().push(spec.clone());
            if self.fail {
                return Err(Error::publish_failed("simulated API failure"));
            }
            Ok(PullRequestRef {
                number: 1,
                url: "https://github.com/acme/widgets/pull/1".to_string(),
            })
        }
    }
}

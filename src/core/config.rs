//! Run configuration: the YAML rule file driving a link update run.
//!
//! Parsing and defaults live here; pattern compilation lives in
//! [`crate::rewrite`] so that malformed patterns surface as configuration
//! errors before any file is touched.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_COMMIT_MESSAGE: &str = "chore: update repository links";
pub const DEFAULT_PR_BODY: &str =
    "Automated link updates generated by relink. Review the diff before merging.";

/// An ordered link-replacement rule.
///
/// `from` is a literal string unless `regex` is set; `to` may reference
/// capture groups (`$1`, `${name}`) in regex mode and is inserted verbatim
/// in literal mode. `scope` restricts the rule to files whose root-relative
/// path matches the glob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRule {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub regex: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Recognized GitHub URL shapes that can be canonicalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlKind {
    /// `https://github.com/{owner}/{repo}/blob/{ref}/{path}`
    Blob,
    /// `https://raw.githubusercontent.com/{owner}/{repo}/{ref}/{path}`
    Raw,
    /// `https://github.com/{owner}/{repo}/issues/{number}`
    Issue,
    /// `https://github.com/{owner}/{repo}/pull/{number}`
    Pull,
}

impl UrlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlKind::Blob => "blob",
            UrlKind::Raw => "raw",
            UrlKind::Issue => "issue",
            UrlKind::Pull => "pull",
        }
    }
}

/// Rewrite every URL of `kind` to the canonical `to` template.
///
/// Templates use `{owner}`, `{repo}`, `{ref}`, `{path}` and `{number}`
/// placeholders, filled from the matched URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlTypeRule {
    pub kind: UrlKind,
    pub to: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubUrls {
    #[serde(default)]
    pub types: Vec<UrlTypeRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// Root paths to scan, relative to the repository directory.
    #[serde(default = "default_paths")]
    pub paths: Vec<String>,
    /// File extensions considered candidate text files.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Ordered replacement rules, applied sequentially per file.
    #[serde(default)]
    pub links: Vec<LinkRule>,
    /// URL-shape canonicalization, applied after the replacement rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_urls: Option<GithubUrls>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
    /// Pull-request mode; direct commit when false.
    #[serde(default)]
    pub create_pr: bool,
    /// Tracked files excluded from the produced commit.
    #[serde(default = "default_protected")]
    pub protect: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_body: Option<String>,
    /// PR base branch; defaults to the branch checked out when the run starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
    /// `owner/repo` slug; defaults to the GITHUB_REPOSITORY environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

fn default_paths() -> Vec<String> {
    vec![".".to_string()]
}

fn default_extensions() -> Vec<String> {
    vec!["md".to_string()]
}

fn default_protected() -> Vec<String> {
    vec!["package.json".to_string(), "bun.lockb".to_string()]
}

impl RunConfig {
    pub fn commit_message(&self) -> &str {
        self.commit_message.as_deref().unwrap_or(DEFAULT_COMMIT_MESSAGE)
    }

    pub fn pr_title(&self) -> &str {
        self.pr_title.as_deref().unwrap_or_else(|| self.commit_message())
    }

    pub fn pr_body(&self) -> &str {
        self.pr_body.as_deref().unwrap_or(DEFAULT_PR_BODY)
    }

    pub fn url_types(&self) -> &[UrlTypeRule] {
        self.github_urls.as_ref().map(|g| g.types.as_slice()).unwrap_or(&[])
    }

    fn validate(&self) -> Result<()> {
        if self.paths.is_empty() {
            return Err(Error::config_invalid_value(
                "paths",
                None,
                "At least one scan path is required",
            ));
        }
        if self.extensions.is_empty() {
            return Err(Error::config_invalid_value(
                "extensions",
                None,
                "At least one file extension is required",
            ));
        }
        for ext in &self.extensions {
            if ext.starts_with('.') {
                return Err(Error::config_invalid_value(
                    "extensions",
                    Some(ext.clone()),
                    "Extensions are listed without the leading dot",
                ));
            }
        }
        for rule in &self.links {
            if rule.from.is_empty() {
                return Err(Error::config_invalid_value(
                    "links",
                    None,
                    "Rule 'from' must not be empty",
                ));
            }
        }
        Ok(())
    }
}

/// Parse and validate a run configuration from a YAML file.
pub fn load(path: &Path) -> Result<RunConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::config_missing_key(
                "config",
                Some(path.display().to_string()),
            )
            .with_hint("Create a .relink.yml or pass --config")
        } else {
            Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
        }
    })?;

    parse(&raw, &path.display().to_string())
}

/// Parse and validate a run configuration from YAML text.
pub fn parse(raw: &str, origin: &str) -> Result<RunConfig> {
    let config: RunConfig = serde_yml::from_str(raw)
        .map_err(|e| Error::config_invalid_yaml(origin, e.to_string()))?;
    config.validate()?;
    Ok(config)
}

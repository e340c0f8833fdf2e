//! Link rewriting engine.
//!
//! Pure content transformation: no filesystem or network access. Rules are
//! applied in configuration order against the progressively rewritten
//! content, so an earlier rule's output is input to a later rule. URL-shape
//! canonicalization runs second, after all replacement rules — that relative
//! order is a contract, not an accident. Canonicalization is applied globally
//! per shape and is order-independent across shapes (the recognized shapes do
//! not overlap).
//!
//! A rule whose replacement re-matches an earlier rule is left as written;
//! the chain is never re-run to a fixed point. Rules whose output re-matches
//! themselves grow without bound and are a configuration hazard the engine
//! does not guard against.

use regex::{Captures, NoExpand, Regex};

use crate::config::{LinkRule, RunConfig, UrlKind, UrlTypeRule};
use crate::error::{Error, Result};

/// A single compiled replacement rule.
#[derive(Debug)]
pub struct CompiledRule {
    pattern: Regex,
    replacement: String,
    literal: bool,
    scope: Option<String>,
}

/// A compiled URL-shape canonicalization.
#[derive(Debug)]
pub struct CompiledUrlType {
    pub kind: UrlKind,
    shape: Regex,
    template: String,
}

/// The full compiled rule set for a run. Immutable once built.
#[derive(Debug)]
pub struct CompiledRules {
    rules: Vec<CompiledRule>,
    url_types: Vec<CompiledUrlType>,
}

// Shapes match the URL forms GitHub itself emits. The trailing character
// classes stop at whitespace and markdown/HTML link delimiters so a URL
// embedded in prose or a link target is captured without its surroundings.
fn shape_pattern(kind: UrlKind) -> &'static str {
    match kind {
        UrlKind::Blob => {
            r#"https://github\.com/(?P<owner>[A-Za-z0-9_.-]+)/(?P<repo>[A-Za-z0-9_.-]+)/blob/(?P<ref>[^/\s)\]>'"]+)/(?P<path>[^\s)\]>'"]+)"#
        }
        UrlKind::Raw => {
            r#"https://raw\.githubusercontent\.com/(?P<owner>[A-Za-z0-9_.-]+)/(?P<repo>[A-Za-z0-9_.-]+)/(?P<ref>[^/\s)\]>'"]+)/(?P<path>[^\s)\]>'"]+)"#
        }
        UrlKind::Issue => {
            r"https://github\.com/(?P<owner>[A-Za-z0-9_.-]+)/(?P<repo>[A-Za-z0-9_.-]+)/issues/(?P<number>\d+)"
        }
        UrlKind::Pull => {
            r"https://github\.com/(?P<owner>[A-Za-z0-9_.-]+)/(?P<repo>[A-Za-z0-9_.-]+)/pull/(?P<number>\d+)"
        }
    }
}

fn placeholders_for(kind: UrlKind) -> &'static [&'static str] {
    match kind {
        UrlKind::Blob | UrlKind::Raw => &["owner", "repo", "ref", "path"],
        UrlKind::Issue | UrlKind::Pull => &["owner", "repo", "number"],
    }
}

impl CompiledRules {
    /// Compile every rule in the configuration. Any malformed pattern or
    /// template fails here, before a single file is read.
    pub fn compile(config: &RunConfig) -> Result<Self> {
        let rules = config
            .links
            .iter()
            .map(compile_rule)
            .collect::<Result<Vec<_>>>()?;

        let url_types = config
            .url_types()
            .iter()
            .map(compile_url_type)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules, url_types })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.url_types.is_empty()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn url_type_count(&self) -> usize {
        self.url_types.len()
    }

    /// Whether any rule can apply to a file at this root-relative path.
    ///
    /// URL canonicalization is unscoped, so its presence makes every
    /// candidate file relevant.
    pub fn applies_to(&self, rel_path: &str) -> bool {
        if !self.url_types.is_empty() {
            return true;
        }
        self.rules.iter().any(|rule| match &rule.scope {
            Some(scope) => glob_match::glob_match(scope, rel_path),
            None => true,
        })
    }
}

fn compile_rule(rule: &LinkRule) -> Result<CompiledRule> {
    let pattern = if rule.regex {
        Regex::new(&rule.from)
            .map_err(|e| Error::config_invalid_pattern(&rule.from, e.to_string()))?
    } else {
        // Escaped literals always compile; the map_err is for completeness.
        Regex::new(&regex::escape(&rule.from))
            .map_err(|e| Error::config_invalid_pattern(&rule.from, e.to_string()))?
    };

    Ok(CompiledRule {
        pattern,
        replacement: rule.to.clone(),
        literal: !rule.regex,
        scope: rule.scope.clone(),
    })
}

fn compile_url_type(rule: &UrlTypeRule) -> Result<CompiledUrlType> {
    let shape = Regex::new(shape_pattern(rule.kind))
        .map_err(|e| Error::config_invalid_pattern(rule.kind.as_str(), e.to_string()))?;

    let allowed = placeholders_for(rule.kind);
    for name in template_placeholders(&rule.to) {
        if !allowed.contains(&name.as_str()) {
            return Err(Error::config_invalid_value(
                "githubUrls",
                Some(rule.to.clone()),
                format!(
                    "Unknown placeholder '{{{}}}' for URL type '{}' (allowed: {})",
                    name,
                    rule.kind.as_str(),
                    allowed.join(", ")
                ),
            ));
        }
    }

    Ok(CompiledUrlType {
        kind: rule.kind,
        shape,
        template: rule.to.clone(),
    })
}

fn template_placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        match rest[start..].find('}') {
            Some(offset) => {
                names.push(rest[start + 1..start + offset].to_string());
                rest = &rest[start + offset + 1..];
            }
            None => break,
        }
    }
    names
}

fn render_template(template: &str, caps: &Captures) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        match rest[start..].find('}') {
            Some(offset) => {
                let name = &rest[start + 1..start + offset];
                match caps.name(name) {
                    Some(m) => out.push_str(m.as_str()),
                    None => out.push_str(&rest[start..start + offset + 1]),
                }
                rest = &rest[start + offset + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Apply the full rule set to one file's content.
///
/// `rel_path` is the file's path relative to the scanned repository
/// directory; it gates scoped rules. Returns the rewritten content and
/// whether it differs byte-for-byte from the original.
pub fn rewrite(content: &str, rules: &CompiledRules, rel_path: &str) -> (String, bool) {
    let mut current = content.to_string();

    for rule in &rules.rules {
        if let Some(scope) = &rule.scope {
            if !glob_match::glob_match(scope, rel_path) {
                continue;
            }
        }
        current = if rule.literal {
            rule.pattern
                .replace_all(&current, NoExpand(&rule.replacement))
                .into_owned()
        } else {
            rule.pattern
                .replace_all(&current, rule.replacement.as_str())
                .into_owned()
        };
    }

    for url_type in &rules.url_types {
        current = url_type
            .shape
            .replace_all(&current, |caps: &Captures| {
                render_template(&url_type.template, caps)
            })
            .into_owned();
    }

    let changed = current != content;
    (current, changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GithubUrls, LinkRule, RunConfig, UrlTypeRule};

    fn config_with(links: Vec<LinkRule>, url_types: Vec<UrlTypeRule>) -> RunConfig {
        let github_urls = if url_types.is_empty() {
            None
        } else {
            Some(GithubUrls { types: url_types })
        };
        crate::config::parse("{}", "test")
            .map(|mut c| {
                c.links = links;
                c.github_urls = github_urls;
                c
            })
            .unwrap()
    }

    fn literal(from: &str, to: &str) -> LinkRule {
        LinkRule {
            from: from.to_string(),
            to: to.to_string(),
            regex: false,
            scope: None,
        }
    }

    #[test]
    fn literal_rule_replaces_every_occurrence() {
        let config = config_with(vec![literal("docs/old.md", "docs/new.md")], vec![]);
        let rules = CompiledRules::compile(&config).unwrap();

        let (out, changed) = rewrite("see docs/old.md and docs/old.md", &rules, "README.md");
        assert!(changed);
        assert_eq!(out, "see docs/new.md and docs/new.md");
    }

    #[test]
    fn rules_compose_sequentially() {
        let config = config_with(
            vec![literal("foo", "bar"), literal("bar", "baz")],
            vec![],
        );
        let rules = CompiledRules::compile(&config).unwrap();

        let (out, changed) = rewrite("foo", &rules, "README.md");
        assert!(changed);
        assert_eq!(out, "baz");
    }

    #[test]
    fn earlier_rules_do_not_rematch_later_output() {
        // bar→foo runs before foo→baz; the produced "foo" is seen by the
        // later rule (forward composition), but nothing loops back.
        let config = config_with(
            vec![literal("bar", "foo"), literal("foo", "baz")],
            vec![],
        );
        let rules = CompiledRules::compile(&config).unwrap();

        let (out, _) = rewrite("bar", &rules, "README.md");
        assert_eq!(out, "baz");
    }

    #[test]
    fn empty_rule_set_is_a_noop() {
        let config = config_with(vec![], vec![]);
        let rules = CompiledRules::compile(&config).unwrap();

        let (out, changed) = rewrite("anything at all", &rules, "README.md");
        assert!(!changed);
        assert_eq!(out, "anything at all");
    }

    #[test]
    fn rewrite_is_idempotent() {
        let config = config_with(vec![literal("docs/old.md", "docs/new.md")], vec![]);
        let rules = CompiledRules::compile(&config).unwrap();

        let (first, changed) = rewrite("see docs/old.md", &rules, "README.md");
        assert!(changed);
        let (second, changed_again) = rewrite(&first, &rules, "README.md");
        assert!(!changed_again);
        assert_eq!(first, second);
    }

    #[test]
    fn scoped_rule_skips_files_outside_scope() {
        let mut rule = literal("old", "new");
        rule.scope = Some("docs/**".to_string());
        let config = config_with(vec![rule], vec![]);
        let rules = CompiledRules::compile(&config).unwrap();

        let (_, changed) = rewrite("old", &rules, "README.md");
        assert!(!changed);
        let (out, changed) = rewrite("old", &rules, "docs/guide.md");
        assert!(changed);
        assert_eq!(out, "new");
    }

    #[test]
    fn regex_rule_expands_capture_groups() {
        let config = config_with(
            vec![LinkRule {
                from: r"docs/(\w+)-v1\.md".to_string(),
                to: "docs/$1.md".to_string(),
                regex: true,
                scope: None,
            }],
            vec![],
        );
        let rules = CompiledRules::compile(&config).unwrap();

        let (out, _) = rewrite("see docs/setup-v1.md", &rules, "README.md");
        assert_eq!(out, "see docs/setup.md");
    }

    #[test]
    fn literal_replacement_dollar_signs_are_not_expanded() {
        let config = config_with(vec![literal("PRICE", "$100")], vec![]);
        let rules = CompiledRules::compile(&config).unwrap();

        let (out, _) = rewrite("cost: PRICE", &rules, "README.md");
        assert_eq!(out, "cost: $100");
    }

    #[test]
    fn invalid_regex_fails_at_compile_time() {
        let config = config_with(
            vec![LinkRule {
                from: "(unclosed".to_string(),
                to: "x".to_string(),
                regex: true,
                scope: None,
            }],
            vec![],
        );
        let err = CompiledRules::compile(&config).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ConfigInvalidPattern);
    }

    #[test]
    fn raw_urls_canonicalize_to_blob_form() {
        let config = config_with(
            vec![],
            vec![UrlTypeRule {
                kind: UrlKind::Raw,
                to: "https://github.com/{owner}/{repo}/blob/{ref}/{path}".to_string(),
            }],
        );
        let rules = CompiledRules::compile(&config).unwrap();

        let (out, changed) = rewrite(
            "see https://raw.githubusercontent.com/acme/widgets/main/docs/a.md here",
            &rules,
            "README.md",
        );
        assert!(changed);
        assert_eq!(out, "see https://github.com/acme/widgets/blob/main/docs/a.md here");
    }

    #[test]
    fn issue_urls_canonicalize_and_stop_at_markdown_delimiters() {
        let config = config_with(
            vec![],
            vec![UrlTypeRule {
                kind: UrlKind::Issue,
                to: "{owner}/{repo}#{number}".to_string(),
            }],
        );
        let rules = CompiledRules::compile(&config).unwrap();

        let (out, _) = rewrite(
            "[bug](https://github.com/acme/widgets/issues/42)",
            &rules,
            "README.md",
        );
        assert_eq!(out, "[bug](acme/widgets#42)");
    }

    #[test]
    fn url_types_apply_after_replacement_rules() {
        // The literal rule rewrites the repo slug; canonicalization then
        // sees the already-rewritten URL.
        let config = config_with(
            vec![literal("acme/old-widgets", "acme/widgets")],
            vec![UrlTypeRule {
                kind: UrlKind::Pull,
                to: "{owner}/{repo}#{number}".to_string(),
            }],
        );
        let rules = CompiledRules::compile(&config).unwrap();

        let (out, _) = rewrite(
            "https://github.com/acme/old-widgets/pull/7",
            &rules,
            "README.md",
        );
        assert_eq!(out, "acme/widgets#7");
    }

    #[test]
    fn unknown_template_placeholder_is_rejected() {
        let config = config_with(
            vec![],
            vec![UrlTypeRule {
                kind: UrlKind::Issue,
                to: "{owner}/{repo}/{path}".to_string(),
            }],
        );
        let err = CompiledRules::compile(&config).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ConfigInvalidValue);
    }

    #[test]
    fn applies_to_honors_scopes() {
        let mut scoped = literal("a", "b");
        scoped.scope = Some("docs/**".to_string());
        let config = config_with(vec![scoped], vec![]);
        let rules = CompiledRules::compile(&config).unwrap();

        assert!(rules.applies_to("docs/guide.md"));
        assert!(!rules.applies_to("README.md"));
    }

    #[test]
    fn applies_to_everything_when_url_types_present() {
        let config = config_with(
            vec![],
            vec![UrlTypeRule {
                kind: UrlKind::Blob,
                to: "https://github.com/{owner}/{repo}/raw/{ref}/{path}".to_string(),
            }],
        );
        let rules = CompiledRules::compile(&config).unwrap();
        assert!(rules.applies_to("anything.md"));
    }
}

//! The publish transaction: protect, stage, commit, push, open a PR.
//!
//! The transaction exists only when the aggregator has reported changes.
//! `protect` snapshots tracked protected files as they sit in the work tree
//! at that moment; cleanup always runs afterwards, restores those snapshots
//! byte-for-byte, and removes the exclusion marker. Protected rewrites thus
//! stay on disk but never enter history. Cleanup failures degrade to
//! warnings so they never mask the outcome of the run itself.

use serde::Serialize;

use crate::config::RunConfig;
use crate::error::Result;
use crate::git;
use crate::remote::{PullRequestRef, PullRequestSpec, RemotePublisher};
use crate::repo::RepoContext;

/// Marker file staged-then-excluded so an otherwise-empty run still has a
/// deterministic staging surface.
pub const EXCLUSION_MARKER: &str = ".relink-ignore";

pub const BOT_NAME: &str = "relink[bot]";
pub const BOT_EMAIL: &str = "relink[bot]@users.noreply.github.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Idle,
    Protecting,
    Staged,
    Committed,
    Publishing,
    Cleaned,
    Done,
    Failed,
}

/// Knobs the transaction needs, detached from the full run configuration.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub commit_message: String,
    pub create_pr: bool,
    pub protect: Vec<String>,
    pub pr_title: String,
    pub pr_body: String,
    pub base_branch: Option<String>,
}

impl PublishOptions {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            commit_message: config.commit_message().to_string(),
            create_pr: config.create_pr,
            protect: config.protect.clone(),
            pr_title: config.pr_title().to_string(),
            pr_body: config.pr_body().to_string(),
            base_branch: config.base_branch.clone(),
        }
    }
}

#[derive(Debug)]
struct ProtectedFile {
    path: String,
    content: Vec<u8>,
}

/// What the transaction produced.
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub committed: bool,
    /// The branch the commit landed on, when one was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestRef>,
    pub warnings: Vec<String>,
}

pub struct PublishTransaction<'a> {
    ctx: &'a RepoContext,
    options: PublishOptions,
    state: TxState,
    protected: Vec<ProtectedFile>,
    marker_written: bool,
    warnings: Vec<String>,
}

impl<'a> PublishTransaction<'a> {
    pub fn new(ctx: &'a RepoContext, options: PublishOptions) -> Self {
        Self {
            ctx,
            options,
            state: TxState::Idle,
            protected: Vec::new(),
            marker_written: false,
            warnings: Vec::new(),
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Snapshot tracked protected files and drop the exclusion marker.
    ///
    /// Snapshots capture the work tree as the aggregator left it; cleanup
    /// restores exactly these bytes, so a rewrite of a protected file
    /// survives on disk while staying out of the commit.
    pub fn protect(&mut self) -> Result<()> {
        self.state = TxState::Protecting;

        for path in &self.options.protect {
            let full = std::path::Path::new(&self.ctx.dir).join(path);
            if !full.exists() || !git::is_tracked(&self.ctx.dir, path) {
                continue;
            }
            let content = std::fs::read(&full).map_err(|e| {
                crate::Error::internal_io(e.to_string(), Some(format!("snapshot {}", path)))
                    .in_step("protecting")
            })?;
            self.protected.push(ProtectedFile {
                path: path.clone(),
                content,
            });
        }

        let marker = std::path::Path::new(&self.ctx.dir).join(EXCLUSION_MARKER);
        std::fs::write(&marker, "# relink transaction marker\n").map_err(|e| {
            crate::Error::internal_io(e.to_string(), Some(EXCLUSION_MARKER.to_string()))
                .in_step("protecting")
        })?;
        self.marker_written = true;

        Ok(())
    }

    /// Stage, commit, push, and (in PR mode) open the pull request.
    ///
    /// Cleanup always runs before this returns, success or failure.
    pub fn commit_and_publish(
        &mut self,
        publisher: Option<&dyn RemotePublisher>,
    ) -> Result<PublishOutcome> {
        let result = self.run_forward(publisher);
        self.cleanup();
        match result {
            Ok(mut outcome) => {
                self.state = TxState::Done;
                outcome.warnings = self.warnings.clone();
                Ok(outcome)
            }
            Err(e) => {
                self.state = TxState::Failed;
                Err(e)
            }
        }
    }

    /// Roll back protection after a failure between `protect` and
    /// `commit_and_publish`.
    pub fn abort(&mut self) {
        self.cleanup();
        self.state = TxState::Failed;
    }

    fn run_forward(
        &mut self,
        publisher: Option<&dyn RemotePublisher>,
    ) -> Result<PublishOutcome> {
        let dir = self.ctx.dir.clone();

        // Stage everything, then pull the protected paths back out so the
        // commit never contains them.
        self.state = TxState::Staged;
        git::set_local_identity(&dir, BOT_NAME, BOT_EMAIL).map_err(|e| e.in_step("staging"))?;
        git::stage_all(&dir).map_err(|e| e.in_step("staging"))?;
        let mut excluded: Vec<&str> = self.options.protect.iter().map(String::as_str).collect();
        excluded.push(EXCLUSION_MARKER);
        git::unstage(&dir, &excluded).map_err(|e| e.in_step("staging"))?;

        if !git::has_staged_changes(&dir) {
            crate::log_status!("publish", "Nothing staged after exclusions; skipping commit");
            return Ok(PublishOutcome {
                committed: false,
                branch: None,
                pull_request: None,
                warnings: Vec::new(),
            });
        }

        self.state = TxState::Committed;
        let base = match &self.options.base_branch {
            Some(base) => base.clone(),
            None => git::current_branch(&dir).map_err(|e| e.in_step("committing"))?,
        };
        let branch = if self.options.create_pr {
            let name = format!("link-updates-{}", chrono::Utc::now().timestamp_millis());
            git::create_branch(&dir, &name).map_err(|e| e.in_step("committing"))?;
            Some(name)
        } else {
            None
        };
        git::commit(&dir, &self.options.commit_message).map_err(|e| e.in_step("committing"))?;

        self.state = TxState::Publishing;
        let pull_request = self.push_and_open_pr(&dir, &base, branch.as_deref(), publisher)?;

        Ok(PublishOutcome {
            committed: true,
            branch,
            pull_request,
            warnings: Vec::new(),
        })
    }

    fn push_and_open_pr(
        &mut self,
        dir: &str,
        base: &str,
        branch: Option<&str>,
        publisher: Option<&dyn RemotePublisher>,
    ) -> Result<Option<PullRequestRef>> {
        // Swap in a token-authenticated origin for the push, and always swap
        // the original back, even when the push fails.
        let original_url = match self.ctx.authenticated_remote_url() {
            Some(auth_url) => {
                let original =
                    git::get_remote_url(dir, "origin").map_err(|e| e.in_step("publishing"))?;
                git::set_remote_url(dir, "origin", &auth_url)
                    .map_err(|e| e.in_step("publishing"))?;
                Some(original)
            }
            None => None,
        };

        let push_result = match branch {
            Some(name) => git::push_branch(dir, "origin", name),
            None => git::push_current(dir, "origin"),
        };

        if let Some(url) = original_url {
            if let Err(e) = git::set_remote_url(dir, "origin", &url) {
                self.warn(format!("Failed to restore origin URL: {}", e));
            }
        }
        push_result.map_err(|e| e.in_step("publishing"))?;

        match (branch, publisher) {
            (Some(name), Some(publisher)) => {
                let spec = PullRequestSpec {
                    branch: name.to_string(),
                    base: base.to_string(),
                    title: self.options.pr_title.clone(),
                    body: self.options.pr_body.clone(),
                };
                let pr = publisher
                    .create_pull_request(&spec)
                    .map_err(|e| e.in_step("publishing"))?;
                crate::log_status!("publish", "Opened pull request #{}: {}", pr.number, pr.url);
                Ok(Some(pr))
            }
            _ => Ok(None),
        }
    }

    /// Restore snapshots and remove the marker. Never fails.
    fn cleanup(&mut self) {
        for file in &self.protected {
            let full = std::path::Path::new(&self.ctx.dir).join(&file.path);
            if let Err(e) = std::fs::write(&full, &file.content) {
                self.warnings
                    .push(format!("Failed to restore {}: {}", file.path, e));
            }
        }
        if self.marker_written {
            let marker = std::path::Path::new(&self.ctx.dir).join(EXCLUSION_MARKER);
            if marker.exists() {
                if let Err(e) = std::fs::remove_file(&marker) {
                    self.warnings
                        .push(format!("Failed to remove {}: {}", EXCLUSION_MARKER, e));
                }
            }
        }
        for warning in &self.warnings {
            crate::log_status!("cleanup", "{}", warning);
        }
        self.state = TxState::Cleaned;
    }

    fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::RecordingPublisher;

    struct TestRepo {
        work: tempfile::TempDir,
        origin: tempfile::TempDir,
    }

    impl TestRepo {
        fn dir(&self) -> &str {
            self.work.path().to_str().unwrap()
        }

        fn origin_dir(&self) -> &str {
            self.origin.path().to_str().unwrap()
        }

        fn write(&self, rel: &str, content: &str) {
            std::fs::write(self.work.path().join(rel), content).unwrap();
        }

        fn read(&self, rel: &str) -> String {
            std::fs::read_to_string(self.work.path().join(rel)).unwrap()
        }

        fn origin_log(&self) -> String {
            crate::utils::command::run_in(
                self.origin_dir(),
                "git",
                &["log", "--all", "--format=%s"],
                "git log",
            )
            .unwrap()
        }
    }

    /// A work repo with one commit on `main` and a bare origin it can push to.
    fn setup_repo() -> TestRepo {
        let work = tempfile::tempdir().unwrap();
        let origin = tempfile::tempdir().unwrap();
        let work_dir = work.path().to_str().unwrap();
        let origin_dir = origin.path().to_str().unwrap();

        crate::git::execute_git(origin_dir, &["init", "--bare", "--initial-branch=main"]).unwrap();
        crate::git::execute_git(work_dir, &["init", "--initial-branch=main"]).unwrap();
        crate::git::set_local_identity(work_dir, "Test", "test@example.com").unwrap();

        std::fs::write(work.path().join("README.md"), "see docs/old.md\n").unwrap();
        std::fs::write(work.path().join("package.json"), "{\"name\":\"demo\"}\n").unwrap();
        crate::git::stage_all(work_dir).unwrap();
        crate::git::commit(work_dir, "initial").unwrap();
        crate::git::execute_git(work_dir, &["remote", "add", "origin", origin_dir]).unwrap();
        crate::git::push_branch(work_dir, "origin", "main").unwrap();

        TestRepo { work, origin }
    }

    fn options(create_pr: bool) -> PublishOptions {
        PublishOptions {
            commit_message: "chore: update repository links".to_string(),
            create_pr,
            protect: vec!["package.json".to_string(), "bun.lockb".to_string()],
            pr_title: "chore: update repository links".to_string(),
            pr_body: "body".to_string(),
            base_branch: None,
        }
    }

    fn local_ctx(dir: &str) -> RepoContext {
        RepoContext {
            dir: dir.to_string(),
            slug: None,
            token: None,
        }
    }

    #[test]
    fn direct_commit_pushes_to_origin() {
        let repo = setup_repo();
        let ctx = local_ctx(repo.dir());
        let mut tx = PublishTransaction::new(&ctx, options(false));

        repo.write("README.md", "see docs/new.md\n");
        tx.protect().unwrap();
        let outcome = tx.commit_and_publish(None).unwrap();

        assert!(outcome.committed);
        assert!(outcome.branch.is_none());
        assert_eq!(tx.state(), TxState::Done);
        assert!(repo.origin_log().contains("chore: update repository links"));
    }

    #[test]
    fn pr_mode_creates_branch_and_opens_pull_request() {
        let repo = setup_repo();
        let ctx = local_ctx(repo.dir());
        let publisher = RecordingPublisher::default();
        let mut tx = PublishTransaction::new(&ctx, options(true));

        repo.write("README.md", "see docs/new.md\n");
        tx.protect().unwrap();
        let outcome = tx.commit_and_publish(Some(&publisher)).unwrap();

        let branch = outcome.branch.unwrap();
        assert!(branch.starts_with("link-updates-"));
        assert_eq!(outcome.pull_request.unwrap().number, 1);

        let requests = publisher.requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].branch, branch);
        assert_eq!(requests[0].base, "main");
    }

    #[test]
    fn protected_changes_stay_on_disk_but_out_of_the_commit() {
        let repo = setup_repo();
        let ctx = local_ctx(repo.dir());
        let mut tx = PublishTransaction::new(&ctx, options(false));

        // The rewriting pass has touched a normal file and a protected one.
        repo.write("README.md", "see docs/new.md\n");
        repo.write("package.json", "{\"name\":\"rewritten\"}\n");
        tx.protect().unwrap();
        tx.commit_and_publish(None).unwrap();

        // The protected rewrite survives on the work tree.
        assert_eq!(repo.read("package.json"), "{\"name\":\"rewritten\"}\n");
        // The commit only touched README.md.
        let files = crate::git::execute_git(
            repo.dir(),
            &["show", "--name-only", "--format=", "HEAD"],
        )
        .unwrap();
        assert_eq!(files, "README.md");
    }

    #[test]
    fn untracked_protected_files_are_not_snapshotted() {
        let repo = setup_repo();
        let ctx = local_ctx(repo.dir());
        let mut tx = PublishTransaction::new(&ctx, options(false));

        repo.write("README.md", "see docs/new.md\n");
        repo.write("bun.lockb", "lockfile\n");
        tx.protect().unwrap();
        tx.commit_and_publish(None).unwrap();

        // The untracked lockfile is left alone and kept out of the commit.
        assert_eq!(repo.read("bun.lockb"), "lockfile\n");
        let tracked = crate::git::execute_git(repo.dir(), &["ls-files"]).unwrap();
        assert!(!tracked.contains("bun.lockb"));
    }

    #[test]
    fn marker_never_survives_the_run() {
        let repo = setup_repo();
        let ctx = local_ctx(repo.dir());
        let mut tx = PublishTransaction::new(&ctx, options(false));

        repo.write("README.md", "see docs/new.md\n");
        tx.protect().unwrap();
        assert!(repo.work.path().join(EXCLUSION_MARKER).exists());
        tx.commit_and_publish(None).unwrap();
        assert!(!repo.work.path().join(EXCLUSION_MARKER).exists());

        let tracked = crate::git::execute_git(repo.dir(), &["ls-files"]).unwrap();
        assert!(!tracked.contains(EXCLUSION_MARKER));
    }

    #[test]
    fn nothing_staged_after_exclusions_skips_commit() {
        let repo = setup_repo();
        let ctx = local_ctx(repo.dir());
        let mut tx = PublishTransaction::new(&ctx, options(false));

        // Only a protected file changed; the commit is skipped entirely.
        repo.write("package.json", "{\"name\":\"rewritten\"}\n");
        tx.protect().unwrap();
        let outcome = tx.commit_and_publish(None).unwrap();

        assert!(!outcome.committed);
        assert_eq!(repo.read("package.json"), "{\"name\":\"rewritten\"}\n");
        assert_eq!(repo.origin_log(), "initial");
    }

    #[test]
    fn cleanup_runs_even_when_publish_fails() {
        let repo = setup_repo();
        let ctx = local_ctx(repo.dir());
        let mut tx = PublishTransaction::new(&ctx, options(false));

        repo.write("README.md", "see docs/new.md\n");
        repo.write("package.json", "{\"name\":\"rewritten\"}\n");
        tx.protect().unwrap();
        // Break the remote so the push fails mid-transaction.
        crate::git::set_remote_url(repo.dir(), "origin", "/nonexistent/origin.git").unwrap();

        let err = tx.commit_and_publish(None).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::GitCommandFailed);
        assert_eq!(err.details.get("step").and_then(|v| v.as_str()), Some("publishing"));
        assert_eq!(tx.state(), TxState::Failed);

        // Protection held: work tree as the snapshot saw it, marker gone.
        assert_eq!(repo.read("package.json"), "{\"name\":\"rewritten\"}\n");
        assert!(!repo.work.path().join(EXCLUSION_MARKER).exists());
    }

    #[test]
    fn publisher_failure_is_fatal_but_push_survives() {
        let repo = setup_repo();
        let ctx = local_ctx(repo.dir());
        let publisher = RecordingPublisher {
            fail: true,
            ..Default::default()
        };
        let mut tx = PublishTransaction::new(&ctx, options(true));

        repo.write("README.md", "see docs/new.md\n");
        tx.protect().unwrap();
        let err = tx.commit_and_publish(Some(&publisher)).unwrap_err();

        assert_eq!(err.code, crate::ErrorCode::PublishFailed);
        assert_eq!(err.details.get("step").and_then(|v| v.as_str()), Some("publishing"));
        assert_eq!(tx.state(), TxState::Failed);

        // The branch and its commit were already pushed and stay pushed.
        let refs = crate::git::execute_git(
            repo.origin_dir(),
            &["for-each-ref", "--format=%(refname:short)", "refs/heads/"],
        )
        .unwrap();
        assert!(refs.lines().any(|r| r.starts_with("link-updates-")));
        assert!(repo.origin_log().contains("chore: update repository links"));
        // Cleanup still ran.
        assert!(!repo.work.path().join(EXCLUSION_MARKER).exists());
    }

    #[test]
    fn abort_cleans_up_protection_state() {
        let repo = setup_repo();
        let ctx = local_ctx(repo.dir());
        let mut tx = PublishTransaction::new(&ctx, options(false));

        repo.write("package.json", "{\"name\":\"rewritten\"}\n");
        tx.protect().unwrap();
        tx.abort();

        assert_eq!(tx.state(), TxState::Failed);
        assert_eq!(repo.read("package.json"), "{\"name\":\"rewritten\"}\n");
        assert!(!repo.work.path().join(EXCLUSION_MARKER).exists());
    }
}

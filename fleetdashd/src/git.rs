//! Read-only git lookups against repositories on this host.
//!
//! A repository path must pass [`RepoSandbox::check`] before any `git`
//! process is started: it has to exist, carry a `.git` entry, and resolve
//! under one of the allowed roots. The sha is validated by the caller.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::runner::{CommandError, CommandRunner};

const MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);
const STAT_TIMEOUT: Duration = Duration::from_secs(10);

/// Unit separator between metadata fields.
const FIELD_SEP: char = '\u{1f}';

#[derive(Debug, Error)]
pub enum GitError {
    #[error("repository path does not exist: {}", .0.display())]
    PathMissing(PathBuf),

    #[error("not a git repository: {}", .0.display())]
    NotARepository(PathBuf),

    #[error("repository path is outside the allowed roots: {}", .0.display())]
    OutsideRoots(PathBuf),

    #[error("commit {sha} not found")]
    CommitNotFound { sha: String },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("unexpected git output: {0}")]
    Metadata(String),
}

// ── Sandbox ────────────────────────────────────────────────────────────────

/// Allow-list of filesystem roots git may be pointed at.
#[derive(Debug, Clone)]
pub struct RepoSandbox {
    roots: Vec<PathBuf>,
}

impl RepoSandbox {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }

    /// Canonical form of `path` if it is an allowed git checkout.
    pub async fn check(&self, path: &Path) -> Result<PathBuf, GitError> {
        let canonical = tokio::fs::canonicalize(path)
            .await
            .map_err(|_| GitError::PathMissing(path.to_path_buf()))?;

        if !tokio::fs::try_exists(canonical.join(".git"))
            .await
            .unwrap_or(false)
        {
            return Err(GitError::NotARepository(canonical));
        }

        for root in &self.roots {
            // Symlinked roots (e.g. /var/www -> /srv/www) compare by both forms.
            let resolved = tokio::fs::canonicalize(root).await.ok();
            if canonical.starts_with(root)
                || resolved.as_ref().is_some_and(|r| canonical.starts_with(r))
            {
                return Ok(canonical);
            }
        }
        Err(GitError::OutsideRoots(canonical))
    }
}

// ── Commit lookup ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitRecord {
    pub sha: String,
    pub short_sha: String,
    pub subject: String,
    pub body: String,
    pub author_name: String,
    pub author_email: String,
    pub date: String,
    pub stat: String,
}

#[derive(Clone)]
pub struct GitInspector {
    runner: Arc<dyn CommandRunner>,
}

impl GitInspector {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn git(
        &self,
        repo: &Path,
        args: &[&str],
        timeout: Duration,
    ) -> Result<crate::runner::CommandOutput, CommandError> {
        let mut full = vec!["-C".to_string(), repo.to_string_lossy().into_owned()];
        full.extend(args.iter().map(|a| a.to_string()));
        self.runner.run("git", &full, timeout).await
    }

    /// Look up one commit in a sandbox-checked repository.
    ///
    /// The message query decides existence; a failed stat query degrades
    /// to an empty stat.
    pub async fn commit_detail(&self, repo: &Path, sha: &str) -> Result<CommitRecord, GitError> {
        let message = match self
            .git(repo, &["show", "-s", "--format=%B", sha], MESSAGE_TIMEOUT)
            .await
        {
            Ok(out) if out.success => out.stdout,
            Ok(out) => {
                debug!(sha, stderr = %out.stderr.trim(), "git show message failed");
                return Err(GitError::CommitNotFound {
                    sha: sha.to_string(),
                });
            }
            Err(e) => {
                debug!(sha, "git show message errored: {}", e);
                return Err(GitError::CommitNotFound {
                    sha: sha.to_string(),
                });
            }
        };

        let meta = self
            .git(
                repo,
                &["show", "-s", "--format=%H%x1f%h%x1f%an%x1f%ae%x1f%aI", sha],
                METADATA_TIMEOUT,
            )
            .await?;
        if !meta.success {
            return Err(GitError::Metadata(meta.stderr.trim().to_string()));
        }
        let fields: Vec<&str> = meta.stdout.trim_end().split(FIELD_SEP).collect();
        let [full_sha, short_sha, author_name, author_email, date] = fields[..] else {
            return Err(GitError::Metadata(format!(
                "expected 5 metadata fields, got {}",
                fields.len()
            )));
        };

        let stat = match self
            .git(repo, &["show", "--stat", "--format=", sha], STAT_TIMEOUT)
            .await
        {
            Ok(out) if out.success => out.stdout.trim().to_string(),
            Ok(out) => {
                warn!(sha, stderr = %out.stderr.trim(), "git stat failed, returning empty stat");
                String::new()
            }
            Err(e) => {
                warn!(sha, "git stat failed, returning empty stat: {}", e);
                String::new()
            }
        };

        let (subject, body) = split_message(&message);
        Ok(CommitRecord {
            sha: full_sha.to_string(),
            short_sha: short_sha.to_string(),
            subject,
            body,
            author_name: author_name.to_string(),
            author_email: author_email.to_string(),
            date: date.to_string(),
            stat,
        })
    }
}

fn split_message(message: &str) -> (String, String) {
    let message = message.trim();
    match message.split_once('\n') {
        Some((subject, body)) => (subject.trim().to_string(), body.trim().to_string()),
        None => (message.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::SystemRunner;
    use crate::runner::recording::RecordingRunner;
    use fleetdash_common::test_guard;

    const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

    fn meta_line() -> String {
        [SHA, "0123456", "Ada Lovelace", "ada@example.com", "2026-03-01T10:00:00+00:00"]
            .join("\u{1f}")
    }

    #[test]
    fn test_split_message() {
        let _guard = test_guard!();
        assert_eq!(
            split_message("Fix login\n\nHandles expired tokens.\n"),
            ("Fix login".to_string(), "Handles expired tokens.".to_string())
        );
        assert_eq!(
            split_message("One line\n"),
            ("One line".to_string(), String::new())
        );
    }

    #[tokio::test]
    async fn test_commit_detail_parses_three_queries() {
        let _guard = test_guard!();
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("--format=%B", "Fix login\n\nHandles expired tokens.\n");
        runner.respond("--format=%H", &format!("{}\n", meta_line()));
        runner.respond("--stat", " src/auth.rs | 4 ++--\n 1 file changed\n");

        let inspector = GitInspector::new(runner.clone());
        let record = inspector
            .commit_detail(Path::new("/var/www/app"), SHA)
            .await
            .unwrap();

        assert_eq!(record.sha, SHA);
        assert_eq!(record.short_sha, "0123456");
        assert_eq!(record.subject, "Fix login");
        assert_eq!(record.body, "Handles expired tokens.");
        assert_eq!(record.author_email, "ada@example.com");
        assert!(record.stat.ends_with("1 file changed"));

        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(&calls[0][..3], &["git", "-C", "/var/www/app"]);
    }

    #[tokio::test]
    async fn test_failed_message_query_is_not_found() {
        let _guard = test_guard!();
        let runner = Arc::new(RecordingRunner::new());
        let err = GitInspector::new(runner.clone())
            .commit_detail(Path::new("/var/www/app"), "abcdef")
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::CommitNotFound { ref sha } if sha == "abcdef"));
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_stat_degrades_to_empty() {
        let _guard = test_guard!();
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("--format=%B", "Subject only\n");
        runner.respond("--format=%H", &meta_line());

        let record = GitInspector::new(runner)
            .commit_detail(Path::new("/var/www/app"), SHA)
            .await
            .unwrap();
        assert_eq!(record.stat, "");
        assert_eq!(record.subject, "Subject only");
    }

    #[tokio::test]
    async fn test_malformed_metadata_is_an_error() {
        let _guard = test_guard!();
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("--format=%B", "msg\n");
        runner.respond("--format=%H", "only-one-field\n");
        let err = GitInspector::new(runner)
            .commit_detail(Path::new("/var/www/app"), SHA)
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::Metadata(_)));
    }

    #[tokio::test]
    async fn test_sandbox_rejects_missing_path() {
        let _guard = test_guard!();
        let sandbox = RepoSandbox::new([PathBuf::from("/")]);
        let err = sandbox
            .check(Path::new("/definitely/not/here/fleetdash"))
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::PathMissing(_)));
    }

    #[tokio::test]
    async fn test_sandbox_rejects_non_repository() {
        let _guard = test_guard!();
        let dir = tempfile::tempdir().unwrap();
        let sandbox = RepoSandbox::new([dir.path().to_path_buf()]);
        let err = sandbox.check(dir.path()).await.unwrap_err();
        assert!(matches!(err, GitError::NotARepository(_)));
    }

    #[tokio::test]
    async fn test_sandbox_rejects_repository_outside_roots() {
        let _guard = test_guard!();
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let sandbox = RepoSandbox::new([PathBuf::from("/var/www/"), PathBuf::from("/home/")]);
        let err = sandbox.check(dir.path()).await.unwrap_err();
        assert!(matches!(err, GitError::OutsideRoots(_)));
    }

    #[tokio::test]
    async fn test_sandbox_rejects_traversal_out_of_root() {
        let _guard = test_guard!();
        let root = tempfile::tempdir().unwrap();
        let allowed = root.path().join("allowed");
        let outside = root.path().join("outside");
        std::fs::create_dir_all(allowed.join("repo")).unwrap();
        std::fs::create_dir_all(outside.join(".git")).unwrap();

        let sandbox = RepoSandbox::new([allowed.clone()]);
        let sneaky = allowed.join("repo").join("..").join("..").join("outside");
        let err = sandbox.check(&sneaky).await.unwrap_err();
        assert!(matches!(err, GitError::OutsideRoots(_)));
    }

    #[tokio::test]
    async fn test_sandbox_accepts_repository_under_root() {
        let _guard = test_guard!();
        let root = tempfile::tempdir().unwrap();
        let repo = root.path().join("site");
        std::fs::create_dir_all(repo.join(".git")).unwrap();
        let sandbox = RepoSandbox::new([root.path().to_path_buf()]);
        let checked = sandbox.check(&repo).await.unwrap();
        assert!(checked.ends_with("site"));
    }

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn git(dir: &Path, args: &[&str]) -> String {
        let out = std::process::Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(["-c", "user.name=Ops Bot", "-c", "user.email=ops@example.com"])
            .args(["-c", "commit.gpgsign=false"])
            .args(args)
            .output()
            .expect("git should run");
        assert!(out.status.success(), "git {args:?} failed: {out:?}");
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    #[tokio::test]
    async fn test_commit_detail_against_real_repository() {
        let _guard = test_guard!();
        if !git_available() {
            eprintln!("git not installed, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-q"]);
        std::fs::write(dir.path().join("README.md"), "hello\n").unwrap();
        git(dir.path(), &["add", "README.md"]);
        git(dir.path(), &["commit", "-q", "-m", "Add readme", "-m", "First commit body."]);
        let head = git(dir.path(), &["rev-parse", "HEAD"]);

        let sandbox = RepoSandbox::new([dir.path().to_path_buf()]);
        let repo = sandbox.check(dir.path()).await.unwrap();
        let record = GitInspector::new(Arc::new(SystemRunner))
            .commit_detail(&repo, &head[..10])
            .await
            .unwrap();

        assert_eq!(record.sha, head);
        assert_eq!(record.subject, "Add readme");
        assert_eq!(record.body, "First commit body.");
        assert_eq!(record.author_name, "Ops Bot");
        assert!(record.stat.contains("README.md"));
    }
}

//! Version history of the store.
//!
//! [`HistoryStore`] is the seam between the store and git. [`GitCli`] drives
//! the `git` executable found on `PATH`.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::path::Path;
use std::process::{Command, Output};
use thiserror::Error;
use tracing::debug;

/// Domain used for the commit email derived from the identity label.
pub const GIT_EMAIL_DOMAIN: &str = "treepass.local";

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("git could not be started: {0}")]
    Unavailable(String),
    #[error("'git {command}' failed: {message}")]
    CommandFailed { command: String, message: String },
    #[error("invalid commit record: {0}")]
    InvalidCommit(String),
}

/// One record of the history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub timestamp: DateTime<Utc>,
    pub revision: String,
    pub summary: String,
}

impl CommitInfo {
    /// Parse `<epoch seconds>\n<revision>\n<summary>`.
    pub fn parse(record: &str) -> Result<Self, HistoryError> {
        let mut lines = record.trim().splitn(3, '\n');
        let (Some(epoch), Some(revision), Some(summary)) = (lines.next(), lines.next(), lines.next())
        else {
            return Err(HistoryError::InvalidCommit(record.to_string()));
        };

        let seconds: i64 = epoch
            .trim()
            .parse()
            .map_err(|_| HistoryError::InvalidCommit(format!("bad timestamp '{epoch}'")))?;
        let timestamp = Utc
            .timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| HistoryError::InvalidCommit(format!("bad timestamp '{epoch}'")))?;

        Ok(Self {
            timestamp,
            revision: revision.trim().to_string(),
            summary: summary.trim().to_string(),
        })
    }

    /// Abbreviated revision for display.
    pub fn short_revision(&self) -> &str {
        let end = self.revision.len().min(7);
        &self.revision[..end]
    }
}

/// Versioned storage backing the store directory.
pub trait HistoryStore {
    /// Create an empty history in `repo`.
    fn init(&self, repo: &Path) -> Result<(), HistoryError>;

    /// Clone `url` into the existing, empty directory `dest`.
    fn clone_from(&self, url: &str, dest: &Path) -> Result<(), HistoryError>;

    fn pull(&self, repo: &Path) -> Result<(), HistoryError>;

    fn push(&self, repo: &Path) -> Result<(), HistoryError>;

    /// Stage additions, modifications and removals at `relative_path`.
    fn stage(&self, repo: &Path, relative_path: &str) -> Result<(), HistoryError>;

    fn commit(&self, repo: &Path, message: &str) -> Result<(), HistoryError>;

    /// Discard uncommitted tracked changes, back to the last commit.
    fn reset(&self, repo: &Path) -> Result<(), HistoryError>;

    /// Set the author identity used for new commits.
    fn config_set_identity(&self, repo: &Path, label: &str) -> Result<(), HistoryError>;

    fn local_head_matches_remote(&self, repo: &Path) -> Result<bool, HistoryError>;

    /// History newest first.
    fn log(&self, repo: &Path) -> Result<Vec<CommitInfo>, HistoryError>;
}

/// [`HistoryStore`] backed by the `git` command line tool.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
        }
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific git executable.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Check that git can be executed.
    pub fn check_available(&self) -> Result<(), HistoryError> {
        self.output(None, &["--version"]).map(|_| ())
    }

    fn output(&self, repo: Option<&Path>, args: &[&str]) -> Result<Output, HistoryError> {
        let mut cmd = Command::new(&self.program);
        if let Some(repo) = repo {
            cmd.arg("-C").arg(repo);
        }
        cmd.args(args);

        debug!(command = %args.join(" "), "running git");
        let output = cmd
            .output()
            .map_err(|e| HistoryError::Unavailable(format!("{}: {e}", self.program)))?;

        if output.status.success() {
            return Ok(output);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            match output.status.code() {
                Some(code) => format!("exit code {code}"),
                None => "terminated by signal".to_string(),
            }
        } else {
            stderr
        };
        Err(HistoryError::CommandFailed {
            command: args.first().copied().unwrap_or_default().to_string(),
            message,
        })
    }

    fn run(&self, repo: &Path, args: &[&str]) -> Result<(), HistoryError> {
        self.output(Some(repo), args).map(|_| ())
    }

    fn stdout(&self, repo: &Path, args: &[&str]) -> Result<String, HistoryError> {
        let output = self.output(Some(repo), args)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn has_commits(&self, repo: &Path) -> bool {
        self.output(Some(repo), &["rev-parse", "--verify", "--quiet", "HEAD"])
            .is_ok()
    }
}

impl HistoryStore for GitCli {
    fn init(&self, repo: &Path) -> Result<(), HistoryError> {
        self.run(repo, &["init", "--quiet"])
    }

    fn clone_from(&self, url: &str, dest: &Path) -> Result<(), HistoryError> {
        let dest = dest.to_string_lossy();
        self.output(None, &["clone", "--quiet", url, &dest])
            .map(|_| ())
    }

    fn pull(&self, repo: &Path) -> Result<(), HistoryError> {
        self.run(repo, &["pull", "--ff-only", "--quiet"])
    }

    fn push(&self, repo: &Path) -> Result<(), HistoryError> {
        self.run(repo, &["push", "--quiet"])
    }

    fn stage(&self, repo: &Path, relative_path: &str) -> Result<(), HistoryError> {
        self.run(repo, &["add", "-A", "--", relative_path])
    }

    fn commit(&self, repo: &Path, message: &str) -> Result<(), HistoryError> {
        self.run(repo, &["commit", "--quiet", "-m", message])
    }

    fn reset(&self, repo: &Path) -> Result<(), HistoryError> {
        if !self.has_commits(repo) {
            // Nothing to go back to, just unstage.
            return self.run(repo, &["rm", "-r", "--cached", "--quiet", "--ignore-unmatch", "."]);
        }
        self.run(repo, &["reset", "--hard", "--quiet", "HEAD"])
    }

    fn config_set_identity(&self, repo: &Path, label: &str) -> Result<(), HistoryError> {
        self.run(repo, &["config", "user.name", label])?;
        let email = format!("{label}@{GIT_EMAIL_DOMAIN}");
        self.run(repo, &["config", "user.email", &email])
    }

    fn local_head_matches_remote(&self, repo: &Path) -> Result<bool, HistoryError> {
        let local = self.stdout(repo, &["rev-parse", "HEAD"])?;
        match self.stdout(repo, &["rev-parse", "@{upstream}"]) {
            Ok(remote) => Ok(local == remote),
            Err(err) => {
                debug!(error = %err, "no upstream to compare with");
                Ok(false)
            }
        }
    }

    fn log(&self, repo: &Path) -> Result<Vec<CommitInfo>, HistoryError> {
        if !self.has_commits(repo) {
            return Ok(Vec::new());
        }
        let raw = self.stdout(repo, &["log", "--format=%ct%n%H%n%s%x00"])?;
        raw.split('\0')
            .map(str::trim)
            .filter(|record| !record.is_empty())
            .map(CommitInfo::parse)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commit_info() {
        let info = CommitInfo::parse("1700000000\n0123456789abcdef\nAdded mail/work\n").unwrap();
        assert_eq!(info.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(info.revision, "0123456789abcdef");
        assert_eq!(info.short_revision(), "0123456");
        assert_eq!(info.summary, "Added mail/work");
    }

    #[test]
    fn test_parse_commit_info_rejects_garbage() {
        assert!(matches!(
            CommitInfo::parse("only one line"),
            Err(HistoryError::InvalidCommit(_))
        ));
        assert!(matches!(
            CommitInfo::parse("yesterday\nabc\nsummary"),
            Err(HistoryError::InvalidCommit(_))
        ));
    }

    #[test]
    fn test_missing_program() {
        let git = GitCli::with_program("definitely-not-a-git-binary");
        assert!(matches!(
            git.check_available(),
            Err(HistoryError::Unavailable(_))
        ));
    }
}

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Git repository helpers.
//!
//! Read-only queries about the project repository, e.g., current branch, or
//! uncommitted changes, go through libgit2. Anything that mutates history, or
//! talks to a remote, is left to `git` subprocesses through a
//! [`CommandRunner`](crate::cmd::CommandRunner) so it honors the user's own
//! Git configuration and credentials.

pub mod describe;

pub use describe::{describe_cmd, describe_with_auto_deepen, parse_describe, DescribedVersion};

use git2::{ErrorCode, Repository, Status, StatusOptions};
use std::{
    future::Future,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Working tree of project repository.
pub struct Workspace {
    repo: Repository,
}

impl Workspace {
    /// Open repository containing `path`.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::Git2`] if no repository can be found.
    #[instrument(skip(path), level = "debug")]
    pub fn discover(path: impl AsRef<Path>) -> Result<Self> {
        debug!("discover repository at {:?}", path.as_ref().display());
        let repo = Repository::discover(path.as_ref())?;
        Ok(Self { repo })
    }

    /// Top-level directory of working tree.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::Bare`] if repository has no working tree.
    pub fn root(&self) -> Result<PathBuf> {
        self.repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| GitError::Bare(self.repo.path().to_path_buf()))
    }

    /// Name of checked out branch.
    ///
    /// Detached heads have no branch name.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::Git2`] if HEAD cannot be read.
    pub fn branch_name(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(error) if error.code() == ErrorCode::UnbornBranch => {
                return Ok(self.unborn_branch_name())
            }
            Err(error) => return Err(error.into()),
        };

        if !head.is_branch() {
            return Ok(None);
        }

        Ok(head.shorthand().map(ToString::to_string))
    }

    fn unborn_branch_name(&self) -> Option<String> {
        self.repo
            .find_reference("HEAD")
            .ok()?
            .symbolic_target()?
            .strip_prefix("refs/heads/")
            .map(ToString::to_string)
    }

    /// Paths with uncommitted changes, untracked files included.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::Git2`] if status cannot be computed.
    pub fn uncommitted_changes(&self) -> Result<Vec<String>> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = self.repo.statuses(Some(&mut opts))?;
        let changes = statuses
            .iter()
            .filter(|entry| entry.status() != Status::CURRENT)
            .filter_map(|entry| entry.path().map(ToString::to_string))
            .collect();

        Ok(changes)
    }

    /// Require working tree without uncommitted changes.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::Dirty`] if there are uncommitted changes.
    pub fn require_clean(&self) -> Result<()> {
        let changes = self.uncommitted_changes()?;
        if !changes.is_empty() {
            return Err(GitError::Dirty { changes });
        }

        Ok(())
    }
}

/// Require clean working tree both before and after `action`.
///
/// # Errors
///
/// - Return [`GitError::Dirty`] if there are uncommitted changes before or
///   after `action` runs.
/// - Return whatever error `action` fails with.
pub async fn require_clean_around<F, T, E>(path: impl AsRef<Path>, action: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<GitError>,
{
    Workspace::discover(path.as_ref())?.require_clean()?;
    let result = action.await?;
    Workspace::discover(path.as_ref())?.require_clean()?;

    Ok(result)
}

/// Git error types.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Subprocess calls fail.
    #[error(transparent)]
    Cmd(#[from] crate::cmd::CmdError),

    /// Repository has no working tree.
    #[error("repository {0:?} has no working tree")]
    Bare(PathBuf),

    /// Working tree has uncommitted changes.
    #[error("clean workspace required, uncommitted changes:\n  {}", .changes.join("\n  "))]
    Dirty { changes: Vec<String> },

    /// Output of `git describe` has an unexpected shape.
    #[error("unexpected `git describe` output: {0:?}")]
    UnexpectedDescribe(String),
}

/// Friendly result alias :3
type Result<T, E = GitError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{RepositoryInitOptions, Signature};
    use pretty_assertions::assert_eq;

    fn init_repo(path: &Path) -> anyhow::Result<Repository> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        Ok(Repository::init_opts(path, &opts)?)
    }

    fn commit_all(repo: &Repository) -> anyhow::Result<()> {
        let mut index = repo.index()?;
        index.add_all(["*"], git2::IndexAddOption::DEFAULT, None)?;
        index.write()?;
        let tree = repo.find_tree(index.write_tree()?)?;
        let signature = Signature::now("John Doe", "john@doe.com")?;
        repo.commit(Some("HEAD"), &signature, &signature, "initial", &tree, &[])?;

        Ok(())
    }

    #[test]
    fn workspace_reports_uncommitted_changes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = init_repo(dir.path())?;
        std::fs::write(dir.path().join("a.txt"), "a")?;

        let workspace = Workspace::discover(dir.path())?;
        assert_eq!(workspace.branch_name()?, Some("main".into()));
        assert_eq!(workspace.uncommitted_changes()?, vec!["a.txt".to_string()]);
        assert!(matches!(workspace.require_clean(), Err(GitError::Dirty { .. })));

        commit_all(&repo)?;
        assert!(workspace.require_clean().is_ok());
        assert_eq!(workspace.branch_name()?, Some("main".into()));

        Ok(())
    }

    #[tokio::test]
    async fn require_clean_around_checks_after_action() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = init_repo(dir.path())?;
        std::fs::write(dir.path().join("a.txt"), "a")?;
        commit_all(&repo)?;

        let root = dir.path().to_path_buf();
        let result = require_clean_around(dir.path(), async {
            std::fs::write(root.join("b.txt"), "b")?;
            Ok::<_, anyhow::Error>(())
        })
        .await;
        let error = result.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<GitError>(),
            Some(GitError::Dirty { .. })
        ));

        Ok(())
    }
}

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Self-updating repositories.
//!
//! A self update runs some update procedure against a clean working tree,
//! then commits whatever it changed. A [`Handler`] decides what happens to
//! that commit: nothing, a push, or a pull request on GitHub.

use crate::{
    chore::ChoreError,
    cmd::{cmdline, CommandRunner, ProcessRunner},
    git::Workspace,
    github::{GithubClient, GithubError, PullRequest, PullRequestOptions},
};

use std::{future::Future, path::Path};
use tracing::{error, info, instrument};

/// Commit message used when the update fails before committing anything.
pub const EMPTY_COMMIT_MESSAGE: &str = "empty commit";

/// Default remote to push to.
pub const DEFAULT_REMOTE: &str = "origin";

/// Hooks around a self update.
pub trait Handler: Send + Sync {
    /// Drive the update procedure.
    ///
    /// # Errors
    ///
    /// - Return [`SelfUpdateError`] if update or handler fails.
    fn wrap<F>(&self, update: F) -> impl Future<Output = Result<()>> + Send
    where
        F: Future<Output = Result<()>> + Send;

    /// Publish commit made after update changed something.
    ///
    /// # Errors
    ///
    /// - Return [`SelfUpdateError`] if publishing fails.
    fn on_change(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Handler that keeps the commit local.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl Handler for NoopHandler {
    async fn wrap<F>(&self, update: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send,
    {
        update.await
    }

    async fn on_change(&self) -> Result<()> {
        Ok(())
    }
}

/// Handler that pushes the commit to a remote branch.
#[derive(Debug, Clone)]
pub struct PushHandler<R = ProcessRunner> {
    runner: R,
    remote: String,
    branch: Option<String>,
    force: bool,
}

impl<R: CommandRunner> PushHandler<R> {
    /// Push to checked out branch of default remote.
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            remote: DEFAULT_REMOTE.into(),
            branch: None,
            force: false,
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Push to `branch` instead of the checked out one.
    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Push HEAD to remote branch.
    ///
    /// # Errors
    ///
    /// - Return [`SelfUpdateError::Cmd`] if `git` fails.
    /// - Return [`SelfUpdateError::DetachedHead`] if no branch is set, and
    ///   HEAD is detached.
    #[instrument(skip(self), level = "debug")]
    pub async fn push(&self) -> Result<()> {
        let branch = match &self.branch {
            Some(branch) => branch.clone(),
            None => {
                let current = self
                    .runner
                    .run_output(&cmdline(["git", "branch", "--show-current"]), false)
                    .await?;
                if current.is_empty() {
                    return Err(SelfUpdateError::DetachedHead);
                }
                current
            }
        };

        let mut cmd = cmdline(["git", "push"]);
        if self.force {
            cmd.push("--force".into());
        }
        cmd.push(self.remote.clone());
        cmd.push(format!("HEAD:refs/heads/{branch}"));

        info!("pushing to {} {branch}", self.remote);
        self.runner.run(&cmd).await?;
        Ok(())
    }
}

impl<R: CommandRunner> Handler for PushHandler<R> {
    async fn wrap<F>(&self, update: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send,
    {
        update.await
    }

    async fn on_change(&self) -> Result<()> {
        self.push().await
    }
}

/// Pull request operations of GitHub API.
pub trait PullRequestApi: Send + Sync {
    /// Login of token owner.
    fn viewer_login(&self) -> impl Future<Output = Result<String, GithubError>> + Send;

    /// Update open pull request of head branch, or open a new one.
    fn create_or_update_pull_request(
        &self,
        opts: &PullRequestOptions,
    ) -> impl Future<Output = Result<PullRequest, GithubError>> + Send;
}

impl PullRequestApi for GithubClient {
    async fn viewer_login(&self) -> Result<String, GithubError> {
        GithubClient::viewer_login(self).await
    }

    async fn create_or_update_pull_request(
        &self,
        opts: &PullRequestOptions,
    ) -> Result<PullRequest, GithubError> {
        GithubClient::create_or_update_pull_request(self, opts).await
    }
}

/// Handler that force pushes the commit, and opens a pull request for it.
///
/// Failed updates still produce a pull request, marked as broken, so that
/// scheduled updates never fail silently.
#[derive(Debug, Clone)]
pub struct PullRequestHandler<R = ProcessRunner, A = GithubClient> {
    push: PushHandler<R>,
    api: A,
    pull_request: PullRequestOptions,
}

impl<R: CommandRunner, A: PullRequestApi> PullRequestHandler<R, A> {
    /// Construct new pull request handler.
    ///
    /// The token behind `api` is validated up front. If `run_url` is set, the
    /// body links to the workflow run's logs.
    ///
    /// # Errors
    ///
    /// - Return [`SelfUpdateError::Github`] if token is rejected.
    #[instrument(skip(runner, api, pull_request), level = "debug")]
    pub async fn new(
        runner: R,
        api: A,
        mut pull_request: PullRequestOptions,
        run_url: Option<String>,
    ) -> Result<Self> {
        let login = api.viewer_login().await?;
        info!("authenticated to GitHub as {login}");

        if let Some(url) = run_url {
            let body = pull_request.body.get_or_insert_with(String::new);
            body.push_str(&format!(
                "\n\n---\n\nThis PR was created from a workflow, [click here to view logs]({url})."
            ));
        }

        let push = PushHandler::new(runner)
            .with_branch(Some(pull_request.head_branch.clone()))
            .with_force(true);

        Ok(Self {
            push,
            api,
            pull_request,
        })
    }

    /// Push to `remote` instead of the default.
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.push = self.push.with_remote(remote);
        self
    }

    fn failure_report(&self, message: &str) -> PullRequestOptions {
        let body = format!(
            "# Error:\n\n\
             An error occurred while generating this pull request: `{message}`\n\n\
             You may need to re-run this action and fix the errors manually. \
             This pull request is created for visibility, it may not have any useful changes.\n\n\
             ---\n\n{}",
            self.pull_request.body.as_deref().unwrap_or_default()
        );

        PullRequestOptions {
            title: format!("{} :no_entry_sign:", self.pull_request.title),
            body: Some(body),
            ..self.pull_request.clone()
        }
    }
}

impl<R: CommandRunner, A: PullRequestApi> Handler for PullRequestHandler<R, A> {
    async fn wrap<F>(&self, update: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send,
    {
        let Err(failure) = update.await else {
            return Ok(());
        };
        error!("update failed: {failure}");

        // INVARIANT: Head branch needs at least one commit for a pull request.
        self.push
            .runner
            .run(&cmdline([
                "git",
                "commit",
                "--allow-empty",
                "--message",
                EMPTY_COMMIT_MESSAGE,
            ]))
            .await?;
        self.push.push().await?;
        self.api
            .create_or_update_pull_request(&self.failure_report(&failure.to_string()))
            .await?;

        Err(failure)
    }

    async fn on_change(&self) -> Result<()> {
        self.push.push().await?;
        self.api
            .create_or_update_pull_request(&self.pull_request)
            .await?;
        Ok(())
    }
}

/// Run `update` in clean working tree at `path`, and commit its changes.
///
/// Returns whether the update changed anything.
///
/// # Errors
///
/// - Return [`SelfUpdateError::Git`] if working tree is dirty beforehand.
/// - Return [`SelfUpdateError::Update`] if update fails.
/// - Return [`SelfUpdateError`] if committing or handler fails.
#[instrument(skip(path, runner, handler, update), level = "debug")]
pub async fn self_update<R, H, F>(
    path: impl AsRef<Path>,
    runner: &R,
    handler: &H,
    commit_message: &str,
    update: F,
) -> Result<bool>
where
    R: CommandRunner,
    H: Handler,
    F: Future<Output = Result<(), ChoreError>> + Send,
{
    Workspace::discover(path.as_ref())?.require_clean()?;

    handler
        .wrap(async { update.await.map_err(|error| SelfUpdateError::Update(Box::new(error))) })
        .await?;

    let changes = Workspace::discover(path.as_ref())?.uncommitted_changes()?;
    if changes.is_empty() {
        info!("no changes detected after update");
        return Ok(false);
    }

    info!("committing {} changed files", changes.len());
    runner.run(&cmdline(["git", "add", "--all"])).await?;
    runner
        .run(&cmdline(["git", "commit", "--message", commit_message]))
        .await?;
    handler.on_change().await?;

    Ok(true)
}

/// Self update error types.
#[derive(Debug, thiserror::Error)]
pub enum SelfUpdateError {
    #[error(transparent)]
    Git(#[from] crate::git::GitError),

    #[error(transparent)]
    Cmd(#[from] crate::cmd::CmdError),

    #[error(transparent)]
    Github(#[from] GithubError),

    /// HEAD is detached, and no branch to push to was given.
    #[error("cannot push from detached HEAD without a branch name")]
    DetachedHead,

    /// Update procedure failed.
    #[error(transparent)]
    Update(Box<ChoreError>),
}

/// Friendly result alias :3
type Result<T, E = SelfUpdateError> = std::result::Result<T, E>;

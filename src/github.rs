// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! GitHub integration.
//!
//! [`RunEnv`] describes the GitHub Actions run chored executes in, if any.
//! The [`api`] module talks to the GitHub GraphQL API for pull request
//! management.

pub mod api;

pub use api::{GithubClient, GithubError, PullRequest, PullRequestOptions};

use std::collections::HashMap;

/// GitHub Actions run environment.
///
/// Every field is optional, since chored happily runs outside of CI.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct RunEnv {
    /// Kind of ref that triggered the run, "branch" or "tag".
    pub ref_type: Option<String>,

    /// Event that triggered the run, e.g., "push", or "pull_request".
    pub event_name: Option<String>,

    /// Repository in "owner/name" form.
    pub repository: Option<String>,

    /// Short name of ref that triggered the run.
    pub ref_name: Option<String>,

    /// Commit that triggered the run.
    pub sha: Option<String>,

    /// Source branch of pull request.
    pub head_ref: Option<String>,

    /// Target branch of pull request.
    pub base_ref: Option<String>,

    /// Running in CI at all.
    pub ci: bool,

    /// Identifier of workflow run.
    pub run_id: Option<String>,
}

impl RunEnv {
    /// Read run environment from process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Read run environment from arbitrary variables.
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut vars = vars
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .collect::<HashMap<_, _>>();

        Self {
            ref_type: vars.remove("GITHUB_REF_TYPE"),
            event_name: vars.remove("GITHUB_EVENT_NAME"),
            repository: vars.remove("GITHUB_REPOSITORY"),
            ref_name: vars.remove("GITHUB_REF_NAME"),
            sha: vars.remove("GITHUB_SHA"),
            head_ref: vars.remove("GITHUB_HEAD_REF"),
            base_ref: vars.remove("GITHUB_BASE_REF"),
            ci: vars.remove("CI").is_some_and(|ci| ci == "true"),
            run_id: vars.remove("GITHUB_RUN_ID"),
        }
    }

    /// Run was triggered by a push.
    pub fn is_push(&self) -> bool {
        self.event_name.as_deref() == Some("push")
    }

    /// Run was triggered by a pull request.
    pub fn is_pull_request(&self) -> bool {
        self.event_name.as_deref() == Some("pull_request")
    }

    /// Branch that was pushed, if run was triggered by a branch push.
    pub fn pushed_branch(&self) -> Option<&str> {
        self.pushed("branch")
    }

    /// Tag that was pushed, if run was triggered by a tag push.
    pub fn pushed_tag(&self) -> Option<&str> {
        self.pushed("tag")
    }

    fn pushed(&self, ref_type: &str) -> Option<&str> {
        if !self.is_push() || self.ref_type.as_deref() != Some(ref_type) {
            return None;
        }

        self.ref_name.as_deref()
    }

    /// Branch that pull request targets.
    pub fn pull_request_target(&self) -> Option<&str> {
        if !self.is_pull_request() {
            return None;
        }

        self.base_ref.as_deref()
    }

    /// Owner and name of repository.
    pub fn repository(&self) -> Option<(&str, &str)> {
        self.repository.as_deref()?.split_once('/')
    }

    /// Link to logs of current workflow run.
    pub fn run_url(&self) -> Option<String> {
        let repository = self.repository.as_deref()?;
        let run_id = self.run_id.as_deref()?;
        Some(format!("https://github.com/{repository}/actions/runs/{run_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [
        ("GITHUB_EVENT_NAME", "push"),
        ("GITHUB_REF_TYPE", "branch"),
        ("GITHUB_REF_NAME", "v1.x"),
        ("GITHUB_REPOSITORY", "awkless/chored"),
        ("GITHUB_RUN_ID", "42"),
        ("GITHUB_HEAD_REF", ""),
        ("CI", "true"),
    ])]
    fn run_env_from_push() {
        let env = RunEnv::from_env();
        assert!(env.ci);
        assert!(env.is_push());
        assert!(!env.is_pull_request());
        assert_eq!(env.head_ref, None);
        assert_eq!(env.pushed_branch(), Some("v1.x"));
        assert_eq!(env.pushed_tag(), None);
        assert_eq!(env.pull_request_target(), None);
        assert_eq!(env.repository(), Some(("awkless", "chored")));
        assert_eq!(
            env.run_url().as_deref(),
            Some("https://github.com/awkless/chored/actions/runs/42")
        );
    }

    #[test]
    fn run_env_from_pull_request() {
        let env = RunEnv::from_vars([
            ("GITHUB_EVENT_NAME".into(), "pull_request".into()),
            ("GITHUB_REF_TYPE".into(), "branch".into()),
            ("GITHUB_REF_NAME".into(), "12/merge".into()),
            ("GITHUB_BASE_REF".into(), "main".into()),
        ]);
        assert_eq!(env.pushed_branch(), None);
        assert_eq!(env.pull_request_target(), Some("main"));
        assert_eq!(env.run_url(), None);
    }
}

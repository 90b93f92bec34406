// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version bumps.
//!
//! The version bump engine figures out the current version of a project from
//! its nearest version tag, scans the commit subjects since that tag for
//! directives, computes the next version under a version template, and then
//! prints, tags, or pushes it.
//!
//! # Pull Requests
//!
//! On pull request builds, CI checks out an ephemeral merge commit. Tags
//! reachable through that merge commit may only exist on the source branch,
//! so the current version is described from the __merge-target ref__ (the
//! branch being merged into), while commit directives are gathered up to the
//! __head ref__ (the branch being merged). Pushing from a pull request is
//! never allowed, so push actions are downgraded to tag actions there.

use crate::{
    cmd::{cmdline, CommandRunner, ProcessRunner},
    git::{describe_with_auto_deepen, DescribedVersion},
    github::RunEnv,
    version::{
        next_version, parse_commit_lines, Index, NextVersionOptions, Version, VersionTemplate,
    },
};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{info, instrument};

/// What to do with a computed version.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Only log version.
    Print,

    /// Create lightweight tag on HEAD.
    #[default]
    Tag,

    /// Create tag, and push it to origin.
    Push,
}

/// When a version bump happens.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Trigger {
    /// Every time the current commit is untagged.
    #[default]
    Always,

    /// Only when some commit subject carries a release directive.
    CommitMessage,
}

/// Refs that a version bump looks at.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Context {
    /// Ref whose commits carry directives.
    pub head_ref: String,

    /// Ref whose history holds the current version tag.
    pub merge_target_ref: String,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            head_ref: "HEAD".into(),
            merge_target_ref: "HEAD".into(),
        }
    }
}

impl Context {
    /// Context of current CI run.
    ///
    /// Pull requests compare the source branch against its target branch on
    /// origin. Everything else looks at HEAD.
    pub fn from_run_env(env: &RunEnv) -> Self {
        if !env.is_pull_request() {
            return Self::default();
        }

        let origin = |branch: Option<&str>| {
            branch
                .filter(|branch| !branch.is_empty())
                .map_or_else(|| "HEAD".into(), |branch| format!("origin/{branch}"))
        };

        Self {
            head_ref: origin(env.head_ref.as_deref()),
            merge_target_ref: origin(env.base_ref.as_deref()),
        }
    }
}

/// Settings of a single version bump.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BumpOptions {
    /// Shape of acceptable versions.
    pub template: VersionTemplate,

    /// Component that must be bumped, overriding commit directives.
    pub index: Option<Index>,

    /// Component to bump if the template allows it.
    pub default_bump: Option<Index>,

    /// What to do with the new version.
    pub action: Action,

    /// When to bump at all.
    pub trigger: Trigger,
}

impl Default for BumpOptions {
    fn default() -> Self {
        Self {
            template: VersionTemplate::unrestricted(3),
            index: None,
            default_bump: None,
            action: Action::default(),
            trigger: Trigger::default(),
        }
    }
}

/// Version bump engine.
#[derive(Debug)]
pub struct Engine<R = ProcessRunner>
where
    R: CommandRunner,
{
    runner: R,
    context: Context,
}

impl<R> Engine<R>
where
    R: CommandRunner,
{
    /// Construct new version bump engine.
    pub fn new(runner: R, context: Context) -> Self {
        Self { runner, context }
    }

    /// Describe current version from merge-target ref.
    ///
    /// # Errors
    ///
    /// - Return [`BumpError::Git`] if `git describe` fails.
    pub async fn current_version(&self) -> Result<DescribedVersion> {
        Ok(describe_with_auto_deepen(&self.runner, &self.context.merge_target_ref).await?)
    }

    /// Compute next version, and apply it if needed.
    ///
    /// Returns the new version, or nothing if HEAD is already tagged, or the
    /// trigger did not fire.
    ///
    /// # Errors
    ///
    /// - Return [`BumpError::Git`] if the current version cannot be described.
    /// - Return [`BumpError::Version`] if the requested index does not fit
    ///   the template.
    /// - Return [`BumpError::Cmd`] if reading history, tagging, or pushing
    ///   fails.
    #[instrument(skip(self), level = "debug")]
    pub async fn bump(&self, opts: &BumpOptions) -> Result<Option<Version>> {
        let described = self.current_version().await?;

        let (current, range) = match &described.tag {
            None => {
                info!("no current version detected");
                (None, self.context.head_ref.clone())
            }
            Some(tag) => {
                if described.is_exact {
                    info!("current commit is already tagged {tag}");
                    if opts.action == Action::Push {
                        self.push_tag(tag).await?;
                    }
                    return Ok(None);
                }

                // INVARIANT: A tag without a version still bounds the history to scan.
                match &described.version {
                    Some(current) => info!("current version: {current}"),
                    None => info!("tag {tag} holds no version, starting from initial version"),
                }
                (described.version.clone(), format!("{tag}..{}", self.context.head_ref))
            }
        };

        let log = cmdline(["git", "log", "--format=format:%s", range.as_str(), "--"]);
        let directive = parse_commit_lines(self.runner.run_output(&log, false).await?);
        if opts.index.is_none() {
            if let Some(index) = directive.index {
                info!("using index {index} from commit message");
            }
        }

        let next = next_version(
            &opts.template,
            current.as_ref(),
            NextVersionOptions {
                index: opts.index.or(directive.index),
                default_bump: opts.default_bump,
            },
        )?;

        if opts.trigger == Trigger::Always || directive.release {
            self.apply_version(opts.action, &next).await?;
            return Ok(Some(next));
        }

        info!("no version bump required");
        Ok(None)
    }

    /// Print, tag, or push version.
    ///
    /// # Errors
    ///
    /// - Return [`BumpError::Cmd`] if tagging or pushing fails.
    #[instrument(skip(self), level = "debug")]
    pub async fn apply_version(&self, action: Action, version: &Version) -> Result<()> {
        let tag = version.tag();
        match action {
            Action::Print => info!("calculated tag: {tag}"),
            Action::Tag => self.create_tag(&tag).await?,
            Action::Push => {
                self.create_tag(&tag).await?;
                self.push_tag(&tag).await?;
            }
        }

        Ok(())
    }

    async fn create_tag(&self, tag: &str) -> Result<()> {
        info!("tagging HEAD as {tag}");
        Ok(self.runner.run(&cmdline(["git", "tag", tag, "HEAD"])).await?)
    }

    async fn push_tag(&self, tag: &str) -> Result<()> {
        info!("pushing tag {tag}");
        Ok(self
            .runner
            .run(&cmdline(["git", "push", "origin", "tag", tag]))
            .await?)
    }
}

/// Version bump as requested through chore options.
///
/// Template precedence:
///
/// 1. Explicit `versionTemplate`.
/// 2. Implicit template from the branch name, e.g., "v1.x", if it parses.
/// 3. `defaultTemplate`.
/// 4. Three free components.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BumpRequest {
    pub version_template: Option<String>,
    pub default_template: Option<String>,
    pub component: Option<Index>,
    pub default_component: Option<Index>,
    pub action: Option<Action>,
    pub trigger: Option<Trigger>,
}

impl BumpRequest {
    /// Resolve request against CI run environment.
    ///
    /// The `branch` is the locally checked out branch, used for the implicit
    /// template when CI did not name one.
    ///
    /// # Errors
    ///
    /// - Return [`BumpError::Version`] if an explicit template is invalid.
    pub fn plan(self, env: &RunEnv, branch: Option<&str>) -> Result<(Context, BumpOptions)> {
        let context = Context::from_run_env(env);
        let mut action = self.action.unwrap_or_default();
        if env.is_pull_request() && action == Action::Push {
            info!("not pushing from a pull request, tagging instead");
            action = Action::Tag;
        }

        let implicit = env
            .pushed_branch()
            .or_else(|| env.pull_request_target())
            .or(branch);

        let template = match self.version_template {
            Some(template) => template.parse()?,
            None => match implicit.and_then(VersionTemplate::parse_lax) {
                Some(template) => template,
                None => match self.default_template {
                    Some(template) => template.parse()?,
                    None => VersionTemplate::unrestricted(3),
                },
            },
        };

        let opts = BumpOptions {
            template,
            index: self.component,
            default_bump: self.default_component,
            action,
            trigger: self.trigger.unwrap_or_default(),
        };

        Ok((context, opts))
    }
}

impl Display for Action {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Print => fmt.write_str("print"),
            Self::Tag => fmt.write_str("tag"),
            Self::Push => fmt.write_str("push"),
        }
    }
}

/// Version bump error types.
#[derive(Debug, thiserror::Error)]
pub enum BumpError {
    /// Version or template is invalid.
    #[error(transparent)]
    Version(#[from] crate::version::VersionError),

    /// Current version cannot be described.
    #[error(transparent)]
    Git(#[from] crate::git::GitError),

    /// Git subprocess fails.
    #[error(transparent)]
    Cmd(#[from] crate::cmd::CmdError),
}

/// Friendly result alias :3
type Result<T, E = BumpError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::testing::ScriptedRunner;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn engine(runner: ScriptedRunner) -> Engine<ScriptedRunner> {
        Engine::new(runner, Context::default())
    }

    #[tokio::test]
    async fn bump_skips_tagged_commit() -> anyhow::Result<()> {
        let engine = engine(ScriptedRunner::new().respond(&["git", "describe"], "v1.1-0-gd14d21c"));
        let result = engine.bump(&BumpOptions::default()).await?;
        assert_eq!(result, None);
        assert_eq!(engine.runner.audit().len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn bump_pushes_existing_tag() -> anyhow::Result<()> {
        let engine = engine(ScriptedRunner::new().respond(&["git", "describe"], "v1.1-0-gd14d21c"));
        let opts = BumpOptions {
            action: Action::Push,
            ..Default::default()
        };
        assert_eq!(engine.bump(&opts).await?, None);
        assert_eq!(engine.runner.audit()[1], "git push origin tag v1.1");

        Ok(())
    }

    #[tokio::test]
    async fn bump_after_tag_without_version() -> anyhow::Result<()> {
        let engine = engine(
            ScriptedRunner::new()
                .respond(&["git", "describe"], "v1beta-3-gd14d21c")
                .respond(&["git", "log"], ""),
        );
        let opts = BumpOptions {
            action: Action::Print,
            ..Default::default()
        };
        assert_eq!(engine.bump(&opts).await?, Some(Version::new([0, 0, 0])));
        assert!(engine.runner.audit()[1].contains("v1beta..HEAD"));

        Ok(())
    }

    #[tokio::test]
    async fn bump_tags_next_version() -> anyhow::Result<()> {
        let engine = engine(
            ScriptedRunner::new()
                .respond(&["git", "describe"], "v1.2.3-4-gd14d21c")
                .respond(&["git", "log"], "fix things\nadd [minor] feature"),
        );
        let result = engine.bump(&BumpOptions::default()).await?;
        assert_eq!(result, Some(Version::new([1, 3, 0])));

        let audit = engine.runner.audit();
        assert_eq!(audit[1], "git log --format=format:%s v1.2.3..HEAD --");
        assert_eq!(audit[2], "git tag v1.3.0 HEAD");

        Ok(())
    }

    #[tokio::test]
    async fn bump_explicit_index_beats_directive() -> anyhow::Result<()> {
        let engine = engine(
            ScriptedRunner::new()
                .respond(&["git", "describe"], "v1.2.3-4-gd14d21c")
                .respond(&["git", "log"], "add [minor] feature"),
        );
        let opts = BumpOptions {
            index: Some(Index::Major),
            action: Action::Print,
            ..Default::default()
        };
        assert_eq!(engine.bump(&opts).await?, Some(Version::new([2, 0, 0])));
        assert_eq!(engine.runner.audit().len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn bump_without_tag_uses_initial_version() -> anyhow::Result<()> {
        let engine = engine(ScriptedRunner::new().respond(&["git", "describe"], "d14d21c"));
        let opts = BumpOptions {
            template: "1.x".parse()?,
            ..Default::default()
        };
        assert_eq!(engine.bump(&opts).await?, Some(Version::new([1, 0])));

        let audit = engine.runner.audit();
        assert_eq!(audit[1], "git log --format=format:%s HEAD --");
        assert_eq!(audit[2], "git tag v1.0 HEAD");

        Ok(())
    }

    #[test_case("fix things", None; "no release directive")]
    #[test_case("ship it [release]", Some(Version::new([1, 2, 4])); "release directive")]
    #[tokio::test]
    async fn bump_on_commit_message(log: &str, expect: Option<Version>) -> anyhow::Result<()> {
        let engine = engine(
            ScriptedRunner::new()
                .respond(&["git", "describe"], "v1.2.3-4-gd14d21c")
                .respond(&["git", "log"], log),
        );
        let opts = BumpOptions {
            trigger: Trigger::CommitMessage,
            ..Default::default()
        };
        pretty_assertions::assert_eq!(engine.bump(&opts).await?, expect);

        Ok(())
    }

    #[test_case(Action::Print, &[]; "print")]
    #[test_case(Action::Tag, &["git tag v1.2.3 HEAD"]; "tag")]
    #[test_case(Action::Push, &["git tag v1.2.3 HEAD", "git push origin tag v1.2.3"]; "push")]
    #[tokio::test]
    async fn apply_version_actions(action: Action, expect: &[&str]) -> anyhow::Result<()> {
        let engine = engine(ScriptedRunner::new());
        engine.apply_version(action, &Version::new([1, 2, 3])).await?;
        pretty_assertions::assert_eq!(engine.runner.audit(), expect);

        Ok(())
    }

    #[tokio::test]
    async fn bump_fails_when_tagging_fails() {
        let engine = engine(
            ScriptedRunner::new()
                .respond(&["git", "describe"], "v1.2.3-4-gd14d21c")
                .fail(&["git", "tag"]),
        );
        let result = engine.bump(&BumpOptions::default()).await;
        assert!(matches!(result, Err(BumpError::Cmd(_))));
    }

    fn run_env(vars: &[(&str, &str)]) -> RunEnv {
        RunEnv::from_vars(vars.iter().map(|(key, value)| (key.to_string(), value.to_string())))
    }

    #[test]
    fn plan_template_precedence() -> anyhow::Result<()> {
        let env = run_env(&[]);

        let request = BumpRequest {
            version_template: Some("2.x".into()),
            default_template: Some("3.x".into()),
            ..Default::default()
        };
        let (_, opts) = request.plan(&env, Some("v1.x"))?;
        assert_eq!(opts.template.to_string(), "2.x");

        let request = BumpRequest {
            default_template: Some("3.x".into()),
            ..Default::default()
        };
        let (_, opts) = request.clone().plan(&env, Some("v1.x"))?;
        assert_eq!(opts.template.to_string(), "1.x");

        let (_, opts) = request.plan(&env, Some("main"))?;
        assert_eq!(opts.template.to_string(), "3.x");

        let (_, opts) = BumpRequest::default().plan(&env, None)?;
        assert_eq!(opts.template.to_string(), "x.x.x");

        let request = BumpRequest {
            version_template: Some("1.x.2".into()),
            ..Default::default()
        };
        assert!(request.plan(&env, None).is_err());

        Ok(())
    }

    #[test]
    fn plan_pull_request_context() -> anyhow::Result<()> {
        let env = run_env(&[
            ("GITHUB_EVENT_NAME", "pull_request"),
            ("GITHUB_HEAD_REF", "feature"),
            ("GITHUB_BASE_REF", "v2.x"),
        ]);
        let request = BumpRequest {
            action: Some(Action::Push),
            ..Default::default()
        };
        let (context, opts) = request.plan(&env, Some("feature"))?;
        let expect = Context {
            head_ref: "origin/feature".into(),
            merge_target_ref: "origin/v2.x".into(),
        };
        assert_eq!(context, expect);
        assert_eq!(opts.action, Action::Tag);
        assert_eq!(opts.template.to_string(), "2.x");

        Ok(())
    }

    #[test]
    fn request_deserializes_from_options() -> anyhow::Result<()> {
        let result: BumpRequest = serde_json::from_value(serde_json::json!({
            "versionTemplate": "1.x",
            "component": "minor",
            "action": "push",
            "trigger": "commitMessage",
        }))?;
        let expect = BumpRequest {
            version_template: Some("1.x".into()),
            component: Some(Index::Minor),
            action: Some(Action::Push),
            trigger: Some(Trigger::CommitMessage),
            ..Default::default()
        };
        assert_eq!(result, expect);

        Ok(())
    }
}

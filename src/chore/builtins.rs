// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Builtin module.
//!
//! Chores bundled with chored itself. The builtin module is searched last,
//! so task files may shadow any of these.

use crate::{
    bump::{BumpRequest, Context, Engine},
    chore::{Chore, ChoreError, Export, Module, Options, Resolver, Result},
    cmd::ProcessRunner,
    deps::{github::resolve_latest, BumpSpec, Bumper},
    git::Workspace,
    github::{GithubClient, PullRequestOptions, RunEnv},
    render::render,
    self_update::{self_update, NoopHandler, PullRequestHandler, PushHandler, DEFAULT_REMOTE},
};

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{collections::BTreeMap, path::PathBuf};
use tracing::{debug, info};

/// Name of builtin module, as shown in listings.
pub const MODULE_NAME: &str = "builtin";

/// Construct the builtin module.
pub fn module() -> Module {
    let deps = BTreeMap::from([("bump".to_string(), Export::chore(DepsBump))]);
    let self_update = BTreeMap::from([
        ("default".to_string(), Export::chore(SelfUpdate(UpdateMode::Local))),
        ("push".to_string(), Export::chore(SelfUpdate(UpdateMode::Push))),
        ("pr".to_string(), Export::chore(SelfUpdate(UpdateMode::PullRequest))),
    ]);

    let exports = BTreeMap::from([
        ("about".to_string(), Export::chore(About)),
        ("bump".to_string(), Export::chore(Bump)),
        ("deps".to_string(), Export::Namespace(deps)),
        ("render".to_string(), Export::chore(Render)),
        ("selfUpdate".to_string(), Export::Namespace(self_update)),
        ("version".to_string(), Export::chore(PrintVersion)),
    ]);

    Module::new(MODULE_NAME, exports)
}

fn split_path(path: &str) -> Vec<String> {
    path.split_whitespace().map(ToString::to_string).collect()
}

const VERSION_HELP: &str = "\
Print the current version, as described from the nearest version tag.

Options:
  ref?: string   ref to describe, default HEAD";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct VersionRequest {
    #[serde(rename = "ref")]
    git_ref: Option<String>,
}

/// Print current version.
struct PrintVersion;

impl Chore for PrintVersion {
    fn invoke<'a>(&'a self, resolver: &'a Resolver, options: Options) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let request: VersionRequest = options.parse()?;
            let git_ref = request.git_ref.unwrap_or_else(|| "HEAD".into());
            let context = Context {
                head_ref: git_ref.clone(),
                merge_target_ref: git_ref,
            };

            let engine = Engine::new(
                ProcessRunner::new().with_cwd(resolver.project_root()),
                context,
            );
            let Some(version) = engine.current_version().await?.version else {
                return Err(ChoreError::Failed("no current version found".into()));
            };

            println!("{version}");
            Ok(Value::String(version.to_string()))
        })
    }

    fn help(&self) -> Option<&str> {
        Some(VERSION_HELP)
    }
}

const BUMP_HELP: &str = "\
Compute and print, tag, or push the next version tag.

The version template is taken from the first defined in:
 - versionTemplate
 - an implicit version template based on the git branch
   (only if it looks like a version, e.g., v1.x)
 - defaultTemplate

Options:
  versionTemplate?: string
  defaultTemplate?: string
  component?: major | minor | patch | number
  defaultComponent?: major | minor | patch | number
  action?: print | tag | push     default tag
  trigger?: always | commitMessage  default always";

/// Bump version tag.
struct Bump;

impl Chore for Bump {
    fn invoke<'a>(&'a self, resolver: &'a Resolver, options: Options) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let request: BumpRequest = options.parse()?;
            let branch = Workspace::discover(resolver.project_root())?.branch_name()?;
            let (context, opts) = request.plan(&RunEnv::from_env(), branch.as_deref())?;
            info!("computed bump options: {opts:?}");
            debug!("bump context: {context:?}");

            let engine = Engine::new(
                ProcessRunner::new().with_cwd(resolver.project_root()),
                context,
            );
            let version = engine.bump(&opts).await?;

            Ok(version.map_or(Value::Null, |version| Value::String(version.to_string())))
        })
    }

    fn help(&self) -> Option<&str> {
        Some(BUMP_HELP)
    }
}

const RENDER_HELP: &str = "\
Write generated files listed in the configuration file.

Files generated previously, but no longer listed, are removed.";

/// Render generated files.
struct Render;

impl Chore for Render {
    fn invoke<'a>(&'a self, resolver: &'a Resolver, options: Options) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            if !options.is_empty() {
                debug!("render takes no options, ignoring {}", options.to_json());
            }

            let summary = render(resolver.project_root(), &resolver.config().generated).await?;
            for path in &summary.written {
                println!("wrote {path}");
            }
            for path in &summary.removed {
                println!("removed {path}");
            }

            Ok(json!({ "written": summary.written, "removed": summary.removed }))
        })
    }

    fn help(&self) -> Option<&str> {
        Some(RENDER_HELP)
    }
}

const DEPS_BUMP_HELP: &str = "\
Scan the project and bump remote URLs when supported.

Options:
  postChore (string|null): run the given chore after bumping, default `render`
  args (string[]): list of files, directories or specs. Specs take the form
    \"source#version\" and can use shorthand, e.g., \"chored#testing\" bumps
    chored URLs to the \"testing\" branch.";

#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DepsBumpRequest {
    #[serde(default)]
    args: Vec<String>,

    #[serde(default = "default_post_chore")]
    post_chore: Option<String>,
}

fn default_post_chore() -> Option<String> {
    Some("render".into())
}

impl DepsBumpRequest {
    /// Split arguments into explicit specs and roots.
    fn partition(&self) -> std::result::Result<(Vec<BumpSpec>, Vec<PathBuf>), crate::deps::DepsError> {
        let (specs, roots): (Vec<&String>, Vec<&String>) =
            self.args.iter().partition(|arg| arg.contains('#'));
        let specs = specs
            .into_iter()
            .map(|spec| spec.parse())
            .collect::<std::result::Result<Vec<BumpSpec>, _>>()?;
        let roots = roots.into_iter().map(PathBuf::from).collect();

        Ok((specs, roots))
    }
}

/// Bump remote URLs.
struct DepsBump;

impl Chore for DepsBump {
    fn invoke<'a>(&'a self, resolver: &'a Resolver, options: Options) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let request: DepsBumpRequest = options.parse()?;
            let (specs, roots) = request.partition()?;
            let settings = &resolver.config().deps;
            let roots = if roots.is_empty() {
                settings.roots.clone()
            } else {
                roots
            };
            let roots = roots
                .iter()
                .map(|root| resolver.project_root().join(root))
                .collect::<Vec<_>>();

            let bumper = Bumper::new(ProcessRunner::new().with_cwd(resolver.project_root()))
                .with_overrides(specs);
            let summary = bumper.bump_roots(&roots, &settings.extensions).await?;
            println!("{summary}");

            if let Some(chore) = &request.post_chore {
                println!("\nRunning postChore: {chore} ...");
                resolver.run(&split_path(chore), Options::new()).await?;
            }

            Ok(json!({
                "found": summary.found,
                "updated": summary.updated,
                "missing": summary.missing,
                "files": summary.files,
            }))
        })
    }

    fn help(&self) -> Option<&str> {
        Some(DEPS_BUMP_HELP)
    }
}

const SELF_UPDATE_HELP: &str = "\
Run an update chore in a clean working tree, and commit its changes.

Options:
  update?: string           chore to run, default `deps bump`
  commitMessage?: string    default `bump dependencies`";

const SELF_UPDATE_PUSH_HELP: &str = "\
Run an update chore in a clean working tree, commit its changes, and push.

Options:
  update?: string           chore to run, default `deps bump`
  commitMessage?: string    default `bump dependencies`
  remote?: string           default `origin`
  branch?: string           default current branch
  force?: bool";

const SELF_UPDATE_PR_HELP: &str = "\
Run an update chore in a clean working tree, and open a pull request with
its changes. Failed updates open a pull request describing the failure.

The GitHub token is read from the environment variable named by
`github.token_env` in the configuration file.

Options:
  update?: string           chore to run, default `deps bump`
  commitMessage?: string    default `bump dependencies`
  remote?: string           default `origin`
  branch?: string           head branch, default `self-update`
  baseBranch?: string       default `main`
  title?: string            default `[bot] update dependencies`
  body?: string
  repository?: string       owner/name, default from GitHub Actions";

#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SelfUpdateRequest {
    #[serde(default = "default_update_chore")]
    update: String,

    #[serde(default = "default_commit_message")]
    commit_message: String,

    #[serde(default = "default_remote")]
    remote: String,

    branch: Option<String>,

    #[serde(default)]
    force: bool,

    #[serde(default = "default_base_branch")]
    base_branch: String,

    #[serde(default = "default_title")]
    title: String,

    #[serde(default = "default_body")]
    body: String,

    repository: Option<String>,
}

fn default_update_chore() -> String {
    "deps bump".into()
}

fn default_commit_message() -> String {
    "bump dependencies".into()
}

fn default_remote() -> String {
    DEFAULT_REMOTE.into()
}

fn default_base_branch() -> String {
    "main".into()
}

fn default_title() -> String {
    "[bot] update dependencies".into()
}

fn default_body() -> String {
    ":robot: :rocket:".into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateMode {
    Local,
    Push,
    PullRequest,
}

/// Update project, and publish the result.
struct SelfUpdate(UpdateMode);

impl SelfUpdate {
    fn pull_request_options(
        &self,
        request: &SelfUpdateRequest,
        env: &RunEnv,
    ) -> Result<PullRequestOptions> {
        let (owner, repo) = match &request.repository {
            Some(repository) => repository.split_once('/'),
            None => env.repository(),
        }
        .ok_or_else(|| {
            ChoreError::Failed("unknown GitHub repository, pass `--repository owner/name`".into())
        })?;

        Ok(PullRequestOptions {
            owner: owner.into(),
            repo: repo.into(),
            head_branch: request
                .branch
                .clone()
                .unwrap_or_else(|| "self-update".into()),
            base_branch: request.base_branch.clone(),
            title: request.title.clone(),
            body: Some(request.body.clone()),
        })
    }
}

impl Chore for SelfUpdate {
    fn invoke<'a>(&'a self, resolver: &'a Resolver, options: Options) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let request: SelfUpdateRequest = options.parse()?;
            let root = resolver.project_root();
            let runner = ProcessRunner::new().with_cwd(root);
            let update_path = split_path(&request.update);
            let update = async {
                info!("running update chore {:?}", request.update);
                resolver.run(&update_path, Options::new()).await.map(|_| ())
            };
            let message = request.commit_message.as_str();

            let changed = match self.0 {
                UpdateMode::Local => self_update(root, &runner, &NoopHandler, message, update).await?,
                UpdateMode::Push => {
                    let handler = PushHandler::new(&runner)
                        .with_remote(request.remote.clone())
                        .with_branch(request.branch.clone())
                        .with_force(request.force);
                    self_update(root, &runner, &handler, message, update).await?
                }
                UpdateMode::PullRequest => {
                    let env = RunEnv::from_env();
                    let pull_request = self.pull_request_options(&request, &env)?;
                    let token_env = &resolver.config().github.token_env;
                    let token = std::env::var(token_env).map_err(|_| {
                        ChoreError::Failed(format!("GitHub token variable {token_env:?} is not set"))
                    })?;
                    let client = GithubClient::new(token).map_err(crate::self_update::SelfUpdateError::from)?;

                    let handler = PullRequestHandler::new(&runner, client, pull_request, env.run_url())
                        .await?
                        .with_remote(request.remote.clone());
                    self_update(root, &runner, &handler, message, update).await?
                }
            };

            Ok(Value::Bool(changed))
        })
    }

    fn help(&self) -> Option<&str> {
        match self.0 {
            UpdateMode::Local => Some(SELF_UPDATE_HELP),
            UpdateMode::Push => Some(SELF_UPDATE_PUSH_HELP),
            UpdateMode::PullRequest => Some(SELF_UPDATE_PR_HELP),
        }
    }
}

const ABOUT_HELP: &str = "Print where chored runs from, and its newest releases.";

/// Describe chored installation.
struct About;

impl Chore for About {
    fn invoke<'a>(&'a self, _: &'a Resolver, _: Options) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let exe = std::env::current_exe()
                .map(|exe| exe.display().to_string())
                .unwrap_or_else(|_| "<unknown>".into());
            println!("\nchored {} running from: {exe}", env!("CARGO_PKG_VERSION"));

            let runner = ProcessRunner::new();
            let repository = env!("CARGO_PKG_REPOSITORY");
            if let Some(release) = resolve_latest(&runner, repository, None).await? {
                println!("\nThe latest release is:\n  {release}");
            }
            if let Some(commit) = resolve_latest(&runner, repository, Some("main")).await? {
                println!("\nThe latest development commit is:\n  {commit}");
            }

            Ok(Value::Null)
        })
    }

    fn help(&self) -> Option<&str> {
        Some(ABOUT_HELP)
    }
}

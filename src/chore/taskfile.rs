// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Task file format.
//!
//! Task files are TOML documents living in the task root. Every table holding
//! a `run`, `all`, or `chore` key defines a chore. Every other table is a
//! namespace grouping further chores:
//!
//! ```toml
//! [default]
//! help = "Run the test suite"
//! run = ["cargo", "test"]
//!
//! [check]
//! all = ["lint", "test"]
//!
//! [release]
//! chore = "bump"
//! options = { action = "push" }
//!
//! [ci.lint]
//! run = ["cargo", "clippy", "--", "-D", "{level}"]
//! ```
//!
//! Command chores substitute `{key}` placeholders with option values, and
//! append anything passed after `--`.

use crate::{
    chore::{Chore, Export, Module, Options, Resolver},
    cmd::{CommandRunner, ProcessRunner},
};

use futures::future::{try_join_all, BoxFuture};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::{collections::BTreeMap, path::PathBuf, sync::LazyLock};
use tracing::{debug, info};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_-]+)\}").expect("valid placeholder pattern"));

const CHORE_KEYS: [&str; 3] = ["run", "all", "chore"];

/// Parse task file into module.
///
/// Non-table values at any level are ignored.
///
/// # Errors
///
/// - Return [`TaskFileError::Deserialize`] if file is no valid TOML.
/// - Return [`TaskFileError::Definition`] if a chore definition is malformed.
pub fn parse_module(name: impl Into<String>, data: &str) -> Result<Module> {
    let table: toml::Table = toml::de::from_str(data)?;
    Ok(Module::new(name, parse_exports(&[], table)?))
}

fn parse_exports(parent: &[&str], table: toml::Table) -> Result<BTreeMap<String, Export>> {
    let mut exports = BTreeMap::new();
    for (key, value) in table {
        let toml::Value::Table(table) = value else {
            debug!("ignoring non-table value {key:?}");
            continue;
        };

        let path = [parent, &[key.as_str()]].concat();
        let export = if CHORE_KEYS.iter().any(|chore_key| table.contains_key(*chore_key)) {
            let definition: TaskDef =
                toml::Value::Table(table)
                    .try_into()
                    .map_err(|source| TaskFileError::Definition {
                        chore: path.join("."),
                        source,
                    })?;
            Export::chore(definition.into_chore(&path)?)
        } else {
            Export::Namespace(parse_exports(&path, table)?)
        };
        exports.insert(key, export);
    }

    Ok(exports)
}

/// Layout of chore definition.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskDef {
    /// Help text shown through `--help`.
    pub help: Option<String>,

    /// Command to run.
    pub run: Option<Vec<String>>,

    /// Chores to run concurrently.
    pub all: Option<Vec<String>>,

    /// Chore to delegate to.
    pub chore: Option<String>,

    /// Preset options of delegated chore.
    #[serde(default)]
    pub options: toml::Table,

    /// Extra environment of command.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory of command, relative to project root.
    pub cwd: Option<PathBuf>,

    /// Chore may be invoked from the command line.
    #[serde(default = "default_choredef")]
    pub choredef: bool,
}

fn default_choredef() -> bool {
    true
}

impl TaskDef {
    fn into_chore(self, path: &[&str]) -> Result<TaskChore> {
        let kind = match (self.run, self.all, self.chore) {
            (Some(argv), None, None) if !argv.is_empty() => TaskKind::Command {
                argv,
                env: self.env,
                cwd: self.cwd,
            },
            (None, Some(chores), None) => TaskKind::Composite(
                chores
                    .iter()
                    .map(|chore| chore.split_whitespace().map(ToString::to_string).collect())
                    .collect(),
            ),
            (None, None, Some(chore)) => TaskKind::Alias {
                path: chore.split_whitespace().map(ToString::to_string).collect(),
                options: Options::from_json(serde_json::to_value(self.options)?)?,
            },
            _ => {
                return Err(TaskFileError::Ambiguous {
                    chore: path.join("."),
                })
            }
        };

        Ok(TaskChore {
            help: self.help,
            choredef: self.choredef,
            kind,
        })
    }
}

/// Chore defined by task file.
#[derive(Debug, Clone)]
pub struct TaskChore {
    help: Option<String>,
    choredef: bool,
    kind: TaskKind,
}

#[derive(Debug, Clone)]
enum TaskKind {
    Command {
        argv: Vec<String>,
        env: BTreeMap<String, String>,
        cwd: Option<PathBuf>,
    },
    Composite(Vec<Vec<String>>),
    Alias {
        path: Vec<String>,
        options: Options,
    },
}

impl Chore for TaskChore {
    fn invoke<'a>(
        &'a self,
        resolver: &'a Resolver,
        options: Options,
    ) -> BoxFuture<'a, super::Result<Value>> {
        Box::pin(async move {
            match &self.kind {
                TaskKind::Command { argv, env, cwd } => {
                    let cmd = substitute(argv, &options)?;
                    let cwd = match cwd {
                        Some(cwd) => resolver.project_root().join(cwd),
                        None => resolver.project_root().to_path_buf(),
                    };
                    info!("running {}", cmd.join(" "));
                    ProcessRunner::new()
                        .with_cwd(cwd)
                        .with_envs(env.clone())
                        .run(&cmd)
                        .await?;
                    Ok(Value::Null)
                }
                TaskKind::Composite(chores) => {
                    let results = try_join_all(
                        chores
                            .iter()
                            .map(|chore| resolver.run(chore, options.clone())),
                    )
                    .await?;
                    Ok(Value::Array(results))
                }
                TaskKind::Alias { path, options: preset } => {
                    resolver.run(path, preset.clone().merged(options)).await
                }
            }
        })
    }

    fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    fn is_choredef(&self) -> bool {
        self.choredef
    }
}

/// Fill `{key}` placeholders of command with option values.
///
/// Trailing arguments given after `--` are appended.
///
/// # Errors
///
/// - Return [`TaskFileError::MissingOption`] if a placeholder has no value.
pub fn substitute(argv: &[String], options: &Options) -> Result<Vec<String>> {
    let mut cmd = Vec::with_capacity(argv.len());
    for arg in argv {
        let mut missing = None;
        let filled = PLACEHOLDER.replace_all(arg, |caps: &regex::Captures<'_>| {
            match options.get(&caps[1]) {
                Some(value) => value.to_string(),
                None => {
                    missing.get_or_insert_with(|| caps[1].to_string());
                    String::new()
                }
            }
        });

        if let Some(key) = missing {
            return Err(TaskFileError::MissingOption { key });
        }
        cmd.push(filled.into_owned());
    }

    cmd.extend(options.args());
    Ok(cmd)
}

/// Task file error types.
#[derive(Debug, thiserror::Error)]
pub enum TaskFileError {
    /// Task file is no valid TOML.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Chore definition has unknown or mistyped fields.
    #[error("invalid definition of chore {chore}")]
    Definition {
        chore: String,
        #[source]
        source: toml::de::Error,
    },

    /// Chore definition sets more than one of `run`, `all`, and `chore`, or
    /// an empty command.
    #[error("chore {chore} must set exactly one of non-empty `run`, `all`, or `chore`")]
    Ambiguous { chore: String },

    /// Preset options cannot be converted.
    #[error("invalid preset options")]
    Preset(#[from] serde_json::Error),

    /// Preset options are malformed.
    #[error(transparent)]
    Options(#[from] crate::chore::options::OptionError),

    /// Command placeholder has no option value.
    #[error("command needs option {key:?}, pass it with `--{key} <value>`")]
    MissingOption { key: String },
}

/// Friendly result alias :3
type Result<T, E = TaskFileError> = std::result::Result<T, E>;

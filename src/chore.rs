// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Chores and their modules.
//!
//! A __chore__ is a named unit of work, e.g., "test", "render", or "bump".
//! Chores live in __modules__: task files in the project's task root, an
//! optional index file, and a builtin module bundled with chored. Each module
//! exports a tree of chores, where intermediate nodes are __namespaces__.
//!
//! # Entrypoints
//!
//! Every eligible chore of a module becomes an __entrypoint__ identified by
//! the path of keys leading to it. Entrypoints of a task file are prefixed by
//! the file's name, so chore "lint" in "choredefs/rust.toml" is identified as
//! `["rust", "lint"]`. Entrypoints of the index file and the builtin module
//! are unscoped, and thus carry no prefix.
//!
//! Chores inside a namespace called "default" are merged into the top level
//! of their module. Requesting `["rust"]` is the same as requesting
//! `["rust", "default"]`.
//!
//! # See Also
//!
//! 1. [`Resolver`]
//! 2. [`taskfile`]

pub mod builtins;
pub mod options;
pub mod resolve;
pub mod taskfile;

pub use options::{Invocation, InvocationMode, OptionValue, Options};
pub use resolve::{Listing, ListingGroup, Location, Resolver, Source};

use futures::future::BoxFuture;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

/// Invocable unit of work.
pub trait Chore: Send + Sync + 'static {
    /// Run chore with given options.
    ///
    /// The resolver is handed in so chores can run other chores.
    ///
    /// # Errors
    ///
    /// - Return [`ChoreError`] if chore fails for any reason.
    fn invoke<'a>(&'a self, resolver: &'a Resolver, options: Options)
        -> BoxFuture<'a, Result<Value>>;

    /// Describe what chore does, and which options it takes.
    fn help(&self) -> Option<&str> {
        None
    }

    /// Chore may be used as an entrypoint.
    fn is_choredef(&self) -> bool {
        true
    }
}

/// Item exported by a module.
#[derive(Clone)]
pub enum Export {
    /// Invocable chore.
    Chore(Arc<dyn Chore>),

    /// Nested group of exports.
    Namespace(BTreeMap<String, Export>),
}

impl Export {
    /// Wrap chore as export.
    pub fn chore(chore: impl Chore) -> Self {
        Self::Chore(Arc::new(chore))
    }
}

impl Debug for Export {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Chore(_) => fmt.write_str("Chore"),
            Self::Namespace(exports) => fmt.debug_map().entries(exports.iter()).finish(),
        }
    }
}

/// Loaded module of chores.
#[derive(Default, Debug, Clone)]
pub struct Module {
    /// Where module was loaded from.
    pub name: String,

    /// Top-level exports of module.
    pub exports: BTreeMap<String, Export>,
}

impl Module {
    /// Construct new module.
    pub fn new(name: impl Into<String>, exports: BTreeMap<String, Export>) -> Self {
        Self {
            name: name.into(),
            exports,
        }
    }

    /// List entrypoints of module.
    ///
    /// Entrypoints are sorted by key. Chores merged from the "default"
    /// namespace follow the regular exports.
    pub fn entrypoints(&self, scope: Option<&str>) -> Vec<Entrypoint> {
        let prefix = scope.map(|scope| vec![scope.to_string()]).unwrap_or_default();
        let mut found = Vec::new();
        self.collect(&prefix, &[], &self.exports, true, &mut found);

        if let Some(Export::Namespace(default)) = self.exports.get("default") {
            self.collect(&prefix, &["default".into()], default, false, &mut found);
        }

        found
    }

    fn collect(
        &self,
        id_prefix: &[String],
        symbol_prefix: &[String],
        exports: &BTreeMap<String, Export>,
        top_level: bool,
        found: &mut Vec<Entrypoint>,
    ) {
        for (key, export) in exports {
            let id = [id_prefix, &[key.clone()]].concat();
            let symbol = [symbol_prefix, &[key.clone()]].concat();
            match export {
                Export::Chore(chore) if chore.is_choredef() => found.push(Entrypoint {
                    module: self.name.clone(),
                    id,
                    symbol,
                    chore: Arc::clone(chore),
                }),
                Export::Chore(_) => continue,
                // INVARIANT: Default namespace is merged into top level separately.
                Export::Namespace(_) if top_level && key == "default" => continue,
                Export::Namespace(children) => self.collect(&id, &symbol, children, false, found),
            }
        }
    }
}

/// Resolved, invocable chore.
#[derive(Clone)]
pub struct Entrypoint {
    /// Module chore was found in.
    pub module: String,

    /// Identifier that requests must match.
    pub id: Vec<String>,

    /// Path of keys to chore inside its module.
    pub symbol: Vec<String>,

    /// Chore itself.
    pub chore: Arc<dyn Chore>,
}

impl Entrypoint {
    /// Check if entrypoint answers request for `path`.
    ///
    /// An identifier one component longer than `path` also matches if its
    /// last component is "default".
    pub fn matches(&self, path: &[String]) -> bool {
        match self.id.split_last() {
            _ if self.id.len() == path.len() => self.id == path,
            Some((last, init)) if self.id.len() == path.len() + 1 => {
                last == "default" && init == path
            }
            _ => false,
        }
    }

    /// Identifier meant for humans.
    ///
    /// Trailing "default" is dropped unless nothing would remain.
    pub fn display_id(&self) -> String {
        let id = match self.id.split_last() {
            Some((last, init)) if last == "default" && !init.is_empty() => init,
            _ => self.id.as_slice(),
        };
        id.join(" ")
    }
}

impl Debug for Entrypoint {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("Entrypoint")
            .field("module", &self.module)
            .field("id", &self.id)
            .field("symbol", &self.symbol)
            .finish_non_exhaustive()
    }
}

/// Chore error types.
#[derive(Debug, thiserror::Error)]
pub enum ChoreError {
    /// No entrypoint answers request.
    #[error("chore {path:?} not found, searched: {}. Try `chored --list`", .searched.join(", "))]
    NotFound {
        path: Vec<String>,
        searched: Vec<String>,
    },

    /// Module cannot be loaded.
    #[error("failed to load module {module}")]
    Load {
        module: String,
        #[source]
        source: Box<ChoreError>,
    },

    /// Task file cannot be read.
    #[error("failed to read {path:?}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Remote module cannot be fetched.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Task file is malformed.
    #[error(transparent)]
    TaskFile(#[from] taskfile::TaskFileError),

    /// Options are malformed, or do not fit chore.
    #[error(transparent)]
    Options(#[from] options::OptionError),

    /// Version bump fails.
    #[error(transparent)]
    Bump(#[from] crate::bump::BumpError),

    /// Git queries fail.
    #[error(transparent)]
    Git(#[from] crate::git::GitError),

    /// Subprocess fails.
    #[error(transparent)]
    Cmd(#[from] crate::cmd::CmdError),

    /// Generated files cannot be rendered.
    #[error(transparent)]
    Render(#[from] crate::render::RenderError),

    /// Dependency URLs cannot be bumped.
    #[error(transparent)]
    Deps(#[from] crate::deps::DepsError),

    /// Self-update fails.
    #[error(transparent)]
    SelfUpdate(#[from] crate::self_update::SelfUpdateError),

    /// Chore refuses to run.
    #[error("{0}")]
    Failed(String),
}

/// Friendly result alias :3
pub type Result<T, E = ChoreError> = std::result::Result<T, E>;


#[cfg(test)]
mod tests {
    use super::{testing::*, *};
    use pretty_assertions::assert_eq;

    fn ids(entrypoints: &[Entrypoint]) -> Vec<String> {
        entrypoints.iter().map(|entry| entry.id.join(".")).collect()
    }

    #[test]
    fn module_entrypoints_merge_default_namespace() {
        let module = Module::new(
            "dynamic.toml",
            namespace([
                ("default", Export::Namespace(namespace([("impl", Echo::export("dynamic!"))]))),
                ("lint", Echo::export("lint")),
                ("hidden", Export::chore(Hidden)),
                ("ci", Export::Namespace(namespace([("check", Echo::export("check"))]))),
            ]),
        );

        let result = module.entrypoints(Some("dynamic"));
        assert_eq!(ids(&result), vec!["dynamic.ci.check", "dynamic.lint", "dynamic.impl"]);
        assert_eq!(result[2].symbol, vec!["default".to_string(), "impl".into()]);

        let result = module.entrypoints(None);
        assert_eq!(ids(&result), vec!["ci.check", "lint", "impl"]);
    }

    #[test]
    fn entrypoint_matching_and_display() {
        let module = Module::new(
            "a.toml",
            namespace([("default", Echo::export("a")), ("async", Echo::export("b"))]),
        );
        let entries = module.entrypoints(Some("a"));
        let path = |parts: &[&str]| parts.iter().map(ToString::to_string).collect::<Vec<_>>();

        assert!(entries[1].matches(&path(&["a"])));
        assert!(entries[1].matches(&path(&["a", "default"])));
        assert!(!entries[1].matches(&path(&["a", "async"])));
        assert!(entries[0].matches(&path(&["a", "async"])));
        assert!(!entries[0].matches(&path(&["a"])));

        assert_eq!(entries[1].display_id(), "a");
        assert_eq!(entries[0].display_id(), "a async");

        let unscoped = module.entrypoints(None);
        assert_eq!(unscoped[1].display_id(), "default");
    }
}

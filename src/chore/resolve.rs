// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Entrypoint resolution.
//!
//! Map a requested chore path onto the first matching entrypoint among the
//! modules chored knows about. Modules are searched in priority order:
//!
//! 1. A direct module reference, if the first path component names a file
//!    path or URL. Nothing else is searched then.
//! 2. Task files in the task root named after the first path component.
//! 3. The index file of the task root.
//! 4. The builtin module.
//!
//! Modules are loaded lazily, so a task file is only parsed if every module
//! before it failed to answer the request.

use crate::{
    chore::{builtins, taskfile, ChoreError, Entrypoint, Module, Options, Result},
    config::Config,
};

use serde_json::Value;
use std::{
    collections::HashSet,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Name of unscoped task file in the task root.
pub const INDEX_FILE_NAME: &str = "index.toml";

/// Extension of task files.
pub const TASK_FILE_EXTENSION: &str = "toml";

const USAGE: &str = "\
Usage: chored [MODULE] CHORE [OPTIONS]

Options will be passed as a single argument to the given chore:
  --string key value / -s key value / --key=value
  --bool flag true / --flag / --no-flag
  --num key int / -n key int / --key=int
  --env key ENVNAME / -e key ENVNAME
  --json '{ ... }'
  -- ARGS (passed as `args` string array)";

/// Where a module is loaded from.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Location {
    File(PathBuf),
    Url(String),
    Builtin,
}

impl Display for Location {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::File(path) => write!(fmt, "{}", path.display()),
            Self::Url(url) => fmt.write_str(url),
            Self::Builtin => fmt.write_str("builtin"),
        }
    }
}

/// Module that may answer a request.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Source {
    pub location: Location,

    /// Prefix of every entrypoint in module, if any.
    pub scope: Option<String>,
}

impl Source {
    fn scoped(location: Location, scope: impl Into<String>) -> Self {
        Self {
            location,
            scope: Some(scope.into()),
        }
    }

    fn unscoped(location: Location) -> Self {
        Self {
            location,
            scope: None,
        }
    }
}

/// Entrypoint listing grouped by module.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct Listing {
    pub groups: Vec<ListingGroup>,
}

/// Entrypoints listed from a single module.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct ListingGroup {
    /// Module named in a header, only given for unscoped modules.
    pub header: Option<String>,

    /// Display identifiers of entrypoints.
    pub ids: Vec<String>,
}

impl Display for Listing {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for group in &self.groups {
            if let Some(header) = &group.header {
                write!(fmt, "\n\n[ from {header} ]:")?;
            }
            for id in &group.ids {
                write!(fmt, "\n - {id}")?;
            }
        }

        Ok(())
    }
}

/// Resolve and run chores.
#[derive(Debug, Clone)]
pub struct Resolver {
    project_root: PathBuf,
    task_root: PathBuf,
    config: Config,
    builtins: Module,
}

impl Resolver {
    /// Construct new resolver for project.
    ///
    /// Task root comes from configuration, and falls back to "choredefs" in
    /// the project root.
    pub fn new(project_root: impl Into<PathBuf>, config: Config) -> Self {
        let project_root = project_root.into();
        Self {
            task_root: config.task_root_in(&project_root),
            project_root,
            config,
            builtins: builtins::module(),
        }
    }

    /// Search for task files in `task_root` instead.
    pub fn with_task_root(mut self, task_root: impl Into<PathBuf>) -> Self {
        self.task_root = self.project_root.join(task_root.into());
        self
    }

    /// Use `builtins` as the builtin module.
    pub fn with_builtins(mut self, builtins: Module) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn task_root(&self) -> &Path {
        &self.task_root
    }

    /// List modules that may answer request for `scope`, in priority order.
    ///
    /// Without a scope, every task file is listed.
    ///
    /// # Errors
    ///
    /// - Return [`ChoreError::Failed`] if the task root cannot be searched.
    pub async fn sources(&self, scope: Option<&str>) -> Result<Vec<Source>> {
        if let Some(reference) = scope.filter(|scope| scope.contains('/')) {
            let location = if reference.contains("://") {
                Location::Url(reference.to_string())
            } else {
                Location::File(self.project_root.join(reference))
            };
            return Ok(vec![Source::scoped(location, reference)]);
        }

        let mut sources = Vec::new();
        for path in self.task_files()? {
            let Some(stem) = path.file_stem().map(|stem| stem.to_string_lossy().into_owned()) else {
                continue;
            };
            if scope.is_some_and(|scope| scope != stem) {
                continue;
            }
            sources.push(Source::scoped(Location::File(path), stem));
        }

        let index = self.task_root.join(INDEX_FILE_NAME);
        if tokio::fs::try_exists(&index).await.unwrap_or(false) {
            sources.push(Source::unscoped(Location::File(index)));
        }
        sources.push(Source::unscoped(Location::Builtin));

        Ok(sources)
    }

    // INVARIANT: Task files are sorted by name, and exclude the index file.
    fn task_files(&self) -> Result<Vec<PathBuf>> {
        let pattern = format!(
            "{}/*.{TASK_FILE_EXTENSION}",
            glob::Pattern::escape(&self.task_root.to_string_lossy())
        );
        let paths = glob::glob(&pattern)
            .map_err(|error| ChoreError::Failed(format!("invalid task root: {error}")))?;

        let mut files = paths
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(error) => {
                    debug!("skipping unreadable task file: {error}");
                    None
                }
            })
            .filter(|path| path.is_file())
            .filter(|path| path.file_name().is_some_and(|name| name != INDEX_FILE_NAME))
            .collect::<Vec<_>>();
        files.sort();

        Ok(files)
    }

    /// Load module from source.
    ///
    /// # Errors
    ///
    /// - Return [`ChoreError::Load`] if module cannot be read, fetched, or
    ///   parsed.
    #[instrument(skip(self), level = "debug")]
    pub async fn load(&self, source: &Source) -> Result<Module> {
        let result = match &source.location {
            Location::Builtin => return Ok(self.builtins.clone()),
            Location::File(path) => match tokio::fs::read_to_string(path).await {
                Ok(data) => taskfile::parse_module(source.location.to_string(), &data)
                    .map_err(ChoreError::from),
                Err(error) => Err(ChoreError::Read {
                    path: path.clone(),
                    source: error,
                }),
            },
            Location::Url(url) => fetch(url)
                .await
                .and_then(|data| Ok(taskfile::parse_module(url.clone(), &data)?)),
        };

        result.map_err(|error| ChoreError::Load {
            module: source.location.to_string(),
            source: Box::new(error),
        })
    }

    /// Find entrypoint answering request for `path`.
    ///
    /// An empty path requests the "default" chore.
    ///
    /// # Errors
    ///
    /// - Return [`ChoreError::Load`] if a module searched is malformed.
    pub async fn resolve_entrypoint(&self, path: &[String]) -> Result<Option<Entrypoint>> {
        Ok(self.search(path).await?.0)
    }

    async fn search(&self, path: &[String]) -> Result<(Option<Entrypoint>, Vec<String>)> {
        let default = ["default".to_string()];
        let path = if path.is_empty() { &default[..] } else { path };

        let mut searched = Vec::new();
        for source in self.sources(path.first().map(String::as_str)).await? {
            searched.push(source.location.to_string());
            let module = self.load(&source).await?;
            let found = module
                .entrypoints(source.scope.as_deref())
                .into_iter()
                .find(|entry| entry.matches(path));

            if let Some(entry) = found {
                debug!("resolved {path:?} to {entry:?}");
                return Ok((Some(entry), searched));
            }
        }

        Ok((None, searched))
    }

    /// Run chore at `path` with `options`.
    ///
    /// # Errors
    ///
    /// - Return [`ChoreError::NotFound`] if no module answers request.
    /// - Return whatever error the chore fails with.
    pub async fn run(&self, path: &[String], options: Options) -> Result<Value> {
        let entry = self.require_entrypoint(path).await?;
        debug!("running {} from {}", entry.display_id(), entry.module);
        entry.chore.invoke(self, options).await
    }

    async fn require_entrypoint(&self, path: &[String]) -> Result<Entrypoint> {
        match self.search(path).await? {
            (Some(entry), _) => Ok(entry),
            (None, searched) => Err(ChoreError::NotFound {
                path: path.to_vec(),
                searched,
            }),
        }
    }

    /// List entrypoints available for `scope`.
    ///
    /// Unscoped entrypoints shadowed by a task file or an earlier unscoped
    /// module are left out.
    ///
    /// # Errors
    ///
    /// - Return [`ChoreError::Load`] if a module searched is malformed.
    pub async fn list_entrypoints(&self, scope: Option<&str>) -> Result<Listing> {
        // INVARIANT: Earlier sources shadow whole first components, so one
        //   source may still list several ids under the same name.
        let mut seen = HashSet::new();
        let mut listed = HashSet::new();
        let mut listing = Listing::default();

        for source in self.sources(scope).await? {
            let module = self.load(&source).await?;
            let mut entrypoints = module.entrypoints(source.scope.as_deref());

            let header = match &source.scope {
                Some(source_scope) => {
                    seen.insert(source_scope.clone());
                    None
                }
                None => {
                    let earlier = seen.clone();
                    entrypoints.retain(|entry| {
                        let name = &entry.id[0];
                        scope.is_none_or(|scope| scope == name.as_str())
                            && !earlier.contains(name)
                            && listed.insert(entry.id.clone())
                    });
                    seen.extend(entrypoints.iter().map(|entry| entry.id[0].clone()));
                    Some(module.name.clone())
                }
            };

            if !entrypoints.is_empty() {
                listing.groups.push(ListingGroup {
                    header,
                    ids: entrypoints.iter().map(Entrypoint::display_id).collect(),
                });
            }
        }

        Ok(listing)
    }

    /// Describe chore at `path`, or how to invoke chored at all.
    ///
    /// # Errors
    ///
    /// - Return [`ChoreError::NotFound`] if no module answers request.
    pub async fn help(&self, path: &[String]) -> Result<String> {
        if path.is_empty() {
            return Ok(USAGE.to_string());
        }

        let entry = self.require_entrypoint(path).await?;
        let help = entry
            .chore
            .help()
            .unwrap_or("(chore has no help text)");

        Ok(format!(
            "\nsource: {}\nchore:  {}\n\n{help}",
            entry.module,
            entry.display_id()
        ))
    }
}

async fn fetch(url: &str) -> Result<String> {
    debug!("fetching {url}");
    Ok(reqwest::get(url).await?.error_for_status()?.text().await?)
}

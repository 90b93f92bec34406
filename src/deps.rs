// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dependency URL bumping.
//!
//! Walk the project for files referencing remote sources, resolve the newest
//! ref each reference should follow, and rewrite the references in place.
//! Every distinct remote is resolved at most once, no matter how many files
//! reference it or how many rewrites race on it.

pub mod github;

pub use github::GithubImport;

use crate::cmd::{CommandRunner, ProcessRunner};

use futures::future::try_join_all;
use ignore::WalkBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    collections::{HashMap, HashSet},
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, instrument};

/// Explicit ref to follow for a remote source, e.g., "chored#main".
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BumpSpec {
    /// Repository name, or "owner/repo".
    pub source_name: String,

    /// Ref filter to follow.
    pub spec: String,
}

impl FromStr for BumpSpec {
    type Err = DepsError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut parts = data.split('#');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(source_name), Some(spec), None) => Ok(Self {
                source_name: source_name.into(),
                spec: spec.into(),
            }),
            _ => Err(DepsError::InvalidSpec(data.into())),
        }
    }
}

/// Single-flight cache of resolved refs.
///
/// Concurrent lookups of the same key share one resolution.
#[derive(Debug, Default)]
pub struct SpecCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<Option<String>>>>>,
    fetches: AtomicUsize,
}

impl SpecCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `key`, resolving it through `resolve` if nobody did yet.
    ///
    /// # Errors
    ///
    /// - Return whatever error `resolve` fails with. Failed resolutions are
    ///   not cached.
    pub async fn get_or_resolve<F, Fut>(&self, key: &str, resolve: F) -> Result<Option<String>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Option<String>>>,
    {
        let cell = {
            let mut entries = self.entries.lock().await;
            Arc::clone(entries.entry(key.to_string()).or_default())
        };

        let value = cell
            .get_or_try_init(|| async {
                self.fetches.fetch_add(1, Ordering::SeqCst);
                debug!("fetch {key}");
                resolve().await
            })
            .await?;

        Ok(value.clone())
    }

    /// Number of resolutions started.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Keys resolved to nothing.
    pub async fn missing(&self) -> Vec<String> {
        let entries = self.entries.lock().await;
        let mut missing = entries
            .iter()
            .filter(|(_, cell)| matches!(cell.get(), Some(None)))
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        missing.sort();
        missing
    }
}

/// Outcome of dependency bump.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct BumpSummary {
    /// Distinct remote sources resolved.
    pub found: usize,

    /// Remote sources whose references changed.
    pub updated: usize,

    /// Remote sources without any matching ref.
    pub missing: Vec<String>,

    /// Files rewritten.
    pub files: Vec<PathBuf>,
}

impl Display for BumpSummary {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        if !self.missing.is_empty() {
            let subject = match self.missing.len() {
                1 => "source has",
                _ => "sources have",
            };
            writeln!(fmt, "{} {subject} no available versions:", self.missing.len())?;
            for missing in &self.missing {
                writeln!(fmt, " - {missing}")?;
            }
        }

        write!(fmt, "{} remote sources found, {} updated", self.found, self.updated)
    }
}

/// Rewrite remote source references to their newest refs.
#[derive(Debug)]
pub struct Bumper<R = ProcessRunner>
where
    R: CommandRunner,
{
    runner: R,
    overrides: Vec<BumpSpec>,
    cache: SpecCache,
    changed: Mutex<HashSet<String>>,
}

impl<R> Bumper<R>
where
    R: CommandRunner,
{
    /// Construct new bumper resolving refs through `runner`.
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            overrides: Vec::new(),
            cache: SpecCache::new(),
            changed: Mutex::new(HashSet::new()),
        }
    }

    /// Follow explicit refs for matching repositories.
    pub fn with_overrides(mut self, overrides: impl IntoIterator<Item = BumpSpec>) -> Self {
        self.overrides.extend(overrides);
        self
    }

    /// Parse remote source reference, applying explicit specs.
    pub fn parse(&self, url: &str) -> Option<GithubImport> {
        let mut import = GithubImport::parse(url)?;
        if let Some(spec) = self.overrides.iter().find(|spec| import.matches(spec)) {
            import.spec = Some(spec.spec.clone());
        }

        Some(import)
    }

    /// Compute replacement of remote source reference.
    ///
    /// Unknown or unresolvable references are returned unchanged.
    ///
    /// # Errors
    ///
    /// - Return [`DepsError::Cmd`] if refs cannot be listed.
    pub async fn replace_url(&self, url: &str) -> Result<String> {
        let Some(import) = self.parse(url) else {
            return Ok(url.to_string());
        };

        let identity = import.identity();
        let repo_url = import.repo_url();
        let resolved = self
            .cache
            .get_or_resolve(&identity, || {
                github::resolve_latest(&self.runner, &repo_url, import.spec.as_deref())
            })
            .await?;

        let Some(version) = resolved else {
            return Ok(url.to_string());
        };

        let replacement = GithubImport { version, ..import }.show();
        if replacement != url {
            self.changed.lock().await.insert(identity);
        }

        Ok(replacement)
    }

    /// Rewrite every remote source reference in `contents`.
    ///
    /// # Errors
    ///
    /// - Return [`DepsError::Cmd`] if refs cannot be listed.
    pub async fn process(&self, contents: &str) -> Result<String> {
        let urls = github::RAW_URL
            .find_iter(contents)
            .map(|found| found.as_str())
            .collect::<HashSet<_>>();
        let replacements = try_join_all(urls.into_iter().map(|url| async move {
            Ok::<_, DepsError>((url, self.replace_url(url).await?))
        }))
        .await?
        .into_iter()
        .collect::<HashMap<_, _>>();

        Ok(github::RAW_URL
            .replace_all(contents, |caps: &regex::Captures<'_>| {
                let url = &caps[0];
                replacements.get(url).cloned().unwrap_or_else(|| url.to_string())
            })
            .into_owned())
    }

    /// Rewrite remote source references of file.
    ///
    /// Returns whether the file changed.
    ///
    /// # Errors
    ///
    /// - Return [`DepsError::Io`] if file cannot be read or written.
    /// - Return [`DepsError::Cmd`] if refs cannot be listed.
    pub async fn bump_file(&self, path: &Path) -> Result<bool> {
        let io_error = |source| DepsError::Io {
            path: path.to_path_buf(),
            source,
        };

        let contents = tokio::fs::read_to_string(path).await.map_err(io_error)?;
        let result = self.process(&contents).await?;
        let changed = result != contents;
        debug!(
            "{} {}",
            if changed { "modified" } else { "unchanged" },
            path.display()
        );

        if changed {
            tokio::fs::write(path, result).await.map_err(io_error)?;
        }

        Ok(changed)
    }

    /// Rewrite remote source references below `roots`.
    ///
    /// Directories are walked honoring ignore files and skipping hidden
    /// entries. Only files with one of `extensions` are considered, unless a
    /// root names a file directly.
    ///
    /// # Errors
    ///
    /// - Return [`DepsError::Walk`] if a root cannot be walked.
    /// - Return [`DepsError::Io`] if files cannot be read or written.
    /// - Return [`DepsError::Cmd`] if refs cannot be listed.
    #[instrument(skip(self), level = "debug")]
    pub async fn bump_roots(&self, roots: &[PathBuf], extensions: &[String]) -> Result<BumpSummary> {
        let files = collect_files(roots, extensions)?;
        let spinner = ProgressBar::new_spinner();
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(format!("checking {} files for remote sources", files.len()));

        let results = try_join_all(files.iter().map(|file| self.bump_file(file))).await;
        spinner.finish_and_clear();

        let changed_files = files
            .into_iter()
            .zip(results?)
            .filter_map(|(file, changed)| changed.then_some(file))
            .collect();

        let summary = BumpSummary {
            found: self.cache.fetches(),
            updated: self.changed.lock().await.len(),
            missing: self.cache.missing().await,
            files: changed_files,
        };
        info!("{summary}");

        Ok(summary)
    }
}

fn collect_files(roots: &[PathBuf], extensions: &[String]) -> Result<Vec<PathBuf>> {
    let default_roots = [PathBuf::from(".")];
    let roots = if roots.is_empty() { &default_roots[..] } else { roots };
    if extensions.is_empty() {
        return Err(DepsError::NoExtensions);
    }

    let mut files = Vec::new();
    for root in roots {
        if root.is_file() {
            files.push(root.clone());
            continue;
        }

        for entry in WalkBuilder::new(root).hidden(true).build() {
            let entry = entry.map_err(|error| DepsError::Walk {
                root: root.clone(),
                source: error,
            })?;
            let is_file = entry.file_type().is_some_and(|kind| kind.is_file());
            let matches = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.iter().any(|wanted| wanted == ext));
            if is_file && matches {
                files.push(entry.into_path());
            }
        }
    }

    Ok(files)
}

/// Dependency bump error types.
#[derive(Debug, thiserror::Error)]
pub enum DepsError {
    /// Explicit spec is not of the form "source#spec".
    #[error("Can't parse spec: {0}")]
    InvalidSpec(String),

    /// No file extensions to look for.
    #[error("no file extensions configured for dependency bump")]
    NoExtensions,

    /// Root cannot be walked.
    #[error("failed to walk {root:?}")]
    Walk {
        root: PathBuf,
        #[source]
        source: ignore::Error,
    },

    /// File cannot be read or written.
    #[error("failed to rewrite {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Refs cannot be listed.
    #[error(transparent)]
    Cmd(#[from] crate::cmd::CmdError),
}

/// Friendly result alias :3
pub type Result<T, E = DepsError> = std::result::Result<T, E>;

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote sources hosted on GitHub.
//!
//! Files served through "raw.githubusercontent.com" embed the ref they were
//! fetched from. An optional `#spec` fragment says which refs the URL should
//! follow: a wildcard like `v*` tracks the newest matching version tag, while
//! a plain name like `main` pins the head commit of that branch.

use crate::{
    cmd::{cmdline, CommandRunner},
    deps::{BumpSpec, Result},
    version::Version,
};

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Pattern of GitHub raw URLs, usable inside arbitrary text.
pub(crate) static RAW_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(https://raw\.githubusercontent\.com)/([^/\s"'#]+)/([^/\s"'#]+)/([^/\s"'#]+)/([^#\s"']*)(?:#([^\s"']+))?"#,
    )
    .expect("valid raw URL pattern")
});

/// Ref filter used when URL names none.
pub const DEFAULT_REF_FILTER: &str = "v*";

/// Reference to file in GitHub repository.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct GithubImport {
    pub prefix: String,
    pub owner: String,
    pub repo: String,

    /// Ref the file is currently fetched from.
    pub version: String,

    pub path: String,

    /// Refs to follow.
    pub spec: Option<String>,
}

impl GithubImport {
    /// Parse GitHub raw URL.
    pub fn parse(url: &str) -> Option<Self> {
        let caps = RAW_URL.captures(url)?;
        if caps.get(0).is_none_or(|whole| whole.as_str() != url) {
            return None;
        }

        Some(Self {
            prefix: caps[1].to_string(),
            owner: caps[2].to_string(),
            repo: caps[3].to_string(),
            version: caps[4].to_string(),
            path: caps[5].to_string(),
            spec: caps.get(6).map(|spec| spec.as_str().to_string()),
        })
    }

    /// Render back into URL.
    pub fn show(&self) -> String {
        let url = format!(
            "{}/{}/{}/{}/{}",
            self.prefix, self.owner, self.repo, self.version, self.path
        );
        with_spec(url, self.spec.as_deref())
    }

    /// Key under which resolved refs are cached.
    ///
    /// Only the repository and spec matter, not the file or current ref.
    pub fn identity(&self) -> String {
        with_spec(
            format!("github:{}/{}", self.owner, self.repo),
            self.spec.as_deref(),
        )
    }

    /// Check if explicit spec applies to this repository.
    ///
    /// Either the bare repository name or "owner/repo" is accepted.
    pub fn matches(&self, spec: &BumpSpec) -> bool {
        spec.source_name == self.repo || spec.source_name == format!("{}/{}", self.owner, self.repo)
    }

    pub fn repo_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.repo)
    }
}

fn with_spec(url: String, spec: Option<&str>) -> String {
    match spec {
        Some(spec) => format!("{url}#{spec}"),
        None => url,
    }
}

/// Remote ref as listed by `git ls-remote`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Ref {
    /// Short name without "refs/heads/" or "refs/tags/".
    pub name: String,

    /// Commit to pin. Tags are assumed immutable, so their name is used.
    pub commit: String,
}

impl Ref {
    /// Parse line of `git ls-remote` output.
    pub fn parse(line: &str) -> Option<Self> {
        let (commit, name) = line.split_once('\t')?;
        let short = match name.strip_prefix("refs/") {
            Some(rest) => rest.split_once('/').map_or(rest, |(_, short)| short),
            None => name,
        };

        let commit = if name.starts_with("refs/tags/") {
            short.to_string()
        } else {
            commit.to_string()
        };

        Some(Self {
            name: short.to_string(),
            commit,
        })
    }
}

/// Resolve newest ref of repository matching `spec`.
///
/// Returns nothing if no ref matches.
///
/// # Errors
///
/// - Return [`DepsError::Cmd`](crate::deps::DepsError::Cmd) if
///   `git ls-remote` fails.
pub async fn resolve_latest(
    runner: &impl CommandRunner,
    repo_url: &str,
    spec: Option<&str>,
) -> Result<Option<String>> {
    let filter = spec.unwrap_or(DEFAULT_REF_FILTER);
    let wildcard = filter.contains('*');
    let cmd = if wildcard {
        cmdline(["git", "ls-remote", "--tags", repo_url, filter])
    } else {
        cmdline(["git", "ls-remote", "--tags", "--heads", repo_url, filter])
    };

    let output = runner.run_output(&cmd, false).await?;
    let refs = output
        .lines()
        .filter(|line| !line.ends_with("^{}"))
        .filter_map(Ref::parse)
        .collect::<Vec<_>>();
    debug!("{} refs received from {repo_url}", refs.len());

    if refs.is_empty() {
        warn!("no {filter:?} refs present in {repo_url}");
        return Ok(None);
    }

    if !wildcard {
        let mut matching = refs.iter().filter(|remote| remote.name == filter);
        let Some(first) = matching.next() else {
            warn!("refs received from {repo_url}, but none matched {filter:?}");
            return Ok(None);
        };
        if matching.next().is_some() {
            warn!("multiple matches for {filter:?} in {repo_url}");
        }
        return Ok(Some(first.commit.clone()));
    }

    if refs.len() == 1 {
        return Ok(Some(refs[0].commit.clone()));
    }

    let newest = refs
        .iter()
        .filter_map(|remote| Version::parse_lax(&remote.name).map(|version| (version, remote)))
        .max_by(|(a, _), (b, _)| a.cmp(b));

    match newest {
        Some((_, remote)) => Ok(Some(remote.commit.clone())),
        None => {
            warn!("no versions found in refs of {repo_url}");
            Ok(None)
        }
    }
}

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Current version discovery through `git describe`.
//!
//! CI systems love shallow clones, and a shallow clone often lacks the commit
//! that carries the latest version tag. Rather than always fetching the full
//! history, [`describe_with_auto_deepen`] deepens the clone in steps until a
//! version tag becomes reachable, and only fetches everything as a last
//! resort.

use crate::{
    cmd::{cmdline, CommandRunner},
    git::{GitError, Result},
    version::Version,
};

use std::path::Path;
use tracing::{debug, info, instrument};

/// Attempts at finding a tag in a shallow clone before giving up.
const DEEPEN_ATTEMPTS: usize = 4;

/// Result of `git describe`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DescribedVersion {
    /// Abbreviated commit being described.
    pub commit: String,

    /// Nearest version tag, if any.
    pub tag: Option<String>,

    /// Version carried by tag.
    pub version: Option<Version>,

    /// Commit is tagged itself.
    pub is_exact: bool,
}

/// Command line for `git describe` restricted to version tags.
pub fn describe_cmd(reference: &str) -> Vec<String> {
    let mut cmd = cmdline(["git", "describe", "--tags", "--first-parent"]);
    for digit in 0..=9 {
        cmd.push("--match".into());
        cmd.push(format!("v{digit}*"));
    }
    cmd.extend(cmdline(["--always", "--long", reference]));

    cmd
}

/// Parse output of [`describe_cmd`].
///
/// A bare commit means no tag could be found. Otherwise output takes the
/// form "<tag>-<depth>-g<commit>", where tag itself may contain hyphens.
///
/// # Errors
///
/// - Return [`GitError::UnexpectedDescribe`] if output has neither form.
pub fn parse_describe(output: &str) -> Result<DescribedVersion> {
    let parts = output.split('-').collect::<Vec<_>>();
    match parts.as_slice() {
        [commit] => Ok(DescribedVersion {
            commit: commit.to_string(),
            tag: None,
            version: None,
            is_exact: false,
        }),
        [_, _] => Err(GitError::UnexpectedDescribe(output.into())),
        [tag @ .., depth, commit] => {
            let tag = tag.join("-");
            Ok(DescribedVersion {
                commit: commit.strip_prefix('g').unwrap_or(*commit).to_string(),
                version: Version::from_tag(&tag).ok(),
                tag: Some(tag),
                is_exact: *depth == "0",
            })
        }
        [] => Err(GitError::UnexpectedDescribe(output.into())),
    }
}

/// Describe `reference`, deepening a shallow clone until a tag shows up.
///
/// Regular clones are described once. Shallow clones are described up to
/// five times, fetching 100 more commits of history between attempts, and
/// the full history before the final attempt.
///
/// # Errors
///
/// - Return [`GitError::Cmd`] if fetching more history fails.
/// - Return [`GitError::UnexpectedDescribe`] if output cannot be parsed.
#[instrument(skip(runner), level = "debug")]
pub async fn describe_with_auto_deepen(
    runner: &impl CommandRunner,
    reference: &str,
) -> Result<DescribedVersion> {
    let cmd = describe_cmd(reference);
    if !runner.exists(Path::new(".git/shallow")).await {
        return parse_describe(&runner.run_output(&cmd, true).await?);
    }

    info!("shallow clone detected, deepening history until a version tag is found");
    let mut tries = DEEPEN_ATTEMPTS;
    loop {
        let described = parse_describe(&runner.run_output(&cmd, true).await?)?;
        if described.tag.is_some() || tries == 0 {
            return Ok(described);
        }

        // INVARIANT: Fetch everything on the final attempt.
        let fetch = if tries == 1 {
            cmdline(["git", "fetch", "--unshallow", "--tags"])
        } else {
            cmdline(["git", "fetch", "--deepen", "100"])
        };
        debug!("no version tag reachable from {reference}, running {}", fetch.join(" "));
        runner.run(&fetch).await?;
        tries -= 1;
    }
}

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version numbers and version templates.
//!
//! A [`Version`] is an ordered sequence of non-negative integers with no fixed
//! arity, e.g., "1.2.3", or "4.0". Versions are published as Git tags of the
//! form "v1.2.3". Version templates restrict which components of a version may
//! change when computing the next version, see [`template`] for details.
//! Commit subjects can carry directives like "[minor-release]" that steer the
//! next version, see [`directive`].

pub mod directive;
pub mod template;

pub use directive::{parse_commit_lines, CommitDirective};
pub use template::{next_version, NextVersionOptions, TemplatePart, VersionTemplate};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
    sync::LazyLock,
};

static LAX_VERSION: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^([^0-9.]*)([0-9]+(?:\.[0-9]+)+)([^0-9.].*)?$")
        .expect("lax version pattern is valid")
});

/// Version number.
///
/// Ordering compares components index by index. When one side runs out of
/// components first it sorts lower no matter what the other side holds at
/// that index, so "1" < "1.2.3", and "1.0" > "1". Derived ordering over the
/// component vector gives exactly this.
#[derive(Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct Version {
    parts: Vec<u64>,
}

impl Version {
    /// Construct new version from its components.
    pub fn new(parts: impl Into<Vec<u64>>) -> Self {
        Self {
            parts: parts.into(),
        }
    }

    /// Components of version.
    pub fn parts(&self) -> &[u64] {
        self.parts.as_slice()
    }

    /// Parse version out of arbitrary text.
    ///
    /// Strips any non-numeric prefix and suffix, e.g., "release-1.2.3-rc1"
    /// yields "1.2.3". At least two components are required.
    pub fn parse_lax(input: impl AsRef<str>) -> Option<Self> {
        let captures = LAX_VERSION.captures(input.as_ref())?;
        captures.get(2)?.as_str().parse().ok()
    }

    /// Parse version out of a Git tag.
    ///
    /// Tries strict parsing first, and falls back to lax parsing.
    ///
    /// # Errors
    ///
    /// - Return [`VersionError::InvalidVersion`] if tag holds no version.
    pub fn from_tag(tag: impl AsRef<str>) -> Result<Self> {
        let tag = tag.as_ref();
        tag.parse()
            .ok()
            .or_else(|| Self::parse_lax(tag))
            .ok_or_else(|| VersionError::InvalidVersion(tag.into()))
    }

    /// Name of Git tag for version.
    pub fn tag(&self) -> String {
        format!("v{self}")
    }
}

impl FromStr for Version {
    type Err = VersionError;

    /// Strict parse of "v?N(.N)*".
    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let parts = split_components(data)
            .map(|part| parse_component(part).ok_or_else(|| VersionError::InvalidVersion(data.into())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { parts })
    }
}

impl Display for Version {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let parts = self
            .parts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        fmt.write_str(parts.join(".").as_str())
    }
}

/// Split version-like string into its dot separated components.
///
/// A single leading "v" is dropped.
pub(crate) fn split_components(data: &str) -> impl Iterator<Item = &str> {
    data.strip_prefix('v').unwrap_or(data).split('.')
}

/// Parse single decimal component.
///
/// Unlike [`str::parse`], signs and empty strings are rejected.
pub(crate) fn parse_component(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    part.parse().ok()
}

/// Position of a version component.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Deserialize, Serialize)]
#[serde(try_from = "RawIndex", into = "RawIndex")]
pub enum Index {
    /// First component.
    Major,

    /// Second component.
    Minor,

    /// Third component.
    Patch,

    /// Arbitrary component by position.
    Position(usize),
}

/// Highest component position an [`Index`] may name.
pub const MAX_INDEX: usize = 63;

impl Index {
    /// Construct index for component at `position`.
    ///
    /// # Errors
    ///
    /// - Return [`VersionError::InvalidIndex`] if `position` exceeds [`MAX_INDEX`].
    pub fn position(position: usize) -> Result<Self> {
        if position > MAX_INDEX {
            return Err(VersionError::InvalidIndex(position.to_string()));
        }

        Ok(Self::Position(position))
    }

    /// Resolve index to zero-based position in version.
    pub fn resolve(&self) -> usize {
        match self {
            Self::Major => 0,
            Self::Minor => 1,
            Self::Patch => 2,
            Self::Position(position) => *position,
        }
    }
}

impl FromStr for Index {
    type Err = VersionError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data {
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "patch" => Ok(Self::Patch),
            other => other
                .parse()
                .map_err(|_| VersionError::InvalidIndex(other.into()))
                .and_then(Self::position),
        }
    }
}

impl Display for Index {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Major => fmt.write_str("major"),
            Self::Minor => fmt.write_str("minor"),
            Self::Patch => fmt.write_str("patch"),
            Self::Position(position) => write!(fmt, "{position}"),
        }
    }
}

// Options arrive either as "minor", or as a bare number.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
enum RawIndex {
    Name(String),
    Position(usize),
}

impl TryFrom<RawIndex> for Index {
    type Error = VersionError;

    fn try_from(raw: RawIndex) -> Result<Self, Self::Error> {
        match raw {
            RawIndex::Name(name) => name.parse(),
            RawIndex::Position(position) => Self::position(position),
        }
    }
}

impl From<Index> for RawIndex {
    fn from(index: Index) -> Self {
        match index {
            Index::Position(position) => Self::Position(position),
            named => Self::Name(named.to_string()),
        }
    }
}

/// Version error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    /// Version string cannot be parsed.
    #[error("invalid version: {0:?}")]
    InvalidVersion(String),

    /// Index is neither a component name nor a position.
    #[error("invalid version index {0:?}: expected major, minor, patch, or a number")]
    InvalidIndex(String),

    /// Version template violates its layout rules.
    #[error("Invalid version template: {0}")]
    InvalidTemplate(String),

    /// Requested index cannot be bumped under version template.
    #[error("Requested index ({index}) is incompatible with version template: {template}")]
    IncompatibleIndex { index: Index, template: String },
}

/// Friendly result alias :3
type Result<T, E = VersionError> = std::result::Result<T, E>;

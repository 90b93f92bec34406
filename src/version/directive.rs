// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Commit message directives.
//!
//! Commit subjects may carry bracketed tags that steer version bumps:
//!
//! - "[major]", "[minor]", "[patch]" request the component to bump.
//! - "[release]" requests a release when bumps only happen on demand.
//! - "[minor-release]" and friends do both at once.

use crate::version::Index;

use std::sync::LazyLock;

static BRACKET_TAG: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\[\S+\]").expect("bracket tag pattern is valid"));

/// Directive gathered from commit subjects.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy)]
pub struct CommitDirective {
    /// Some commit asked for a release.
    pub release: bool,

    /// Most significant component any commit asked to bump.
    pub index: Option<Index>,
}

impl CommitDirective {
    fn from_tag(tag: &str) -> Self {
        let (label, suffixed) = match tag.strip_suffix("-release") {
            Some(label) => (label, true),
            None => (tag, false),
        };

        match label {
            "major" | "minor" | "patch" => Self {
                release: suffixed,
                index: label.parse().ok(),
            },
            _ => Self {
                release: label == "release",
                index: None,
            },
        }
    }

    fn merge(self, other: Self) -> Self {
        let index = match (self.index, other.index) {
            (Some(lhs), Some(rhs)) if rhs.resolve() < lhs.resolve() => Some(rhs),
            (Some(lhs), _) => Some(lhs),
            (None, rhs) => rhs,
        };

        Self {
            release: self.release || other.release,
            index,
        }
    }
}

/// Gather directive out of newline separated commit subjects.
pub fn parse_commit_lines(text: impl AsRef<str>) -> CommitDirective {
    BRACKET_TAG
        .find_iter(text.as_ref())
        .map(|found| {
            let tag = found.as_str();
            CommitDirective::from_tag(&tag[1..tag.len() - 1])
        })
        .fold(CommitDirective::default(), CommitDirective::merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case("", false, None; "empty")]
    #[test_case("abcd [release] commit", true, None; "release only")]
    #[test_case("abcd [patch] commit", false, Some(Index::Patch); "index only")]
    #[test_case("abcd [minor-release] commit", true, Some(Index::Minor); "index and release")]
    #[test_case("abcd [wip] commit", false, None; "unrelated tag")]
    #[test_case("abcd [major-release-release] commit", false, None; "suffix stripped once")]
    #[test]
    fn parse_single_line(input: &str, release: bool, index: Option<Index>) {
        pretty_assertions::assert_eq!(parse_commit_lines(input), CommitDirective { release, index });
    }

    #[test]
    fn parse_multiple_lines_picks_most_significant() {
        let result = parse_commit_lines(indoc! {"
            abcd [patch] commit
            abcd [release] commit
            abcd [major] commit
            abcd [minor] commit
        "});
        let expect = CommitDirective {
            release: true,
            index: Some(Index::Major),
        };
        assert_eq!(result, expect);
    }
}

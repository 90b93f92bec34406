// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version templates.
//!
//! A __version template__ describes the shape of acceptable versions. Each
//! component is either a literal number that the version must carry, a free
//! component marked "x" that may be bumped, or a pinned component marked "-"
//! that is left alone. Thus, "1.x.0" accepts "1.0.0", "1.1.0", "1.2.0", and so
//! on, but never "2.0.0" nor "1.1.1".
//!
//! Free components must be trailing, or form a single span followed only by
//! zeros. Hence "1.x.x" and "1.x.0" are valid, whereas "1.x.2" and "1.x.-"
//! are not.

use crate::version::{
    parse_component, split_components, Index, Result, Version, VersionError, MAX_INDEX,
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};
use tracing::info;

/// Single component of a version template.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TemplatePart {
    /// Fixed value, written as a number.
    Literal(u64),

    /// Component that may be bumped, written as "x".
    Free,

    /// Component kept as is, written as "-".
    Pinned,
}

impl Display for TemplatePart {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Literal(value) => write!(fmt, "{value}"),
            Self::Free => fmt.write_str("x"),
            Self::Pinned => fmt.write_str("-"),
        }
    }
}

/// Shape of acceptable versions.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct VersionTemplate {
    parts: Vec<TemplatePart>,
    first_free: usize,
    minimal_index: usize,
    last_free: Option<usize>,
}

impl VersionTemplate {
    /// Construct new version template.
    ///
    /// # Errors
    ///
    /// - Return [`VersionError::InvalidTemplate`] if a component other than
    ///   "x" or "0" follows the first free component.
    pub fn new(parts: impl Into<Vec<TemplatePart>>) -> Result<Self> {
        let parts = parts.into();
        let first_free = parts.iter().position(|part| *part == TemplatePart::Free);
        let last_free = parts.iter().rposition(|part| *part == TemplatePart::Free);

        let template = match (first_free, last_free) {
            (Some(first_free), Some(last_free)) => Self {
                first_free,
                minimal_index: last_free,
                last_free: Some(last_free),
                parts,
            },
            _ => Self {
                first_free: parts.len(),
                minimal_index: parts.len(),
                last_free: None,
                parts,
            },
        };

        // INVARIANT: Only free components or zeros may follow the first free component.
        let valid = template.parts[template.first_free..]
            .iter()
            .all(|part| matches!(part, TemplatePart::Free | TemplatePart::Literal(0)));
        if !valid {
            return Err(VersionError::InvalidTemplate(template.to_string()));
        }

        Ok(template)
    }

    /// Template where every one of `len` components is free.
    pub fn unrestricted(len: usize) -> Self {
        Self {
            parts: vec![TemplatePart::Free; len],
            first_free: 0,
            minimal_index: len.saturating_sub(1),
            last_free: len.checked_sub(1),
        }
    }

    /// Parse version template, or log why it was ignored.
    pub fn parse_lax(input: impl AsRef<str>) -> Option<Self> {
        match input.as_ref().parse() {
            Ok(template) => Some(template),
            Err(error) => {
                info!("ignoring fallback version template: {error}");
                None
            }
        }
    }

    /// Components of template.
    pub fn parts(&self) -> &[TemplatePart] {
        self.parts.as_slice()
    }

    /// Index bumped when nothing else is requested.
    pub fn minimal_index(&self) -> usize {
        self.minimal_index
    }

    /// Check if component at `index` may be bumped.
    pub fn is_free(&self, index: usize) -> bool {
        match self.last_free {
            // INVARIANT: A terminated span of free components only frees the span itself.
            Some(last_free) if last_free + 1 != self.parts.len() => {
                self.first_free <= index && index <= last_free
            }
            _ => index >= self.first_free,
        }
    }

    /// First version that fits template.
    pub fn initial_version(&self) -> Version {
        Version::new(
            self.parts
                .iter()
                .map(|part| match part {
                    TemplatePart::Literal(value) => *value,
                    TemplatePart::Free | TemplatePart::Pinned => 0,
                })
                .collect::<Vec<_>>(),
        )
    }

    /// Pad template with free components up to `len` components.
    pub fn extend_to(&self, len: usize) -> Self {
        if len <= self.parts.len() {
            return self.clone();
        }

        let mut parts = self.parts.clone();
        parts.resize(len, TemplatePart::Free);
        let first_free = self.first_free.min(self.parts.len());
        Self {
            first_free,
            minimal_index: len - 1,
            last_free: Some(len - 1),
            parts,
        }
    }
}

impl FromStr for VersionTemplate {
    type Err = VersionError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let parts = split_components(data)
            .map(|part| match part {
                "x" => Ok(TemplatePart::Free),
                "-" => Ok(TemplatePart::Pinned),
                number => parse_component(number)
                    .map(TemplatePart::Literal)
                    .ok_or_else(|| VersionError::InvalidTemplate(data.into())),
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(parts)
    }
}

impl Display for VersionTemplate {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let parts = self
            .parts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        fmt.write_str(parts.join(".").as_str())
    }
}

/// Extra knobs for [`next_version`].
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy)]
pub struct NextVersionOptions {
    /// Component that must be bumped.
    pub index: Option<Index>,

    /// Component to bump if the template allows it.
    pub default_bump: Option<Index>,
}

/// Compute version that follows `current` under `template`.
///
/// Without a current version, the initial version of the template is used.
/// Otherwise the chosen component is incremented, literal components of the
/// template are adopted, and every component after the first raised one is
/// reset to zero.
///
/// # Errors
///
/// - Return [`VersionError::IncompatibleIndex`] if an explicitly requested
///   index is not free in the template.
pub fn next_version(
    template: &VersionTemplate,
    current: Option<&Version>,
    opts: NextVersionOptions,
) -> Result<Version> {
    let Some(current) = current else {
        return Ok(template.initial_version());
    };

    let mut chosen = template.minimal_index();
    if let Some(index) = opts.index {
        let requested = index.resolve();
        if requested > MAX_INDEX {
            return Err(VersionError::InvalidIndex(index.to_string()));
        }
        if !template.is_free(requested) {
            return Err(VersionError::IncompatibleIndex {
                index,
                template: template.to_string(),
            });
        }
        chosen = requested;
    } else if let Some(default_bump) = opts.default_bump {
        let requested = default_bump.resolve();
        if requested <= MAX_INDEX && template.is_free(requested) {
            chosen = requested;
        }
    }

    let mut incremented = false;
    let parts = template
        .extend_to(chosen + 1)
        .parts()
        .iter()
        .enumerate()
        .map(|(index, part)| {
            let value = current.parts().get(index).copied().unwrap_or(0);
            let mut next = if incremented { 0 } else { value };

            if index < chosen {
                if let TemplatePart::Literal(literal) = part {
                    next = *literal;
                    if *literal > value {
                        incremented = true;
                    }
                }
            } else if index == chosen {
                next = if incremented { 0 } else { value + 1 };
                incremented = true;
            }

            next
        })
        .collect::<Vec<_>>();

    Ok(Version::new(parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn bump(template: &str, current: Option<&str>, opts: NextVersionOptions) -> anyhow::Result<String> {
        let template: VersionTemplate = template.parse()?;
        let current = current.map(str::parse::<Version>).transpose()?;
        Ok(next_version(&template, current.as_ref(), opts)?.to_string())
    }

    #[test_case("1.x.0", Some("1.1.2"), "1.2.0"; "bump free span")]
    #[test_case("1.x.0", Some("0.1"), "1.0.0"; "literal raises major")]
    #[test_case("x.x", Some("0.1"), "0.2"; "bump last free")]
    #[test_case("x.x.0", Some("0.1"), "0.2.0"; "trailing zero extends")]
    #[test_case("1.2", Some("1.2"), "1.2.1"; "fixed template grows")]
    #[test_case("1.2", Some("0.2"), "1.2.0"; "fixed template adopts literals")]
    #[test_case("1.x.x.x", Some("0.1.2.3"), "1.0.0.0"; "literal resets tail")]
    #[test_case("x.x", None, "0.0"; "initial version")]
    #[test_case("1.-.x", None, "1.0.0"; "initial pinned")]
    #[test]
    fn next_version_default_index(template: &str, current: Option<&str>, expect: &str) -> anyhow::Result<()> {
        pretty_assertions::assert_eq!(bump(template, current, NextVersionOptions::default())?, expect);
        Ok(())
    }

    #[test]
    fn next_version_explicit_index() -> anyhow::Result<()> {
        let opts = NextVersionOptions {
            index: Some(Index::Major),
            ..Default::default()
        };
        assert_eq!(bump("x.x", Some("0.2"), opts)?, "1.0");

        Ok(())
    }

    #[test]
    fn next_version_default_bump_only_when_free() -> anyhow::Result<()> {
        let opts = NextVersionOptions {
            default_bump: Some(Index::Minor),
            ..Default::default()
        };
        assert_eq!(bump("x.0", Some("0.2"), opts)?, "1.0");
        assert_eq!(bump("x.x", Some("0.2"), opts)?, "0.3");

        Ok(())
    }

    #[test_case("1.x", "0.2", Index::Major; "literal major")]
    #[test_case("1.x.0", "0.2", Index::Patch; "after terminated span")]
    #[test]
    fn next_version_incompatible_index(template: &str, current: &str, index: Index) {
        let opts = NextVersionOptions {
            index: Some(index),
            ..Default::default()
        };
        let error = bump(template, Some(current), opts).unwrap_err().to_string();
        assert!(error.contains("is incompatible with version template"), "{error}");
    }

    #[test_case(Index::Position(MAX_INDEX + 1); "just past limit")]
    #[test_case(Index::Position(usize::MAX); "largest position")]
    #[test]
    fn next_version_rejects_out_of_range_index(index: Index) {
        let template = VersionTemplate::unrestricted(3);
        let current = Version::new([1, 2, 3]);
        let opts = NextVersionOptions {
            index: Some(index),
            ..Default::default()
        };
        pretty_assertions::assert_eq!(
            next_version(&template, Some(&current), opts),
            Err(VersionError::InvalidIndex(index.to_string()))
        );

        let opts = NextVersionOptions {
            default_bump: Some(index),
            ..Default::default()
        };
        pretty_assertions::assert_eq!(next_version(&template, Some(&current), opts), Ok(Version::new([1, 2, 4])));
    }

    #[test_case("1.x.-"; "pinned after free")]
    #[test_case("1.x.2"; "literal after free")]
    #[test_case("1.y"; "bad marker")]
    #[test]
    fn template_parse_rejects(input: &str) {
        let error = input.parse::<VersionTemplate>().unwrap_err();
        assert!(error.to_string().contains("Invalid version template"));
    }

    #[test]
    fn template_free_components() -> anyhow::Result<()> {
        let template: VersionTemplate = "1".parse()?;
        assert!(!template.is_free(0));
        assert!(template.is_free(1));
        assert_eq!(template.minimal_index(), 1);

        let template: VersionTemplate = "1.x.0".parse()?;
        assert!(!template.is_free(0));
        assert!(template.is_free(1));
        assert!(!template.is_free(2));
        assert!(!template.is_free(3));

        let template: VersionTemplate = "v2.x.x".parse()?;
        assert!(template.is_free(2));
        assert!(template.is_free(5));
        assert_eq!(template.to_string(), "2.x.x");

        Ok(())
    }

    #[test]
    fn template_helpers() -> anyhow::Result<()> {
        let template = VersionTemplate::unrestricted(3);
        assert_eq!(template.to_string(), "x.x.x");
        assert_eq!(template.minimal_index(), 2);
        assert_eq!(template.initial_version().to_string(), "0.0.0");

        let template: VersionTemplate = "1.2".parse()?;
        assert_eq!(template.extend_to(4).to_string(), "1.2.x.x");
        assert_eq!(template.extend_to(1).to_string(), "1.2");

        assert!(VersionTemplate::parse_lax("main").is_none());
        assert_eq!(VersionTemplate::parse_lax("v1.x").map(|t| t.to_string()), Some("1.x".into()));

        Ok(())
    }
}

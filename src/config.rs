// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of "chored.toml", the optional project configuration
//! file, to simplify the process of serialization and deserialization.
//!
//! # General Layout
//!
//! ```toml
//! task_root = "choredefs"
//!
//! [[generated]]
//! path = ".github/workflows/ci.yml"
//! format = "text"
//! contents = "..."
//!
//! [deps]
//! roots = ["."]
//! extensions = ["toml"]
//!
//! [github]
//! token_env = "GITHUB_TOKEN"
//! ```

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument};

/// Name of project configuration file.
pub const CONFIG_FILE_NAME: &str = "chored.toml";

/// Name of default task root directory.
pub const DEFAULT_TASK_ROOT: &str = "choredefs";

/// Project configuration.
#[derive(Default, Debug, PartialEq, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding task files, relative to project root.
    pub task_root: Option<PathBuf>,

    /// Files produced by the render chore.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generated: Vec<GeneratedEntry>,

    /// Settings of dependency URL bumps.
    #[serde(default)]
    pub deps: DepsSettings,

    /// Settings of GitHub integration.
    #[serde(default)]
    pub github: GithubSettings,
}

impl Config {
    /// Load configuration from file, or use defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file is malformed.
    #[instrument(skip(path), level = "debug")]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            debug!("no configuration at {:?}, using defaults", path.display());
            return Ok(Self::default());
        }

        debug!("load configuration from {:?}", path.display());
        let data = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        data.parse()
    }

    /// Resolve task root against project root.
    pub fn task_root_in(&self, project_root: impl AsRef<Path>) -> PathBuf {
        let task_root = self
            .task_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TASK_ROOT));
        project_root.as_ref().join(task_root)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: Config = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        if let Some(task_root) = &config.task_root {
            config.task_root = Some(expand_path(task_root)?);
        }
        for entry in &mut config.generated {
            entry.path = expand_path(&entry.path)?;
        }
        config.deps.roots = config
            .deps
            .roots
            .iter()
            .map(|root| expand_path(root))
            .collect::<Result<Vec<_>>>()?;

        Ok(config)
    }
}

impl Display for Config {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())?.into_owned(),
    ))
}

/// Layout of generated file entry.
#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratedEntry {
    /// Destination relative to project root.
    pub path: PathBuf,

    /// Serialization format of contents.
    #[serde(default)]
    pub format: GeneratedFormat,

    /// Verbatim contents of text files.
    pub contents: Option<String>,

    /// Structured contents of JSON or TOML files.
    pub value: Option<toml::Value>,

    /// Mark file as executable.
    #[serde(default)]
    pub executable: bool,

    /// Keep file read-only to discourage manual edits.
    #[serde(default = "default_read_only")]
    pub read_only: bool,
}

fn default_read_only() -> bool {
    true
}

/// Serialization format of generated file.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratedFormat {
    Json,
    Toml,

    /// Text with a generated-file header comment.
    #[default]
    Text,

    /// Text written verbatim.
    Raw,
}

/// Layout of dependency bump settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DepsSettings {
    /// Directories to walk for files with remote URLs.
    #[serde(default = "default_roots")]
    pub roots: Vec<PathBuf>,

    /// File extensions to rewrite, without leading dot.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for DepsSettings {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            extensions: default_extensions(),
        }
    }
}

fn default_roots() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}

fn default_extensions() -> Vec<String> {
    vec!["toml".into()]
}

/// Layout of GitHub settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GithubSettings {
    /// Environment variable holding API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
        }
    }
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("TASKS", "/home/blah/tasks")])]
    fn deserialize_config() -> anyhow::Result<()> {
        let result: Config = r##"
            task_root = "$TASKS"

            [[generated]]
            path = "bin/hello"
            contents = "#!/bin/sh\necho hello\n"
            executable = true

            [[generated]]
            path = "renovate.json"
            format = "json"
            value = { extends = ["config:base"] }

            [deps]
            extensions = ["toml", "yml"]
        "##
        .parse()?;

        assert_eq!(result.task_root, Some(PathBuf::from("/home/blah/tasks")));
        assert_eq!(result.generated.len(), 2);
        assert_eq!(result.generated[0].format, GeneratedFormat::Text);
        assert!(result.generated[0].executable);
        assert!(result.generated[0].read_only);
        assert_eq!(result.generated[1].format, GeneratedFormat::Json);
        assert_eq!(result.deps.roots, vec![PathBuf::from(".")]);
        assert_eq!(result.deps.extensions, vec!["toml".to_string(), "yml".into()]);
        assert_eq!(result.github.token_env, "GITHUB_TOKEN");

        Ok(())
    }

    #[test]
    fn deserialize_config_rejects_unknown_fields() {
        assert!("task_rot = \"x\"".parse::<Config>().is_err());
    }

    #[test]
    fn serialize_config_round_trip() -> anyhow::Result<()> {
        let config = Config {
            task_root: Some("tasks".into()),
            ..Default::default()
        };
        let result = config.to_string();
        assert!(result.starts_with("task_root = \"tasks\""));
        assert_eq!(result.parse::<Config>()?, config);

        Ok(())
    }

    #[test]
    fn task_root_defaults_to_choredefs() {
        let config = Config::default();
        assert_eq!(
            config.task_root_in("/project"),
            PathBuf::from("/project/choredefs")
        );
    }
}

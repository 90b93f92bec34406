// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where the project root, its configuration file, and the user's
//! fallback configuration file live.

use crate::{config::CONFIG_FILE_NAME, git::Workspace};

use std::path::{Path, PathBuf};
use tracing::debug;

/// Determine project root containing `cwd`.
///
/// The project root is the top-level directory of the Git working tree that
/// contains `cwd`. Outside of any repository, `cwd` itself is the project
/// root.
pub fn project_root(cwd: impl AsRef<Path>) -> PathBuf {
    match Workspace::discover(cwd.as_ref()).and_then(|workspace| workspace.root()) {
        Ok(root) => root,
        Err(error) => {
            debug!("using {:?} as project root: {error}", cwd.as_ref().display());
            cwd.as_ref().to_path_buf()
        }
    }
}

/// Determine path to configuration file of project.
///
/// Falls back to the user configuration file when the project has none.
///
/// # Errors
///
/// - Return [`NoWayHome`] if the project has no configuration file, and the
///   user configuration directory cannot be determined.
pub fn config_file(project_root: impl AsRef<Path>) -> Result<PathBuf> {
    let project_config = project_root.as_ref().join(CONFIG_FILE_NAME);
    if project_config.exists() {
        return Ok(project_config);
    }

    user_config_file()
}

/// Determine default absolute path to user configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/chored/chored.toml`. Does
/// not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn user_config_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("chored").join(CONFIG_FILE_NAME))
        .ok_or(NoWayHome)
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

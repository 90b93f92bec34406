// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Generated file rendering.
//!
//! Write the files listed under `[[generated]]` in "chored.toml". Every
//! generated file is marked as such, both through a header inside the file
//! and through ".gitattributes", which doubles as the record of what was
//! generated last time. Files generated before but no longer listed are
//! removed.

use crate::config::{GeneratedEntry, GeneratedFormat};

use serde_json::{Map, Value};
use std::{
    collections::HashSet,
    path::{Component, Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Marker placed in every generated file.
pub const GENERATED_MARKER: &str = "NOTE: This file is generated by chored";

/// Git attribute flagging generated files.
pub const GENERATED_ATTR: &str = "chored-generated";

/// Path of attributes file, relative to project root.
pub const GITATTRIBUTES: &str = ".gitattributes";

/// File ready to be written.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RenderedFile {
    /// Path relative to project root.
    pub path: String,

    pub contents: String,

    /// Unix permission bits.
    pub mode: u32,
}

impl RenderedFile {
    /// Render generated file entry.
    ///
    /// # Errors
    ///
    /// - Return [`RenderError::MissingContents`] if entry lacks what its
    ///   format needs.
    /// - Return [`RenderError::Serialize`] if structured contents cannot be
    ///   serialized.
    pub fn from_entry(entry: &GeneratedEntry) -> Result<Self> {
        let path = entry.path.to_string_lossy().replace('\\', "/");
        let missing = || RenderError::MissingContents { path: path.clone() };

        let contents = match entry.format {
            GeneratedFormat::Text => {
                let text = entry.contents.as_deref().ok_or_else(missing)?;
                with_header(text, comment_style(&path))
            }
            GeneratedFormat::Raw => entry.contents.clone().ok_or_else(missing)?,
            GeneratedFormat::Toml => {
                let value = entry.value.as_ref().ok_or_else(missing)?;
                let text = toml::ser::to_string_pretty(value)
                    .map_err(|error| RenderError::Serialize(error.to_string()))?;
                with_header(&text, ("#", None))
            }
            GeneratedFormat::Json => {
                let value = entry.value.as_ref().ok_or_else(missing)?;
                let value = serde_json::to_value(value)
                    .map_err(|error| RenderError::Serialize(error.to_string()))?;
                json_with_marker(value)?
            }
        };

        Ok(Self {
            path,
            contents,
            mode: write_mode(entry.read_only, entry.executable),
        })
    }
}

// INVARIANT: Header goes right after shebang line, if any.
fn with_header(text: &str, (prefix, suffix): (&str, Option<&str>)) -> String {
    let header = match suffix {
        Some(suffix) => format!("{prefix} {GENERATED_MARKER} {suffix}\n"),
        None => format!("{prefix} {GENERATED_MARKER}\n"),
    };

    match text.split_once('\n') {
        Some((shebang, rest)) if shebang.starts_with("#!") => {
            format!("{shebang}\n{header}\n{rest}")
        }
        None if text.starts_with("#!") => format!("{text}\n{header}"),
        _ => format!("{header}\n{text}"),
    }
}

fn comment_style(path: &str) -> (&'static str, Option<&'static str>) {
    match Path::new(path).extension().and_then(|ext| ext.to_str()) {
        Some("html" | "htm" | "md" | "xml") => ("<!--", Some("-->")),
        Some("rs" | "js" | "ts" | "go" | "c" | "h" | "cpp" | "java" | "kt" | "swift") => ("//", None),
        _ => ("#", None),
    }
}

fn json_with_marker(value: Value) -> Result<String> {
    let value = match value {
        Value::Object(map) => {
            let mut marked = Map::new();
            marked.insert("//".into(), Value::String(GENERATED_MARKER.into()));
            marked.extend(map);
            Value::Object(marked)
        }
        other => other,
    };

    let mut text =
        serde_json::to_string_pretty(&value).map_err(|error| RenderError::Serialize(error.to_string()))?;
    text.push('\n');
    Ok(text)
}

/// Compute permission bits of generated file.
pub fn write_mode(read_only: bool, executable: bool) -> u32 {
    let mut mode = 0o400;
    if !read_only {
        mode |= 0o200;
    }
    if executable {
        mode |= 0o100;
    }

    mode
}

/// Render attributes file covering `paths`.
pub fn gitattributes(paths: &[String]) -> RenderedFile {
    let lines = paths
        .iter()
        .map(|path| format!("{path} linguist-generated {GENERATED_ATTR}"))
        .collect::<Vec<_>>()
        .join("\n");

    RenderedFile {
        path: GITATTRIBUTES.into(),
        contents: with_header(&lines, ("#", None)),
        mode: write_mode(true, false),
    }
}

/// Extract generated paths recorded in attributes file.
pub fn generated_from_gitattributes(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| {
            let fields = line.split_whitespace().collect::<Vec<_>>();
            match fields.iter().rposition(|field| *field == GENERATED_ATTR) {
                Some(position) if position > 0 => Some(fields[0].to_string()),
                _ => None,
            }
        })
        .collect()
}

/// Outcome of rendering.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct RenderSummary {
    /// Files written, including the attributes file.
    pub written: Vec<String>,

    /// Stale files removed.
    pub removed: Vec<String>,
}

/// Write generated files into project root.
///
/// The attributes file is always written first, so a failure midway still
/// leaves a record of every generated file.
///
/// # Errors
///
/// - Return [`RenderError::DuplicatePath`] if a path is listed twice.
/// - Return [`RenderError::Io`] if files cannot be written or removed.
#[instrument(skip(project_root, entries), level = "debug")]
pub async fn render(project_root: impl AsRef<Path>, entries: &[GeneratedEntry]) -> Result<RenderSummary> {
    let root = project_root.as_ref();
    let files = entries
        .iter()
        .map(RenderedFile::from_entry)
        .collect::<Result<Vec<_>>>()?;

    let mut all_paths = files.iter().map(|file| file.path.clone()).collect::<Vec<_>>();
    all_paths.push(GITATTRIBUTES.into());
    all_paths.sort();

    let mut unique = HashSet::new();
    if let Some(duplicate) = all_paths.iter().find(|path| !unique.insert(*path)) {
        return Err(RenderError::DuplicatePath(duplicate.clone()));
    }

    let attributes = gitattributes(&all_paths);
    let previous = match tokio::fs::read_to_string(root.join(GITATTRIBUTES)).await {
        Ok(contents) => generated_from_gitattributes(&contents),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            warn!("no {GITATTRIBUTES} found, assuming first generation run");
            Vec::new()
        }
        Err(source) => {
            return Err(RenderError::Io {
                path: root.join(GITATTRIBUTES),
                source,
            })
        }
    };

    let mut summary = RenderSummary::default();
    for stale in previous.iter().filter(|path| !all_paths.contains(path)) {
        if !is_inside_root(stale) {
            warn!("refusing to remove {stale}: not a path inside project root");
            continue;
        }

        let path = root.join(stale);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("removed stale generated file {stale}");
                summary.removed.push(stale.clone());
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!("stale generated file {stale} already gone");
            }
            Err(source) => return Err(RenderError::Io { path, source }),
        }
    }

    for file in std::iter::once(&attributes).chain(files.iter()) {
        write_file(root, file).await?;
        summary.written.push(file.path.clone());
    }

    info!("generated {} files", summary.written.len());
    Ok(summary)
}

// INVARIANT: Only plain relative paths stay inside project root once joined.
fn is_inside_root(path: &str) -> bool {
    Path::new(path)
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

async fn write_file(root: &Path, file: &RenderedFile) -> Result<()> {
    let path: PathBuf = root.join(&file.path);
    let io_error = |source| RenderError::Io {
        path: path.clone(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }

    // INVARIANT: Existing file may be read-only, so replace it instead of
    // writing through it.
    match tokio::fs::remove_file(&path).await {
        Err(error) if error.kind() != std::io::ErrorKind::NotFound => return Err(io_error(error)),
        _ => {}
    }

    debug!("write {}", file.path);
    tokio::fs::write(&path, &file.contents).await.map_err(io_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(file.mode))
            .await
            .map_err(io_error)?;
    }

    Ok(())
}

/// Render error types.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Path is generated more than once.
    #[error("duplicate generated path {0:?}")]
    DuplicatePath(String),

    /// Entry lacks `contents` or `value` required by its format.
    #[error("generated file {path:?} has no contents for its format")]
    MissingContents { path: String },

    /// Structured contents cannot be serialized.
    #[error("failed to serialize generated file: {0}")]
    Serialize(String),

    /// File cannot be written or removed.
    #[error("failed to write {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Friendly result alias :3
type Result<T, E = RenderError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn text_entry(path: &str, contents: &str) -> GeneratedEntry {
        GeneratedEntry {
            path: path.into(),
            format: GeneratedFormat::Text,
            contents: Some(contents.into()),
            value: None,
            executable: false,
            read_only: true,
        }
    }

    #[test_case("hello\n", "# NOTE: This file is generated by chored\n\nhello\n"; "plain text")]
    #[test_case("#!/bin/sh\necho hi\n", "#!/bin/sh\n# NOTE: This file is generated by chored\n\necho hi\n"; "after shebang")]
    #[test]
    fn text_header(contents: &str, expect: &str) -> anyhow::Result<()> {
        let result = RenderedFile::from_entry(&text_entry("script", contents))?;
        pretty_assertions::assert_eq!(result.contents, expect);
        Ok(())
    }

    #[test]
    fn markdown_header_uses_html_comment() -> anyhow::Result<()> {
        let result = RenderedFile::from_entry(&text_entry("README.md", "# Title\n"))?;
        assert_eq!(
            result.contents,
            "<!-- NOTE: This file is generated by chored -->\n\n# Title\n"
        );
        Ok(())
    }

    #[test]
    fn json_marker_key() -> anyhow::Result<()> {
        let entry = GeneratedEntry {
            path: "renovate.json".into(),
            format: GeneratedFormat::Json,
            contents: None,
            value: Some(toml::Value::Table(toml::from_str(r#"extends = ["config:base"]"#)?)),
            executable: false,
            read_only: true,
        };

        let result = RenderedFile::from_entry(&entry)?;
        assert_eq!(
            result.contents,
            indoc! {r#"
                {
                  "//": "NOTE: This file is generated by chored",
                  "extends": [
                    "config:base"
                  ]
                }
            "#}
        );
        Ok(())
    }

    #[test]
    fn missing_contents_rejected() {
        let mut entry = text_entry("x", "");
        entry.contents = None;
        assert!(matches!(
            RenderedFile::from_entry(&entry),
            Err(RenderError::MissingContents { .. })
        ));
    }

    #[test_case(true, false, 0o400; "read only")]
    #[test_case(false, false, 0o600; "writable")]
    #[test_case(true, true, 0o500; "executable")]
    #[test]
    fn write_mode_bits(read_only: bool, executable: bool, expect: u32) {
        pretty_assertions::assert_eq!(write_mode(read_only, executable), expect);
    }

    #[test]
    fn parse_gitattributes() {
        let result = generated_from_gitattributes(indoc! {"
            # NOTE: This file is generated by chored

            .gitattributes linguist-generated chored-generated
            bin/hello linguist-generated chored-generated
            *.png binary
            chored-generated
        "});
        assert_eq!(result, vec![".gitattributes".to_string(), "bin/hello".into()]);
    }

    #[tokio::test]
    async fn render_writes_and_prunes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let first = vec![text_entry("bin/hello", "#!/bin/sh\necho hello\n"), text_entry("old.txt", "old")];
        render(dir.path(), &first).await?;
        assert!(dir.path().join("old.txt").exists());

        let attributes = std::fs::read_to_string(dir.path().join(GITATTRIBUTES))?;
        assert_eq!(
            generated_from_gitattributes(&attributes),
            vec![".gitattributes".to_string(), "bin/hello".into(), "old.txt".into()]
        );

        let second = vec![text_entry("bin/hello", "#!/bin/sh\necho hi\n")];
        let result = render(dir.path(), &second).await?;
        assert_eq!(result.removed, vec!["old.txt".to_string()]);
        assert_eq!(result.written, vec![".gitattributes".to_string(), "bin/hello".into()]);
        assert!(!dir.path().join("old.txt").exists());
        assert!(std::fs::read_to_string(dir.path().join("bin/hello"))?.ends_with("echo hi\n"));

        Ok(())
    }

    #[tokio::test]
    async fn render_keeps_stale_paths_outside_root() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path().join("project");
        std::fs::create_dir(&root)?;
        let outside = dir.path().join("outside.txt");
        std::fs::write(&outside, "keep me")?;
        std::fs::write(
            root.join(GITATTRIBUTES),
            format!(
                "../outside.txt linguist-generated chored-generated\n\
                 {} linguist-generated chored-generated\n\
                 old.txt linguist-generated chored-generated\n",
                outside.display()
            ),
        )?;
        std::fs::write(root.join("old.txt"), "old")?;

        let result = render(&root, &[text_entry("new.txt", "new")]).await?;
        assert_eq!(result.removed, vec!["old.txt".to_string()]);
        assert_eq!(std::fs::read_to_string(&outside)?, "keep me");
        assert!(!root.join("old.txt").exists());

        Ok(())
    }

    #[test_case("bin/hello", true; "nested")]
    #[test_case("./old.txt", true; "current dir")]
    #[test_case("../outside.txt", false; "parent dir")]
    #[test_case("bin/../../outside.txt", false; "parent dir midway")]
    #[test_case("/etc/passwd", false; "absolute")]
    #[test]
    fn stale_path_inside_root(path: &str, expect: bool) {
        pretty_assertions::assert_eq!(is_inside_root(path), expect);
    }

    #[tokio::test]
    async fn render_rejects_duplicates() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let entries = vec![text_entry("a", "1"), text_entry("a", "2")];
        let result = render(dir.path(), &entries).await;
        assert!(matches!(result, Err(RenderError::DuplicatePath(path)) if path == "a"));

        let entries = vec![text_entry(GITATTRIBUTES, "custom")];
        assert!(render(dir.path(), &entries).await.is_err());

        Ok(())
    }
}

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use chored::{
    bump::{Action, BumpOptions, Context, Engine},
    chore::{options::parse_args, ChoreError, Resolver},
    cmd::ProcessRunner,
    config::Config,
    git::Workspace,
    version::Version,
};

use anyhow::Result;
use git2::{IndexEntry, IndexTime, Oid, Repository, RepositoryInitOptions};
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::TempDir;

pub(crate) struct RepoFixture {
    repo: Repository,
}

impl RepoFixture {
    pub(crate) fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(path.as_ref(), &opts)?;

        // INVARIANT: Always provide valid name and email.
        //   - Git will complain if this is not set in CI/CD environments.
        let mut config = repo.config()?;
        config.set_str("user.name", "John Doe")?;
        config.set_str("user.email", "john@doe.com")?;

        Ok(Self { repo })
    }

    pub(crate) fn stage_and_commit(
        &self,
        filename: impl AsRef<Path>,
        contents: impl AsRef<str>,
        message: impl AsRef<str>,
    ) -> Result<Oid> {
        let entry = IndexEntry {
            ctime: IndexTime::new(0, 0),
            mtime: IndexTime::new(0, 0),
            dev: 0,
            ino: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            file_size: contents.as_ref().len() as u32,
            id: self.repo.blob(contents.as_ref().as_bytes())?,
            flags: 0,
            flags_extended: 0,
            path: filename
                .as_ref()
                .as_os_str()
                .to_string_lossy()
                .into_owned()
                .into_bytes(),
        };

        // INVARIANT: Always use new tree produced by index after staging new entry.
        let mut index = self.repo.index()?;
        index.add_frombuffer(&entry, contents.as_ref().as_bytes())?;
        index.write()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;

        // INVARIANT: Always determine latest parent commits to append to.
        let signature = self.repo.signature()?;
        let mut parents = Vec::new();
        if let Some(parent) = self.repo.head().ok().and_then(|head| head.target()) {
            parents.push(self.repo.find_commit(parent)?);
        }
        let parents = parents.iter().collect::<Vec<_>>();

        // INVARIANT: Commit to HEAD by appending to obtained parent commits.
        let oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message.as_ref(),
            &tree,
            &parents,
        )?;

        // INVARIANT: Keep working tree in sync with index, so it stays clean.
        let workdir = self.repo.workdir().map(Path::to_path_buf);
        if let Some(workdir) = workdir {
            std::fs::write(workdir.join(filename.as_ref()), contents.as_ref())?;
        }

        Ok(oid)
    }

    pub(crate) fn tag(&self, name: &str) -> Result<()> {
        let head = self.repo.head()?.peel(git2::ObjectType::Commit)?;
        self.repo.tag_lightweight(name, &head, false)?;
        Ok(())
    }

    pub(crate) fn has_tag(&self, name: &str) -> bool {
        self.repo
            .find_reference(&format!("refs/tags/{name}"))
            .is_ok()
    }
}

fn engine(dir: &TempDir) -> Engine {
    Engine::new(
        ProcessRunner::new().with_cwd(dir.path()),
        Context::default(),
    )
}

fn bump_options(template: &str, action: Action) -> Result<BumpOptions> {
    Ok(BumpOptions {
        template: template.parse()?,
        action,
        ..BumpOptions::default()
    })
}

#[tokio::test]
async fn bump_tags_next_version() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let fixture = RepoFixture::new(dir.path())?;
    fixture.stage_and_commit("a.txt", "first", "initial commit")?;
    fixture.tag("v1.2.3")?;
    fixture.stage_and_commit("a.txt", "second", "fix something")?;

    let engine = engine(&dir);
    let current = engine.current_version().await?;
    assert_eq!(current.version, Some(Version::new([1, 2, 3])));
    assert!(!current.is_exact);

    let result = engine.bump(&bump_options("x.x.x", Action::Tag)?).await?;
    assert_eq!(result, Some(Version::new([1, 2, 4])));
    assert!(fixture.has_tag("v1.2.4"));

    Ok(())
}

#[tokio::test]
async fn bump_skips_tagged_head() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let fixture = RepoFixture::new(dir.path())?;
    fixture.stage_and_commit("a.txt", "first", "initial commit")?;
    fixture.tag("v0.1")?;

    let result = engine(&dir).bump(&bump_options("x.x", Action::Tag)?).await?;
    assert_eq!(result, None);

    Ok(())
}

#[tokio::test]
async fn bump_without_tags_prints_initial_version() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let fixture = RepoFixture::new(dir.path())?;
    fixture.stage_and_commit("a.txt", "first", "initial commit")?;

    let result = engine(&dir)
        .bump(&bump_options("1.x.x", Action::Print)?)
        .await?;
    assert_eq!(result, Some(Version::new([1, 0, 0])));
    assert!(!fixture.has_tag("v1.0.0"));

    Ok(())
}

#[tokio::test]
async fn workspace_reports_branch_and_changes() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let fixture = RepoFixture::new(dir.path())?;
    fixture.stage_and_commit("a.txt", "first", "initial commit")?;

    let workspace = Workspace::discover(dir.path())?;
    assert_eq!(workspace.branch_name()?.as_deref(), Some("main"));
    assert!(workspace.uncommitted_changes()?.is_empty());

    std::fs::write(dir.path().join("b.txt"), "untracked")?;
    assert_eq!(workspace.uncommitted_changes()?, vec!["b.txt"]);

    Ok(())
}

fn project(files: &[(&str, &str)]) -> Result<TempDir> {
    let dir = tempfile::tempdir()?;
    std::fs::create_dir(dir.path().join("choredefs"))?;
    for (name, contents) in files {
        std::fs::write(dir.path().join("choredefs").join(name), contents)?;
    }

    Ok(dir)
}

fn args(line: &str) -> Vec<String> {
    line.split_whitespace().map(ToString::to_string).collect()
}

#[tokio::test]
async fn run_command_chore_with_options() -> Result<()> {
    let dir = project(&[(
        "files.toml",
        indoc! {r#"
            [touch]
            help = "create a file"
            run = ["touch", "{name}"]
        "#},
    )])?;
    let resolver = Resolver::new(dir.path(), Config::default());

    let invocation = parse_args(args("files touch --name created.txt"))?;
    resolver.run(&invocation.path, invocation.options).await?;
    assert!(dir.path().join("created.txt").exists());

    Ok(())
}

#[tokio::test]
async fn run_composite_and_alias_chores() -> Result<()> {
    let dir = project(&[(
        "index.toml",
        indoc! {r#"
            [one]
            run = ["touch", "one.txt"]

            [two]
            run = ["touch", "two.txt"]

            [both]
            all = ["one", "two"]

            [release]
            chore = "both"
        "#},
    )])?;
    let resolver = Resolver::new(dir.path(), Config::default());

    resolver.run(&args("release"), Default::default()).await?;
    assert!(dir.path().join("one.txt").exists());
    assert!(dir.path().join("two.txt").exists());

    Ok(())
}

#[tokio::test]
async fn listing_groups_sources() -> Result<()> {
    let dir = project(&[
        (
            "rust.toml",
            indoc! {r#"
                [default]
                run = ["true"]

                [lint]
                run = ["true"]
            "#},
        ),
        ("index.toml", "[test]\nrun = [\"true\"]\n"),
    ])?;
    let resolver = Resolver::new(dir.path(), Config::default());

    let listing = resolver.list_entrypoints(None).await?.to_string();
    assert!(listing.contains(" - rust\n"));
    assert!(listing.contains(" - rust lint"));
    assert!(listing.contains(" - test"));
    assert!(listing.contains(" - deps bump"));

    Ok(())
}

#[tokio::test]
async fn help_describes_chore() -> Result<()> {
    let dir = project(&[(
        "files.toml",
        "[touch]\nhelp = \"create a file\"\nrun = [\"touch\", \"x\"]\n",
    )])?;
    let resolver = Resolver::new(dir.path(), Config::default());

    let help = resolver.help(&args("files touch")).await?;
    assert!(help.contains("chore:  files touch"));
    assert!(help.ends_with("create a file"));

    let usage = resolver.help(&[]).await?;
    assert!(usage.starts_with("Usage: chored"));

    Ok(())
}

#[tokio::test]
async fn unknown_chore_lists_searched_sources() -> Result<()> {
    let dir = project(&[("index.toml", "")])?;
    let resolver = Resolver::new(dir.path(), Config::default());

    let result = resolver.run(&args("nope"), Default::default()).await;
    match result {
        Err(ChoreError::NotFound { path, searched }) => {
            assert_eq!(path, vec!["nope"]);
            assert_eq!(searched.len(), 2);
            assert_eq!(searched.last().map(String::as_str), Some("builtin"));
        }
        other => anyhow::bail!("expected not found error, got {other:?}"),
    }

    Ok(())
}

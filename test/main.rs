// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

mod integration;

use anyhow::Result;
use git2::{Repository, RepositoryInitOptions};
use indoc::indoc;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub(crate) const README: &str = indoc! {r#"
    # new-project-name

    ### Initial build (new repo)
    1. Run `wptask init`.
    2. Commit the results.

    ### Initial build (existing repo)
    1. Run `wptask configure`.
    2. Run `wptask install`.
"#};

pub(crate) const COMPOSER_JSON: &str = indoc! {r#"
    {
      "name": "thinkshout/bedrock",
      "type": "project"
    }
"#};

pub(crate) const ENV_EXAMPLE: &str = indoc! {r#"
    PROJECT="SITE"
    URL=http://example.com
    HOST_REPO=ssh://codeserver.dev.example@codeserver.example:2222/~/repository.git

    DB_NAME=
    DB_USER=root
    DB_PASSWORD=root
    DB_HOST=localhost

    AUTH_KEY='generateme'
    NONCE_SALT='generateme'
"#};

/// Starter site checked out into a repository with a real work tree.
pub(crate) struct SiteFixture {
    // INVARIANT: Keep temp directory alive for as long as the fixture.
    _dir: TempDir,
    root: PathBuf,
    repo: Repository,
}

impl SiteFixture {
    /// Create starter site in a repository named `name` on `branch`.
    pub(crate) fn new(name: &str, branch: &str) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let root = dir.path().join(name);

        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(branch);
        let repo = Repository::init_opts(&root, &opts)?;

        // INVARIANT: Always provide valid name and email.
        //   - Git will complain if this is not set in CI/CD environments.
        let mut config = repo.config()?;
        config.set_str("user.name", "John Doe")?;
        config.set_str("user.email", "john@doe.com")?;

        let fixture = Self {
            _dir: dir,
            root,
            repo,
        };
        fixture.write("README.md", README)?;
        fixture.write("composer.json", COMPOSER_JSON)?;
        fixture.write(".env.example", ENV_EXAMPLE)?;
        fixture.write(".gitignore", ".env\nnode_modules/\n")?;

        Ok(fixture)
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    /// Write file into work tree, creating parent directories as needed.
    pub(crate) fn write(&self, path: impl AsRef<Path>, contents: impl AsRef<str>) -> Result<()> {
        let path = self.root.join(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents.as_ref())?;

        Ok(())
    }

    pub(crate) fn read(&self, path: impl AsRef<Path>) -> Result<String> {
        Ok(std::fs::read_to_string(self.root.join(path))?)
    }

    /// Stage every file in the work tree and commit it to `HEAD`.
    pub(crate) fn commit_all(&self, message: &str) -> Result<()> {
        let mut index = self.repo.index()?;
        index.add_all(["*"], git2::IndexAddOption::DEFAULT, None)?;
        index.write()?;
        let tree = self.repo.find_tree(index.write_tree()?)?;

        // INVARIANT: Always determine latest parent commits to append to.
        let signature = self.repo.signature()?;
        let mut parents = Vec::new();
        if let Some(parent) = self.repo.head().ok().and_then(|head| head.target()) {
            parents.push(self.repo.find_commit(parent)?);
        }
        let parents = parents.iter().collect::<Vec<_>>();

        self.repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;

        Ok(())
    }
}

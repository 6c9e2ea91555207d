// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::SiteFixture;

use anyhow::Result;
use pretty_assertions::assert_eq;
use wptask::{
    config::Settings,
    git::current_branch,
    project::{Environment, ProjectProperties},
};

#[test]
fn branch_comes_from_repository_head() -> Result<()> {
    let site = SiteFixture::new("acme", "feature-x")?;
    site.write(".env", "PROJECT=acme\n")?;

    assert_eq!(current_branch(site.root()), "feature-x");

    let properties = ProjectProperties::load(site.root(), &Settings::default(), &Environment::new())?;
    assert_eq!(properties.branch, "feature-x");
    assert_eq!(properties.db_name, "acme_feature-x");
    assert_eq!(properties.terminus_env, "feature-x");
    assert_eq!(properties.terminus_site_env, "acme.feature-x");

    Ok(())
}

#[test]
fn branch_follows_commits_on_default_branch() -> Result<()> {
    let site = SiteFixture::new("acme", "master")?;
    site.write(".env", "PROJECT=acme\nWEB_ROOT=web\n")?;
    site.commit_all("chore: starter project")?;

    let properties = ProjectProperties::load(site.root(), &Settings::default(), &Environment::new())?;
    assert_eq!(properties.branch, "master");
    assert_eq!(properties.terminus_env, "dev");
    assert_eq!(properties.web_root, site.root().join("web"));

    Ok(())
}

#[test]
fn project_settings_file_is_picked_up() -> Result<()> {
    let site = SiteFixture::new("acme", "main")?;
    site.write(
        "wptask.toml",
        "[environment]\ndefault_branch = \"main\"\ndev_alias = \"develop\"\n",
    )?;
    site.write(".env", "PROJECT=acme\n")?;

    let settings = Settings::load(site.root())?;
    let properties = ProjectProperties::load(site.root(), &settings, &Environment::new())?;
    assert_eq!(properties.terminus_env, "develop");

    Ok(())
}

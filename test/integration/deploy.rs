// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::SiteFixture;

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use wptask::{
    config::Settings,
    deploy::{deploy, staged_files, DeployError, StageFilter},
    project::{Environment, ProjectProperties},
    syscall::SystemInvoker,
};

#[test]
fn staged_files_of_committed_site() -> Result<()> {
    let site = SiteFixture::new("acme", "master")?;
    site.write(".env", "PROJECT=acme\n")?;
    site.write("web/app/themes/acme/style.css", "body {}\n")?;
    site.write("node_modules/left-pad/index.js", "")?;
    site.commit_all("chore: starter project")?;

    let result = staged_files(site.root(), &Settings::default())?;
    let expect = vec![
        PathBuf::from(".env.example"),
        PathBuf::from("README.md"),
        PathBuf::from("composer.json"),
        PathBuf::from("web/app/themes/acme/style.css"),
    ];
    assert_eq!(result, expect);

    Ok(())
}

#[test]
fn stage_filter_honors_configured_excludes() -> Result<()> {
    let site = SiteFixture::new("acme", "master")?;
    let mut settings = Settings::default();
    settings.deploy.exclude.push("*.sql".into());

    let filter = StageFilter::new(site.root(), &settings)?;
    assert!(filter.is_excluded(site.root().join("backup.sql"), false));
    assert!(filter.is_excluded(site.root().join(".git").join("HEAD"), false));
    assert!(filter.is_excluded(site.root().join(".env"), false));
    assert!(!filter.is_excluded(site.root().join(".env.example"), false));
    assert!(!filter.is_excluded(site.root().join("web").join("index.php"), false));

    Ok(())
}

#[tokio::test]
async fn deploy_without_host_repo_touches_nothing() -> Result<()> {
    let site = SiteFixture::new("acme", "master")?;
    site.write(".env", "PROJECT=acme\n")?;
    let settings = Settings::default();
    let properties = ProjectProperties::load(site.root(), &settings, &Environment::new())?;

    let invoker = SystemInvoker::default();
    let result = deploy(&invoker, &properties, &settings, None).await;
    assert!(matches!(result, Err(DeployError::NoHostRepo)));

    Ok(())
}

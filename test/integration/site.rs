// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::SiteFixture;

use anyhow::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::time::Duration;
use wptask::{
    config::{Settings, ToolPaths},
    envfile::{EnvFile, SALT_KEYS},
    project::{Environment, ProjectProperties},
    site::{configure, init, run, ConfigureOptions, SiteError, DEFAULT_PORT},
    syscall::SystemInvoker,
    template::TemplateError,
};

#[test]
fn init_renames_starter_project_once() -> Result<()> {
    let site = SiteFixture::new("acme", "master")?;

    assert_eq!(init(site.root())?, "acme");

    let expect = indoc! {r#"
        # acme

        ### Initial build (existing repo)
        1. Run `wptask configure`.
        2. Run `wptask install`.
    "#};
    assert_eq!(site.read("README.md")?, expect);
    assert!(site.read("composer.json")?.contains(r#""name": "thinkshout/acme","#));
    assert!(site.read(".env.example")?.starts_with("PROJECT=\"acme\"\nURL=http://acme\n"));

    let result = init(site.root());
    assert!(matches!(
        result,
        Err(SiteError::Template(TemplateError::MarkerNotFound { .. }))
    ));

    Ok(())
}

#[test]
fn init_from_nested_directory_uses_repository_name() -> Result<()> {
    let site = SiteFixture::new("acme-corp", "master")?;
    site.write("web/app/.gitkeep", "")?;

    // Files are still looked up relative to the given directory.
    let result = init(site.root().join("web").join("app"));
    assert!(matches!(result, Err(SiteError::Template(TemplateError::Read { .. }))));

    assert_eq!(init(site.root())?, "acme-corp");

    Ok(())
}

#[test]
fn configure_end_to_end() -> Result<()> {
    let site = SiteFixture::new("acme", "master")?;
    init(site.root())?;

    let settings = Settings::default();
    let mut properties = ProjectProperties::load(site.root(), &settings, &Environment::new())?;
    assert_eq!(properties.project, "acme");
    assert_eq!(properties.terminus_env, "dev");

    let opts = ConfigureOptions {
        branch: Some("qa".into()),
        url: Some("http://example.test".into()),
        db_password: Some("NULL".into()),
        ..Default::default()
    };
    configure(&mut properties, &settings, &opts)?;
    assert_eq!(properties.terminus_site_env, "acme.qa");

    let env = site.read(".env")?;
    assert!(env.contains("BRANCH=qa\n"));
    assert!(env.contains("URL=http://example.test\n"));
    assert!(env.contains("TERMINUS_ENV=qa\n"));
    assert!(env.contains("DB_PASSWORD=\n"));
    assert!(!env.contains("generateme"));

    let pairs = EnvFile::open_or_seed(site.root())?.pairs()?;
    for key in SALT_KEYS {
        assert_eq!(pairs[key].len(), 64);
    }

    // Reloading picks up persisted values over the template.
    let reloaded = ProjectProperties::load(site.root(), &settings, &Environment::new())?;
    assert_eq!(reloaded.branch, "qa");
    assert_eq!(reloaded.url, "http://example.test");
    assert_eq!(reloaded.db_name, "acme_qa");

    Ok(())
}

#[test]
fn configure_keeps_earlier_values() -> Result<()> {
    let site = SiteFixture::new("acme", "master")?;
    init(site.root())?;
    let settings = Settings::default();
    let mut properties = ProjectProperties::load(site.root(), &settings, &Environment::new())?;

    let opts = ConfigureOptions {
        db_user: Some("wp".into()),
        ..Default::default()
    };
    configure(&mut properties, &settings, &opts)?;
    let salt = EnvFile::open_or_seed(site.root())?.pairs()?["AUTH_KEY"].clone();

    let opts = ConfigureOptions {
        branch: Some("release-1".into()),
        ..Default::default()
    };
    configure(&mut properties, &settings, &opts)?;

    let pairs = EnvFile::open_or_seed(site.root())?.pairs()?;
    assert_eq!(pairs["DB_USER"], "wp");
    assert_eq!(pairs["BRANCH"], "release-1");
    assert_eq!(pairs["TERMINUS_ENV"], "release-1");
    assert_eq!(pairs["AUTH_KEY"], salt);

    Ok(())
}

#[test]
fn run_returns_without_waiting_on_server() -> Result<()> {
    let site = SiteFixture::new("acme", "master")?;
    site.write(".env", "PROJECT=acme\n")?;
    let settings = Settings::default();
    let properties = ProjectProperties::load(site.root(), &settings, &Environment::new())?;

    let paths = ToolPaths {
        php: "true".into(),
        ..ToolPaths::default()
    };
    let invoker = SystemInvoker::new(paths, Some(Duration::from_secs(5)));
    run(&invoker, &properties, DEFAULT_PORT)?;

    Ok(())
}

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Project properties.
//!
//! Every task needs to know what project it is working on: its name, where
//! it gets deployed, which branch and hosting environment it maps to, and
//! where its web root lives. These facts are collected once per run into
//! [`ProjectProperties`], and then handed to each task by reference.
//!
//! # Precedence
//!
//! Each property is looked up in the following order, first match wins:
//!
//! 1. Process environment, through an explicit [`Environment`] snapshot.
//! 2. The `.env` file, or `.env.example` if `.env` does not exist.
//! 3. A value derived from other properties, e.g., the database name.
//!
//! The deployment environment name is the exception. A file value for it is
//! ignored when the branch comes from the process environment, so the two
//! never disagree.
//!
//! Explicit command line arguments override properties at the call site.

use crate::{
    config::Settings,
    envfile::{parse_env_file, EnvFileError},
    git::current_branch,
    path::{ENV_FILE, ENV_TEMPLATE_FILE},
    syscall::quote_arg,
};

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Keys that make up the project properties.
pub const PROPERTY_KEYS: [&str; 8] = [
    "PROJECT",
    "HOST_REPO",
    "URL",
    "BRANCH",
    "TERMINUS_ENV",
    "TERMINUS_SITE",
    "DB_NAME",
    "WEB_ROOT",
];

/// Snapshot of environment variables.
///
/// Taken once at startup from the process environment, or built by hand.
/// Nothing else in wptask reads the process environment directly.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Construct empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot recognized keys of current process environment.
    pub fn from_process() -> Self {
        let vars = PROPERTY_KEYS
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (key.to_string(), value)))
            .collect();

        Self { vars }
    }

    /// Set variable.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Lookup variable. Empty values count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// Resolved properties of the project being worked on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectProperties {
    /// Project identifier.
    pub project: String,

    /// URL of host repository to deploy into.
    pub host_repo: String,

    /// Base URL of local site.
    pub url: String,

    /// Branch being worked on.
    pub branch: String,

    /// Deployment environment name on the hosting platform.
    pub terminus_env: String,

    /// Site identifier on the hosting platform.
    pub terminus_site: String,

    /// Combined `<site>.<env>` identifier.
    pub terminus_site_env: String,

    /// Top-level directory of the project.
    pub working_dir: PathBuf,

    /// Absolute path to web root.
    pub web_root: PathBuf,

    /// Web root quoted for shell interpolation.
    pub escaped_web_root: String,

    /// Local database name.
    pub db_name: String,
}

impl ProjectProperties {
    /// Load project properties for a working directory.
    ///
    /// Reads `.env`, or `.env.example` as a fallback, and layers the given
    /// environment over it. The branch is taken from the repository's `HEAD`
    /// if not set anywhere else.
    ///
    /// # Errors
    ///
    /// - Return [`ProjectError::MissingEnvFile`] if neither environment file
    ///   exists.
    /// - Return [`ProjectError::EnvFile`] if environment file is malformed.
    /// - Return [`ProjectError::MissingKey`] if no project identifier is set.
    #[instrument(skip(working_dir, settings, environment), level = "debug")]
    pub fn load(
        working_dir: impl AsRef<Path>,
        settings: &Settings,
        environment: &Environment,
    ) -> Result<Self> {
        let working_dir = working_dir.as_ref().to_path_buf();
        let env_file = [ENV_FILE, ENV_TEMPLATE_FILE]
            .iter()
            .map(|name| working_dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| ProjectError::MissingEnvFile {
                working_dir: working_dir.clone(),
            })?;
        debug!("load properties from {:?}", env_file.display());

        let file = parse_env_file(&env_file)?;
        let lookup = |key: &str| -> Option<String> {
            environment
                .get(key)
                .or_else(|| file.get(key).map(String::as_str).filter(|v| !v.is_empty()))
                .map(str::to_owned)
        };

        let project = lookup("PROJECT").ok_or(ProjectError::MissingKey { key: "PROJECT" })?;
        // INVARIANT: Web root always lives below the working directory.
        let web_root = match lookup("WEB_ROOT") {
            Some(web_root) => working_dir.join(web_root.trim_start_matches('/')),
            None => working_dir.clone(),
        };
        let escaped_web_root = quote_arg(&web_root.to_string_lossy());
        let branch = lookup("BRANCH").unwrap_or_else(|| current_branch(&working_dir));
        let db_name = lookup("DB_NAME").unwrap_or_else(|| format!("{project}_{branch}"));
        // INVARIANT: A branch from the process environment outranks an
        // environment name persisted in the file.
        let terminus_env = match (environment.get("TERMINUS_ENV"), environment.get("BRANCH")) {
            (Some(env), _) => env.to_string(),
            (None, Some(_)) => environment_name(&branch, settings),
            (None, None) => lookup("TERMINUS_ENV")
                .unwrap_or_else(|| environment_name(&branch, settings)),
        };
        let terminus_site = lookup("TERMINUS_SITE").unwrap_or_else(|| project.clone());

        Ok(Self {
            host_repo: lookup("HOST_REPO").unwrap_or_default(),
            url: lookup("URL").unwrap_or_default(),
            terminus_site_env: site_env(&terminus_site, &terminus_env),
            project,
            branch,
            terminus_env,
            terminus_site,
            working_dir,
            web_root,
            escaped_web_root,
            db_name,
        })
    }

    /// Switch deployment environment name, keeping the combined identifier
    /// consistent.
    pub fn set_terminus_env(&mut self, env: impl Into<String>) {
        self.terminus_env = env.into();
        self.terminus_site_env = site_env(&self.terminus_site, &self.terminus_env);
    }
}

impl Display for ProjectProperties {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        writeln!(fmt, "project            {}", self.project)?;
        writeln!(fmt, "host_repo          {}", self.host_repo)?;
        writeln!(fmt, "url                {}", self.url)?;
        writeln!(fmt, "branch             {}", self.branch)?;
        writeln!(fmt, "terminus_env       {}", self.terminus_env)?;
        writeln!(fmt, "terminus_site      {}", self.terminus_site)?;
        writeln!(fmt, "terminus_site_env  {}", self.terminus_site_env)?;
        writeln!(fmt, "working_dir        {}", self.working_dir.display())?;
        writeln!(fmt, "web_root           {}", self.web_root.display())?;
        writeln!(fmt, "escaped_web_root   {}", self.escaped_web_root)?;
        write!(fmt, "db_name            {}", self.db_name)
    }
}

/// Derive deployment environment name from branch.
///
/// The default branch deploys to the development environment. Every other
/// branch deploys to an environment of the same name.
pub fn environment_name(branch: &str, settings: &Settings) -> String {
    if branch == settings.environment.default_branch {
        settings.environment.dev_alias.clone()
    } else {
        branch.to_string()
    }
}

fn site_env(site: &str, env: &str) -> String {
    format!("{site}.{env}")
}

/// Project property error types.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    /// No environment file to load properties from.
    #[error("no .env or .env.example found in {:?}", .working_dir.display())]
    MissingEnvFile { working_dir: PathBuf },

    /// Required property is not set.
    #[error("required property {key} is not set")]
    MissingKey { key: &'static str },

    /// Environment file cannot be parsed.
    #[error(transparent)]
    EnvFile(#[from] EnvFileError),
}

/// Friendly result alias :3
pub type Result<T, E = ProjectError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    fn project_dir(env_example: &str) -> anyhow::Result<tempfile::TempDir> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join(ENV_TEMPLATE_FILE), env_example)?;
        Ok(dir)
    }

    #[test]
    fn database_name_defaults_to_project_and_branch() -> anyhow::Result<()> {
        let dir = project_dir("PROJECT=acme\n")?;
        let env = Environment::new().with("BRANCH", "staging");

        let result = ProjectProperties::load(dir.path(), &Settings::default(), &env)?;
        assert_eq!(result.db_name, "acme_staging");
        assert_eq!(result.terminus_env, "staging");
        assert_eq!(result.terminus_site_env, "acme.staging");

        Ok(())
    }

    #[test]
    fn explicit_database_name_wins() -> anyhow::Result<()> {
        let dir = project_dir("PROJECT=acme\nBRANCH=staging\nDB_NAME=wordpress\n")?;

        let result =
            ProjectProperties::load(dir.path(), &Settings::default(), &Environment::new())?;
        assert_eq!(result.db_name, "wordpress");

        Ok(())
    }

    #[test]
    fn environment_name_from_branch() {
        let settings = Settings::default();
        assert_eq!(environment_name("release-1", &settings), "release-1");
        assert_eq!(environment_name("master", &settings), "dev");
    }

    #[test]
    fn process_environment_overrides_file() -> anyhow::Result<()> {
        let dir = project_dir(indoc! {r#"
            PROJECT="acme"
            URL=http://acme.test
            BRANCH=master
            TERMINUS_SITE=acme-site
        "#})?;
        // Real .env wins over template.
        std::fs::write(dir.path().join(ENV_FILE), "PROJECT=acme\nBRANCH=master\n")?;
        let env = Environment::new().with("BRANCH", "release-1");

        let result = ProjectProperties::load(dir.path(), &Settings::default(), &env)?;
        assert_eq!(result.branch, "release-1");
        assert_eq!(result.terminus_env, "release-1");
        assert_eq!(result.url, "");
        assert_eq!(result.terminus_site, "acme");

        Ok(())
    }

    #[test]
    fn web_root_is_joined_and_escaped() -> anyhow::Result<()> {
        let dir = project_dir("PROJECT=acme\nBRANCH=master\nWEB_ROOT=web\n")?;

        let result =
            ProjectProperties::load(dir.path(), &Settings::default(), &Environment::new())?;
        assert_eq!(result.web_root, dir.path().join("web"));
        assert_eq!(
            result.escaped_web_root,
            format!("'{}'", dir.path().join("web").display())
        );
        assert_eq!(result.terminus_site_env, "acme.dev");

        Ok(())
    }

    #[test]
    fn process_branch_outranks_configured_environment_name() -> anyhow::Result<()> {
        let dir = project_dir("PROJECT=acme\n")?;
        std::fs::write(
            dir.path().join(ENV_FILE),
            "PROJECT=acme\nBRANCH=qa\nTERMINUS_ENV=qa\n",
        )?;
        let settings = Settings::default();

        let result = ProjectProperties::load(dir.path(), &settings, &Environment::new())?;
        assert_eq!(result.terminus_site_env, "acme.qa");

        let env = Environment::new().with("BRANCH", "release-1");
        let result = ProjectProperties::load(dir.path(), &settings, &env)?;
        assert_eq!(result.branch, "release-1");
        assert_eq!(result.terminus_env, "release-1");
        assert_eq!(result.terminus_site_env, "acme.release-1");

        let env = env.with("TERMINUS_ENV", "hotfix");
        let result = ProjectProperties::load(dir.path(), &settings, &env)?;
        assert_eq!(result.terminus_env, "hotfix");

        Ok(())
    }

    #[test]
    fn absolute_web_root_stays_below_working_dir() -> anyhow::Result<()> {
        let dir = project_dir("PROJECT=acme\nBRANCH=master\nWEB_ROOT=/web\n")?;

        let result =
            ProjectProperties::load(dir.path(), &Settings::default(), &Environment::new())?;
        assert_eq!(result.web_root, dir.path().join("web"));

        Ok(())
    }

    #[test]
    fn missing_env_file_is_fatal() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let result = ProjectProperties::load(dir.path(), &Settings::default(), &Environment::new());
        assert!(matches!(result, Err(ProjectError::MissingEnvFile { .. })));

        Ok(())
    }

    #[test]
    fn missing_project_is_fatal() -> anyhow::Result<()> {
        let dir = project_dir("URL=http://acme.test\n")?;
        let result = ProjectProperties::load(dir.path(), &Settings::default(), &Environment::new());
        assert!(matches!(result, Err(ProjectError::MissingKey { key: "PROJECT" })));

        Ok(())
    }

    #[sealed_test(env = [("BRANCH", "release-1"), ("HOME", "/home/nobody")])]
    fn environment_snapshot_keeps_recognized_keys() {
        let result = Environment::from_process();
        assert_eq!(result.get("BRANCH"), Some("release-1"));
        assert_eq!(result.get("HOME"), None);
    }
}

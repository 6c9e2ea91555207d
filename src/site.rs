// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Site lifecycle operations.
//!
//! Everything a developer does with a site over its lifetime: turning the
//! starter project into a real project, configuring a machine, installing
//! WordPress locally or on the hosting platform, running the behavior tests,
//! and serving the site locally.
//!
//! # Install Reporting
//!
//! Install sequences run every step even if an earlier one fails. The first
//! unsuccessful [`Outcome`] is handed back unchanged in the [`InstallReport`],
//! so the caller sees exactly what the failing tool wrote to its error stream.

use crate::{
    config::Settings,
    envfile::{EnvFile, EnvFileError},
    git::{toplevel_name, GitError},
    hosting::Terminus,
    project::{environment_name, ProjectProperties},
    syscall::{Invoker, Outcome, Syscall, SyscallError, Tool},
    template::{apply_substitutions, find_text_between, Substitution, TemplateError},
};

use rand::Rng;
use serde_json::json;
use std::{
    fs::{create_dir_all, read_dir, read_to_string, remove_dir_all, remove_file},
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// README marker where instructions for a new repository start.
pub const README_NEW_REPO_MARKER: &str = "### Initial build (new repo)";

/// README marker where instructions for an existing repository start.
pub const README_EXISTING_REPO_MARKER: &str = "### Initial build (existing repo)";

/// Placeholder project name in the starter README.
pub const README_PLACEHOLDER: &str = "new-project-name";

/// Behat profile used against the hosting platform.
pub const REMOTE_TEST_PROFILE: &str = "pantheon";

/// Default port of the local development server.
pub const DEFAULT_PORT: u16 = 8088;

/// Turn a fresh copy of the starter project into a real project.
///
/// The project is named after the top-level directory of its repository.
/// Returns that name.
///
/// This is a one-shot operation. Running it twice fails, because the README
/// instructions it strips are gone after the first run.
///
/// # Errors
///
/// - Return [`SiteError::Git`] if working directory is not inside a
///   repository.
/// - Return [`SiteError::Template`] if README markers cannot be found, or if
///   any project file cannot be rewritten.
#[instrument(skip(working_dir), level = "debug")]
pub fn init(working_dir: impl AsRef<Path>) -> Result<String> {
    let working_dir = working_dir.as_ref();
    let name = toplevel_name(working_dir)?;
    info!("initialize project {name}");

    let readme = working_dir.join("README.md");
    let content = read_to_string(&readme).map_err(|err| TemplateError::Read {
        source: err,
        path: readme.clone(),
    })?;

    // INVARIANT: Never substitute an empty span.
    let span = find_text_between(README_NEW_REPO_MARKER, README_EXISTING_REPO_MARKER, &content);
    if span.is_empty() {
        let marker = if content.contains(README_NEW_REPO_MARKER) {
            README_EXISTING_REPO_MARKER
        } else {
            README_NEW_REPO_MARKER
        };
        return Err(TemplateError::MarkerNotFound {
            marker: marker.into(),
            path: readme,
        }
        .into());
    }

    let rules = [
        Substitution::regex(
            working_dir.join("composer.json"),
            r#""name": "([^"/]+)/bedrock","#,
            format!(r#""name": "${{1}}/{name}","#),
        )?,
        Substitution::literal(
            working_dir.join(".env.example"),
            [r#"PROJECT="SITE""#, "URL=http://example.com"],
            [format!(r#"PROJECT="{name}""#), format!("URL=http://{name}")],
        )?,
        Substitution::literal(
            &readme,
            [span, README_PLACEHOLDER],
            [README_EXISTING_REPO_MARKER, name.as_str()],
        )?,
    ];
    apply_substitutions(&rules)?;

    Ok(name)
}

/// Options for [`configure`].
///
/// A value of `NULL` writes an empty value, e.g., for a database password
/// that is really empty.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigureOptions {
    pub db_password: Option<String>,
    pub db_user: Option<String>,
    pub db_name: Option<String>,
    pub db_host: Option<String>,
    pub branch: Option<String>,
    pub url: Option<String>,
}

impl ConfigureOptions {
    fn pairs(&self) -> [(&'static str, Option<&str>); 6] {
        [
            ("DB_PASSWORD", self.db_password.as_deref()),
            ("DB_USER", self.db_user.as_deref()),
            ("DB_NAME", self.db_name.as_deref()),
            ("DB_HOST", self.db_host.as_deref()),
            ("BRANCH", self.branch.as_deref()),
            ("URL", self.url.as_deref()),
        ]
    }
}

/// Write machine configuration into the environment file.
///
/// Seeds `.env` from `.env.example` with fresh salts if it does not exist.
/// Writes every given option, then always writes the branch and the hosting
/// environment name derived from it. The given properties are updated to
/// match what was written, including a database name derived from the
/// branch.
///
/// # Errors
///
/// - Return [`SiteError::EnvFile`] if environment file cannot be seeded, read,
///   or written.
#[instrument(skip_all, level = "debug")]
pub fn configure(
    properties: &mut ProjectProperties,
    settings: &Settings,
    opts: &ConfigureOptions,
) -> Result<()> {
    let env_file = EnvFile::open_or_seed(&properties.working_dir)?;

    let values = opts
        .pairs()
        .into_iter()
        .filter_map(|(key, value)| {
            value.map(|value| match value {
                "NULL" => (key, String::new()),
                value => (key, value.to_string()),
            })
        })
        .collect::<Vec<_>>();

    // INVARIANT: A derived database name follows the branch it came from.
    let db_name_is_derived = opts.db_name.is_none()
        && properties.db_name == format!("{}_{}", properties.project, properties.branch)
        && env_file
            .pairs()?
            .get("DB_NAME")
            .map_or(true, |value| value.is_empty());

    for (key, value) in &values {
        match *key {
            "DB_NAME" => properties.db_name = value.clone(),
            "BRANCH" => properties.branch = value.clone(),
            "URL" => properties.url = value.clone(),
            _ => {}
        }
    }
    if db_name_is_derived {
        properties.db_name = format!("{}_{}", properties.project, properties.branch);
    }
    properties.set_terminus_env(environment_name(&properties.branch, settings));

    env_file.edit(|edit| {
        for (key, value) in &values {
            info!("set {key}");
            edit.set(*key, value);
        }
        edit.set("TERMINUS_ENV", &properties.terminus_env);
        edit.set("BRANCH", &properties.branch);
    })?;

    Ok(())
}

/// Options for [`install`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    /// Plugins to activate, replacing the configured listing.
    pub plugins: Vec<String>,

    /// Empty the uploads directory first.
    pub clear_uploads: bool,
}

/// Result of an install sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// First unsuccessful outcome, or the last outcome if all succeeded.
    pub outcome: Outcome,

    /// Name of generated admin user.
    pub admin_user: String,

    /// Password of generated admin user.
    pub admin_password: String,
}

impl InstallReport {
    fn new(outcome: Outcome, admin_user: String, admin_password: String) -> Self {
        let report = Self {
            outcome,
            admin_user,
            admin_password,
        };

        if report.outcome.success {
            info!("Install complete");
            info!("Admin: {}", report.admin_user);
            info!("Password: {}", report.admin_password);
        }

        report
    }
}

/// Install WordPress locally from scratch.
///
/// Installs dependencies, resets the database, installs WordPress with a
/// fresh admin account, activates plugins, pulls configuration, and flushes
/// rewrite rules.
///
/// # Errors
///
/// - Return [`SiteError::ClearUploads`] if uploads directory cannot be
///   emptied.
/// - Return [`SiteError::Syscall`] if a tool cannot be run at all.
#[instrument(skip_all, level = "debug")]
pub async fn install<I>(
    invoker: &I,
    properties: &ProjectProperties,
    settings: &Settings,
    opts: &InstallOptions,
) -> Result<InstallReport>
where
    I: Invoker,
{
    let working_dir = &properties.working_dir;
    let wp = |args: Vec<String>| {
        Syscall::new(Tool::Wp)
            .args(args)
            .current_dir(working_dir)
    };

    let mut steps = Steps::default();
    let composer = Syscall::new(Tool::Composer)
        .args(["install", "--optimize-autoloader"])
        .current_dir(working_dir);
    steps.record(invoker.invoke(&composer).await?);

    if opts.clear_uploads {
        clear_dir(properties.web_root.join(&settings.install.uploads_dir))?;
    }

    steps.record(invoker.invoke(&wp(strings(["db", "reset", "--yes"]))).await?);

    let admin_password = generate_password();
    let admin_user = admin_user(properties);
    let install = core_install_args(properties, settings, &properties.url, &admin_password);
    steps.record(invoker.invoke(&wp(install)).await?);

    let plugins = plugins(opts.plugins.as_slice(), settings);
    if !plugins.is_empty() {
        let activate = strings(["plugin", "activate"]).into_iter().chain(plugins).collect();
        steps.record(invoker.invoke(&wp(activate)).await?);
    }

    let pull = strings(["config", "pull", settings.install.config_bundle.as_str()]);
    steps.record(invoker.invoke(&wp(pull)).await?);
    steps.record(invoker.invoke(&wp(strings(["rewrite", "flush"]))).await?);

    Ok(InstallReport::new(steps.finish(), admin_user, admin_password))
}

/// Install WordPress from scratch on the hosting environment of the project.
///
/// The site URL is taken from the first domain of the environment. The
/// environment is wiped before installing.
///
/// # Errors
///
/// - Return [`SiteError::Syscall`] if Terminus cannot be run at all.
#[instrument(skip_all, level = "debug")]
pub async fn remote_install<I>(
    invoker: &I,
    properties: &ProjectProperties,
    settings: &Settings,
    plugins: &[String],
) -> Result<InstallReport>
where
    I: Invoker,
{
    let terminus = Terminus::new(invoker, properties, settings);
    let mut steps = Steps::default();

    let domains = terminus.domain_list().await?;
    let url = match domains.stdout.lines().map(str::trim).find(|line| !line.is_empty()) {
        Some(domain) => format!("https://{domain}"),
        None => {
            let url = platform_url(properties, settings);
            warn!("no domain listed for {}, using {url}", terminus.site_env());
            url
        }
    };
    steps.record(domains);

    steps.record(terminus.wipe().await?);

    let admin_password = generate_password();
    let admin_user = admin_user(properties);
    let install = core_install_args(properties, settings, &url, &admin_password);
    steps.record(terminus.remote_wp(install).await?);

    let plugins = self::plugins(plugins, settings);
    if !plugins.is_empty() {
        let activate = strings(["plugin", "activate"]).into_iter().chain(plugins);
        steps.record(terminus.remote_wp(activate).await?);
    }

    let pull = ["config", "pull", settings.install.config_bundle.as_str()];
    steps.record(terminus.remote_wp(pull).await?);

    Ok(InstallReport::new(steps.finish(), admin_user, admin_password))
}

/// Arguments to `wp core install` for the project.
pub fn core_install_args(
    properties: &ProjectProperties,
    settings: &Settings,
    url: &str,
    admin_password: &str,
) -> Vec<String> {
    let project = &properties.project;
    vec![
        "core".into(),
        "install".into(),
        format!("--url={url}"),
        format!("--title={project}"),
        format!("--admin_user={}", admin_user(properties)),
        format!("--admin_password={admin_password}"),
        format!(
            "--admin_email=dev-team+{project}@{}",
            settings.install.admin_email_domain
        ),
        "--skip-email".into(),
    ]
}

/// Generate admin password of 20 hexadecimal characters.
pub fn generate_password() -> String {
    rand::thread_rng()
        .gen::<[u8; 10]>()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn admin_user(properties: &ProjectProperties) -> String {
    format!("{}_admin", properties.project)
}

fn plugins(requested: &[String], settings: &Settings) -> Vec<String> {
    if requested.is_empty() {
        settings.install.plugins.clone()
    } else {
        requested.to_vec()
    }
}

fn strings<'a>(args: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    args.into_iter().map(str::to_owned).collect()
}

fn clear_dir(dir: PathBuf) -> Result<()> {
    let to_error = |err| SiteError::ClearUploads {
        source: err,
        path: dir.clone(),
    };

    info!("clear {:?}", dir.display());
    create_dir_all(&dir).map_err(to_error)?;
    for entry in read_dir(&dir).map_err(to_error)? {
        let path = entry.map_err(to_error)?.path();
        if path.is_dir() {
            remove_dir_all(&path).map_err(to_error)?;
        } else {
            remove_file(&path).map_err(to_error)?;
        }
    }

    Ok(())
}

/// Track outcomes of a sequence of steps that all run.
#[derive(Debug, Default)]
struct Steps {
    first_failure: Option<Outcome>,
    last: Outcome,
}

impl Steps {
    fn record(&mut self, outcome: Outcome) {
        if !outcome.success {
            warn!("{} failed", outcome.command);
            if self.first_failure.is_none() {
                self.first_failure = Some(outcome.clone());
            }
        }
        self.last = outcome;
    }

    fn finish(self) -> Outcome {
        self.first_failure.unwrap_or(self.last)
    }
}

/// Options for [`test`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TestOptions {
    /// Single feature file to run instead of the whole suite.
    pub feature: Option<String>,

    /// Behat profile, the configured default profile if not given.
    pub profile: Option<String>,
}

/// Run behavior tests.
///
/// The outcome of Behat is handed back unchanged.
///
/// # Errors
///
/// - Return [`SiteError::Syscall`] if Behat cannot be run at all.
#[instrument(skip(invoker, properties, settings), level = "debug")]
pub async fn test<I>(
    invoker: &I,
    properties: &ProjectProperties,
    settings: &Settings,
    opts: &TestOptions,
) -> Result<Outcome>
where
    I: Invoker,
{
    Ok(invoker.invoke(&behat(properties, settings, opts)).await?)
}

/// Run behavior tests against the hosting environment of the project.
///
/// # Errors
///
/// - Return [`SiteError::Syscall`] if Behat cannot be run at all.
#[instrument(skip(invoker, properties, settings), level = "debug")]
pub async fn remote_test<I>(
    invoker: &I,
    properties: &ProjectProperties,
    settings: &Settings,
    feature: Option<String>,
) -> Result<Outcome>
where
    I: Invoker,
{
    let opts = TestOptions {
        feature,
        profile: Some(REMOTE_TEST_PROFILE.into()),
    };
    let call = behat(properties, settings, &opts)
        .env("BEHAT_PARAMS", behat_params(properties, settings));

    Ok(invoker.invoke(&call).await?)
}

fn behat(properties: &ProjectProperties, settings: &Settings, opts: &TestOptions) -> Syscall {
    let profile = opts
        .profile
        .as_deref()
        .unwrap_or(settings.test.default_profile.as_str());
    let config = settings
        .test
        .config_dir
        .join(format!("behat.{profile}.yml"));

    let call = Syscall::new(Tool::Behat)
        .arg("--config")
        .arg(config)
        .args(["--profile", profile, "--format", "progress"])
        .current_dir(&properties.working_dir);
    match &opts.feature {
        Some(feature) => call.arg(feature),
        None => call,
    }
}

/// Public URL of hosting environment on the platform domain.
pub fn platform_url(properties: &ProjectProperties, settings: &Settings) -> String {
    format!(
        "https://{}-{}.{}",
        properties.terminus_env, properties.terminus_site, settings.environment.domain_suffix
    )
}

/// Behat parameters that point the test suite at the hosting environment.
pub fn behat_params(properties: &ProjectProperties, settings: &Settings) -> String {
    let alias = format!(
        "pantheon.{}.{}",
        properties.terminus_site, properties.terminus_env
    );

    json!({
        "extensions": {
            "Behat\\MinkExtension": {
                "base_url": platform_url(properties, settings),
            },
            "Drupal\\DrupalExtension": {
                "drupal": { "drupal_root": properties.web_root.to_string_lossy() },
                "drush": { "alias": alias },
            },
        },
    })
    .to_string()
}

/// Serve site locally through PHP's built-in web server.
///
/// The server runs detached in the background, and outlives wptask.
///
/// # Errors
///
/// - Return [`SiteError::Syscall`] if server cannot be started.
#[instrument(skip(invoker, properties), level = "debug")]
pub fn run<I>(invoker: &I, properties: &ProjectProperties, port: u16) -> Result<()>
where
    I: Invoker,
{
    let server = Syscall::new(Tool::Php)
        .arg("-S")
        .arg(format!("localhost:{port}"))
        .arg("-t")
        .arg(&properties.web_root)
        .current_dir(&properties.working_dir);
    invoker.spawn_detached(&server)?;
    info!("serving {} at http://localhost:{port}", properties.project);

    Ok(())
}

/// Log resolved project properties and effective settings.
pub fn info(properties: &ProjectProperties, settings: &Settings) {
    info!("project properties:\n{properties}");
    info!("settings:\n{settings}");
}

/// Site lifecycle error types.
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    /// Uploads directory cannot be emptied.
    #[error("failed to clear uploads at {:?}", .path.display())]
    ClearUploads {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Repository of project cannot be inspected.
    #[error(transparent)]
    Git(#[from] GitError),

    /// Project files cannot be templated.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Environment file cannot be edited.
    #[error(transparent)]
    EnvFile(#[from] EnvFileError),

    /// External tool cannot be run.
    #[error(transparent)]
    Syscall(#[from] SyscallError),
}

/// Friendly result alias :3
pub type Result<T, E = SiteError> = std::result::Result<T, E>;

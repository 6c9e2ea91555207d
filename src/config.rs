// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Settings layout.
//!
//! Specify the layout of the `wptask.toml` settings file. Settings decide
//! which binaries get called for each external tool, how long a command may
//! run, and the defaults used by install, deploy, and test tasks.
//!
//! Settings are looked up in the working directory first, then in the user's
//! configuration directory. If neither exists, the defaults are used as-is.

use crate::path::{default_settings_path, PROJECT_SETTINGS_FILE};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::debug;

/// Task runner settings.
///
/// # General Layout
///
/// Settings are split into sections: tool paths, environment naming,
/// deployment, installation, and testing. Every section is optional, and
/// every field inside a section falls back to its default when left out.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Maximum run time for one external command in seconds.
    ///
    /// Unbounded when unset, because clones and remote test runs can
    /// legitimately take a long time.
    pub timeout_secs: Option<u64>,

    /// Binaries used for each external tool.
    pub tools: ToolPaths,

    /// Environment naming rules.
    pub environment: EnvironmentSettings,

    /// Deployment pipeline settings.
    pub deploy: DeploySettings,

    /// Site installation defaults.
    pub install: InstallSettings,

    /// Behavioral test runner settings.
    pub test: TestSettings,
}

impl Settings {
    /// Load settings for a working directory.
    ///
    /// Prefers `wptask.toml` at the top-level of the working directory, then
    /// the user's settings file. Falls back to default settings if neither
    /// exists.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ReadSettings`] if a settings file exists but
    ///   cannot be read.
    /// - Return [`ConfigError::Deserialize`] if settings cannot be parsed.
    pub fn load(working_dir: impl AsRef<Path>) -> Result<Self> {
        let local = working_dir.as_ref().join(PROJECT_SETTINGS_FILE);
        let user = default_settings_path().ok();

        let path = match (local.is_file(), user) {
            (true, _) => local,
            (false, Some(user)) if user.is_file() => user,
            _ => {
                debug!("no settings file found, using defaults");
                return Ok(Self::default());
            }
        };

        debug!("load settings from {:?}", path.display());
        read_to_string(&path)
            .map_err(|err| ConfigError::ReadSettings {
                source: err,
                path: path.clone(),
            })?
            .parse()
    }

    /// Command timeout as a [`Duration`].
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every tool path.
        let tools = &mut settings.tools;
        for path in [
            &mut tools.composer,
            &mut tools.wp,
            &mut tools.git,
            &mut tools.rsync,
            &mut tools.terminus,
            &mut tools.behat,
            &mut tools.php,
        ] {
            *path = shellexpand::full(path.as_str())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned();
        }

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Binary to call for each external tool.
///
/// Plain names are resolved through `PATH`.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolPaths {
    pub composer: String,
    pub wp: String,
    pub git: String,
    pub rsync: String,
    pub terminus: String,
    pub behat: String,
    pub php: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            composer: "composer".into(),
            wp: "wp".into(),
            git: "git".into(),
            rsync: "rsync".into(),
            terminus: "terminus".into(),
            behat: "behat".into(),
            php: "php".into(),
        }
    }
}

/// Hosting environment naming.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvironmentSettings {
    /// Branch that deploys to the development environment.
    pub default_branch: String,

    /// Name of the development environment on the hosting platform.
    pub dev_alias: String,

    /// Domain suffix of hosted environments.
    pub domain_suffix: String,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            default_branch: "master".into(),
            dev_alias: "dev".into(),
            domain_suffix: "pantheonsite.io".into(),
        }
    }
}

/// Deployment pipeline settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeploySettings {
    /// Local-only paths that must never be staged, on top of version control
    /// metadata and the environment file.
    pub exclude: Vec<String>,

    /// First line of every deployment commit message.
    pub commit_header: String,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            exclude: vec!["node_modules/".into()],
            commit_header: "Combined commits: ".into(),
        }
    }
}

/// Site installation defaults.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InstallSettings {
    /// Domain of the admin account email address.
    pub admin_email_domain: String,

    /// Plugins to activate after install when none are given explicitly.
    pub plugins: Vec<String>,

    /// Uploads directory relative to the web root.
    pub uploads_dir: PathBuf,

    /// Configuration bundle to pull after install.
    pub config_bundle: String,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            admin_email_domain: "thinkshout.com".into(),
            plugins: Vec::new(),
            uploads_dir: PathBuf::from("app").join("uploads"),
            config_bundle: "all".into(),
        }
    }
}

/// Behavioral test runner settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TestSettings {
    /// Directory holding `behat.<profile>.yml` files.
    pub config_dir: PathBuf,

    /// Profile used when none is given.
    pub default_profile: String,
}

impl Default for TestSettings {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("behat"),
            default_profile: "local".into(),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read settings file.
    #[error("failed to read settings at {:?}", .path.display())]
    ReadSettings {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize settings.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize settings.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on settings.
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

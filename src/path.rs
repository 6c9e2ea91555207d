// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for files that need to be read,
//! written, or staged during a task run.

use std::{
    env,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

/// Untracked environment file at the top-level of a project.
pub const ENV_FILE: &str = ".env";

/// Checked-in environment file template.
pub const ENV_TEMPLATE_FILE: &str = ".env.example";

/// Project-level settings file.
pub const PROJECT_SETTINGS_FILE: &str = "wptask.toml";

/// Directory inside the deploy temp directory that holds the host checkout.
pub const FETCH_DIR_NAME: &str = "host";

/// Directory inside the deploy temp directory that holds staged site files.
pub const DEPLOY_DIR_NAME: &str = "deploy";

/// Determine default absolute path to the user's settings file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/wptask/config.toml`. Does
/// not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_settings_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("wptask").join("config.toml"))
        .ok_or(NoWayHome)
}

/// Build temp directory path for one deployment run.
///
/// Named after the current Unix time in seconds, so two runs started in the
/// same second share a directory.
pub fn deploy_tmp_dir() -> PathBuf {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();

    deploy_tmp_dir_in(env::temp_dir(), secs)
}

pub(crate) fn deploy_tmp_dir_in(tmp: impl AsRef<Path>, secs: u64) -> PathBuf {
    // INVARIANT: Resolve symlinked temp roots, e.g., /tmp -> /private/tmp.
    let tmp = tmp
        .as_ref()
        .canonicalize()
        .unwrap_or_else(|_| tmp.as_ref().to_path_buf());

    tmp.join(format!("wp-deploy-{secs}"))
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

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deployment pipeline.
//!
//! Sites are deployed by pushing into a separate __host repository__ that the
//! hosting platform builds from. The host repository does not share history
//! with the site's own repository. So, each deployment assembles a fresh
//! artifact in a temp directory, and commits it on top of the host's history.
//!
//! # Pipeline Stages
//!
//! 1. __Prepare__: create and empty `<tmp>/wp-deploy-<secs>`, and create the
//!    `host` checkout directory inside it.
//! 2. __Fetch host__: clone the host repository, and check out the target
//!    branch.
//! 3. __Derive commit message__: list site commits made since the last host
//!    commit.
//! 4. __Stage site files__: mirror the working directory into `deploy`,
//!    leaving out version control metadata and local-only files.
//! 5. __Graft host history__: mirror the host's `.git` directory into
//!    `deploy`, so the next commit lands on the host branch.
//! 6. __Commit & push__: commit everything, and push to `origin`.
//! 7. __Cleanup__: nothing. The temp directory is left behind for
//!    inspection.
//!
//! Every stage stops the pipeline on failure, except for deriving the commit
//! message, which falls back to the bare header. Nothing is rolled back.

use crate::{
    config::Settings,
    path::{deploy_tmp_dir, DEPLOY_DIR_NAME, ENV_FILE, FETCH_DIR_NAME},
    project::ProjectProperties,
    syscall::{Invoker, Syscall, SyscallError, Tool},
};

use ignore::{
    gitignore::{Gitignore, GitignoreBuilder},
    WalkBuilder,
};
use std::{
    fs::{create_dir_all, read_dir, remove_dir_all, remove_file},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Version control metadata never staged for deployment.
pub const VCS_EXCLUDES: [&str; 5] = [".git/", ".svn/", ".hg/", ".bzr/", "CVS/"];

/// Options shared by both rsync passes.
const RSYNC_ARCHIVE_ARGS: [&str; 5] = ["-a", "-v", "-z", "--no-group", "--no-owner"];

/// Summary of a finished deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    /// Temp directory the artifact was assembled in.
    pub tmp_dir: PathBuf,

    /// Host branch that was pushed.
    pub branch: String,

    /// Commit message used for the deployment commit.
    pub message: String,
}

/// Deploy site into host repository.
///
/// Pushes to `target_branch` if given, or to the project's branch otherwise.
///
/// # Errors
///
/// - Return [`DeployError::Prepare`] if temp directory cannot be prepared.
/// - Return [`DeployError::Syscall`] if any git or rsync call fails.
#[instrument(skip_all, level = "debug")]
pub async fn deploy<I>(
    invoker: &I,
    properties: &ProjectProperties,
    settings: &Settings,
    target_branch: Option<&str>,
) -> Result<DeployReport>
where
    I: Invoker,
{
    deploy_in(invoker, properties, settings, target_branch, deploy_tmp_dir()).await
}

pub(crate) async fn deploy_in<I>(
    invoker: &I,
    properties: &ProjectProperties,
    settings: &Settings,
    target_branch: Option<&str>,
    tmp_dir: PathBuf,
) -> Result<DeployReport>
where
    I: Invoker,
{
    let branch = target_branch.unwrap_or(&properties.branch).to_string();
    if branch.is_empty() {
        return Err(DeployError::NoBranch);
    }
    if properties.host_repo.is_empty() {
        return Err(DeployError::NoHostRepo);
    }

    let host_dir = tmp_dir.join(FETCH_DIR_NAME);
    let deploy_dir = tmp_dir.join(DEPLOY_DIR_NAME);
    info!("deploy {:?} to {} on {branch}", properties.working_dir.display(), properties.host_repo);

    prepare(&tmp_dir, &host_dir)?;
    fetch_host(invoker, &properties.host_repo, &host_dir, &branch).await?;
    let message = derive_commit_message(invoker, &properties.working_dir, &host_dir, settings).await;
    stage_site_files(invoker, &properties.working_dir, &deploy_dir, settings).await?;
    graft_host_history(invoker, &host_dir, &deploy_dir).await?;
    commit_and_push(invoker, &deploy_dir, &message, &branch).await?;

    // INVARIANT: Temp directory is kept.
    debug!("leaving {:?} in place", tmp_dir.display());
    info!("deployed {branch}");

    Ok(DeployReport {
        tmp_dir,
        branch,
        message,
    })
}

fn prepare(tmp_dir: &Path, host_dir: &Path) -> Result<()> {
    let to_error = |err| DeployError::Prepare {
        source: err,
        path: tmp_dir.to_path_buf(),
    };

    create_dir_all(tmp_dir).map_err(to_error)?;

    // INVARIANT: Start from an empty temp directory, even if a previous run
    // left something behind.
    for entry in read_dir(tmp_dir).map_err(to_error)? {
        let path = entry.map_err(to_error)?.path();
        if path.is_dir() {
            remove_dir_all(&path).map_err(to_error)?;
        } else {
            remove_file(&path).map_err(to_error)?;
        }
    }

    create_dir_all(host_dir).map_err(to_error)?;

    Ok(())
}

#[instrument(skip(invoker), level = "debug")]
async fn fetch_host<I>(invoker: &I, repo: &str, host_dir: &Path, branch: &str) -> Result<()>
where
    I: Invoker,
{
    let clone = Syscall::new(Tool::Git).arg("clone").arg(repo).arg(host_dir);
    invoker.invoke(&clone).await?.into_result()?;

    let checkout = Syscall::new(Tool::Git)
        .args(["checkout", branch])
        .current_dir(host_dir);
    invoker.invoke(&checkout).await?.into_result()?;

    Ok(())
}

/// Never fails. If either `git log` query fails, a warning is logged and the
/// message is only the header, so the deploy still goes through.
#[instrument(skip(invoker, settings), level = "debug")]
async fn derive_commit_message<I>(
    invoker: &I,
    working_dir: &Path,
    host_dir: &Path,
    settings: &Settings,
) -> String
where
    I: Invoker,
{
    let header = &settings.deploy.commit_header;
    let last_commit = Syscall::new(Tool::Git)
        .args(["log", "-1", "--date=short", "--pretty=format:%ci"])
        .current_dir(host_dir);
    let date = match invoker.invoke(&last_commit).await {
        Ok(outcome) if outcome.success => outcome.stdout_trimmed().to_string(),
        Ok(outcome) => {
            warn!("cannot read last host commit: {}", outcome.stderr.trim_end());
            return commit_message(header, "");
        }
        Err(err) => {
            warn!("cannot read last host commit: {err}");
            return commit_message(header, "");
        }
    };

    let since = Syscall::new(Tool::Git)
        .args(["log", "--pretty=format:%h %s", "--no-merges"])
        .option("since", &date)
        .current_dir(working_dir);
    match invoker.invoke(&since).await {
        Ok(outcome) if outcome.success => commit_message(header, &outcome.stdout),
        Ok(outcome) => {
            warn!("cannot list site commits: {}", outcome.stderr.trim_end());
            commit_message(header, "")
        }
        Err(err) => {
            warn!("cannot list site commits: {err}");
            commit_message(header, "")
        }
    }
}

/// Build deployment commit message from header and `git log` output.
///
/// Log lines keep the order git emitted them in, most recent first.
pub fn commit_message(header: &str, log: &str) -> String {
    format!("{header}\n{}", log.trim_end())
}

#[instrument(skip(invoker, settings), level = "debug")]
async fn stage_site_files<I>(
    invoker: &I,
    working_dir: &Path,
    deploy_dir: &Path,
    settings: &Settings,
) -> Result<()>
where
    I: Invoker,
{
    let excludes = stage_excludes(settings)
        .into_iter()
        .map(|pattern| format!("--exclude={pattern}"));
    let rsync = Syscall::new(Tool::Rsync)
        .args(RSYNC_ARCHIVE_ARGS)
        .args(excludes)
        .arg("./")
        .arg(deploy_dir)
        .current_dir(working_dir);
    invoker.invoke(&rsync).await?.into_result()?;

    Ok(())
}

#[instrument(skip(invoker), level = "debug")]
async fn graft_host_history<I>(invoker: &I, host_dir: &Path, deploy_dir: &Path) -> Result<()>
where
    I: Invoker,
{
    let rsync = Syscall::new(Tool::Rsync)
        .args(RSYNC_ARCHIVE_ARGS)
        .arg(host_dir.join(".git"))
        .arg(deploy_dir);
    invoker.invoke(&rsync).await?.into_result()?;

    Ok(())
}

#[instrument(skip(invoker, message), level = "debug")]
async fn commit_and_push<I>(invoker: &I, deploy_dir: &Path, message: &str, branch: &str) -> Result<()>
where
    I: Invoker,
{
    let calls = [
        Syscall::new(Tool::Git).args(["add", "-A"]),
        Syscall::new(Tool::Git).args(["commit", "-m", message]),
        Syscall::new(Tool::Git).args(["push", "origin", branch]),
    ];

    for call in calls {
        let call = call.current_dir(deploy_dir);
        invoker.invoke(&call).await?.into_result()?;
    }

    Ok(())
}

/// Full listing of exclusion patterns for staging site files.
///
/// Patterns follow gitignore syntax, which rsync understands for these
/// simple cases too.
pub fn stage_excludes(settings: &Settings) -> Vec<String> {
    VCS_EXCLUDES
        .iter()
        .map(ToString::to_string)
        .chain([".gitignore".to_string(), ENV_FILE.to_string()])
        .chain(settings.deploy.exclude.iter().cloned())
        .collect()
}

/// Match paths against the staging exclusion list.
#[derive(Debug)]
pub struct StageFilter {
    matcher: Gitignore,
}

impl StageFilter {
    /// Construct new stage filter rooted at working directory.
    ///
    /// # Errors
    ///
    /// - Return [`DeployError::Walk`] if an exclusion pattern is invalid.
    pub fn new(working_dir: impl AsRef<Path>, settings: &Settings) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(working_dir.as_ref());
        for pattern in stage_excludes(settings) {
            builder.add_line(None, &pattern)?;
        }

        Ok(Self {
            matcher: builder.build()?,
        })
    }

    /// Check if path would be left out of the deploy staging directory.
    pub fn is_excluded(&self, path: impl AsRef<Path>, is_dir: bool) -> bool {
        self.matcher
            .matched_path_or_any_parents(path.as_ref(), is_dir)
            .is_ignore()
    }
}

/// List files that staging would copy, relative to working directory.
///
/// Does not touch anything. Paths come back sorted.
///
/// # Errors
///
/// - Return [`DeployError::Walk`] if an exclusion pattern is invalid.
/// - Return [`DeployError::Walk`] if working directory cannot be walked.
pub fn staged_files(working_dir: impl AsRef<Path>, settings: &Settings) -> Result<Vec<PathBuf>> {
    let working_dir = working_dir.as_ref();
    let filter = StageFilter::new(working_dir, settings)?;

    let mut files = Vec::new();
    let walker = WalkBuilder::new(working_dir)
        .standard_filters(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|kind| kind.is_dir());
            !filter.is_excluded(entry.path(), is_dir)
        })
        .build();

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_some_and(|kind| kind.is_file()) {
            if let Ok(path) = entry.path().strip_prefix(working_dir) {
                files.push(path.to_path_buf());
            }
        }
    }
    files.sort();

    Ok(files)
}

/// Deployment error types.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// No branch to deploy.
    #[error("no branch to deploy, set BRANCH or pass a target branch")]
    NoBranch,

    /// No host repository to deploy into.
    #[error("no host repository configured, set HOST_REPO")]
    NoHostRepo,

    /// Temp directory cannot be prepared.
    #[error("failed to prepare temp directory at {:?}", .path.display())]
    Prepare {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// External command fails.
    #[error(transparent)]
    Syscall(#[from] SyscallError),

    /// Exclusion pattern is invalid, or working directory cannot be walked.
    #[error(transparent)]
    Walk(#[from] ignore::Error),
}

/// Friendly result alias :3
pub type Result<T, E = DeployError> = std::result::Result<T, E>;

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Local repository introspection.
//!
//! Queries about the site's own repository are answered through libgit2.
//! Anything that touches a remote, or writes history, goes through the `git`
//! binary via [`crate::syscall`] instead.

use git2::Repository;
use std::path::Path;
use tracing::debug;

/// Short name of branch that `HEAD` points to.
///
/// Works on unborn branches too. Returns an empty string if the path is not
/// inside a repository, or if `HEAD` is detached.
pub fn current_branch(path: impl AsRef<Path>) -> String {
    let repository = match Repository::discover(path.as_ref()) {
        Ok(repository) => repository,
        Err(err) => {
            debug!("no repository at {:?}: {err}", path.as_ref().display());
            return String::new();
        }
    };

    repository
        .find_reference("HEAD")
        .ok()
        .and_then(|head| head.symbolic_target().map(str::to_owned))
        .and_then(|target| target.strip_prefix("refs/heads/").map(str::to_owned))
        .unwrap_or_default()
}

/// Name of top-level directory of repository containing target path.
///
/// # Errors
///
/// - Return [`GitError::Git2`] if path is not inside a repository.
/// - Return [`GitError::NoWorkTree`] if repository is bare.
pub fn toplevel_name(path: impl AsRef<Path>) -> Result<String> {
    let repository = Repository::discover(path.as_ref())?;
    let workdir = repository.workdir().ok_or(GitError::NoWorkTree)?;

    // INVARIANT: Resolve symlinks so the real directory name is used.
    let workdir = workdir
        .canonicalize()
        .unwrap_or_else(|_| workdir.to_path_buf());

    workdir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or(GitError::NoWorkTree)
}

/// Repository introspection error types.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// Repository has no work tree to take a name from.
    #[error("repository has no work tree")]
    NoWorkTree,

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
pub type Result<T, E = GitError> = std::result::Result<T, E>;

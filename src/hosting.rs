// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Hosting platform adapter.
//!
//! Sites are hosted on Pantheon, and Pantheon is driven through its Terminus
//! command line tool. Every Terminus call made here is scoped to the
//! `<site>.<env>` identifier of the project, so one [`Terminus`] instance
//! always talks about exactly one hosting environment.

use crate::{
    config::Settings,
    deploy::{deploy_in, DeployError, DeployReport},
    path::deploy_tmp_dir,
    project::{environment_name, ProjectProperties},
    site::{remote_install, InstallReport, SiteError},
    syscall::{Invoker, Outcome, Result as SyscallResult, Syscall, SyscallError, Tool},
};

use std::{ffi::OsString, path::PathBuf};
use tracing::{info, instrument, warn};

/// Issue Terminus commands for one hosting environment.
#[derive(Debug)]
pub struct Terminus<'a, I>
where
    I: Invoker,
{
    invoker: &'a I,
    site: String,
    env: String,
    site_env: String,
    dev_alias: String,
}

impl<'a, I> Terminus<'a, I>
where
    I: Invoker,
{
    /// Construct new Terminus adapter for environment of project.
    pub fn new(invoker: &'a I, properties: &ProjectProperties, settings: &Settings) -> Self {
        Self {
            invoker,
            site: properties.terminus_site.clone(),
            env: properties.terminus_env.clone(),
            site_env: properties.terminus_site_env.clone(),
            dev_alias: settings.environment.dev_alias.clone(),
        }
    }

    /// Combined `<site>.<env>` identifier every call is scoped to.
    pub fn site_env(&self) -> &str {
        &self.site_env
    }

    /// Describe `terminus <subcommand> <site>.<env>` call.
    pub fn command(&self, subcommand: impl Into<OsString>) -> Syscall {
        Syscall::new(Tool::Terminus)
            .arg(subcommand)
            .arg(&self.site_env)
    }

    /// Query environment info. Unsuccessful if environment does not exist.
    pub async fn env_info(&self) -> SyscallResult<Outcome> {
        self.run(self.command("env:info")).await
    }

    /// Wake environment up.
    pub async fn wake(&self) -> SyscallResult<Outcome> {
        self.run(self.command("env:wake")).await
    }

    /// Switch environment to git connection mode.
    pub async fn connection_git(&self) -> SyscallResult<Outcome> {
        self.run(self.command("connection:set").arg("git")).await
    }

    /// List domains of environment, one per line.
    pub async fn domain_list(&self) -> SyscallResult<Outcome> {
        let call = self
            .command("domain:list")
            .option("format", "list")
            .option("field", "id");
        self.run(call).await
    }

    /// Wipe database and files of environment.
    pub async fn wipe(&self) -> SyscallResult<Outcome> {
        self.run(self.command("env:wipe").arg("--yes")).await
    }

    /// Run WP-CLI on environment.
    pub async fn remote_wp(
        &self,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> SyscallResult<Outcome> {
        self.run(self.command("remote:wp").arg("--").args(args)).await
    }

    /// Create environment as a multidev branched off the development
    /// environment.
    pub async fn multidev_create(&self) -> SyscallResult<Outcome> {
        let call = Syscall::new(Tool::Terminus)
            .arg("multidev:create")
            .arg(format!("{}.{}", self.site, self.dev_alias))
            .arg(&self.env);
        self.run(call).await
    }

    /// Run any Terminus subcommand on environment.
    ///
    /// Extra arguments are passed after the `<site>.<env>` identifier.
    pub async fn passthrough(
        &self,
        subcommand: impl Into<OsString>,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> SyscallResult<Outcome> {
        self.run(self.command(subcommand).args(args)).await
    }

    async fn run(&self, call: Syscall) -> SyscallResult<Outcome> {
        self.invoker.invoke(&call).await
    }
}

/// Ask user a yes or no question.
pub trait Confirm {
    /// Ask question, answering `true` for yes.
    ///
    /// # Errors
    ///
    /// - Return [`HostingError::Prompt`] if the question cannot be asked.
    fn confirm(&self, message: &str) -> Result<bool>;
}

/// Ask through interactive terminal prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct InquireConfirm;

impl Confirm for InquireConfirm {
    fn confirm(&self, message: &str) -> Result<bool> {
        Ok(inquire::Confirm::new(message).with_default(false).prompt()?)
    }
}

/// Options for [`remote_deploy`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemoteDeployOptions {
    /// Run remote install after deployment.
    pub install: bool,

    /// Answer yes to every question.
    pub yes: bool,

    /// Branch to deploy instead of the project's branch.
    pub target_branch: Option<String>,

    /// Plugins to activate on remote install.
    pub plugins: Vec<String>,
}

/// Result of a remote deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDeployReport {
    /// Report of deployment pipeline.
    pub deploy: DeployReport,

    /// Report of remote install, if one was requested.
    pub install: Option<InstallReport>,
}

/// Deploy project to its hosting environment.
///
/// Creates the environment as a multidev if it does not exist yet, asking
/// first unless told to answer yes. The environment is always woken up and
/// switched to git mode before the deployment pipeline runs.
///
/// # Errors
///
/// - Return [`HostingError::Declined`] if user declines environment creation.
/// - Return [`HostingError::Syscall`] if a Terminus call fails.
/// - Return [`HostingError::Deploy`] if deployment pipeline fails.
/// - Return [`HostingError::Install`] if remote install cannot run.
#[instrument(skip_all, level = "debug")]
pub async fn remote_deploy<I, C>(
    invoker: &I,
    confirm: &C,
    properties: &ProjectProperties,
    settings: &Settings,
    opts: &RemoteDeployOptions,
) -> Result<RemoteDeployReport>
where
    I: Invoker,
    C: Confirm,
{
    remote_deploy_in(invoker, confirm, properties, settings, opts, deploy_tmp_dir()).await
}

pub(crate) async fn remote_deploy_in<I, C>(
    invoker: &I,
    confirm: &C,
    properties: &ProjectProperties,
    settings: &Settings,
    opts: &RemoteDeployOptions,
    tmp_dir: PathBuf,
) -> Result<RemoteDeployReport>
where
    I: Invoker,
    C: Confirm,
{
    let mut properties = properties.clone();
    if let Some(branch) = &opts.target_branch {
        properties.set_terminus_env(environment_name(branch, settings));
    }

    let terminus = Terminus::new(invoker, &properties, settings);
    if !terminus.env_info().await?.success {
        warn!("no environment {}", terminus.site_env());
        if !opts.yes && !confirm.confirm("No matching multidev found. Create it?")? {
            return Err(HostingError::Declined {
                site_env: terminus.site_env().to_string(),
            });
        }

        info!("create multidev {}", terminus.site_env());
        terminus.multidev_create().await?.into_result()?;
    }

    terminus.wake().await?.into_result()?;
    terminus.connection_git().await?.into_result()?;

    let deploy = deploy_in(
        invoker,
        &properties,
        settings,
        opts.target_branch.as_deref(),
        tmp_dir,
    )
    .await?;

    let install = if opts.install {
        Some(remote_install(invoker, &properties, settings, &opts.plugins).await?)
    } else {
        None
    };

    Ok(RemoteDeployReport { deploy, install })
}

/// Hosting platform error types.
#[derive(Debug, thiserror::Error)]
pub enum HostingError {
    /// User declined to create missing environment.
    #[error("declined to create environment {site_env}")]
    Declined { site_env: String },

    /// Confirmation prompt fails.
    #[error(transparent)]
    Prompt(#[from] inquire::InquireError),

    /// Terminus call fails.
    #[error(transparent)]
    Syscall(#[from] SyscallError),

    /// Deployment pipeline fails.
    #[error(transparent)]
    Deploy(#[from] DeployError),

    /// Remote install cannot run.
    #[error(transparent)]
    Install(#[from] SiteError),
}

/// Friendly result alias :3
pub type Result<T, E = HostingError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{project::Environment, syscall::fake::RecordingInvoker};
    use pretty_assertions::assert_eq;

    struct Answer(bool);

    impl Confirm for Answer {
        fn confirm(&self, _: &str) -> Result<bool> {
            Ok(self.0)
        }
    }

    fn properties(dir: &std::path::Path) -> anyhow::Result<ProjectProperties> {
        std::fs::write(
            dir.join(".env"),
            "PROJECT=acme\nBRANCH=master\nHOST_REPO=ssh://git@host/acme.git\n",
        )?;
        Ok(ProjectProperties::load(
            dir,
            &Settings::default(),
            &Environment::new(),
        )?)
    }

    #[tokio::test]
    async fn terminus_scopes_calls_to_site_env() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let properties = properties(dir.path())?;
        let invoker = RecordingInvoker::new();
        let terminus = Terminus::new(&invoker, &properties, &Settings::default());

        terminus.domain_list().await?;
        terminus.remote_wp(["rewrite", "flush"]).await?;
        terminus.passthrough("backup:create", ["--element=db"]).await?;

        let expect = vec![
            "terminus 'domain:list' 'acme.dev' '--format=list' '--field=id'",
            "terminus 'remote:wp' 'acme.dev' -- rewrite flush",
            "terminus 'backup:create' 'acme.dev' '--element=db'",
        ];
        assert_eq!(invoker.lines(), expect);

        Ok(())
    }

    #[tokio::test]
    async fn remote_deploy_declined_stops_before_deploying() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let properties = properties(dir.path())?;
        let invoker = RecordingInvoker::new().fail("terminus 'env:info'", "not found");
        let opts = RemoteDeployOptions {
            target_branch: Some("feature-x".into()),
            ..Default::default()
        };

        let result = remote_deploy_in(
            &invoker,
            &Answer(false),
            &properties,
            &Settings::default(),
            &opts,
            dir.path().join("tmp"),
        )
        .await;
        assert!(
            matches!(result, Err(HostingError::Declined { ref site_env }) if site_env == "acme.feature-x")
        );
        assert_eq!(invoker.lines(), vec!["terminus 'env:info' 'acme.feature-x'"]);

        Ok(())
    }

    #[tokio::test]
    async fn remote_deploy_creates_missing_multidev() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let properties = properties(dir.path())?;
        let invoker = RecordingInvoker::new().fail("terminus 'env:info'", "not found");
        let opts = RemoteDeployOptions {
            yes: true,
            target_branch: Some("feature-x".into()),
            ..Default::default()
        };

        let report = remote_deploy_in(
            &invoker,
            &Answer(false),
            &properties,
            &Settings::default(),
            &opts,
            dir.path().join("tmp"),
        )
        .await?;
        assert_eq!(report.deploy.branch, "feature-x");
        assert_eq!(report.install, None);

        let lines = invoker.lines();
        let expect = vec![
            "terminus 'env:info' 'acme.feature-x'",
            "terminus 'multidev:create' 'acme.dev' feature-x",
            "terminus 'env:wake' 'acme.feature-x'",
            "terminus 'connection:set' 'acme.feature-x' git",
        ];
        assert_eq!(&lines[..4], &expect[..]);
        assert_eq!(lines.last().map(String::as_str), Some("git push origin feature-x"));

        Ok(())
    }

    #[tokio::test]
    async fn remote_deploy_existing_environment_skips_prompt() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let properties = properties(dir.path())?;
        let invoker = RecordingInvoker::new();

        // Answer is never asked for.
        let report = remote_deploy_in(
            &invoker,
            &Answer(false),
            &properties,
            &Settings::default(),
            &RemoteDeployOptions::default(),
            dir.path().join("tmp"),
        )
        .await?;
        assert_eq!(report.deploy.branch, "master");

        let lines = invoker.lines();
        assert_eq!(lines[0], "terminus 'env:info' 'acme.dev'");
        assert_eq!(lines[1], "terminus 'env:wake' 'acme.dev'");

        Ok(())
    }

    #[tokio::test]
    async fn remote_deploy_with_install_runs_remote_install() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let properties = properties(dir.path())?;
        let invoker =
            RecordingInvoker::new().respond("terminus 'domain:list'", "dev-acme.pantheonsite.io\n");
        let opts = RemoteDeployOptions {
            install: true,
            ..Default::default()
        };

        let report = remote_deploy_in(
            &invoker,
            &Answer(true),
            &properties,
            &Settings::default(),
            &opts,
            dir.path().join("tmp"),
        )
        .await?;
        let install = report.install.ok_or_else(|| anyhow::anyhow!("no install report"))?;
        assert!(install.outcome.success);
        assert_eq!(install.admin_user, "acme_admin");
        assert!(invoker
            .lines()
            .iter()
            .any(|line| line == "terminus 'env:wipe' 'acme.dev' --yes"));

        Ok(())
    }
}

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use wptask::{
    config::Settings,
    deploy::{deploy, staged_files},
    hosting::{remote_deploy, InquireConfirm, RemoteDeployOptions, Terminus},
    project::{Environment, ProjectProperties},
    site::{
        self, configure, init, install, remote_install, remote_test, ConfigureOptions,
        InstallOptions, InstallReport, TestOptions, DEFAULT_PORT,
    },
    syscall::{Outcome, SystemInvoker},
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{ffi::OsString, path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  wptask [options] <wptask-command>\n  wptask [options] <terminus-command> [args]...",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Top-level directory of project.
    #[arg(short, long, global = true, value_name = "path")]
    pub dir: Option<PathBuf>,

    /// Give up on external commands after this many seconds.
    #[arg(short, long, global = true, value_name = "secs")]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let working_dir = match self.dir {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        let mut settings = Settings::load(&working_dir)?;
        if self.timeout.is_some() {
            settings.timeout_secs = self.timeout;
        }

        // INVARIANT: Init works on the starter project, which has no valid
        // properties yet.
        if matches!(self.command, Command::Init) {
            return run_init(working_dir);
        }

        let environment = Environment::from_process();
        let properties = ProjectProperties::load(&working_dir, &settings, &environment)?;
        let invoker = SystemInvoker::new(settings.tools.clone(), settings.timeout());
        let ctx = Context {
            properties,
            settings,
            invoker,
        };

        match self.command {
            // Handled above.
            Command::Init => Ok(()),
            Command::Configure(opts) => run_configure(ctx, opts),
            Command::Deploy(opts) => run_deploy(ctx, opts).await,
            Command::Install(opts) => run_install(ctx, opts).await,
            Command::Info => run_info(ctx),
            Command::Test(opts) => run_test(ctx, opts).await,
            Command::Run(opts) => run_server(ctx, opts),
            Command::RemoteDeploy(opts) => run_remote_deploy(ctx, opts).await,
            Command::RemoteInstall(opts) => run_remote_install(ctx, opts).await,
            Command::RemoteTest(opts) => run_remote_test(ctx, opts).await,
            Command::Terminus(args) => run_terminus(ctx, args).await,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Turn fresh copy of the starter project into a real project.
    #[command(override_usage = "wptask init")]
    Init,

    /// Write machine configuration into the .env file.
    #[command(override_usage = "wptask configure [options]")]
    Configure(ConfigureCommand),

    /// Deploy site into its host repository.
    #[command(override_usage = "wptask deploy [options] [<target_branch>]")]
    Deploy(DeployCommand),

    /// Install WordPress locally from scratch.
    #[command(override_usage = "wptask install [options]")]
    Install(InstallCommand),

    /// Show resolved project properties and settings.
    #[command(override_usage = "wptask info")]
    Info,

    /// Run behavior tests locally.
    #[command(override_usage = "wptask test [options]")]
    Test(TestCommand),

    /// Serve site through PHP's built-in web server in the background.
    #[command(override_usage = "wptask run [options]")]
    Run(RunCommand),

    /// Deploy site to its Pantheon environment.
    #[command(override_usage = "wptask remote-deploy [options]")]
    RemoteDeploy(RemoteDeployCommand),

    /// Install WordPress from scratch on Pantheon.
    #[command(override_usage = "wptask remote-install [options]")]
    RemoteInstall(RemoteInstallCommand),

    /// Run behavior tests against Pantheon environment.
    #[command(override_usage = "wptask remote-test [options]")]
    RemoteTest(RemoteTestCommand),

    /// Run Terminus subcommand on Pantheon environment of project.
    #[command(external_subcommand)]
    Terminus(Vec<OsString>),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ConfigureCommand {
    /// Database password, NULL for an empty password.
    #[arg(long, value_name = "password")]
    pub db_password: Option<String>,

    /// Database user.
    #[arg(long, value_name = "user")]
    pub db_user: Option<String>,

    /// Database name.
    #[arg(long, value_name = "name")]
    pub db_name: Option<String>,

    /// Database host.
    #[arg(long, value_name = "host")]
    pub db_host: Option<String>,

    /// Branch being worked on.
    #[arg(long, value_name = "branch")]
    pub branch: Option<String>,

    /// Base URL of local site.
    #[arg(long, value_name = "url")]
    pub url: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DeployCommand {
    /// Branch to deploy instead of the project's branch.
    #[arg(value_name = "target_branch")]
    pub target_branch: Option<String>,

    /// List files that would be staged without deploying anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InstallCommand {
    /// Plugins to activate instead of the configured ones.
    #[arg(short, long, value_delimiter = ',', value_name = "plugin")]
    pub plugins: Vec<String>,

    /// Empty uploads directory first.
    #[arg(long)]
    pub clear_uploads: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct TestCommand {
    /// Single feature file to run, e.g., features/user.feature.
    #[arg(short, long, value_name = "feature")]
    pub feature: Option<String>,

    /// Behat profile to run with.
    #[arg(short, long, value_name = "profile")]
    pub profile: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RunCommand {
    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, value_name = "port")]
    pub port: u16,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RemoteDeployCommand {
    /// Run remote install after deploying.
    #[arg(short, long)]
    pub install: bool,

    /// Answer yes to every question.
    #[arg(short, long)]
    pub yes: bool,

    /// Branch to deploy instead of the project's branch.
    #[arg(long, value_name = "branch")]
    pub target_branch: Option<String>,

    /// Plugins to activate on remote install.
    #[arg(short, long, value_delimiter = ',', value_name = "plugin")]
    pub plugins: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RemoteInstallCommand {
    /// Plugins to activate instead of the configured ones.
    #[arg(short, long, value_delimiter = ',', value_name = "plugin")]
    pub plugins: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RemoteTestCommand {
    /// Single feature file to run, e.g., features/user.feature.
    #[arg(short, long, value_name = "feature")]
    pub feature: Option<String>,
}

struct Context {
    properties: ProjectProperties,
    settings: Settings,
    invoker: SystemInvoker,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

fn run_init(working_dir: PathBuf) -> Result<()> {
    let name = init(working_dir)?;
    info!("project initialized as {name}");

    Ok(())
}

fn run_configure(mut ctx: Context, opts: ConfigureCommand) -> Result<()> {
    let opts = ConfigureOptions {
        db_password: opts.db_password,
        db_user: opts.db_user,
        db_name: opts.db_name,
        db_host: opts.db_host,
        branch: opts.branch,
        url: opts.url,
    };
    configure(&mut ctx.properties, &ctx.settings, &opts)?;

    Ok(())
}

async fn run_deploy(ctx: Context, opts: DeployCommand) -> Result<()> {
    if opts.dry_run {
        for path in staged_files(&ctx.properties.working_dir, &ctx.settings)? {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let report = deploy(
        &ctx.invoker,
        &ctx.properties,
        &ctx.settings,
        opts.target_branch.as_deref(),
    )
    .await?;
    info!("staging left at {:?}", report.tmp_dir.display());

    Ok(())
}

async fn run_install(ctx: Context, opts: InstallCommand) -> Result<()> {
    let opts = InstallOptions {
        plugins: opts.plugins,
        clear_uploads: opts.clear_uploads,
    };
    let report = install(&ctx.invoker, &ctx.properties, &ctx.settings, &opts).await?;
    finish_install(report)
}

fn run_info(ctx: Context) -> Result<()> {
    site::info(&ctx.properties, &ctx.settings);

    Ok(())
}

async fn run_test(ctx: Context, opts: TestCommand) -> Result<()> {
    let opts = TestOptions {
        feature: opts.feature,
        profile: opts.profile,
    };
    let outcome = site::test(&ctx.invoker, &ctx.properties, &ctx.settings, &opts).await?;
    finish(outcome)
}

fn run_server(ctx: Context, opts: RunCommand) -> Result<()> {
    site::run(&ctx.invoker, &ctx.properties, opts.port)?;

    Ok(())
}

async fn run_remote_deploy(ctx: Context, opts: RemoteDeployCommand) -> Result<()> {
    let opts = RemoteDeployOptions {
        install: opts.install,
        yes: opts.yes,
        target_branch: opts.target_branch,
        plugins: opts.plugins,
    };
    let report = remote_deploy(
        &ctx.invoker,
        &InquireConfirm,
        &ctx.properties,
        &ctx.settings,
        &opts,
    )
    .await?;
    info!("staging left at {:?}", report.deploy.tmp_dir.display());

    match report.install {
        Some(install) => finish_install(install),
        None => Ok(()),
    }
}

async fn run_remote_install(ctx: Context, opts: RemoteInstallCommand) -> Result<()> {
    let report =
        remote_install(&ctx.invoker, &ctx.properties, &ctx.settings, &opts.plugins).await?;
    finish_install(report)
}

async fn run_remote_test(ctx: Context, opts: RemoteTestCommand) -> Result<()> {
    let outcome =
        remote_test(&ctx.invoker, &ctx.properties, &ctx.settings, opts.feature).await?;
    finish(outcome)
}

async fn run_terminus(ctx: Context, args: Vec<OsString>) -> Result<()> {
    let terminus = Terminus::new(&ctx.invoker, &ctx.properties, &ctx.settings);
    let mut args = args.into_iter();
    let subcommand = args.next().unwrap_or_default();
    let outcome = terminus.passthrough(subcommand, args).await?;
    print!("{}", outcome.stdout);

    finish(outcome)
}

fn finish_install(report: InstallReport) -> Result<()> {
    finish(report.outcome)
}

fn finish(outcome: Outcome) -> Result<()> {
    outcome.into_result()?;

    Ok(())
}

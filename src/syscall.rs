// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External command invocation.
//!
//! Every task in wptask boils down to calling some external tool: Composer,
//! WP-CLI, Git, rsync, Terminus, Behat, or PHP itself. A [`Syscall`] describes
//! one such call, and an [`Invoker`] runs it.
//!
//! A non-zero exit status is _not_ an error at this layer. It comes back as an
//! unsuccessful [`Outcome`] so each caller can decide whether to stop or keep
//! going. Call [`Outcome::into_result`] to stop on failure.

use crate::config::ToolPaths;

use indicatif::{ProgressBar, ProgressStyle};
use std::{
    ffi::{OsStr, OsString},
    fmt::{Display, Formatter, Result as FmtResult},
    future::Future,
    path::{Path, PathBuf},
    process::{Output, Stdio},
    time::Duration,
};
use tokio::process::Command;
use tracing::{debug, instrument};

/// External tools that wptask knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Composer,
    Wp,
    Git,
    Rsync,
    Terminus,
    Behat,
    Php,
}

impl Tool {
    /// Name of tool as typed on a command line.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Composer => "composer",
            Self::Wp => "wp",
            Self::Git => "git",
            Self::Rsync => "rsync",
            Self::Terminus => "terminus",
            Self::Behat => "behat",
            Self::Php => "php",
        }
    }

    /// Resolve tool to its configured binary.
    pub fn resolve<'a>(&self, paths: &'a ToolPaths) -> &'a str {
        match self {
            Self::Composer => &paths.composer,
            Self::Wp => &paths.wp,
            Self::Git => &paths.git,
            Self::Rsync => &paths.rsync,
            Self::Terminus => &paths.terminus,
            Self::Behat => &paths.behat,
            Self::Php => &paths.php,
        }
    }
}

/// Description of one external command call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syscall {
    tool: Tool,
    args: Vec<OsString>,
    dir: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
}

impl Syscall {
    /// Construct new call to tool without any arguments.
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            args: Vec::new(),
            dir: None,
            envs: Vec::new(),
        }
    }

    /// Append argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append listing of arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append `--name=value` option.
    pub fn option(self, name: impl AsRef<str>, value: impl AsRef<OsStr>) -> Self {
        let mut option = OsString::from(format!("--{}=", name.as_ref()));
        option.push(value.as_ref());
        self.arg(option)
    }

    /// Run inside target directory instead of current working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Set environment variable for this call only.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn get_dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn get_envs(&self) -> &[(OsString, OsString)] {
        &self.envs
    }
}

impl Display for Syscall {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.tool.name())?;
        for arg in &self.args {
            write!(fmt, " {}", quote_arg(&arg.to_string_lossy()))?;
        }

        Ok(())
    }
}

/// Result of a finished external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Command line that produced this outcome.
    pub command: String,

    /// Whether command exited successfully.
    pub success: bool,

    /// Captured standard output.
    pub stdout: String,

    /// Captured standard error.
    pub stderr: String,
}

impl Outcome {
    /// Construct outcome from process output.
    pub fn new(command: impl Into<String>, output: Output) -> Self {
        Self {
            command: command.into(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(output.stdout.as_slice()).into_owned(),
            stderr: String::from_utf8_lossy(output.stderr.as_slice()).into_owned(),
        }
    }

    /// Standard output with trailing whitespace chomped.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim_end()
    }

    /// Treat unsuccessful outcome as an error.
    ///
    /// # Errors
    ///
    /// - Return [`SyscallError::Failed`] if command exited unsuccessfully.
    pub fn into_result(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(SyscallError::Failed(Box::new(self)))
        }
    }
}

/// Run external commands.
pub trait Invoker: Send + Sync {
    /// Run command to completion, and capture its output.
    ///
    /// # Errors
    ///
    /// - Return [`SyscallError::Spawn`] if command cannot be started.
    /// - Return [`SyscallError::Timeout`] if command outlived the timeout.
    fn invoke(&self, call: &Syscall) -> impl Future<Output = Result<Outcome>> + Send;

    /// Start command in the background, and forget about it.
    ///
    /// The spawned process is never awaited or tracked afterwards.
    ///
    /// # Errors
    ///
    /// - Return [`SyscallError::Spawn`] if command cannot be started.
    fn spawn_detached(&self, call: &Syscall) -> Result<()>;
}

/// Invoke tools installed on the system.
#[derive(Debug, Clone, Default)]
pub struct SystemInvoker {
    paths: ToolPaths,
    timeout: Option<Duration>,
}

impl SystemInvoker {
    /// Construct new system invoker.
    ///
    /// No timeout is applied when `timeout` is `None`.
    pub fn new(paths: ToolPaths, timeout: Option<Duration>) -> Self {
        Self { paths, timeout }
    }

    fn command(&self, call: &Syscall) -> Command {
        let mut command = Command::new(call.tool().resolve(&self.paths));
        command
            .args(call.get_args())
            .envs(call.get_envs().iter().map(|(key, value)| (key, value)));
        if let Some(dir) = call.get_dir() {
            command.current_dir(dir);
        }

        command
    }
}

impl Invoker for SystemInvoker {
    #[instrument(skip(self, call), level = "debug")]
    async fn invoke(&self, call: &Syscall) -> Result<Outcome> {
        let line = call.to_string();
        debug!("run {line}");

        let mut command = self.command(call);
        command.stdin(Stdio::null()).kill_on_drop(true);

        let bar = spinner(&line)?;
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| SyscallError::Timeout {
                    command: line.clone(),
                    limit,
                })?,
            None => command.output().await,
        };
        bar.finish_and_clear();

        let output = output.map_err(|err| SyscallError::Spawn {
            source: err,
            command: line.clone(),
        })?;
        let outcome = Outcome::new(line, output);
        if !outcome.stdout.is_empty() {
            debug!("stdout: {}", outcome.stdout_trimmed());
        }
        if !outcome.stderr.is_empty() {
            debug!("stderr: {}", outcome.stderr.trim_end());
        }

        Ok(outcome)
    }

    fn spawn_detached(&self, call: &Syscall) -> Result<()> {
        let line = call.to_string();
        debug!("spawn detached {line}");

        let mut command = std::process::Command::new(call.tool().resolve(&self.paths));
        command
            .args(call.get_args())
            .envs(call.get_envs().iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = call.get_dir() {
            command.current_dir(dir);
        }

        // INVARIANT: Drop child handle without waiting on it.
        command.spawn().map_err(|err| SyscallError::Spawn {
            source: err,
            command: line,
        })?;

        Ok(())
    }
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let bar = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{elapsed_precise:.green}  {spinner:.yellow}  {msg}")?;
    bar.set_style(style);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));

    Ok(bar)
}

/// Quote argument for safe interpolation into a shell command line.
///
/// Arguments made of word characters and hyphens are passed through
/// unmodified. Everything else is wrapped in single quotes.
pub fn quote_arg(arg: &str) -> String {
    let is_safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if is_safe {
        return arg.to_string();
    }

    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// External command error types.
#[derive(Debug, thiserror::Error)]
pub enum SyscallError {
    /// Command cannot be started.
    #[error("failed to run {command}")]
    Spawn {
        #[source]
        source: std::io::Error,
        command: String,
    },

    /// Command did not finish in time.
    #[error("{command} timed out after {}s", .limit.as_secs())]
    Timeout { command: String, limit: Duration },

    /// Command exited unsuccessfully.
    #[error("{} failed:\n{}", .0.command, .0.stderr.trim_end())]
    Failed(Box<Outcome>),

    /// Style template cannot be set for spinners.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
pub type Result<T, E = SyscallError> = std::result::Result<T, E>;


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn syscall_display_quotes_unsafe_args() {
        let call = Syscall::new(Tool::Git)
            .args(["log", "--no-merges"])
            .option("pretty", "format:%h %s");
        assert_eq!(call.to_string(), "git log --no-merges '--pretty=format:%h %s'");
    }

    #[test]
    fn quote_arg_passes_safe_identifiers_through() {
        assert_eq!(quote_arg("release-1_x"), "release-1_x");
        assert_eq!(quote_arg("/var/www"), "'/var/www'");
        assert_eq!(quote_arg("it's"), r"'it'\''s'");
        assert_eq!(quote_arg(""), "''");
    }

    #[test]
    fn outcome_into_result_keeps_stderr() {
        let outcome = Outcome {
            command: "git push origin qa".into(),
            success: false,
            stdout: String::new(),
            stderr: "rejected\n".into(),
        };

        let error = outcome.into_result().unwrap_err();
        assert_eq!(error.to_string(), "git push origin qa failed:\nrejected");
    }

    #[tokio::test]
    async fn system_invoker_reports_exit_status() -> anyhow::Result<()> {
        let paths = ToolPaths {
            git: "true".into(),
            rsync: "false".into(),
            ..ToolPaths::default()
        };
        let invoker = SystemInvoker::new(paths, Some(Duration::from_secs(30)));

        let outcome = invoker.invoke(&Syscall::new(Tool::Git)).await?;
        assert!(outcome.success);

        let outcome = invoker.invoke(&Syscall::new(Tool::Rsync)).await?;
        assert!(!outcome.success);

        Ok(())
    }

    #[tokio::test]
    async fn system_invoker_enforces_timeout() {
        let paths = ToolPaths {
            php: "sleep".into(),
            ..ToolPaths::default()
        };
        let invoker = SystemInvoker::new(paths, Some(Duration::from_millis(100)));

        let result = invoker.invoke(&Syscall::new(Tool::Php).arg("5")).await;
        assert!(matches!(result, Err(SyscallError::Timeout { .. })));
    }
}

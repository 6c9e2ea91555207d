// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Persisted environment file handling.
//!
//! WordPress projects built on Bedrock keep their per-machine configuration
//! in an untracked `.env` file at the top-level of the project. A checked-in
//! `.env.example` template provides the starting point for new machines.
//!
//! # Environment File Layout
//!
//! The environment file is a plain listing of `KEY=value` lines. Blank lines
//! and comments are allowed, and values may be single or double quoted.
//! Parsing for reading values is delegated to [`dotenvy`]. Writing is done
//! through [`EnvEdit`], which only touches the lines of keys it sets so that
//! comments and ordering survive every edit.

use crate::path::{ENV_FILE, ENV_TEMPLATE_FILE};

use rand::{distributions::Alphanumeric, Rng};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// WordPress authentication keys and salts.
pub const SALT_KEYS: [&str; 8] = [
    "AUTH_KEY",
    "SECURE_AUTH_KEY",
    "LOGGED_IN_KEY",
    "NONCE_KEY",
    "AUTH_SALT",
    "SECURE_AUTH_SALT",
    "LOGGED_IN_SALT",
    "NONCE_SALT",
];

/// Manage key/value pairs in the persisted environment file.
#[derive(Clone, Debug)]
pub struct EnvFile {
    path: PathBuf,
}

impl EnvFile {
    /// Open environment file of project.
    ///
    /// Seeds a new environment file from the template with freshly generated
    /// salts if it does not exist yet. Starts from an empty file if the
    /// template is missing too.
    ///
    /// # Errors
    ///
    /// - Return [`EnvFileError::Read`] if template cannot be read.
    /// - Return [`EnvFileError::Write`] if new environment file cannot be
    ///   written.
    pub fn open_or_seed(working_dir: impl AsRef<Path>) -> Result<Self> {
        let path = working_dir.as_ref().join(ENV_FILE);
        let env_file = Self { path };
        if env_file.path.exists() {
            return Ok(env_file);
        }

        let template = working_dir.as_ref().join(ENV_TEMPLATE_FILE);
        let content = if template.exists() {
            read_to_string(&template).map_err(|err| EnvFileError::Read {
                source: err,
                path: template.clone(),
            })?
        } else {
            String::new()
        };

        info!("initialize {:?} with new salts", env_file.path.display());
        let mut edit = EnvEdit::from(content);
        for key in SALT_KEYS {
            edit.set(key, generate_salt());
        }
        env_file.write(&edit)?;

        Ok(env_file)
    }

    /// Edit key/value pairs.
    ///
    /// Read current content into [`EnvEdit`] instance, and directly edit each
    /// pair before writing the results back into the environment file.
    ///
    /// # Errors
    ///
    /// - Return [`EnvFileError::Read`] if environment file cannot be read.
    /// - Return [`EnvFileError::Write`] if environment file cannot be
    ///   written.
    pub fn edit<E>(&self, editor: E) -> Result<()>
    where
        E: FnOnce(&mut EnvEdit),
    {
        let content = read_to_string(&self.path).map_err(|err| EnvFileError::Read {
            source: err,
            path: self.path.clone(),
        })?;

        let mut edit = EnvEdit::from(content);
        editor(&mut edit);

        if !edit.changed {
            debug!("{:?} unchanged", self.path.display());
            return Ok(());
        }

        self.write(&edit)
    }

    /// Parse current key/value pairs.
    ///
    /// # Errors
    ///
    /// - Return [`EnvFileError::Parse`] if environment file is malformed.
    pub fn pairs(&self) -> Result<BTreeMap<String, String>> {
        parse_env_file(&self.path)
    }

    fn write(&self, edit: &EnvEdit) -> Result<()> {
        write(&self.path, edit.to_string().as_bytes()).map_err(|err| EnvFileError::Write {
            source: err,
            path: self.path.clone(),
        })
    }
}

/// Parse key/value pairs out of environment file at target path.
///
/// Variable substitution is performed by [`dotenvy`] as it would for any
/// other `.env` file.
///
/// # Errors
///
/// - Return [`EnvFileError::Parse`] if environment file is missing or
///   malformed.
pub fn parse_env_file(path: impl AsRef<Path>) -> Result<BTreeMap<String, String>> {
    let path = path.as_ref();
    let to_error = |err| EnvFileError::Parse {
        source: err,
        path: path.to_path_buf(),
    };

    dotenvy::from_path_iter(path)
        .map_err(to_error)?
        .map(|item| item.map_err(to_error))
        .collect()
}

/// Environment file editor.
///
/// # Invariant
///
/// - Lines of keys that are not set through the editor are left untouched.
/// - Setting an existing key rewrites its last line in place, and drops
///   any earlier lines of that key.
/// - Setting a new key appends it to the end.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvEdit {
    lines: Vec<EnvLine>,
    changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EnvLine {
    Pair { key: String, line: String },
    Other(String),
}

impl EnvEdit {
    /// Construct new environment file editor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set value of key.
    ///
    /// Rewrites the last line of the key, since that is the one readers
    /// see. Earlier lines of the same key are dropped.
    pub fn set(&mut self, key: impl Into<String>, value: impl AsRef<str>) {
        let key = key.into();
        let line = format!("{key}={}", quote_value(value.as_ref()));

        let is_key = |entry: &EnvLine| {
            matches!(entry, EnvLine::Pair { key: current, .. } if *current == key)
        };
        let Some(last) = self.lines.iter().rposition(is_key) else {
            self.lines.push(EnvLine::Pair { key, line });
            self.changed = true;
            return;
        };

        let before = self.lines.len();
        let mut index = 0;
        self.lines.retain(|entry| {
            let keep = index >= last || !is_key(entry);
            index += 1;
            keep
        });
        let last = last - (before - self.lines.len());
        if before != self.lines.len() {
            self.changed = true;
        }

        if let EnvLine::Pair { line: current, .. } = &mut self.lines[last] {
            if *current != line {
                *current = line;
                self.changed = true;
            }
        }
    }
}

impl Display for EnvEdit {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        for entry in &self.lines {
            match entry {
                EnvLine::Pair { line, .. } | EnvLine::Other(line) => writeln!(fmt, "{line}")?,
            }
        }

        Ok(())
    }
}

impl From<String> for EnvEdit {
    fn from(content: String) -> Self {
        Self::from(content.as_str())
    }
}

impl From<&str> for EnvEdit {
    fn from(content: &str) -> Self {
        let lines = content
            .lines()
            .map(|line| match line_key(line) {
                Some(key) => EnvLine::Pair {
                    key: key.to_string(),
                    line: line.to_string(),
                },
                None => EnvLine::Other(line.to_string()),
            })
            .collect();

        Self {
            lines,
            changed: false,
        }
    }
}

fn line_key(line: &str) -> Option<&str> {
    let line = line.trim_start();
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, _) = line.split_once('=')?;
    let key = key.trim_end();

    let mut chars = key.chars();
    let head = chars.next()?;
    let is_key = (head.is_ascii_alphabetic() || head == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');

    is_key.then_some(key)
}

fn quote_value(value: &str) -> String {
    let is_bare = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_-./:@+,".contains(c));
    if is_bare {
        return value.to_string();
    }

    if !value.contains('\'') {
        return format!("'{value}'");
    }

    let mut quoted = String::from('"');
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');

    quoted
}

/// Generate one WordPress salt.
pub fn generate_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

/// Environment file error types.
#[derive(Debug, thiserror::Error)]
pub enum EnvFileError {
    /// Environment file cannot be read from.
    #[error("failed to read environment file at {:?}", .path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Environment file cannot be written to.
    #[error("failed to write environment file at {:?}", .path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Environment file cannot be parsed.
    #[error("failed to parse environment file at {:?}", .path.display())]
    Parse {
        #[source]
        source: dotenvy::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = EnvFileError> = std::result::Result<T, E>;

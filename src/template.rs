// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Text templating utilities.
//!
//! Rewrite project files in place through find/replace rules. Used when a
//! fresh copy of the starter project gets turned into a real project.

use regex::Regex;
use std::{
    fs::{read_to_string, write},
    path::PathBuf,
};
use tracing::{debug, info};

/// Find text between two markers.
///
/// Returns the span starting at the first occurrence of `start` through the
/// end of the first occurrence of `end`, both markers included. Returns an
/// empty string if either marker is missing, or if `end` comes before
/// `start`.
pub fn find_text_between<'a>(start: &str, end: &str, document: &'a str) -> &'a str {
    let (Some(start_pos), Some(end_pos)) = (document.find(start), document.find(end)) else {
        return "";
    };

    let end_pos = end_pos + end.len();
    if end_pos < start_pos {
        return "";
    }

    &document[start_pos..end_pos]
}

/// Find/replace rule for one file.
#[derive(Debug, Clone)]
pub struct Substitution {
    path: PathBuf,
    pattern: Pattern,
}

#[derive(Debug, Clone)]
enum Pattern {
    Literal { from: Vec<String>, to: Vec<String> },
    Regex { from: Regex, to: String },
}

impl Substitution {
    /// Construct literal rule.
    ///
    /// Each entry of `from` is replaced by the entry of `to` at the same
    /// position, in order.
    ///
    /// # Errors
    ///
    /// - Return [`TemplateError::LengthMismatch`] if `from` and `to` differ in
    ///   length.
    /// - Return [`TemplateError::EmptyPattern`] if any `from` entry is empty.
    pub fn literal(
        path: impl Into<PathBuf>,
        from: impl IntoIterator<Item = impl Into<String>>,
        to: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self> {
        let path = path.into();
        let from = from.into_iter().map(Into::into).collect::<Vec<String>>();
        let to = to.into_iter().map(Into::into).collect::<Vec<String>>();

        if from.len() != to.len() {
            return Err(TemplateError::LengthMismatch {
                path,
                from: from.len(),
                to: to.len(),
            });
        }

        if from.iter().any(String::is_empty) {
            return Err(TemplateError::EmptyPattern { path });
        }

        Ok(Self {
            path,
            pattern: Pattern::Literal { from, to },
        })
    }

    /// Construct regex rule.
    ///
    /// Replacement text may refer to capture groups, e.g., `$1`.
    ///
    /// # Errors
    ///
    /// - Return [`TemplateError::Regex`] if pattern is invalid.
    pub fn regex(
        path: impl Into<PathBuf>,
        from: impl AsRef<str>,
        to: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            path: path.into(),
            pattern: Pattern::Regex {
                from: Regex::new(from.as_ref())?,
                to: to.into(),
            },
        })
    }

    /// Apply rule to text.
    pub fn apply_to(&self, text: &str) -> String {
        match &self.pattern {
            Pattern::Literal { from, to } => from
                .iter()
                .zip(to)
                .fold(text.to_string(), |text, (from, to)| text.replace(from, to)),
            Pattern::Regex { from, to } => from.replace_all(text, to.as_str()).into_owned(),
        }
    }
}

/// Apply listing of find/replace rules to their files in place.
///
/// Rules are applied in order. Files are only written when their content
/// changed. Nothing is rolled back if a later rule fails.
///
/// # Errors
///
/// - Return [`TemplateError::Read`] if target file cannot be read.
/// - Return [`TemplateError::Write`] if target file cannot be written.
pub fn apply_substitutions<'a>(rules: impl IntoIterator<Item = &'a Substitution>) -> Result<()> {
    for rule in rules {
        let content = read_to_string(&rule.path).map_err(|err| TemplateError::Read {
            source: err,
            path: rule.path.clone(),
        })?;

        let result = rule.apply_to(&content);
        if result == content {
            debug!("no match in {:?}", rule.path.display());
            continue;
        }

        info!("rewrite {:?}", rule.path.display());
        write(&rule.path, result).map_err(|err| TemplateError::Write {
            source: err,
            path: rule.path.clone(),
        })?;
    }

    Ok(())
}

/// Text templating error types.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// Literal rule has unpaired patterns.
    #[error("rule for {:?} pairs {from} patterns with {to} replacements", .path.display())]
    LengthMismatch { path: PathBuf, from: usize, to: usize },

    /// Literal rule would replace an empty string.
    #[error("rule for {:?} has an empty pattern", .path.display())]
    EmptyPattern { path: PathBuf },

    /// Marker text cannot be found.
    #[error("marker {marker:?} not found in {:?}", .path.display())]
    MarkerNotFound { marker: String, path: PathBuf },

    /// Regex rule is invalid.
    #[error(transparent)]
    Regex(#[from] regex::Error),

    /// Target file cannot be read.
    #[error("failed to read {:?}", .path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Target file cannot be written.
    #[error("failed to write {:?}", .path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = TemplateError> = std::result::Result<T, E>;

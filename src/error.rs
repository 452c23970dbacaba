// LogLens - GPL-3.0-or-later
// This file is part of LogLens.
//
// Copyright (C) 2026 LogLens contributors
//
// LogLens is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// LogLens is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with LogLens.  If not, see <https://www.gnu.org/licenses/>.

//! Error taxonomy.
//!
//! Most per-line problems are absorbed where they occur and never
//! surface as errors: a line no parser recognizes becomes an unparsed
//! text line, invalid bytes degrade to lossy substitution (reported
//! once per source), and an oversized line is truncated with a marker.
//! Only two conditions carry a typed error: a source that cannot be
//! read at all ([`SourceError`], fatal for that source only) and a
//! rule with an invalid pattern ([`RuleError`], which disables that
//! rule and leaves its siblings untouched).

use std::path::{Path, PathBuf};
use thiserror::Error;

/// A source-level failure: the named source cannot be read.
///
/// Fatal for the offending source only; sibling sources in a merge
/// keep loading.
#[derive(Debug, Error)]
pub enum SourceError {
    /// I/O failure (missing file, permission denied, broken pipe).
    #[error("{path}: {source}", path = .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The path exists but is not a regular file.
    #[error("{path}: not a regular file", path = .path.display())]
    NotAFile { path: PathBuf },

    /// A load was requested while another producer owns the reader.
    #[error("reader is busy ({state}); stop the active load first")]
    Busy { state: &'static str },
}

impl SourceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The source this error belongs to, if it names one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Io { path, .. } | Self::NotAFile { path } => Some(path),
            Self::Busy { .. } => None,
        }
    }
}

/// An invalid user-supplied pattern in a filter rule or search query.
///
/// The offending rule never matches; other rules are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid pattern `{pattern}`: {message}")]
pub struct RuleError {
    pub pattern: String,
    pub message: String,
}

impl RuleError {
    pub fn new(pattern: impl Into<String>, message: impl ToString) -> Self {
        Self {
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }
}

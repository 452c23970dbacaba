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

//! Raw line sources: ordered `(text, origin)` sequences.
//!
//! The core is transport-agnostic. It requires in-order delivery per
//! source plus an origin label usable as a component fallback; files,
//! stdin pipes and in-memory buffers (the remote-API adapter boundary)
//! all satisfy that here.
//!
//! Decoding is best-effort: invalid UTF-8 degrades to replacement
//! characters, warned once per source, and a line over
//! [`MAX_LINE_BYTES`] is truncated with [`TRUNCATION_MARKER`] instead
//! of stalling the pipeline.
//!
//! Transport limitation: when log data arrives on stdin while
//! interactive control input must remain available, the embedder has
//! to separate the two transports itself (duplicate the stdin fd and
//! reopen the controlling tty on fd 0). On platforms without a
//! controlling tty that separation is impossible; that is a documented
//! limitation of the platform, not a silent failure of this crate.

use crate::error::SourceError;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Hard cap on a single line; anything longer is truncated.
pub const MAX_LINE_BYTES: usize = 512 * 1024;

/// Marker appended to lines cut by the size guard.
pub const TRUNCATION_MARKER: &str = " …[truncated]";

/// An ordered sequence of raw text lines with an origin label.
pub trait RawLineSource: Send {
    /// Label identifying this source (file stem, "stdin", ...).
    /// Used as the component fallback for merged streams.
    fn origin(&self) -> &str;

    /// The next line, without its trailing newline. `Ok(None)` means
    /// the source is exhausted; a live source that is merely idle
    /// returns `Ok(None)` too and may yield more lines later.
    fn read_line(&mut self) -> Result<Option<String>, SourceError>;
}

/// Per-source decode state: lossy substitution is reported once.
#[derive(Debug, Default)]
pub(crate) struct DecodeState {
    lossy_reported: bool,
}

impl DecodeState {
    /// Decode one raw line: strip the newline, substitute invalid
    /// bytes, and apply the size guard.
    pub(crate) fn decode(&mut self, mut bytes: Vec<u8>, origin: &str) -> String {
        if bytes.last() == Some(&b'\n') {
            bytes.pop();
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
        }

        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => {
                if !self.lossy_reported {
                    warn!(origin, "invalid UTF-8, substituting bad bytes");
                    self.lossy_reported = true;
                }
                String::from_utf8_lossy(err.as_bytes()).into_owned()
            }
        };

        guard_line_length(text, origin)
    }
}

/// Truncate an oversized line at a char boundary and mark it.
fn guard_line_length(mut text: String, origin: &str) -> String {
    if text.len() <= MAX_LINE_BYTES {
        return text;
    }
    let mut cut = MAX_LINE_BYTES;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    warn!(origin, length = text.len(), "oversized line truncated");
    text.truncate(cut);
    text.push_str(TRUNCATION_MARKER);
    text
}

/// A regular file read line by line.
#[derive(Debug)]
pub struct FileSource {
    origin: String,
    path: PathBuf,
    reader: BufReader<File>,
    decode: DecodeState,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let metadata =
            std::fs::metadata(path).map_err(|e| SourceError::io(path, e))?;
        if !metadata.is_file() {
            return Err(SourceError::NotAFile {
                path: path.to_path_buf(),
            });
        }
        let file = File::open(path).map_err(|e| SourceError::io(path, e))?;
        let origin = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            origin,
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            decode: DecodeState::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RawLineSource for FileSource {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn read_line(&mut self) -> Result<Option<String>, SourceError> {
        let mut buf = Vec::new();
        let n = self
            .reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| SourceError::io(&self.path, e))?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.decode.decode(buf, &self.origin)))
    }
}

/// Standard input as a line source.
pub struct StdinSource {
    stdin: std::io::Stdin,
    decode: DecodeState,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            stdin: std::io::stdin(),
            decode: DecodeState::default(),
        }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RawLineSource for StdinSource {
    fn origin(&self) -> &str {
        "stdin"
    }

    fn read_line(&mut self) -> Result<Option<String>, SourceError> {
        let mut buf = Vec::new();
        let n = self
            .stdin
            .lock()
            .read_until(b'\n', &mut buf)
            .map_err(|e| SourceError::io("stdin", e))?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.decode.decode(buf, "stdin")))
    }
}

/// An in-memory source: the adapter boundary for remote log APIs and
/// the test double for everything else.
pub struct MemorySource {
    origin: String,
    lines: VecDeque<String>,
}

impl MemorySource {
    pub fn new(origin: impl Into<String>, lines: impl IntoIterator<Item = String>) -> Self {
        Self {
            origin: origin.into(),
            lines: lines.into_iter().collect(),
        }
    }
}

impl RawLineSource for MemorySource {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn read_line(&mut self) -> Result<Option<String>, SourceError> {
        Ok(self.lines.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_source_reads_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "first").unwrap();
        writeln!(file, "second").unwrap();
        write!(file, "third-no-newline").unwrap();
        file.flush().unwrap();

        let mut source = FileSource::open(file.path()).unwrap();
        assert_eq!(source.read_line().unwrap().as_deref(), Some("first"));
        assert_eq!(source.read_line().unwrap().as_deref(), Some("second"));
        assert_eq!(
            source.read_line().unwrap().as_deref(),
            Some("third-no-newline")
        );
        assert_eq!(source.read_line().unwrap(), None);
    }

    #[test]
    fn test_missing_file_is_source_error() {
        let err = FileSource::open(Path::new("/nonexistent/loglens-test")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/loglens-test"));
    }

    #[test]
    fn test_invalid_utf8_degrades_lossily() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"ok line\n\xff\xfe broken\n").unwrap();
        file.flush().unwrap();

        let mut source = FileSource::open(file.path()).unwrap();
        assert_eq!(source.read_line().unwrap().as_deref(), Some("ok line"));
        let bad = source.read_line().unwrap().unwrap();
        assert!(bad.contains('\u{fffd}'));
        assert!(bad.ends_with("broken"));
    }

    #[test]
    fn test_crlf_stripped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"windows line\r\n").unwrap();
        file.flush().unwrap();
        let mut source = FileSource::open(file.path()).unwrap();
        assert_eq!(source.read_line().unwrap().as_deref(), Some("windows line"));
    }

    #[test]
    fn test_oversized_line_truncated_with_marker() {
        let mut state = DecodeState::default();
        let big = vec![b'x'; MAX_LINE_BYTES + 100];
        let decoded = state.decode(big, "test");
        assert!(decoded.ends_with(TRUNCATION_MARKER));
        assert!(decoded.len() <= MAX_LINE_BYTES + TRUNCATION_MARKER.len());
    }

    #[test]
    fn test_memory_source_drains_once() {
        let mut source = MemorySource::new("remote", vec!["a".into(), "b".into()]);
        assert_eq!(source.origin(), "remote");
        assert_eq!(source.read_line().unwrap().as_deref(), Some("a"));
        assert_eq!(source.read_line().unwrap().as_deref(), Some("b"));
        assert_eq!(source.read_line().unwrap(), None);
    }
}

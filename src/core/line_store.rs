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

//! Append-only storage for parsed log lines.
//!
//! The store is the shared read substrate for every analysis engine.
//! Lines are appended by exactly one producer per source and never
//! rewritten or removed afterwards; that single invariant is what lets
//! filters, search, templates and anomaly scoring run over snapshots
//! without locking against the producers.

use crate::parser::LogLine;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Loading progress as published to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadProgress {
    /// Number of lines published so far. Monotonically increasing.
    pub loaded: usize,
    /// Whether the producer has finished (never set for live tails).
    pub complete: bool,
}

/// Central storage for parsed log lines.
///
/// Thread-safe: share it as `Arc<LineStore>`. Readers call
/// [`LineStore::snapshot`] and iterate the returned vector; appends
/// that land afterwards are simply not part of that snapshot.
#[derive(Debug, Default)]
pub struct LineStore {
    lines: RwLock<Vec<Arc<LogLine>>>,
    version: AtomicU64,
    complete: AtomicBool,
}

impl LineStore {
    /// Create a new empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append a single line. The line number must continue the dense
    /// 1-based sequence.
    pub fn append(&self, line: LogLine) {
        let mut guard = self.lines.write().unwrap();
        debug_assert_eq!(line.line_number, guard.len() + 1);
        guard.push(Arc::new(line));
        drop(guard);
        self.bump_version();
    }

    /// Append a batch of lines in one write.
    pub fn extend(&self, lines: Vec<LogLine>) {
        if lines.is_empty() {
            return;
        }
        let mut guard = self.lines.write().unwrap();
        debug_assert!(lines
            .first()
            .is_some_and(|l| l.line_number == guard.len() + 1));
        guard.extend(lines.into_iter().map(Arc::new));
        drop(guard);
        self.bump_version();
    }

    /// Number of lines currently published.
    pub fn len(&self) -> usize {
        self.lines.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.read().unwrap().is_empty()
    }

    /// The 1-based line number the producer should assign next.
    pub fn next_line_number(&self) -> usize {
        self.len() + 1
    }

    /// Get one line by 0-based index (`line_number - 1`).
    pub fn get(&self, index: usize) -> Option<Arc<LogLine>> {
        self.lines.read().unwrap().get(index).cloned()
    }

    /// A point-in-time view of all published lines.
    ///
    /// Cheap: clones the `Arc` per line, not the lines themselves.
    pub fn snapshot(&self) -> Vec<Arc<LogLine>> {
        self.lines.read().unwrap().clone()
    }

    /// Current version, bumped on every append.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Loading progress for UI display.
    pub fn progress(&self) -> LoadProgress {
        LoadProgress {
            loaded: self.len(),
            complete: self.complete.load(Ordering::SeqCst),
        }
    }

    /// Mark the producer as finished.
    pub fn mark_complete(&self) {
        self.complete.store(true, Ordering::SeqCst);
        self.bump_version();
    }

    fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }
}

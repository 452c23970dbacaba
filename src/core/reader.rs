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

//! Source reading: snapshot loads, multi-file merges, live tailing and
//! chunked background loading.
//!
//! One explicit state machine {Idle, Loading, Tailing, Paused,
//! Stopped} replaces ad hoc flags, with a single internal buffer for
//! paused tails. Exactly one producer appends to the store at any
//! time; merge sources parse into private vectors that the merge step
//! splices in as one batch. Background work checks the cancellation
//! flag between lines and batches and never leaves a partially
//! written line.

use crate::core::line_store::LineStore;
use crate::core::source::{DecodeState, FileSource, RawLineSource};
use crate::error::SourceError;
use crate::parser::{ParserChoice, ParserRegistry};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

/// Files above this size load chunked in the background.
pub const CHUNKED_THRESHOLD_BYTES: u64 = 1_000_000;

/// Lines parsed synchronously before chunked loading hands off, so
/// consumers get an immediate view.
pub const INITIAL_CHUNK_LINES: usize = 10_000;

/// Batch size for background chunk parsing.
pub const CHUNK_BATCH_LINES: usize = 50_000;

/// How often a tail polls an idle file for growth.
const TAIL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Reader lifecycle. All transitions go through [`SourceReader`];
/// anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// No producer active; loads may start.
    Idle,
    /// A snapshot, merge or chunked load is appending.
    Loading,
    /// A tail or stream is appending as lines arrive.
    Tailing,
    /// Tailing, but delivery is deferred to the internal buffer.
    Paused,
    /// Cancelled; the reader will not produce again.
    Stopped,
}

impl ReaderState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Tailing => "tailing",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }
}

/// Outcome of a multi-file merge: per-source failures abort only the
/// source they name.
#[derive(Debug)]
pub struct MergeReport {
    /// Total lines published by the merge.
    pub loaded: usize,
    /// Sources that could not be read, with their errors.
    pub failed: Vec<(PathBuf, SourceError)>,
}

/// Shared between the reader handle and its background worker.
/// Lock order: `state` before `buffer`.
struct Shared {
    state: Mutex<ReaderState>,
    buffer: Mutex<Vec<String>>,
    /// Parser choice the active tail delivers with; resume flushes
    /// buffered lines through the same one.
    choice: Mutex<ParserChoice>,
    cancel: AtomicBool,
}

/// Produces parsed lines into a [`LineStore`] from one source at a
/// time.
pub struct SourceReader {
    store: Arc<LineStore>,
    registry: Arc<ParserRegistry>,
    shared: Arc<Shared>,
    worker: Option<thread::JoinHandle<()>>,
}

impl SourceReader {
    pub fn new(store: Arc<LineStore>, registry: Arc<ParserRegistry>) -> Self {
        Self {
            store,
            registry,
            shared: Arc::new(Shared {
                state: Mutex::new(ReaderState::Idle),
                buffer: Mutex::new(Vec::new()),
                choice: Mutex::new(ParserChoice::Auto),
                cancel: AtomicBool::new(false),
            }),
            worker: None,
        }
    }

    pub fn state(&self) -> ReaderState {
        *self.shared.state.lock().unwrap()
    }

    /// Load a file to completion, blocking until done.
    pub fn load_snapshot(&mut self, path: &Path) -> Result<usize, SourceError> {
        self.begin(ReaderState::Loading)?;
        let result = self.read_and_parse(path, 1, None);
        match result {
            Ok(lines) => {
                let count = lines.len();
                self.store.extend(lines);
                self.store.mark_complete();
                self.set_state(ReaderState::Idle);
                info!(path = %path.display(), lines = count, "snapshot loaded");
                Ok(count)
            }
            Err(err) => {
                self.set_state(ReaderState::Idle);
                Err(err)
            }
        }
    }

    /// Pick snapshot or chunked loading based on file size.
    pub fn load_auto(&mut self, path: &Path) -> Result<(), SourceError> {
        let size = std::fs::metadata(path)
            .map_err(|e| SourceError::io(path, e))?
            .len();
        if size > CHUNKED_THRESHOLD_BYTES {
            self.load_chunked(path)
        } else {
            self.load_snapshot(path).map(|_| ())
        }
    }

    /// Merge several files by timestamp into one dense sequence.
    ///
    /// Sources parse independently (and concurrently); lines missing a
    /// component are tagged with their file stem. The merge is a
    /// stable sort on the parsed timestamp, so untimestamped lines
    /// keep per-file arrival order and ties resolve by declaration
    /// order. A source that fails aborts only itself.
    pub fn load_merged(&mut self, paths: &[PathBuf]) -> Result<MergeReport, SourceError> {
        self.begin(ReaderState::Loading)?;

        let results: Vec<(PathBuf, Result<Vec<crate::parser::LogLine>, SourceError>)> = paths
            .par_iter()
            .map(|path| (path.clone(), self.read_and_parse(path, 1, Some(path))))
            .collect();

        let mut merged = Vec::new();
        let mut failed = Vec::new();
        for (path, result) in results {
            match result {
                Ok(lines) => merged.extend(lines),
                Err(err) => {
                    error!(path = %path.display(), %err, "merge source failed");
                    failed.push((path, err));
                }
            }
        }

        merged.sort_by_key(|line| line.timestamp.unwrap_or(DateTime::<Utc>::MIN_UTC));
        for (index, line) in merged.iter_mut().enumerate() {
            line.line_number = index + 1;
        }

        let loaded = merged.len();
        self.store.extend(merged);
        self.store.mark_complete();
        self.set_state(ReaderState::Idle);
        info!(sources = paths.len(), lines = loaded, "merge loaded");
        Ok(MergeReport { loaded, failed })
    }

    /// Load a large file with an immediate synchronous prefix and a
    /// background remainder.
    ///
    /// The first [`INITIAL_CHUNK_LINES`] lines are parsed before this
    /// returns; the rest is parsed in [`CHUNK_BATCH_LINES`] batches on
    /// a background thread that only ever appends, so already
    /// published lines are never reordered or rewritten. Progress is
    /// visible through [`LineStore::progress`].
    pub fn load_chunked(&mut self, path: &Path) -> Result<(), SourceError> {
        self.begin(ReaderState::Loading)?;

        let mut raws = match read_all_raw_lines(path) {
            Ok(raws) => raws,
            Err(err) => {
                self.set_state(ReaderState::Idle);
                return Err(err);
            }
        };
        let choice = self.detect_choice(&raws);

        let initial_len = raws.len().min(INITIAL_CHUNK_LINES);
        let remainder = raws.split_off(initial_len);
        let initial = parse_batch(&self.registry, &raws, 1, choice);
        self.store.extend(initial);

        if remainder.is_empty() {
            self.store.mark_complete();
            self.set_state(ReaderState::Idle);
            return Ok(());
        }

        let store = Arc::clone(&self.store);
        let registry = Arc::clone(&self.registry);
        let shared = Arc::clone(&self.shared);
        let first_number = initial_len + 1;
        self.worker = Some(thread::spawn(move || {
            let mut next_number = first_number;
            for batch in remainder.chunks(CHUNK_BATCH_LINES) {
                if shared.cancel.load(Ordering::SeqCst) {
                    *shared.state.lock().unwrap() = ReaderState::Stopped;
                    debug!("chunked load cancelled");
                    return;
                }
                let lines = parse_batch(&registry, batch, next_number, choice);
                next_number += lines.len();
                store.extend(lines);
            }
            store.mark_complete();
            let mut state = shared.state.lock().unwrap();
            if *state == ReaderState::Loading {
                *state = ReaderState::Idle;
            }
        }));
        Ok(())
    }

    /// Load existing content, then follow the file for new lines.
    ///
    /// The watcher polls every 100ms, detects truncation (log
    /// rotation) and restarts from the top of the file.
    pub fn tail_file(&mut self, path: &Path) -> Result<(), SourceError> {
        self.begin(ReaderState::Loading)?;

        let mut follower = match TailFollower::open(path) {
            Ok(follower) => follower,
            Err(err) => {
                self.set_state(ReaderState::Idle);
                return Err(err);
            }
        };

        // Drain what is already there before following
        let mut raws = Vec::new();
        loop {
            match follower.next_line() {
                Ok(Some(raw)) => raws.push(raw),
                Ok(None) => break,
                Err(err) => {
                    self.set_state(ReaderState::Idle);
                    return Err(err);
                }
            }
        }
        let choice = self.detect_choice(&raws);
        *self.shared.choice.lock().unwrap() = choice;
        let initial = parse_batch(&self.registry, &raws, 1, choice);
        self.store.extend(initial);
        self.set_state(ReaderState::Tailing);

        let store = Arc::clone(&self.store);
        let registry = Arc::clone(&self.registry);
        let shared = Arc::clone(&self.shared);
        self.worker = Some(thread::spawn(move || loop {
            if shared.cancel.load(Ordering::SeqCst) {
                *shared.state.lock().unwrap() = ReaderState::Stopped;
                return;
            }
            match follower.next_line() {
                Ok(Some(raw)) => {
                    if !deliver(&store, &registry, &shared, choice, raw) {
                        return;
                    }
                }
                Ok(None) => thread::sleep(TAIL_POLL_INTERVAL),
                Err(err) => {
                    error!(%err, "tail aborted");
                    *shared.state.lock().unwrap() = ReaderState::Stopped;
                    return;
                }
            }
        }));
        Ok(())
    }

    /// Follow an arbitrary raw-line source (pipe, remote adapter).
    ///
    /// `Ok(None)` from the source ends the stream and completes the
    /// store; pause/resume behave exactly as for file tails.
    pub fn stream(&mut self, mut source: Box<dyn RawLineSource>) -> Result<(), SourceError> {
        self.begin(ReaderState::Tailing)?;

        // Per-line detection: a pipe cannot be sampled ahead of time
        let choice = ParserChoice::Auto;
        let store = Arc::clone(&self.store);
        let registry = Arc::clone(&self.registry);
        let shared = Arc::clone(&self.shared);
        self.worker = Some(thread::spawn(move || loop {
            if shared.cancel.load(Ordering::SeqCst) {
                *shared.state.lock().unwrap() = ReaderState::Stopped;
                return;
            }
            match source.read_line() {
                Ok(Some(raw)) => {
                    if !deliver(&store, &registry, &shared, choice, raw) {
                        return;
                    }
                }
                Ok(None) => {
                    store.mark_complete();
                    let mut state = shared.state.lock().unwrap();
                    if *state == ReaderState::Tailing || *state == ReaderState::Paused {
                        *state = ReaderState::Idle;
                    }
                    return;
                }
                Err(err) => {
                    error!(%err, "stream aborted");
                    *shared.state.lock().unwrap() = ReaderState::Stopped;
                    return;
                }
            }
        }));
        Ok(())
    }

    /// Defer delivery: new lines go to the internal buffer while the
    /// upstream source keeps being drained. Only valid while tailing.
    pub fn pause(&self) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        if *state == ReaderState::Tailing {
            *state = ReaderState::Paused;
            true
        } else {
            false
        }
    }

    /// Flush the pause buffer in arrival order, exactly once, and
    /// return to direct delivery. Only valid while paused.
    pub fn resume(&self) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        if *state != ReaderState::Paused {
            return false;
        }
        let choice = *self.shared.choice.lock().unwrap();
        let buffered = std::mem::take(&mut *self.shared.buffer.lock().unwrap());
        for raw in buffered {
            let line = self
                .registry
                .parse(self.store.next_line_number(), &raw, choice);
            self.store.append(line);
        }
        *state = ReaderState::Tailing;
        true
    }

    /// Cancel any background work. The worker observes the flag at its
    /// next line/batch boundary and tears down without leaving a
    /// partially-written line.
    pub fn stop(&mut self) {
        self.shared.cancel.store(true, Ordering::SeqCst);
        *self.shared.state.lock().unwrap() = ReaderState::Stopped;
        // The worker is not joined: a tail blocked in a read exits at
        // its next wakeup and must not stall the caller.
        self.worker = None;
    }

    fn begin(&self, target: ReaderState) -> Result<(), SourceError> {
        let mut state = self.shared.state.lock().unwrap();
        if *state != ReaderState::Idle {
            return Err(SourceError::Busy {
                state: state.as_str(),
            });
        }
        *state = target;
        Ok(())
    }

    fn set_state(&self, target: ReaderState) {
        *self.shared.state.lock().unwrap() = target;
    }

    fn detect_choice(&self, raws: &[String]) -> ParserChoice {
        self.registry
            .detect(raws)
            .map_or(ParserChoice::Auto, ParserChoice::Fixed)
    }

    /// Read one file and parse it fully. With `tag` set, lines without
    /// a component inherit the file stem (merge origin fallback).
    fn read_and_parse(
        &self,
        path: &Path,
        first_number: usize,
        tag: Option<&Path>,
    ) -> Result<Vec<crate::parser::LogLine>, SourceError> {
        let mut source = FileSource::open(path)?;
        let origin = source.origin().to_string();
        let mut raws = Vec::new();
        while let Some(raw) = source.read_line()? {
            raws.push(raw);
        }
        let choice = self.detect_choice(&raws);
        let mut lines = parse_batch(&self.registry, &raws, first_number, choice);
        if tag.is_some() {
            for line in &mut lines {
                if line.component.is_none() {
                    line.component = Some(origin.clone());
                }
            }
        }
        Ok(lines)
    }
}

impl Drop for SourceReader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Deliver one tailed raw line according to the current state.
/// Returns false when the reader has stopped.
fn deliver(
    store: &Arc<LineStore>,
    registry: &Arc<ParserRegistry>,
    shared: &Arc<Shared>,
    choice: ParserChoice,
    raw: String,
) -> bool {
    let state = shared.state.lock().unwrap();
    match *state {
        ReaderState::Tailing => {
            let line = registry.parse(store.next_line_number(), &raw, choice);
            store.append(line);
            true
        }
        ReaderState::Paused => {
            shared.buffer.lock().unwrap().push(raw);
            true
        }
        ReaderState::Stopped => false,
        // Loads never run concurrently with a tail on the same reader
        ReaderState::Idle | ReaderState::Loading => true,
    }
}

fn parse_batch(
    registry: &ParserRegistry,
    raws: &[String],
    first_number: usize,
    choice: ParserChoice,
) -> Vec<crate::parser::LogLine> {
    raws.iter()
        .enumerate()
        .map(|(offset, raw)| registry.parse(first_number + offset, raw, choice))
        .collect()
}

fn read_all_raw_lines(path: &Path) -> Result<Vec<String>, SourceError> {
    let mut source = FileSource::open(path)?;
    let mut raws = Vec::new();
    while let Some(raw) = source.read_line()? {
        raws.push(raw);
    }
    Ok(raws)
}

/// Follows a growing file, detecting truncation (rotation).
struct TailFollower {
    path: PathBuf,
    origin: String,
    reader: BufReader<File>,
    decode: DecodeState,
    pos: u64,
}

impl TailFollower {
    fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(|e| SourceError::io(path, e))?;
        let origin = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            path: path.to_path_buf(),
            origin,
            reader: BufReader::new(file),
            decode: DecodeState::default(),
            pos: 0,
        })
    }

    /// Next complete line, or `None` when the file has no new content.
    fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        let mut buf = Vec::new();
        let n = self
            .reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| SourceError::io(&self.path, e))?;
        if n > 0 {
            self.pos += n as u64;
            return Ok(Some(self.decode.decode(buf, &self.origin)));
        }

        // At EOF: a shrunken file means rotation, start over
        let len = std::fs::metadata(&self.path)
            .map_err(|e| SourceError::io(&self.path, e))?
            .len();
        if len < self.pos {
            debug!(path = %self.path.display(), "file truncated, restarting tail");
            let file = File::open(&self.path).map_err(|e| SourceError::io(&self.path, e))?;
            self.reader = BufReader::new(file);
            self.pos = 0;
        }
        Ok(None)
    }
}

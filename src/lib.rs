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

//! Log investigation backend.
//!
//! Ingests loosely-structured log text from files, pipes or remote
//! adapters, normalizes it into [`parser::LogLine`]s through a
//! priority-ordered multi-format parser registry, and serves
//! filtering, searching, template grouping and baseline-relative
//! anomaly scoring over an append-only [`core::LineStore`].
//!
//! The typical wiring, as a terminal frontend would use it:
//!
//! ```no_run
//! use loglens::core::{InspectSession, LineStore, SourceReader};
//! use loglens::parser::ParserRegistry;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(ParserRegistry::with_default_formats());
//! let store = LineStore::new();
//! let mut reader = SourceReader::new(Arc::clone(&store), Arc::clone(&registry));
//! reader.load_auto(std::path::Path::new("app.log"))?;
//! let mut session = InspectSession::new(store, registry);
//! let visible = session.apply_filters();
//! # Ok::<(), loglens::error::SourceError>(())
//! ```

pub mod anomaly;
pub mod core;
pub mod error;
pub mod parser;

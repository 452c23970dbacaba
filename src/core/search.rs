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

//! Text and regex search over a line snapshot, with a wrapping
//! navigation cursor.

use crate::error::RuleError;
use crate::parser::LogLine;
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Direction a search navigates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDirection {
    #[default]
    Forward,
    Backward,
}

/// A search query with options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub pattern: String,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default)]
    pub direction: SearchDirection,
}

impl SearchQuery {
    /// A case-insensitive plain-text forward search.
    pub fn text(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            case_sensitive: false,
            is_regex: false,
            direction: SearchDirection::Forward,
        }
    }

    /// A forward regex search.
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            is_regex: true,
            ..Self::text(pattern)
        }
    }
}

/// One match: byte offsets into the line's `raw` text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchMatch {
    pub line_index: usize,
    pub start: usize,
    pub end: usize,
}

/// Find every non-overlapping match, left to right within each line,
/// in line order.
///
/// Text mode ASCII-case-folds unless case-sensitive, so offsets always
/// refer to the original text. An invalid regex is a [`RuleError`].
pub fn find_matches(
    lines: &[Arc<LogLine>],
    query: &SearchQuery,
) -> Result<Vec<SearchMatch>, RuleError> {
    if query.pattern.is_empty() {
        return Ok(Vec::new());
    }

    let mut results = Vec::new();
    if query.is_regex {
        let pattern = if query.case_sensitive {
            query.pattern.clone()
        } else {
            format!("(?i){}", query.pattern)
        };
        let regex =
            Regex::new(&pattern).map_err(|err| RuleError::new(&query.pattern, &err))?;
        for (line_index, line) in lines.iter().enumerate() {
            for found in regex.find_iter(&line.raw) {
                match found {
                    Ok(m) => results.push(SearchMatch {
                        line_index,
                        start: m.start(),
                        end: m.end(),
                    }),
                    Err(err) => {
                        // Runtime limits (backtracking) skip the line, not the search
                        warn!(line = line.line_number, %err, "regex search gave up on line");
                        break;
                    }
                }
            }
        }
    } else {
        let needle = if query.case_sensitive {
            query.pattern.clone()
        } else {
            query.pattern.to_ascii_lowercase()
        };
        for (line_index, line) in lines.iter().enumerate() {
            let haystack = if query.case_sensitive {
                line.raw.clone()
            } else {
                line.raw.to_ascii_lowercase()
            };
            let mut at = 0;
            while let Some(pos) = haystack[at..].find(&needle) {
                let start = at + pos;
                let end = start + needle.len();
                results.push(SearchMatch {
                    line_index,
                    start,
                    end,
                });
                at = end;
            }
        }
    }
    Ok(results)
}

/// The result of one cursor step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    /// Index into the match list the cursor now points at.
    pub index: usize,
    /// True when the step wrapped around an end of the list, so the
    /// caller can surface the wrap.
    pub wrapped: bool,
}

/// Navigates an ordered match list, wrapping at the ends.
#[derive(Debug)]
pub struct SearchCursor {
    matches: Vec<SearchMatch>,
    current: Option<usize>,
}

impl SearchCursor {
    pub const fn new(matches: Vec<SearchMatch>) -> Self {
        Self {
            matches,
            current: None,
        }
    }

    pub fn matches(&self) -> &[SearchMatch] {
        &self.matches
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// The match the cursor points at, if it has been positioned.
    pub fn current(&self) -> Option<SearchMatch> {
        self.current.and_then(|i| self.matches.get(i).copied())
    }

    pub const fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Step to the nearest match strictly after the current one,
    /// wrapping past the end. An unpositioned cursor lands on the
    /// first match.
    pub fn next(&mut self) -> Option<Advance> {
        if self.matches.is_empty() {
            return None;
        }
        let advance = match self.current {
            None => Advance {
                index: 0,
                wrapped: false,
            },
            Some(i) if i + 1 >= self.matches.len() => Advance {
                index: 0,
                wrapped: true,
            },
            Some(i) => Advance {
                index: i + 1,
                wrapped: false,
            },
        };
        self.current = Some(advance.index);
        Some(advance)
    }

    /// Step to the nearest match strictly before the current one,
    /// wrapping past the start. An unpositioned cursor lands on the
    /// last match.
    pub fn prev(&mut self) -> Option<Advance> {
        if self.matches.is_empty() {
            return None;
        }
        let last = self.matches.len() - 1;
        let advance = match self.current {
            None => Advance {
                index: last,
                wrapped: false,
            },
            Some(0) => Advance {
                index: last,
                wrapped: true,
            },
            Some(i) => Advance {
                index: i - 1,
                wrapped: false,
            },
        };
        self.current = Some(advance.index);
        Some(advance)
    }

    /// Step in the requested direction.
    pub fn advance(&mut self, direction: SearchDirection) -> Option<Advance> {
        match direction {
            SearchDirection::Forward => self.next(),
            SearchDirection::Backward => self.prev(),
        }
    }

    /// Position the cursor at the first match at or after the given
    /// line, without wrapping. Returns the match index found.
    pub fn seek_to_line(&mut self, line_index: usize) -> Option<usize> {
        let index = self
            .matches
            .iter()
            .position(|m| m.line_index >= line_index)?;
        self.current = Some(index);
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParserChoice, ParserRegistry};

    fn lines(raws: &[&str]) -> Vec<Arc<LogLine>> {
        let registry = ParserRegistry::with_default_formats();
        raws.iter()
            .enumerate()
            .map(|(i, raw)| Arc::new(registry.parse(i + 1, raw, ParserChoice::Auto)))
            .collect()
    }

    #[test]
    fn test_text_matches_left_to_right() {
        let lines = lines(&["abc abc abc", "no hit", "tail abc"]);
        let matches = find_matches(&lines, &SearchQuery::text("abc")).unwrap();
        assert_eq!(
            matches,
            vec![
                SearchMatch { line_index: 0, start: 0, end: 3 },
                SearchMatch { line_index: 0, start: 4, end: 7 },
                SearchMatch { line_index: 0, start: 8, end: 11 },
                SearchMatch { line_index: 2, start: 5, end: 8 },
            ]
        );
    }

    #[test]
    fn test_matches_do_not_overlap() {
        let lines = lines(&["aaaa"]);
        let matches = find_matches(&lines, &SearchQuery::text("aa")).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!((matches[0].start, matches[0].end), (0, 2));
        assert_eq!((matches[1].start, matches[1].end), (2, 4));
    }

    #[test]
    fn test_case_insensitive_by_default() {
        let lines = lines(&["Error and ERROR and error"]);
        let matches = find_matches(&lines, &SearchQuery::text("error")).unwrap();
        assert_eq!(matches.len(), 3);
    }

    #[test]
    fn test_case_sensitive_text() {
        let lines = lines(&["Error and ERROR and error"]);
        let mut query = SearchQuery::text("ERROR");
        query.case_sensitive = true;
        let matches = find_matches(&lines, &query).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].start, 10);
    }

    #[test]
    fn test_regex_matches() {
        let lines = lines(&["status=200 status=404 status=500"]);
        let matches = find_matches(&lines, &SearchQuery::regex(r"status=(4|5)\d\d")).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].start, 11);
        assert_eq!(matches[1].start, 22);
    }

    #[test]
    fn test_invalid_regex_is_rule_error() {
        let lines = lines(&["anything"]);
        let err = find_matches(&lines, &SearchQuery::regex("[broken")).unwrap_err();
        assert_eq!(err.pattern, "[broken");
    }

    #[test]
    fn test_empty_pattern_has_no_matches() {
        let lines = lines(&["anything"]);
        assert!(find_matches(&lines, &SearchQuery::text("")).unwrap().is_empty());
    }

    #[test]
    fn test_cursor_wraps_forward_and_flags_it() {
        let matches = vec![
            SearchMatch { line_index: 0, start: 0, end: 1 },
            SearchMatch { line_index: 1, start: 0, end: 1 },
        ];
        let mut cursor = SearchCursor::new(matches);
        assert_eq!(cursor.next(), Some(Advance { index: 0, wrapped: false }));
        assert_eq!(cursor.next(), Some(Advance { index: 1, wrapped: false }));
        // Off the end: wrap back to the first match, visibly
        assert_eq!(cursor.next(), Some(Advance { index: 0, wrapped: true }));
    }

    #[test]
    fn test_cursor_wraps_backward() {
        let matches = vec![
            SearchMatch { line_index: 0, start: 0, end: 1 },
            SearchMatch { line_index: 1, start: 0, end: 1 },
        ];
        let mut cursor = SearchCursor::new(matches);
        assert_eq!(cursor.prev(), Some(Advance { index: 1, wrapped: false }));
        assert_eq!(cursor.prev(), Some(Advance { index: 0, wrapped: false }));
        assert_eq!(cursor.prev(), Some(Advance { index: 1, wrapped: true }));
    }

    #[test]
    fn test_cursor_empty_never_advances() {
        let mut cursor = SearchCursor::new(Vec::new());
        assert_eq!(cursor.next(), None);
        assert_eq!(cursor.prev(), None);
        assert!(cursor.current().is_none());
    }

    #[test]
    fn test_seek_to_line() {
        let matches = vec![
            SearchMatch { line_index: 2, start: 0, end: 1 },
            SearchMatch { line_index: 5, start: 0, end: 1 },
            SearchMatch { line_index: 9, start: 0, end: 1 },
        ];
        let mut cursor = SearchCursor::new(matches);
        assert_eq!(cursor.seek_to_line(4), Some(1));
        assert_eq!(cursor.current().unwrap().line_index, 5);
        assert_eq!(cursor.seek_to_line(10), None);
    }
}

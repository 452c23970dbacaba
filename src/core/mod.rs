pub mod filter;
pub mod line_store;
pub mod reader;
pub mod search;
pub mod session;
pub mod source;

pub use filter::{CompiledRuleSet, FilterConfig, FilterRule, FilterState, FilterType};
pub use line_store::{LineStore, LoadProgress};
pub use reader::{MergeReport, ReaderState, SourceReader};
pub use search::{find_matches, Advance, SearchCursor, SearchDirection, SearchMatch, SearchQuery};
pub use session::{AnalysisMode, AnalysisReport, InspectSession};
pub use source::{FileSource, MemorySource, RawLineSource, StdinSource};

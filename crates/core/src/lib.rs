//! Scanlight Core Library
//!
//! Search-to-highlight alignment for recognized page text: the fragment
//! index, match locator and rectangle projector, plus the page pipeline
//! and search session that feed them.

pub mod config;
pub mod document;
pub mod epoch;
pub mod error;
pub mod fragment_index;
pub mod highlight;
pub mod match_locator;
pub mod pipeline;
pub mod projector;
pub mod search;
pub mod workspace;

pub use config::PipelineConfig;
pub use document::{Document, DocumentStatus};
pub use epoch::{Epoch, EpochTicket};
pub use error::{CoreError, CoreResult};
pub use fragment_index::FragmentIndex;
pub use highlight::{derive_highlights, page_highlights, LayoutCache};
pub use match_locator::{find_matches, overlapping_fragments, page_has_match, MatchSpan};
pub use pipeline::{PagePipeline, PipelineError, PipelineState, Progress, ProgressCallback};
pub use projector::{project, text_height};
pub use search::{search, SearchResult, SearchSession};
pub use workspace::Workspace;

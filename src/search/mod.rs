//! Search layer facade.
//!
//! - **[`text`]**: shared normalization and tokenization; the query side and
//!   the index side must agree on what a token is.
//! - **[`query`]**: query parsing into terms, phrases, and implicit filters.
//! - **[`ranking`]**: the six-factor bounded relevance score.
//! - **[`engine`]**: the cache-first retrieval orchestrator.

pub mod engine;
pub mod query;
pub mod ranking;
pub mod text;

pub use engine::{EngineStats, SearchEngine, SearchError};
pub use query::{ParsedQuery, QueryProcessor};
pub use ranking::{RankingAlgorithm, ScoringWeights};

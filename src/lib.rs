//! # LabelDB
//!
//! An embedded, persistent label index. Records are identified by integer
//! ids; each can carry any number of string labels and one sortable
//! timestamp. Boolean/date queries return the matching ids together with a
//! per-label breakdown of the matches.
//!
//! ## Features
//!
//! - **Sparse bitmaps**: three-tier page/vector/word layout, only dirty pages rewritten
//! - **Timestamp store**: flat i64 file with block-level partial writes
//! - **Query language**: `a, b !c 2016..2018 @12 @unlabeled`, AND binds tighter than OR
//! - **Debounced persistence**: background flush worker, explicit commit and close
//!
//! ## Modules
//!
//! - [`storage`]: Bitmaps, timestamp store and their file formats
//! - [`query`]: Tokenizer, parser and evaluator
//! - [`index`]: The [`LabelIndex`] orchestrator
//! - [`config`]: TOML configuration
//! - [`human_time`]: `YYYYMMDDhhmmssmmm` timestamps
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use labeldb::{IndexConfig, LabelIndex};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let index = LabelIndex::open(IndexConfig::new("./photos-index")).await?;
//!
//!     index.set(1, 2019_06_01_10_00_00_000, &["holiday", "italy"]).await?;
//!     index.set(2, 2019_06_02_18_30_00_000, &["holiday", "beach"]).await?;
//!     index.set(3, 2019_09_14_09_15_00_000, &["work"]).await?;
//!
//!     let results = index.find("holiday (italy, beach) <2019.7").await?;
//!     println!("{:?} {:?}", results.ids, results.counts_per_label);
//!
//!     index.close().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod human_time;
pub mod index;
pub mod query;
pub mod storage;

// Re-export top-level types for convenience
pub use config::{Config, ConfigError, IndexConfig, LoggingConfig};

pub use index::{IndexError, IndexResult, IndexStats, LabelIndex};

pub use query::{parse_query, MatchResults, QueryError, QueryEvaluator, QueryNode};

pub use storage::{SparseBitmap, SparseLongStore, StorageError, StorageResult};

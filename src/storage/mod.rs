//! LabelDB Storage Layer
//!
//! This module provides the persistent data structures behind the index:
//!
//! - **vector**: 8192-bit leaf block with used-span tracking
//! - **page**: 64 optional vectors, one file on disk
//! - **bitmap**: Sparse growable bitmap with set algebra
//! - **longs**: Sparse i64 store with block-level partial writes
//! - **codec**: Big-endian byte writer/reader
//! - **names**: Label name to file name escaping
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! SparseBitmap ─► [Option<BitVectorPage>] ─► [Option<BitVector>; 64] ─► [u64; 128]
//!                        │
//!                        └─ one file per page, rewritten only when dirty
//!
//! SparseLongStore ─► [i64] ─► raw file, dirty 4 KB blocks rewritten in place
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use labeldb::storage::{SparseBitmap, SparseLongStore};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dir = std::path::Path::new("./data");
//!
//!     let mut holiday = SparseBitmap::open("holiday", dir)?;
//!     holiday.set_all(&[3, 4, 5]);
//!     holiday.store()?;
//!
//!     let mut dates = SparseLongStore::open("dates", dir)?;
//!     dates.set(3, 2019_06_01_12_00_00_000);
//!     dates.store()?;
//!
//!     let in_2019 = dates.as_bitmap(2019_01_01_00_00_00_000, 2019_12_31_23_59_59_999);
//!     println!("{} holiday records in 2019", holiday.count_overlap_with(&in_2019));
//!     Ok(())
//! }
//! ```

pub mod bitmap;
pub mod codec;
pub mod error;
pub mod longs;
pub mod names;
pub mod page;
pub mod vector;

// Re-export commonly used types
pub use bitmap::{SparseBitmap, HEADER_FILE};
pub use codec::{ByteReader, ByteWriter};
pub use error::{StorageError, StorageResult};
pub use longs::{DirtyBlocks, SparseLongStore, DEFAULT_GROWTH_RATE, DEFAULT_SAVE_BLOCK_KB, UNUSED};
pub use names::{filename_to_name, name_to_filename};
pub use page::{BitVectorPage, PAGE_BITS, PAGE_VECTORS};
pub use vector::{BitVector, VECTOR_BITS, VECTOR_WORDS};

//! Crawl Frontier
//!
//! Decides which listing entries a crawl run fetches:
//!
//! - **filters**: `EntryFilter` predicate chain
//! - **select**: `FrontierSettings`, `EmissionOrder`, `select`
//! - **progress**: `CrawlProgress` cursor and its stores
//!
//! The cursor is advanced by the caller, and only for entries whose samples
//! were confirmed stored.

pub mod error;
pub mod filters;
pub mod progress;
pub mod select;

pub use error::{FrontierError, FrontierResult};
pub use filters::{EntryFilter, FilterChain, Verdict};
pub use progress::{CrawlProgress, MemoryProgressStore, ProgressStore, SqliteProgressStore};
pub use select::{select, EmissionOrder, FrontierSettings, Selection};

//! Listing Parser
//!
//! Turns remote directory listing pages into typed entries:
//!
//! - **types**: `DirectoryEntry`, `DirectoryListing`, `EntryType`
//! - **parser**: dialect-aware line parsing and link resolution
//! - **error**: per-line `ListingError`

pub mod error;
pub mod parser;
pub mod types;

pub use error::{ListingError, ListingResult};
pub use parser::{parse_line, parse_listing, parse_listing_datetime, ListingDialect};
pub use types::{filename_timestamp, DirectoryEntry, DirectoryListing, EntryType};

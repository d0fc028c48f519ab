//! Entry selection
//!
//! ```text
//! entries -> order -> [directory, extension, name, pattern, latest, skip, limit] -> emitted
//! ```
//!
//! Skip and limit windows only make sense under one consistent order, so the
//! order is an explicit per-source setting rather than whatever the server
//! happened to return.

use crate::config::SourceConfig;
use crate::frontier::error::{FrontierError, FrontierResult};
use crate::frontier::filters::{EntryFilter, FilterChain, Verdict};
use crate::listing::DirectoryEntry;
use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Order in which surviving entries are considered for skip/limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmissionOrder {
    /// As returned by the listing
    #[default]
    Listing,
    /// Most recent entry timestamp first
    NewestFirst,
    /// Oldest entry timestamp first
    OldestFirst,
}

/// Compiled per-source selection settings
#[derive(Debug, Clone, Default)]
pub struct FrontierSettings {
    pub allowed_extensions: Vec<String>,
    pub exact_filename: Option<String>,
    pub pattern: Option<Regex>,
    pub process_latest: bool,
    /// 0 means unlimited
    pub limit: usize,
    pub skip: usize,
    pub order: EmissionOrder,
}

impl FrontierSettings {
    pub fn from_source(source: &SourceConfig) -> FrontierResult<Self> {
        let pattern = source
            .filename_regex_filter
            .as_deref()
            .map(|p| {
                Regex::new(p).map_err(|e| FrontierError::InvalidPattern {
                    pattern: p.to_string(),
                    source: e,
                })
            })
            .transpose()?;

        Ok(Self {
            allowed_extensions: source
                .allowed_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
            exact_filename: source.filename_exact_filter.clone(),
            pattern,
            process_latest: source.process_latest,
            limit: source.limit,
            skip: source.skip,
            order: source.order,
        })
    }

    /// Build the filter chain for one run.
    ///
    /// An exact filename filter targets a single file, so it disables the
    /// skip and limit windows.
    pub fn chain(&self, progress: Option<NaiveDateTime>) -> FilterChain {
        let mut chain = FilterChain::new(vec![
            EntryFilter::Directory,
            EntryFilter::Extension(self.allowed_extensions.clone()),
        ]);

        if let Some(name) = &self.exact_filename {
            chain.push(EntryFilter::Name(name.clone()));
        }

        if let Some(pattern) = &self.pattern {
            chain.push(EntryFilter::Pattern(pattern.clone()));
        }

        if self.process_latest {
            if let Some(cursor) = progress {
                chain.push(EntryFilter::Latest(cursor));
            }
        }

        if self.exact_filename.is_none() {
            if self.skip > 0 {
                chain.push(EntryFilter::Skip {
                    remaining: self.skip,
                });
            }
            if self.limit > 0 {
                chain.push(EntryFilter::Limit {
                    remaining: self.limit,
                });
            }
        }

        chain
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

/// Result of selecting from one listing
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Entries to fetch, in emission order
    pub emitted: Vec<DirectoryEntry>,
    /// Entries not emitted (filtered, skipped or past the limit)
    pub skipped: usize,
}

/// Select the entries to fetch from a listing given the progress cursor
pub fn select(
    mut entries: Vec<DirectoryEntry>,
    progress: Option<NaiveDateTime>,
    settings: &FrontierSettings,
) -> Selection {
    match settings.order {
        EmissionOrder::Listing => {}
        // undated entries go last either way
        EmissionOrder::NewestFirst => entries.sort_by(|a, b| b.timestamp().cmp(&a.timestamp())),
        EmissionOrder::OldestFirst => entries.sort_by_key(|e| (e.timestamp().is_none(), e.timestamp())),
    }

    let total = entries.len();
    let mut chain = settings.chain(progress);
    let mut emitted = Vec::new();

    for entry in entries {
        match chain.check(&entry) {
            Verdict::Accept => emitted.push(entry),
            Verdict::Reject(reason) => {
                tracing::debug!("Filtered {} ({})", entry.filename, reason);
            }
            Verdict::Stop => {
                tracing::info!("Reached limit of {}", settings.limit);
                break;
            }
        }
    }

    Selection {
        skipped: total - emitted.len(),
        emitted,
    }
}

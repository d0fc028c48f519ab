//! Entry filter chain
//!
//! Each filter is a tagged variant with a common `check`. Filters run in a
//! fixed order and the first non-`Accept` verdict wins. `Skip` and `Limit`
//! are stateful windows: they only see entries every earlier filter accepted.

use crate::listing::DirectoryEntry;
use chrono::NaiveDateTime;
use regex::Regex;

/// Outcome of checking one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Drop this entry and keep going
    Reject(&'static str),
    /// Drop this entry and everything after it
    Stop,
}

/// A single predicate over listing entries
#[derive(Debug, Clone)]
pub enum EntryFilter {
    /// Directories are never fetched
    Directory,
    /// Lowercased extensions including the dot; empty accepts everything
    Extension(Vec<String>),
    /// Exact filename
    Name(String),
    /// Filename regex (unanchored)
    Pattern(Regex),
    /// Entries at or before the progress cursor
    Latest(NaiveDateTime),
    /// Consume the first `remaining` survivors without emitting them
    Skip { remaining: usize },
    /// Emit at most `remaining` more entries
    Limit { remaining: usize },
}

impl EntryFilter {
    pub fn name(&self) -> &'static str {
        match self {
            EntryFilter::Directory => "directory",
            EntryFilter::Extension(_) => "extension",
            EntryFilter::Name(_) => "name",
            EntryFilter::Pattern(_) => "pattern",
            EntryFilter::Latest(_) => "latest",
            EntryFilter::Skip { .. } => "skip",
            EntryFilter::Limit { .. } => "limit",
        }
    }

    pub fn check(&mut self, entry: &DirectoryEntry) -> Verdict {
        let name = self.name();

        match self {
            EntryFilter::Directory => {
                if entry.is_file() && !entry.link.ends_with('/') {
                    Verdict::Accept
                } else {
                    Verdict::Reject(name)
                }
            }
            EntryFilter::Extension(allowed) => {
                if allowed.is_empty() {
                    return Verdict::Accept;
                }
                match entry.extension() {
                    Some(ext) if allowed.iter().any(|a| *a == ext) => Verdict::Accept,
                    _ => Verdict::Reject(name),
                }
            }
            EntryFilter::Name(wanted) => {
                if entry.filename == *wanted {
                    Verdict::Accept
                } else {
                    Verdict::Reject(name)
                }
            }
            EntryFilter::Pattern(pattern) => {
                if pattern.is_match(&entry.filename) {
                    Verdict::Accept
                } else {
                    Verdict::Reject(name)
                }
            }
            EntryFilter::Latest(cursor) => match entry.timestamp() {
                Some(ts) if ts <= *cursor => Verdict::Reject(name),
                _ => Verdict::Accept,
            },
            EntryFilter::Skip { remaining } => {
                if *remaining > 0 {
                    *remaining -= 1;
                    Verdict::Reject(name)
                } else {
                    Verdict::Accept
                }
            }
            EntryFilter::Limit { remaining } => {
                if *remaining == 0 {
                    Verdict::Stop
                } else {
                    *remaining -= 1;
                    Verdict::Accept
                }
            }
        }
    }
}

/// Ordered list of filters, short-circuiting on the first rejection
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<EntryFilter>,
}

impl FilterChain {
    pub fn new(filters: Vec<EntryFilter>) -> Self {
        Self { filters }
    }

    pub fn push(&mut self, filter: EntryFilter) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn check(&mut self, entry: &DirectoryEntry) -> Verdict {
        for filter in self.filters.iter_mut() {
            match filter.check(entry) {
                Verdict::Accept => continue,
                verdict => return verdict,
            }
        }
        Verdict::Accept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(filename: &str) -> DirectoryEntry {
        DirectoryEntry::new(filename, format!("http://host/{}", filename), None, Some(1))
    }

    #[test]
    fn test_extension_filter() {
        let mut filter = EntryFilter::Extension(vec![".csv".into(), ".zip".into()]);
        assert_eq!(filter.check(&entry("A.ZIP")), Verdict::Accept);
        assert_eq!(filter.check(&entry("readme.txt")), Verdict::Reject("extension"));
        assert_eq!(filter.check(&entry("noext")), Verdict::Reject("extension"));

        let mut open = EntryFilter::Extension(vec![]);
        assert_eq!(open.check(&entry("readme.txt")), Verdict::Accept);
    }

    #[test]
    fn test_directory_filter() {
        let mut filter = EntryFilter::Directory;
        let dir = DirectoryEntry::new("sub", "http://host/sub/", None, None);
        assert_eq!(filter.check(&dir), Verdict::Reject("directory"));
        assert_eq!(filter.check(&entry("a.csv")), Verdict::Accept);
    }

    #[test]
    fn test_latest_filter_is_strict() {
        let cursor = NaiveDateTime::parse_from_str("2020-06-11 00:05", "%Y-%m-%d %H:%M").unwrap();
        let mut filter = EntryFilter::Latest(cursor);

        assert_eq!(filter.check(&entry("F_202006110005_.zip")), Verdict::Reject("latest"));
        assert_eq!(filter.check(&entry("F_202006110000_.zip")), Verdict::Reject("latest"));
        assert_eq!(filter.check(&entry("F_202006110010_.zip")), Verdict::Accept);
        // no derivable timestamp: nothing to compare against
        assert_eq!(filter.check(&entry("F.zip")), Verdict::Accept);
    }

    #[test]
    fn test_chain_short_circuits_before_windows() {
        let mut chain = FilterChain::new(vec![
            EntryFilter::Extension(vec![".zip".into()]),
            EntryFilter::Skip { remaining: 1 },
            EntryFilter::Limit { remaining: 1 },
        ]);

        // rejected before reaching skip, so the skip budget is untouched
        assert_eq!(chain.check(&entry("a.txt")), Verdict::Reject("extension"));
        assert_eq!(chain.check(&entry("a.zip")), Verdict::Reject("skip"));
        assert_eq!(chain.check(&entry("b.zip")), Verdict::Accept);
        assert_eq!(chain.check(&entry("c.zip")), Verdict::Stop);
    }
}

//! Directory listing types

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Kind of listing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
}

/// One line of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub filename: String,
    /// Absolute URL once returned by the parser
    pub link: String,
    pub modified_date: Option<NaiveDateTime>,
    /// Parsed from a `_YYYYMMDDHHMM_` token in the filename
    pub created_date: Option<NaiveDateTime>,
    pub size_bytes: Option<u64>,
    pub entry_type: EntryType,
}

fn created_token() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"_(?P<created>\d{12})_").expect("static regex"))
}

/// Timestamp embedded in a filename as `_YYYYMMDDHHMM_`, if any
pub fn filename_timestamp(filename: &str) -> Option<NaiveDateTime> {
    let caps = created_token().captures(filename)?;
    NaiveDateTime::parse_from_str(&caps["created"], "%Y%m%d%H%M").ok()
}

impl DirectoryEntry {
    /// Build an entry, deriving `created_date` and `entry_type`.
    ///
    /// An entry is a directory when its size is unknown or its link ends
    /// with `/`.
    pub fn new(
        filename: impl Into<String>,
        link: impl Into<String>,
        modified_date: Option<NaiveDateTime>,
        size_bytes: Option<u64>,
    ) -> Self {
        let filename = filename.into();
        let link = link.into();
        let created_date = filename_timestamp(&filename);

        let entry_type = if size_bytes.is_none() || link.ends_with('/') {
            EntryType::Directory
        } else {
            EntryType::File
        };

        Self {
            filename,
            link,
            modified_date,
            created_date,
            size_bytes,
            entry_type,
        }
    }

    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }

    /// Timestamp used for crawl ordering and the progress cursor: the
    /// filename's created date when present, else the modified date
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.created_date.or(self.modified_date)
    }

    /// Lowercased extension including the dot, e.g. ".zip"
    pub fn extension(&self) -> Option<String> {
        let name = self.filename.rsplit('/').next().unwrap_or(&self.filename);
        name.rfind('.')
            .filter(|&i| i > 0)
            .map(|i| name[i..].to_lowercase())
    }
}

/// A parsed listing page
#[derive(Debug, Clone, Default)]
pub struct DirectoryListing {
    pub url: String,
    pub entries: Vec<DirectoryEntry>,
    /// Lines that could not be parsed
    pub skipped: usize,
}

impl DirectoryListing {
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn file_count(&self) -> usize {
        self.files().len()
    }

    pub fn directory_count(&self) -> usize {
        self.directories().len()
    }

    pub fn files(&self) -> Vec<&DirectoryEntry> {
        self.entries.iter().filter(|e| e.is_file()).collect()
    }

    pub fn directories(&self) -> Vec<&DirectoryEntry> {
        self.entries
            .iter()
            .filter(|e| e.entry_type == EntryType::Directory)
            .collect()
    }

    /// Keep only entries whose link matches `pattern` at its start
    pub fn apply_filter(&mut self, pattern: &Regex) {
        self.entries
            .retain(|e| pattern.find(&e.link).map(|m| m.start() == 0).unwrap_or(false));
    }

    /// Files by modified date, newest first, optionally truncated
    pub fn most_recent_files(&self, limit: Option<usize>) -> Vec<&DirectoryEntry> {
        let mut files = self.files();
        files.sort_by(|a, b| b.modified_date.cmp(&a.modified_date));
        if let Some(limit) = limit {
            files.truncate(limit);
        }
        files
    }

    /// Files modified strictly after `since`
    pub fn modified_since(&self, since: NaiveDateTime) -> Vec<&DirectoryEntry> {
        self.files()
            .into_iter()
            .filter(|e| e.modified_date.map(|m| m > since).unwrap_or(false))
            .collect()
    }
}

//! Directory listing parser
//!
//! Supports two dialects:
//!
//! - **ServerListing** (IIS default listings):
//!   `Thursday, June 11, 2020 12:00 PM  12345 <a href='FILE.zip'>FILE.zip</a>`
//! - **SimplePadded**: columns separated by a gutter of three or more spaces,
//!   `date   size-or-<dir>   name`, where the name may be a bare filename or
//!   an anchor tag
//!
//! A line that fails to parse is logged and skipped; it never fails the page.

use crate::listing::error::{ListingError, ListingResult};
use crate::listing::types::{DirectoryEntry, DirectoryListing};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Width of the column gutter in simple padded listings
const PADDING_WIDTH: usize = 3;

/// Datetime layouts seen in listings and AEMO files, tried in order
const DATE_FORMATS: &[&str] = &[
    "%A, %B %d, %Y %I:%M %p",
    "%Y/%m/%d,%H:%M:%S",
    "%d/%m/%y %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d/%m/%Y %I:%M:%S %p",
    "%Y%m%d%H%M%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Date-only layouts, read as midnight
const DAY_FORMATS: &[&str] = &["%Y%m%d", "%A %d %B %Y", "%d %B %Y", "%Y-%m-%d"];

/// Listing layout produced by the remote server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingDialect {
    #[default]
    ServerListing,
    SimplePadded,
}

fn server_line() -> &'static Regex {
    static LINE: OnceLock<Regex> = OnceLock::new();
    LINE.get_or_init(|| {
        Regex::new(
            r#"(?i)(?P<modified_date>.*(?:AM|PM))\s{2,}(?P<file_size>\d+|<dir>)\s+<a href=['"]?(?P<link>[^'" >]+)['"]?>(?P<filename>[^<]+)"#,
        )
        .expect("static regex")
    })
}

fn anchor() -> &'static Regex {
    static ANCHOR: OnceLock<Regex> = OnceLock::new();
    ANCHOR.get_or_init(|| {
        Regex::new(r#"(?i)<a href=['"]?(?P<link>[^'" >]+)['"]?>(?P<filename>[^<]*)"#)
            .expect("static regex")
    })
}

fn ordinal_suffix() -> &'static Regex {
    static ORDINAL: OnceLock<Regex> = OnceLock::new();
    ORDINAL.get_or_init(|| Regex::new(r"(\d+)(?:st|nd|rd|th)\b").expect("static regex"))
}

fn line_break() -> &'static Regex {
    static BREAK: OnceLock<Regex> = OnceLock::new();
    BREAK.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("static regex"))
}

/// Parse a listing date. Returns `None` when no known layout matches.
pub fn parse_listing_datetime(raw: &str) -> Option<NaiveDateTime> {
    let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(dt) = cleaned.parse::<NaiveDateTime>() {
        return Some(dt);
    }

    for fmt in DATE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, fmt) {
            return Some(dt);
        }
    }

    let without_ordinals = ordinal_suffix().replace_all(&cleaned, "$1");
    for fmt in DAY_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&without_ordinals, fmt) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }

    None
}

/// Decode the handful of HTML entities servers emit in listings
pub fn unescape_html(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn parse_size(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        raw.parse().ok()
    } else {
        None
    }
}

/// Parse one line. The returned link is as written in the listing.
pub fn parse_line(line: &str, dialect: ListingDialect) -> ListingResult<DirectoryEntry> {
    match dialect {
        ListingDialect::ServerListing => parse_server_line(line),
        ListingDialect::SimplePadded => parse_padded_line(line),
    }
}

fn parse_server_line(line: &str) -> ListingResult<DirectoryEntry> {
    let caps = server_line()
        .captures(line)
        .ok_or_else(|| ListingError::Unmatched(line.to_string()))?;

    let raw_date = &caps["modified_date"];
    let modified = parse_listing_datetime(raw_date)
        .ok_or_else(|| ListingError::InvalidDate(raw_date.trim().to_string()))?;

    Ok(DirectoryEntry::new(
        caps["filename"].trim(),
        &caps["link"],
        Some(modified),
        parse_size(&caps["file_size"]),
    ))
}

fn parse_padded_line(line: &str) -> ListingResult<DirectoryEntry> {
    let gutter = " ".repeat(PADDING_WIDTH);
    let columns: Vec<&str> = line
        .split(gutter.as_str())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();

    if columns.len() < 3 {
        return Err(ListingError::MissingColumns(line.to_string()));
    }

    let modified = parse_listing_datetime(columns[0])
        .ok_or_else(|| ListingError::InvalidDate(columns[0].to_string()))?;
    let size = parse_size(columns[1]);

    let name_column = columns[2..].join(" ");
    let (filename, link) = match anchor().captures(&name_column) {
        Some(caps) => {
            let link = caps["link"].to_string();
            let filename = match caps["filename"].trim() {
                "" => link.trim_end_matches('/').rsplit('/').next().unwrap_or("").to_string(),
                name => name.to_string(),
            };
            (filename, link)
        }
        None if size.is_none() => (
            name_column.trim_end_matches('/').to_string(),
            format!("{}/", name_column.trim_end_matches('/')),
        ),
        None => (name_column.clone(), name_column),
    };

    if filename.is_empty() {
        return Err(ListingError::MissingColumns(line.to_string()));
    }

    Ok(DirectoryEntry::new(filename, link, Some(modified), size))
}

/// Split a listing document into candidate lines.
///
/// HTML listings carry their rows inside `<pre>` separated by `<br>`; plain
/// text listings are split on newlines. Blank lines are dropped.
pub fn listing_lines(document: &str) -> Vec<String> {
    let lower = document.to_ascii_lowercase();

    let body = match lower.find("<pre") {
        Some(open) => {
            let content_start = lower[open..]
                .find('>')
                .map(|i| open + i + 1)
                .unwrap_or(open);
            let content_end = lower[content_start..]
                .find("</pre")
                .map(|i| content_start + i)
                .unwrap_or(document.len());
            &document[content_start..content_end]
        }
        None => document,
    };

    let pieces: Vec<&str> = if line_break().is_match(body) {
        line_break().split(body).collect()
    } else {
        body.lines().collect()
    };

    pieces
        .into_iter()
        .map(|p| unescape_html(p.trim()))
        .filter(|p| !p.is_empty())
        .collect()
}

/// Parse a full listing document fetched from `base_url`.
///
/// Links are resolved to absolute URLs. Every line that does not parse is
/// logged and counted in `skipped`; entry order follows the document.
pub fn parse_listing(document: &str, dialect: ListingDialect, base_url: &Url) -> DirectoryListing {
    let mut listing = DirectoryListing {
        url: base_url.to_string(),
        ..Default::default()
    };

    for line in listing_lines(document) {
        let parsed = parse_line(&line, dialect).and_then(|mut entry| {
            entry.link = base_url
                .join(&entry.link)
                .map_err(|e| ListingError::InvalidLink {
                    link: entry.link.clone(),
                    reason: e.to_string(),
                })?
                .to_string();
            Ok(entry)
        });

        match parsed {
            Ok(entry) => listing.entries.push(entry),
            Err(e) => {
                tracing::warn!("Skipping listing line from {}: {}", base_url, e);
                listing.skipped += 1;
            }
        }
    }

    tracing::debug!(
        "Parsed {} entries from {} ({} skipped)",
        listing.entries.len(),
        base_url,
        listing.skipped
    );

    listing
}

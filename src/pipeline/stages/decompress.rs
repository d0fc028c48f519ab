//! Decompress stage (priority 302)
//!
//! Zip payloads fan out into one payload per member. Archive feeds ship zips
//! of zips, so members that are zips themselves are expanded recursively up
//! to `max_depth`. The memory guard applies to each member and to the total
//! expanded size of one downloaded file.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::{FileReport, Item, Stage};
use async_trait::async_trait;
use std::io::{Cursor, Read};
use zip::ZipArchive;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Default nesting allowed for zips inside zips
pub const DEFAULT_MAX_DEPTH: usize = 3;

fn is_zip(name: &str, bytes: &[u8]) -> bool {
    name.to_lowercase().ends_with(".zip") || bytes.starts_with(ZIP_MAGIC)
}

/// Expands zip payloads
pub struct DecompressStage {
    max_bytes: u64,
    max_depth: usize,
}

impl DecompressStage {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    fn expand(
        &self,
        name: &str,
        source: &str,
        bytes: &[u8],
        depth: usize,
        expanded: &mut u64,
        out: &mut Vec<Item>,
    ) -> PipelineResult<()> {
        if depth > self.max_depth {
            return Err(PipelineError::Archive {
                file: name.to_string(),
                message: format!("nested deeper than {} archives", self.max_depth),
            });
        }

        let archive_error = |e: zip::result::ZipError| PipelineError::Archive {
            file: name.to_string(),
            message: e.to_string(),
        };

        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(archive_error)?;

        for index in 0..archive.len() {
            let mut member = archive.by_index(index).map_err(archive_error)?;
            if member.is_dir() {
                continue;
            }

            let member_name = member.name().to_string();
            let remaining = self.max_bytes.saturating_sub(*expanded);

            if member.size() > remaining {
                return Err(PipelineError::MemoryGuard {
                    file: member_name,
                    size: *expanded + member.size(),
                    limit: self.max_bytes,
                });
            }

            // Declared sizes can lie; never read past the guard
            let mut contents = Vec::with_capacity(member.size() as usize);
            (&mut member)
                .take(remaining + 1)
                .read_to_end(&mut contents)
                .map_err(|e| PipelineError::Archive {
                    file: member_name.clone(),
                    message: e.to_string(),
                })?;

            if contents.len() as u64 > remaining {
                return Err(PipelineError::MemoryGuard {
                    file: member_name,
                    size: *expanded + contents.len() as u64,
                    limit: self.max_bytes,
                });
            }
            *expanded += contents.len() as u64;

            if is_zip(&member_name, &contents) {
                self.expand(&member_name, source, &contents, depth + 1, expanded, out)?;
            } else {
                tracing::debug!("Extracted {} from {} ({} bytes)", member_name, name, contents.len());
                out.push(Item::Payload {
                    name: member_name,
                    source: source.to_string(),
                    bytes: contents,
                });
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Stage for DecompressStage {
    fn name(&self) -> &str {
        "decompress"
    }

    fn priority(&self) -> u16 {
        302
    }

    async fn process(&self, item: Item, _report: &mut FileReport) -> PipelineResult<Vec<Item>> {
        match item {
            Item::Payload {
                name,
                source,
                bytes,
            } if is_zip(&name, &bytes) => {
                let mut out = Vec::new();
                let mut expanded = 0;
                self.expand(&name, &source, &bytes, 1, &mut expanded, &mut out)?;
                Ok(out)
            }
            other => Ok(vec![other]),
        }
    }
}

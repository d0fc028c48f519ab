//! Record split stage (priority 320)
//!
//! Understands two tabular layouts:
//!
//! - AEMO MMS files: `C` comment rows, `I` rows declaring a table's columns
//!   (`I,report,subtype,version,col1,col2,...`) and `D` data rows in the same
//!   shape. One file may interleave several tables.
//! - Plain CSV with a header row; the table is named after the file stem.

use crate::pipeline::error::PipelineResult;
use crate::pipeline::{FileReport, Item, Stage, TableRecord};
use async_trait::async_trait;
use csv::StringRecord;
use std::collections::HashMap;

/// Leading columns of an MMS row before the table's own fields
const MMS_PREFIX: usize = 4;

/// Splits decoded documents into table records
#[derive(Debug, Default)]
pub struct RecordSplitStage;

impl RecordSplitStage {
    pub fn new() -> Self {
        Self
    }
}

fn mms_table(row: &StringRecord) -> String {
    format!(
        "{}_{}",
        row.get(1).unwrap_or_default(),
        row.get(2).unwrap_or_default()
    )
    .to_uppercase()
}

fn file_table(name: &str) -> String {
    let base = name.rsplit('/').next().unwrap_or(name);
    base.split('.').next().unwrap_or(base).to_uppercase()
}

fn to_record(table: &str, source: &str, line: usize, columns: &[String], values: &[&str]) -> TableRecord {
    TableRecord {
        table: table.to_string(),
        source: source.to_string(),
        line,
        fields: columns
            .iter()
            .cloned()
            .zip(values.iter().map(|v| v.to_string()))
            .collect(),
    }
}

/// Split one document into records, counting rows that do not fit
pub fn split_records(name: &str, text: &str, report: &mut FileReport) -> Vec<TableRecord> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    let mut mms: Option<bool> = None;
    let mut tables: HashMap<String, Vec<String>> = HashMap::new();
    let mut header: Option<Vec<String>> = None;
    let plain_table = file_table(name);

    let drop_row = |line: usize, reason: &str, report: &mut FileReport| {
        tracing::warn!("Dropping row {} of {}: {}", line, name, reason);
        report.records_dropped += 1;
    };

    for (index, result) in reader.records().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                drop_row(index + 1, &e.to_string(), report);
                continue;
            }
        };
        let line = row.position().map(|p| p.line() as usize).unwrap_or(index + 1);

        if row.iter().all(str::is_empty) {
            continue;
        }

        let is_mms = *mms.get_or_insert_with(|| matches!(row.get(0), Some("C") | Some("I")));

        if is_mms {
            match row.get(0) {
                Some("C") => {}
                Some("I") => {
                    let columns = row.iter().skip(MMS_PREFIX).map(str::to_uppercase).collect();
                    tables.insert(mms_table(&row), columns);
                }
                Some("D") => {
                    let table = mms_table(&row);
                    let values: Vec<&str> = row.iter().skip(MMS_PREFIX).collect();
                    match tables.get(&table) {
                        Some(columns) if columns.len() == values.len() => {
                            records.push(to_record(&table, name, line, columns, &values));
                        }
                        Some(columns) => drop_row(
                            line,
                            &format!("expected {} fields, found {}", columns.len(), values.len()),
                            report,
                        ),
                        None => drop_row(line, &format!("no header for table {}", table), report),
                    }
                }
                other => drop_row(line, &format!("unknown row type {:?}", other), report),
            }
        } else {
            match &header {
                None => header = Some(row.iter().map(str::to_uppercase).collect()),
                Some(columns) => {
                    let values: Vec<&str> = row.iter().collect();
                    if columns.len() == values.len() {
                        records.push(to_record(&plain_table, name, line, columns, &values));
                    } else {
                        drop_row(
                            line,
                            &format!("expected {} fields, found {}", columns.len(), values.len()),
                            report,
                        );
                    }
                }
            }
        }
    }

    records
}

#[async_trait]
impl Stage for RecordSplitStage {
    fn name(&self) -> &str {
        "record_split"
    }

    fn priority(&self) -> u16 {
        320
    }

    async fn process(&self, item: Item, report: &mut FileReport) -> PipelineResult<Vec<Item>> {
        match item {
            Item::Document { name, text } => {
                let records = split_records(&name, &text, report);
                tracing::debug!("Split {} into {} records", name, records.len());
                Ok(records.into_iter().map(Item::Record).collect())
            }
            other => Ok(vec![other]),
        }
    }
}

//! Domain transform stage (priority 405)
//!
//! Maps table records onto `RawSample`s using per-table field mappings, then
//! checks each entity's decoded intervals against the window the resolver
//! expects between its first and last timestamp.

use crate::listing::parse_listing_datetime;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::{process_each, FileReport, Item, Stage, TableRecord};
use crate::series::{Network, TimeInterval, TimeSeriesWindow};
use crate::store::RawSample;
use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// Where a table keeps the timestamp, entity and value of a sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMapping {
    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,

    #[serde(default = "default_entity_field")]
    pub entity_field: String,

    #[serde(default = "default_value_field")]
    pub value_field: String,

    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

fn default_table() -> String {
    "DISPATCH_UNIT_SCADA".to_string()
}

fn default_timestamp_field() -> String {
    "SETTLEMENTDATE".to_string()
}

fn default_entity_field() -> String {
    "DUID".to_string()
}

fn default_value_field() -> String {
    "SCADAVALUE".to_string()
}

fn default_timestamp_format() -> String {
    "%Y/%m/%d %H:%M:%S".to_string()
}

impl Default for RecordMapping {
    fn default() -> Self {
        Self {
            table: default_table(),
            timestamp_field: default_timestamp_field(),
            entity_field: default_entity_field(),
            value_field: default_value_field(),
            timestamp_format: default_timestamp_format(),
        }
    }
}

impl RecordMapping {
    pub fn matches(&self, record: &TableRecord) -> bool {
        self.table.eq_ignore_ascii_case(&record.table)
    }

    /// Map one record to a sample
    pub fn to_sample(&self, record: &TableRecord) -> PipelineResult<RawSample> {
        let field = |name: &str| {
            record.get(name).ok_or_else(|| {
                PipelineError::Validation(format!(
                    "{} line {}: missing field {}",
                    record.source, record.line, name
                ))
            })
        };

        let raw_ts = field(&self.timestamp_field)?;
        let timestamp = NaiveDateTime::parse_from_str(raw_ts, &self.timestamp_format)
            .ok()
            .or_else(|| parse_listing_datetime(raw_ts))
            .ok_or_else(|| {
                PipelineError::Validation(format!(
                    "{} line {}: invalid timestamp {:?}",
                    record.source, record.line, raw_ts
                ))
            })?;

        let entity = field(&self.entity_field)?.trim();
        if entity.is_empty() {
            return Err(PipelineError::Validation(format!(
                "{} line {}: empty {}",
                record.source, record.line, self.entity_field
            )));
        }

        let raw_value = field(&self.value_field)?.trim();
        let value = if raw_value.is_empty() {
            None
        } else {
            Some(
                Decimal::from_str(raw_value)
                    .or_else(|_| Decimal::from_scientific(raw_value))
                    .map_err(|e| {
                        PipelineError::Validation(format!(
                            "{} line {}: invalid value {:?}: {}",
                            record.source, record.line, raw_value, e
                        ))
                    })?,
            )
        };

        Ok(RawSample::new(entity, timestamp, value))
    }
}

/// Turns records into samples and checks interval coverage
pub struct TransformStage {
    mappings: Vec<RecordMapping>,
    network: Network,
}

impl TransformStage {
    pub fn new(mappings: Vec<RecordMapping>, network: Network) -> Self {
        let mappings = if mappings.is_empty() {
            vec![RecordMapping::default()]
        } else {
            mappings
        };
        Self { mappings, network }
    }

    /// Count entities whose distinct intervals fall short of the expected
    /// bucket count between their first and last sample
    fn check_coverage(&self, items: &[Item], report: &mut FileReport) {
        let mut seen: BTreeMap<&str, BTreeSet<NaiveDateTime>> = BTreeMap::new();
        for item in items {
            if let Item::Sample(sample) = item {
                seen.entry(sample.entity_code.as_str())
                    .or_default()
                    .insert(sample.timestamp);
            }
        }

        let offset = self.network.fixed_offset();
        let interval = TimeInterval::Minutes(self.network.interval_minutes());

        for (entity, stamps) in seen {
            let (Some(first), Some(last)) = (stamps.first(), stamps.last()) else {
                continue;
            };
            let (Some(start), Some(end)) = (
                offset.from_local_datetime(first).single(),
                offset.from_local_datetime(last).single(),
            ) else {
                continue;
            };

            let expected = TimeSeriesWindow::new(start, end, interval, self.network).length();
            if stamps.len() < expected {
                tracing::warn!(
                    "{} in {} covers {} of {} intervals between {} and {}",
                    entity,
                    report.file,
                    stamps.len(),
                    expected,
                    first,
                    last
                );
                report.coverage_gaps += 1;
            }
        }
    }
}

#[async_trait]
impl Stage for TransformStage {
    fn name(&self) -> &str {
        "transform"
    }

    fn priority(&self) -> u16 {
        405
    }

    async fn process(&self, item: Item, report: &mut FileReport) -> PipelineResult<Vec<Item>> {
        let record = match item {
            Item::Record(record) => record,
            other => return Ok(vec![other]),
        };

        match self.mappings.iter().find(|m| m.matches(&record)) {
            Some(mapping) => {
                let sample = mapping.to_sample(&record)?;
                report.samples_decoded += 1;
                Ok(vec![Item::Sample(sample)])
            }
            None => {
                tracing::trace!("No mapping for table {}", record.table);
                Ok(Vec::new())
            }
        }
    }

    async fn process_batch(
        &self,
        items: Vec<Item>,
        report: &mut FileReport,
    ) -> PipelineResult<Vec<Item>> {
        let out = process_each(self, items, report).await?;
        self.check_coverage(&out, report);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::fixtures::SCADA_CSV;
    use crate::pipeline::stages::records::split_records;
    use chrono::Duration;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn records(text: &str) -> Vec<Item> {
        split_records("scada.csv", text, &mut FileReport::default())
            .into_iter()
            .map(Item::Record)
            .collect()
    }

    fn samples(items: &[Item]) -> Vec<&RawSample> {
        items
            .iter()
            .filter_map(|i| match i {
                Item::Sample(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_scada_records_mapped() {
        let stage = TransformStage::new(vec![], Network::Nem);
        let mut report = FileReport::default();
        let out = stage.process_batch(records(SCADA_CSV), &mut report).await.unwrap();

        let samples = samples(&out);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].entity_code, "BAYSW1");
        assert_eq!(samples[0].timestamp, ts("2020-06-11 00:05"));
        assert_eq!(samples[0].value, Some(Decimal::from_str("512.5").unwrap()));
        assert_eq!(samples[2].value, None);
        assert_eq!(report.samples_decoded, 3);
        assert_eq!(report.coverage_gaps, 0);
    }

    #[tokio::test]
    async fn test_invalid_records_dropped() {
        let text = "I,DISPATCH,UNIT_SCADA,1,SETTLEMENTDATE,DUID,SCADAVALUE
D,DISPATCH,UNIT_SCADA,1,\"2020/06/11 00:05:00\",BAYSW1,abc
D,DISPATCH,UNIT_SCADA,1,\"not a date\",BAYSW1,1
D,DISPATCH,UNIT_SCADA,1,\"2020/06/11 00:05:00\",,1
D,DISPATCH,UNIT_SCADA,1,\"2020/06/11 00:05:00\",ER01,1.2E+2
";
        let stage = TransformStage::new(vec![], Network::Nem);
        let mut report = FileReport::default();
        let out = stage.process_batch(records(text), &mut report).await.unwrap();

        let samples = samples(&out);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, Some(Decimal::from(120)));
        assert_eq!(report.records_dropped, 3);
    }

    #[tokio::test]
    async fn test_unmapped_tables_ignored() {
        let text = "I,DISPATCH,PRICE,1,SETTLEMENTDATE,REGIONID,RRP
D,DISPATCH,PRICE,1,\"2020/06/11 00:05:00\",NSW1,25.1
";
        let stage = TransformStage::new(vec![], Network::Nem);
        let out = stage
            .process_batch(records(text), &mut FileReport::default())
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_custom_mapping() {
        let mapping = RecordMapping {
            table: "DISPATCH_PRICE".to_string(),
            entity_field: "REGIONID".to_string(),
            value_field: "RRP".to_string(),
            ..Default::default()
        };
        let text = "I,DISPATCH,PRICE,1,SETTLEMENTDATE,REGIONID,RRP
D,DISPATCH,PRICE,1,\"2020/06/11 00:05:00\",NSW1,25.1
";
        let stage = TransformStage::new(vec![mapping], Network::Nem);
        let out = stage
            .process_batch(records(text), &mut FileReport::default())
            .await
            .unwrap();
        assert_eq!(samples(&out)[0].entity_code, "NSW1");
    }

    #[tokio::test]
    async fn test_coverage_gap_reported() {
        let start = ts("2020-06-11 00:05");
        let mut items: Vec<Item> = [0, 1, 3]
            .iter()
            .map(|i| Item::Sample(RawSample::new("BAYSW1", start + Duration::minutes(5 * i), None)))
            .collect();
        items.extend((0..4).map(|i| {
            Item::Sample(RawSample::new("ER01", start + Duration::minutes(5 * i), None))
        }));

        let stage = TransformStage::new(vec![], Network::Nem);
        let mut report = FileReport::default();
        stage.check_coverage(&items, &mut report);

        assert_eq!(report.coverage_gaps, 1);
    }
}

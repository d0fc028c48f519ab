//! Text decode stage (priority 310)

use crate::pipeline::error::PipelineResult;
use crate::pipeline::{FileReport, Item, Stage};
use async_trait::async_trait;

/// Extensions decoded as text; files without an extension are tried too
const TEXT_EXTENSIONS: &[&str] = &["csv", "txt"];

/// Decodes payloads to UTF-8 text. Non-text payloads are dropped.
#[derive(Debug, Default)]
pub struct TextDecodeStage;

impl TextDecodeStage {
    pub fn new() -> Self {
        Self
    }

    fn is_text(name: &str) -> bool {
        let base = name.rsplit('/').next().unwrap_or(name);
        match base.rsplit_once('.') {
            Some((_, ext)) => TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
            None => true,
        }
    }
}

#[async_trait]
impl Stage for TextDecodeStage {
    fn name(&self) -> &str {
        "text_decode"
    }

    fn priority(&self) -> u16 {
        310
    }

    async fn process(&self, item: Item, _report: &mut FileReport) -> PipelineResult<Vec<Item>> {
        let (name, bytes) = match item {
            Item::Payload { name, bytes, .. } => (name, bytes),
            other => return Ok(vec![other]),
        };

        if !Self::is_text(&name) {
            tracing::debug!("Not a supported file type: {}", name);
            return Ok(Vec::new());
        }

        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("{} is not valid UTF-8, decoding lossily", name);
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };

        Ok(vec![Item::Document {
            name,
            text: text.trim_start_matches('\u{feff}').to_string(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(name: &str, bytes: &[u8]) -> Item {
        Item::Payload {
            name: name.to_string(),
            source: "http://host/".to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_csv_decoded() {
        let out = TextDecodeStage
            .process(payload("A.CSV", b"\xef\xbb\xbfa,b\n"), &mut FileReport::default())
            .await
            .unwrap();

        match &out[..] {
            [Item::Document { text, .. }] => assert_eq!(text, "a,b\n"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_lossy() {
        let out = TextDecodeStage
            .process(payload("a.csv", b"caf\xe9,1\n"), &mut FileReport::default())
            .await
            .unwrap();

        match &out[..] {
            [Item::Document { text, .. }] => assert!(text.starts_with("caf")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_binary_members_dropped() {
        let out = TextDecodeStage
            .process(payload("manual.pdf", b"%PDF"), &mut FileReport::default())
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}

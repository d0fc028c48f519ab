//! Built-in pipeline stages

mod decode;
mod decompress;
mod download;
mod records;
mod transform;

pub use decode::TextDecodeStage;
pub use decompress::DecompressStage;
pub use download::DownloadStage;
pub use records::RecordSplitStage;
pub use transform::{RecordMapping, TransformStage};

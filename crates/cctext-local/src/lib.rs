use cctext_core::{Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub mod decode;
pub mod detect;
pub mod diagnose;
pub mod extract;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod resolve;
pub mod stats;
pub mod warc;

pub use decode::{DecodeCheck, DecodedText, StrictDecoder};
pub use detect::{LocaleDetector, MarkupDetector, UniversalDetector};
pub use extract::{BlockExtractor, Html2TextExtractor};
pub use pipeline::{PipelineConfig, ResponsePipeline, RunOutputs, RunSummary};
pub use record::{PayloadStream, RecordAdapter};
pub use resolve::{CharsetResolver, Resolution};
pub use stats::{Stats, StatsFile};
pub use warc::{WarcReader, DEFAULT_BUFFER_SIZE};

/// Archive input: a file path, or `-` for stdin.
pub fn open_archive(input: &Path, buffer_size: usize) -> Result<WarcReader<'static>> {
    let source: Box<dyn Read> = if input == Path::new("-") {
        Box::new(std::io::stdin().lock())
    } else {
        let file = File::open(input)
            .map_err(|e| Error::Setup(format!("cannot open {}: {e}", input.display())))?;
        Box::new(file)
    };
    WarcReader::new(source, buffer_size)
}

/// Name for fault entries: the file name of the input, or `-`.
pub fn archive_name(input: &Path) -> String {
    input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "-".to_string())
}

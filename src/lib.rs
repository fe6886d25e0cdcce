use std::{fs::File, io::BufReader, path::Path};

pub mod batch;
mod engine;
mod error;
pub mod parser;
mod result;
pub mod sequence;
pub mod util;

pub use engine::*;
pub use error::{Error, Result};
pub use parser::ParseOptions;
pub use result::*;
pub use sequence::SequenceOptions;

use parser::parse_raw;
use sequence::validate_and_sequence;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Tunables for turning raw engine output into a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    pub parse: ParseOptions,
    pub sequence: SequenceOptions,
}

impl NormalizeOptions {
    /// Loads options from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::io(path, source))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| Error::json(path, source))
    }
}

pub struct DocumentAggregatorBuilder<E> {
    engine: E,
    options: NormalizeOptions,
}

impl<E: OcrEngine> DocumentAggregatorBuilder<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            options: NormalizeOptions::default(),
        }
    }

    pub fn options(mut self, options: NormalizeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn confidence_threshold(mut self, threshold: f32) -> Self {
        self.options.sequence.confidence_threshold = threshold;
        self
    }

    pub fn row_tolerance(mut self, row_tolerance: u32) -> Self {
        self.options.sequence.row_tolerance = row_tolerance;
        self
    }

    pub fn default_confidence(mut self, confidence: f32) -> Self {
        self.options.parse.default_confidence = confidence;
        self
    }

    pub fn build(self) -> DocumentAggregator<E> {
        DocumentAggregator {
            engine: self.engine,
            options: self.options,
        }
    }
}

/// Runs an OCR engine over an image and normalizes its output into a
/// [`DocumentResult`].
///
/// Holds no per-document state, so one aggregator can serve many images,
/// from several threads if the engine allows it.
pub struct DocumentAggregator<E> {
    engine: E,
    options: NormalizeOptions,
}

impl<E: OcrEngine> DocumentAggregator<E> {
    pub fn builder(engine: E) -> DocumentAggregatorBuilder<E> {
        DocumentAggregatorBuilder::new(engine)
    }

    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn run(&self, image_path: impl AsRef<Path>) -> Result<DocumentResult> {
        self.run_with(image_path.as_ref(), self.options)
    }

    /// Like [`DocumentAggregator::run`] with options for this call only.
    #[instrument(skip(self, options))]
    pub fn run_with(&self, image_path: &Path, options: NormalizeOptions) -> Result<DocumentResult> {
        // only the header is decoded; the file is closed again on return
        let (image_width, image_height) =
            image::image_dimensions(image_path).map_err(|source| Error::Image {
                path: image_path.to_path_buf(),
                source,
            })?;
        log::debug!(
            "Image {} is {image_width}x{image_height}",
            image_path.display()
        );

        let lines = match self.engine.extract(image_path)? {
            Some(raw) => parse_raw(&raw, &options.parse),
            None => Vec::new(),
        };
        let detected = lines.len();
        let lines = validate_and_sequence(lines, image_width, image_height, &options.sequence);
        log::debug!("Kept {} of {detected} detected lines", lines.len());

        let metadata = DocumentMetadata {
            file_name: image_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            image_width,
            image_height,
        };
        Ok(DocumentResult::new(metadata, lines))
    }
}

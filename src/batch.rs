//! Processing of whole directory trees of scans.
//!
//! Results are written to a mirror of the input tree: an image at
//! `input/invoice/a.png` ends up as `output/invoice/a.json`.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use tracing::instrument;
use walkdir::WalkDir;

use crate::{DocumentAggregator, Error, NormalizeOptions, OcrEngine, Result};

pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

#[derive(Debug)]
pub struct BatchFailure {
    pub image: PathBuf,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// JSON files written, in walk order.
    pub outputs: Vec<PathBuf>,
    pub failures: Vec<BatchFailure>,
    /// Outputs written more than once, e.g. by `a.png` and `a.jpg` side by
    /// side. The last image in walk order wins.
    pub overwritten: Vec<PathBuf>,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.outputs.len()
    }
}

/// Runs `aggregator` over every image below `input_root` and saves the
/// results under `output_root`.
///
/// A document that fails is recorded in the report and the walk carries on.
/// Only an unreadable `input_root` fails the whole batch.
#[instrument(skip(aggregator, options))]
pub fn process_tree<E: OcrEngine>(
    aggregator: &DocumentAggregator<E>,
    input_root: &Path,
    output_root: &Path,
    options: NormalizeOptions,
) -> Result<BatchReport> {
    let mut report = BatchReport::default();
    let mut written = HashSet::new();

    for entry in WalkDir::new(input_root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(Error::io(input_root, err.into())),
            Err(err) => {
                log::warn!("Skipping unreadable entry: {err}");
                continue;
            }
        };
        let image = entry.path();
        if !entry.file_type().is_file() || !is_image(image) {
            continue;
        }

        let relative = image
            .parent()
            .and_then(|parent| parent.strip_prefix(input_root).ok())
            .unwrap_or(Path::new(""));
        let target_dir = output_root.join(relative);

        match aggregator
            .run_with(image, options)
            .and_then(|document| document.save_json(&target_dir))
        {
            Ok(output) => {
                log::info!("{} -> {}", image.display(), output.display());
                if !written.insert(output.clone()) {
                    log::warn!(
                        "{} overwrote an earlier result at {}",
                        image.display(),
                        output.display()
                    );
                    report.overwritten.push(output.clone());
                }
                report.outputs.push(output);
            }
            Err(error) => {
                log::warn!("Failed to process {}: {error}", image.display());
                report.failures.push(BatchFailure {
                    image: image.to_path_buf(),
                    error,
                });
            }
        }
    }

    log::info!(
        "Processed {} documents, {} failed",
        report.processed(),
        report.failures.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_extensions() {
        assert!(is_image(Path::new("a/b.png")));
        assert!(is_image(Path::new("B.JPG")));
        assert!(is_image(Path::new("c.Jpeg")));
        assert!(!is_image(Path::new("notes.txt")));
        assert!(!is_image(Path::new("png")));
    }
}

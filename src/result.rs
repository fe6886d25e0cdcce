use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    util::{clamp_bbox, normalize_bbox},
    Error, Result,
};

/// Axis-aligned box `[x_min, y_min, x_max, y_max]` in source image pixels.
///
/// Serialized as a plain four-integer array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BBox([i32; 4]);

impl BBox {
    pub const fn new(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Self {
        Self([x_min, y_min, x_max, y_max])
    }

    pub const fn x_min(&self) -> i32 {
        self.0[0]
    }

    pub const fn y_min(&self) -> i32 {
        self.0[1]
    }

    pub const fn x_max(&self) -> i32 {
        self.0[2]
    }

    pub const fn y_max(&self) -> i32 {
        self.0[3]
    }

    pub const fn width(&self) -> i32 {
        self.x_max() - self.x_min()
    }

    pub const fn height(&self) -> i32 {
        self.y_max() - self.y_min()
    }

    /// True when the box has positive width and height.
    pub const fn is_valid(&self) -> bool {
        self.x_min() < self.x_max() && self.y_min() < self.y_max()
    }

    pub const fn to_array(self) -> [i32; 4] {
        self.0
    }
}

impl From<[i32; 4]> for BBox {
    fn from(coords: [i32; 4]) -> Self {
        Self(coords)
    }
}

impl From<BBox> for [i32; 4] {
    fn from(bbox: BBox) -> Self {
        bbox.0
    }
}

/// One recognized line of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    pub bbox: BBox,
    pub confidence: f32,
}

impl TextLine {
    pub fn new(text: impl Into<String>, bbox: impl Into<BBox>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            bbox: bbox.into(),
            confidence,
        }
    }

    /// Returns this line with its box clamped into a `width` x `height` frame,
    /// or `None` if nothing of the box is left inside it.
    pub fn clamped(self, width: u32, height: u32) -> Option<Self> {
        let bbox = clamp_bbox(self.bbox, width, height)?;
        Some(Self { bbox, ..self })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub file_name: String,
    pub image_width: u32,
    pub image_height: u32,
}

fn default_page_id() -> u32 {
    1
}

/// Normalized OCR output for a single page.
///
/// `full_text` is derived from `lines`. Anything that edits `lines` directly
/// has to call [`DocumentResult::refresh_full_text`] afterwards, or use
/// [`DocumentResult::set_lines`] which does both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    #[serde(default = "default_page_id")]
    pub page_id: u32,
    pub metadata: DocumentMetadata,
    pub lines: Vec<TextLine>,
    #[serde(default)]
    pub full_text: String,
}

impl DocumentResult {
    pub fn new(metadata: DocumentMetadata, lines: Vec<TextLine>) -> Self {
        let mut result = Self {
            page_id: default_page_id(),
            metadata,
            lines,
            full_text: String::new(),
        };
        result.refresh_full_text();
        result
    }

    pub fn refresh_full_text(&mut self) {
        self.full_text = self
            .lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
    }

    pub fn set_lines(&mut self, lines: Vec<TextLine>) {
        self.lines = lines;
        self.refresh_full_text();
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Words and 0-1000 scaled boxes in reading order, the input format of
    /// layout-aware document classifiers. Blank lines are left out.
    pub fn layout_input(&self) -> LayoutInput {
        let DocumentMetadata {
            image_width,
            image_height,
            ..
        } = self.metadata;
        let (words, boxes) = self
            .lines
            .iter()
            .filter(|line| !line.text.trim().is_empty())
            .filter_map(|line| {
                let scaled = normalize_bbox(line.bbox, image_width, image_height)?;
                Some((line.text.clone(), scaled.map(|c| c.clamp(0, 1000))))
            })
            .unzip();
        LayoutInput { words, boxes }
    }

    /// File name the result is persisted under: the image name with a `.json`
    /// extension.
    pub fn json_file_name(&self) -> PathBuf {
        Path::new(&self.metadata.file_name).with_extension("json")
    }

    /// Writes the document as pretty-printed UTF-8 JSON into `out_dir`,
    /// creating the directory if needed. Returns the path written.
    pub fn save_json(&self, out_dir: impl AsRef<Path>) -> Result<PathBuf> {
        let out_dir = out_dir.as_ref();
        fs::create_dir_all(out_dir).map_err(|source| Error::io(out_dir, source))?;
        let path = out_dir.join(self.json_file_name());
        let file = File::create(&path).map_err(|source| Error::io(&path, source))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|source| Error::json(&path, source))?;
        writer.flush().map_err(|source| Error::io(&path, source))?;
        log::debug!("Saved {} lines to {}", self.lines.len(), path.display());
        Ok(path)
    }

    pub fn read_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::io(path, source))?;
        Self::from_reader(BufReader::new(file)).map_err(|source| Error::json(path, source))
    }

    /// Deserializes a persisted document. `full_text` is rebuilt from `lines`
    /// whatever the input held for it.
    pub fn from_reader(reader: impl Read) -> serde_json::Result<Self> {
        let mut document: Self = serde_json::from_reader(reader)?;
        document.refresh_full_text();
        Ok(document)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutInput {
    pub words: Vec<String>,
    pub boxes: Vec<[i32; 4]>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(width: u32, height: u32) -> DocumentMetadata {
        DocumentMetadata {
            file_name: "scan.png".into(),
            image_width: width,
            image_height: height,
        }
    }

    #[test]
    fn full_text_follows_lines() {
        let mut doc = DocumentResult::new(
            metadata(100, 100),
            vec![
                TextLine::new("Total", [0, 0, 50, 10], 0.9),
                TextLine::new("$50", [0, 20, 40, 30], 0.95),
            ],
        );
        assert_eq!(doc.full_text, "Total\n$50");

        doc.lines.reverse();
        assert_eq!(doc.full_text, "Total\n$50");
        doc.refresh_full_text();
        assert_eq!(doc.full_text, "$50\nTotal");

        doc.set_lines(Vec::new());
        assert_eq!(doc.full_text, "");
        assert!(doc.is_empty());
    }

    #[test]
    fn serializes_expected_shape() {
        let doc = DocumentResult::new(
            metadata(640, 480),
            vec![TextLine::new("請求書", [1, 2, 3, 4], 0.5)],
        );
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "page_id": 1,
                "metadata": { "file_name": "scan.png", "image_width": 640, "image_height": 480 },
                "lines": [ { "text": "請求書", "bbox": [1, 2, 3, 4], "confidence": 0.5 } ],
                "full_text": "請求書",
            })
        );
        assert!(serde_json::to_string(&doc).unwrap().contains("請求書"));
    }

    #[test]
    fn clamped_returns_new_line() {
        let line = TextLine::new("edge", [-5, 10, 120, 40], 0.8);
        let clamped = line.clone().clamped(100, 30).unwrap();
        assert_eq!(clamped.bbox, BBox::new(0, 10, 100, 30));
        assert_eq!(clamped.text, "edge");
        assert_eq!(line.bbox, BBox::new(-5, 10, 120, 40));

        assert!(TextLine::new("gone", [-20, -20, -5, -5], 0.9)
            .clamped(100, 100)
            .is_none());
    }

    #[test]
    fn layout_input_scales_and_skips_blank() {
        let doc = DocumentResult::new(
            metadata(200, 100),
            vec![
                TextLine::new("Invoice", [20, 10, 100, 30], 0.9),
                TextLine::new("   ", [0, 40, 10, 50], 0.9),
                TextLine::new("Due", [150, 50, 200, 100], 0.9),
            ],
        );
        let input = doc.layout_input();
        assert_eq!(input.words, ["Invoice", "Due"]);
        assert_eq!(input.boxes, [[100, 100, 500, 300], [750, 500, 1000, 1000]]);
    }

    #[test]
    fn loading_rebuilds_full_text() {
        let missing = r#"{
            "metadata": { "file_name": "a.png", "image_width": 10, "image_height": 10 },
            "lines": [ { "text": "a", "bbox": [0, 0, 5, 5], "confidence": 0.9 } ]
        }"#;
        let doc = DocumentResult::from_reader(missing.as_bytes()).unwrap();
        assert_eq!(doc.page_id, 1);
        assert_eq!(doc.full_text, "a");

        let stale = r#"{
            "page_id": 1,
            "metadata": { "file_name": "a.png", "image_width": 10, "image_height": 10 },
            "lines": [
                { "text": "a", "bbox": [0, 0, 5, 5], "confidence": 0.9 },
                { "text": "b", "bbox": [0, 6, 5, 9], "confidence": 0.9 }
            ],
            "full_text": "outdated"
        }"#;
        let doc = DocumentResult::from_reader(stale.as_bytes()).unwrap();
        assert_eq!(doc.full_text, "a\nb");
    }

    #[test]
    fn json_file_name_replaces_extension() {
        let doc = DocumentResult::new(metadata(1, 1), Vec::new());
        assert_eq!(doc.json_file_name(), PathBuf::from("scan.json"));
    }
}

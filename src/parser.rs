//! Conversion of raw OCR engine output into [`TextLine`]s.
//!
//! Engines disagree on output shape. Newer PaddleOCR builds return parallel
//! arrays (`rec_texts`, `rec_scores`, `rec_polys`); older ones return a list
//! of `[polygon, [text, score]]` pairs, sometimes wrapped in an object.
//! [`classify`] works out which one we were handed and [`parse_raw`] turns it
//! into lines, dropping individual items it cannot read.

use geo::Coord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::instrument;

use crate::{util::polygon_to_bbox, BBox, TextLine};

const TEXTS_KEY: &str = "rec_texts";
const SCORES_KEY: &str = "rec_scores";
const POLYGONS_KEY: &str = "rec_polys";

/// Keys an object may wrap a pair list under, in lookup order.
pub const PAIR_LIST_KEYS: [&str; 3] = ["dt_polys", "ocr_result", "res"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Confidence given to detections that come without a score.
    pub default_confidence: f32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            default_confidence: 0.99,
        }
    }
}

/// The raw output layouts we know how to read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawShape<'a> {
    /// Parallel arrays of texts, scores and polygons. Members that are missing
    /// or not arrays are empty.
    Parallel {
        texts: &'a [Value],
        scores: &'a [Value],
        polygons: &'a [Value],
    },
    /// A list of `[polygon, content]` pairs.
    Pairs(&'a [Value]),
    Unrecognized,
}

impl RawShape<'_> {
    pub fn is_recognized(&self) -> bool {
        !matches!(self, RawShape::Unrecognized)
    }
}

fn array_member<'a>(map: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    map.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Detects the shape of a raw engine result. The parallel-array layout wins
/// over a wrapped pair list when an object carries both.
pub fn classify(raw: &Value) -> RawShape<'_> {
    match raw {
        Value::Object(map) if map.contains_key(TEXTS_KEY) => RawShape::Parallel {
            texts: array_member(map, TEXTS_KEY),
            scores: array_member(map, SCORES_KEY),
            polygons: array_member(map, POLYGONS_KEY),
        },
        Value::Array(items) => RawShape::Pairs(items),
        Value::Object(map) => PAIR_LIST_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .map_or(RawShape::Unrecognized, |items| RawShape::Pairs(items)),
        _ => RawShape::Unrecognized,
    }
}

/// Parses raw engine output into lines in engine order.
///
/// No filtering or sorting happens here beyond dropping items that are
/// malformed. Unknown shapes produce an empty list.
#[instrument(level = "debug", skip_all)]
pub fn parse_raw(raw: &Value, options: &ParseOptions) -> Vec<TextLine> {
    let lines = match classify(raw) {
        RawShape::Parallel {
            texts,
            scores,
            polygons,
        } => texts
            .iter()
            .zip(polygons)
            .enumerate()
            .filter_map(|(index, (text, polygon))| {
                build_line(text, scores.get(index), polygon, options)
                    .or_else(|| skipped(index))
            })
            .collect::<Vec<_>>(),
        RawShape::Pairs(items) => items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| parse_pair(item, options).or_else(|| skipped(index)))
            .collect(),
        RawShape::Unrecognized => {
            log::debug!("Unrecognized raw OCR output, treating as empty");
            Vec::new()
        }
    };
    log::debug!("Parsed {} lines from raw OCR output", lines.len());
    lines
}

fn skipped(index: usize) -> Option<TextLine> {
    log::trace!("Skipping malformed detection #{index}");
    None
}

/// Reads one `[polygon, content]` item. `content` is either `[text, score]`
/// or the bare text, in which case the default confidence applies.
pub fn parse_pair(item: &Value, options: &ParseOptions) -> Option<TextLine> {
    let [polygon, content] = item.as_array()?.as_slice() else {
        return None;
    };
    match content {
        Value::Array(content) => {
            let [text, score, ..] = content.as_slice() else {
                return None;
            };
            build_line(text, Some(score), polygon, options)
        }
        text => build_line(text, None, polygon, options),
    }
}

fn build_line(
    text: &Value,
    score: Option<&Value>,
    polygon: &Value,
    options: &ParseOptions,
) -> Option<TextLine> {
    let text = text_value(text)?;
    let confidence = match score {
        Some(score) => score_value(score)?,
        None => options.default_confidence,
    };
    let bbox = polygon_value(polygon)?;
    Some(TextLine {
        text,
        bbox,
        confidence,
    })
}

fn text_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn score_value(value: &Value) -> Option<f32> {
    let score = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Some(score as f32)
}

fn polygon_value(value: &Value) -> Option<BBox> {
    let points = value
        .as_array()?
        .iter()
        .map(point_value)
        .collect::<Option<Vec<_>>>()?;
    polygon_to_bbox(points)
}

fn point_value(value: &Value) -> Option<Coord<f64>> {
    let [x, y] = value.as_array()?.as_slice() else {
        return None;
    };
    Some(Coord {
        x: x.as_f64()?,
        y: y.as_f64()?,
    })
}

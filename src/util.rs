use geo::{BoundingRect, Coord, LineString};

use crate::BBox;

/// Smallest integer box enclosing a detection polygon.
///
/// Minimums are floored and maximums ceiled, so the box never cuts into the
/// polygon. Returns `None` for an empty polygon or non-finite coordinates.
pub fn polygon_to_bbox<I, P>(points: I) -> Option<BBox>
where
    I: IntoIterator<Item = P>,
    P: Into<Coord<f64>>,
{
    let coords = points.into_iter().map(Into::into).collect::<Vec<Coord<f64>>>();
    if coords.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return None;
    }
    let rect = LineString::new(coords).bounding_rect()?;
    let (min, max) = (rect.min(), rect.max());
    Some(BBox::new(
        min.x.floor() as i32,
        min.y.floor() as i32,
        max.x.ceil() as i32,
        max.y.ceil() as i32,
    ))
}

/// Rescales a pixel box to the 0-1000 grid used by layout-aware models.
///
/// Values are not clamped; boxes reaching outside the image map outside
/// `[0, 1000]`. Returns `None` when either dimension is zero.
pub fn normalize_bbox(bbox: BBox, width: u32, height: u32) -> Option<[i32; 4]> {
    if width == 0 || height == 0 {
        return None;
    }
    let scale = |c: i32, dim: u32| (1000.0 * f64::from(c) / f64::from(dim)).round() as i32;
    Some([
        scale(bbox.x_min(), width),
        scale(bbox.y_min(), height),
        scale(bbox.x_max(), width),
        scale(bbox.y_max(), height),
    ])
}

/// Clamps a box into a `width` x `height` frame. `None` if the clamped box is
/// degenerate.
pub fn clamp_bbox(bbox: BBox, width: u32, height: u32) -> Option<BBox> {
    let width = i32::try_from(width).unwrap_or(i32::MAX);
    let height = i32::try_from(height).unwrap_or(i32::MAX);
    let clamped = BBox::new(
        bbox.x_min().max(0),
        bbox.y_min().max(0),
        bbox.x_max().min(width),
        bbox.y_max().min(height),
    );
    if !clamped.is_valid() {
        log::trace!("Box {bbox:?} is degenerate after clamping to {width}x{height}");
        return None;
    }
    Some(clamped)
}

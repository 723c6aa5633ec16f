//! Watershed boundary construction
//!
//! Member catchment polygons are merged by a pairwise (balanced) union, so
//! the result follows catchment edges exactly and never needs the raw
//! cells. The published outline is simplified to half a cell.

use catchflow_core::{Error, Result};
use geo::{Area, BooleanOps, Contains, Coord, LineString, MultiPolygon, Point, Polygon, Simplify};
use tracing::{debug, warn};

/// Union of all `parts`.
pub fn union_all(mut parts: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    if parts.is_empty() {
        return MultiPolygon::new(Vec::new());
    }
    while parts.len() > 1 {
        let mut next = Vec::with_capacity(parts.len().div_ceil(2));
        let mut iter = parts.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => next.push(a.union(&b)),
                None => next.push(a),
            }
        }
        parts = next;
    }
    parts.pop().unwrap_or_else(|| MultiPolygon::new(Vec::new()))
}

fn ring_length(ring: &LineString<f64>) -> f64 {
    ring.0
        .windows(2)
        .map(|w| ((w[1].x - w[0].x).powi(2) + (w[1].y - w[0].y).powi(2)).sqrt())
        .sum()
}

/// Total length of every ring, holes included
pub fn perimeter(shape: &MultiPolygon<f64>) -> f64 {
    shape
        .0
        .iter()
        .map(|p| ring_length(p.exterior()) + p.interiors().iter().map(ring_length).sum::<f64>())
        .sum()
}

/// Reduce the union to one polygon around `outlet` and simplify it.
///
/// A disjoint union keeps its largest component. If that component does
/// not hold the outlet, the component that does is kept instead. The
/// simplified outline is dropped in favour of the exact one when it loses
/// the outlet or collapses.
pub fn watershed_outline(union: &MultiPolygon<f64>, outlet: Point<f64>, tolerance: f64) -> Result<Polygon<f64>> {
    let largest = union
        .0
        .iter()
        .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
        .ok_or_else(|| Error::Inconsistent("watershed union is empty".into()))?;

    let component = if largest.contains(&outlet) {
        largest
    } else {
        let holder = union
            .0
            .iter()
            .find(|p| p.contains(&outlet))
            .ok_or_else(|| Error::Inconsistent("outlet lies outside its own watershed".into()))?;
        warn!(
            components = union.0.len(),
            "largest watershed component misses the outlet; keeping the outlet's component"
        );
        holder
    };

    let simplified = component.simplify(&tolerance);
    let collapsed = simplified.exterior().0.len() < 4 || simplified.unsigned_area() <= 0.0;
    if collapsed || !simplified.contains(&outlet) {
        debug!(tolerance, "simplified outline rejected; using exact outline");
        return Ok(component.clone());
    }
    Ok(simplified)
}

/// Axis-aligned square polygon, used where a single cell must be outlined
pub fn cell_square(cx: f64, cy: f64, size: f64) -> Polygon<f64> {
    let h = size / 2.0;
    Polygon::new(
        LineString::new(vec![
            Coord { x: cx - h, y: cy - h },
            Coord { x: cx + h, y: cy - h },
            Coord { x: cx + h, y: cy + h },
            Coord { x: cx - h, y: cy + h },
        ]),
        vec![],
    )
}

//! Exact polygons for a label grid
//!
//! Every cell side separating two labels becomes a directed boundary edge,
//! oriented so the labeled cell lies on its left in (col, row) coordinates.
//! Chaining edges head to tail yields closed rings: counter-clockwise rings
//! are exteriors, clockwise rings are holes. Where two cells of one label
//! touch only at a corner the chain turns left, so diagonal neighbors end up
//! as separate polygons instead of a self-touching ring.

use crate::basins::NO_LABEL;
use catchflow_core::raster::GeoTransform;
use catchflow_core::{Error, Result};
use geo::{Contains, Coord, LineString, MultiPolygon, Point, Polygon};
use std::collections::HashMap;

type Vertex = (i64, i64);

#[derive(Debug, Clone, Copy)]
struct Edge {
    from: Vertex,
    to: Vertex,
}

impl Edge {
    fn delta(&self) -> Vertex {
        (self.to.0 - self.from.0, self.to.1 - self.from.1)
    }
}

/// One `MultiPolygon` per label in `0..count`, in world coordinates.
///
/// Cells labeled [`NO_LABEL`] belong to no polygon.
pub fn polygonize_labels(
    labels: &[u32],
    rows: usize,
    cols: usize,
    count: usize,
    transform: &GeoTransform,
) -> Result<Vec<MultiPolygon<f64>>> {
    if labels.len() != rows * cols {
        return Err(Error::SizeMismatch {
            er: rows,
            ec: cols,
            ar: labels.len() / cols.max(1),
            ac: cols,
        });
    }

    let label_at = |row: i64, col: i64| -> u32 {
        if row < 0 || col < 0 || row >= rows as i64 || col >= cols as i64 {
            NO_LABEL
        } else {
            labels[row as usize * cols + col as usize]
        }
    };

    let mut edges: Vec<Vec<Edge>> = vec![Vec::new(); count];
    for row in 0..rows as i64 {
        for col in 0..cols as i64 {
            let label = label_at(row, col);
            if label == NO_LABEL {
                continue;
            }
            let l = label as usize;
            if l >= count {
                return Err(Error::Inconsistent(format!("label {label} out of range {count}")));
            }
            let (tl, tr) = ((col, row), (col + 1, row));
            let (br, bl) = ((col + 1, row + 1), (col, row + 1));
            if label_at(row - 1, col) != label {
                edges[l].push(Edge { from: tl, to: tr });
            }
            if label_at(row, col + 1) != label {
                edges[l].push(Edge { from: tr, to: br });
            }
            if label_at(row + 1, col) != label {
                edges[l].push(Edge { from: br, to: bl });
            }
            if label_at(row, col - 1) != label {
                edges[l].push(Edge { from: bl, to: tl });
            }
        }
    }

    edges
        .iter()
        .enumerate()
        .map(|(label, edges)| {
            let rings = chain_rings(edges)
                .ok_or_else(|| Error::Inconsistent(format!("open boundary for label {label}")))?;
            Ok(assemble(rings, transform))
        })
        .collect()
}

/// Chain directed edges into closed rings of corner vertices.
fn chain_rings(edges: &[Edge]) -> Option<Vec<Vec<Vertex>>> {
    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::new();
    for (i, e) in edges.iter().enumerate() {
        outgoing.entry(e.from).or_default().push(i);
    }

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for first in 0..edges.len() {
        if used[first] {
            continue;
        }
        let mut ring = Vec::new();
        let mut cur = first;
        loop {
            used[cur] = true;
            ring.push(edges[cur].from);
            let (dx, dy) = edges[cur].delta();
            let preference = [(-dy, dx), (dx, dy), (dy, -dx)];
            let candidates = outgoing.get(&edges[cur].to)?;
            let next = preference.iter().find_map(|&turn| {
                candidates
                    .iter()
                    .copied()
                    .find(|&e| (!used[e] || e == first) && edges[e].delta() == turn)
            })?;
            if next == first {
                break;
            }
            cur = next;
        }
        rings.push(drop_collinear(ring));
    }
    Some(rings)
}

fn drop_collinear(ring: Vec<Vertex>) -> Vec<Vertex> {
    let n = ring.len();
    (0..n)
        .filter(|&i| {
            let prev = ring[(i + n - 1) % n];
            let here = ring[i];
            let next = ring[(i + 1) % n];
            let a = ((here.0 - prev.0).signum(), (here.1 - prev.1).signum());
            let b = ((next.0 - here.0).signum(), (next.1 - here.1).signum());
            a != b
        })
        .map(|i| ring[i])
        .collect()
}

/// Twice the signed area; positive for counter-clockwise rings
fn signed_area2(ring: &[Vertex]) -> i64 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (x0, y0) = ring[i];
            let (x1, y1) = ring[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum()
}

fn grid_ring(ring: &[Vertex]) -> LineString<f64> {
    LineString::new(
        ring.iter()
            .map(|&(x, y)| Coord { x: x as f64, y: y as f64 })
            .collect(),
    )
}

fn world_ring(ring: &[Vertex], transform: &GeoTransform) -> LineString<f64> {
    LineString::new(
        ring.iter()
            .map(|&(x, y)| {
                let (wx, wy) = transform.corner_to_geo(x as f64, y as f64);
                Coord { x: wx, y: wy }
            })
            .collect(),
    )
}

/// Center of the cell on the right of a hole ring's first edge, which lies
/// strictly inside the hole.
fn point_inside_hole(ring: &[Vertex]) -> Point<f64> {
    let (x0, y0) = ring[0];
    let (x1, y1) = ring[1 % ring.len()];
    let (dx, dy) = ((x1 - x0).signum() as f64, (y1 - y0).signum() as f64);
    Point::new(x0 as f64 + 0.5 * dx + 0.5 * dy, y0 as f64 + 0.5 * dy - 0.5 * dx)
}

fn assemble(rings: Vec<Vec<Vertex>>, transform: &GeoTransform) -> MultiPolygon<f64> {
    let (exteriors, holes): (Vec<_>, Vec<_>) = rings
        .into_iter()
        .filter(|r| r.len() >= 4)
        .partition(|r| signed_area2(r) > 0);

    let shells: Vec<Polygon<f64>> = exteriors
        .iter()
        .map(|r| Polygon::new(grid_ring(r), vec![]))
        .collect();
    let mut interiors: Vec<Vec<LineString<f64>>> = vec![Vec::new(); exteriors.len()];

    for hole in &holes {
        let inside = point_inside_hole(hole);
        let owner = exteriors
            .iter()
            .enumerate()
            .filter(|(i, _)| shells[*i].contains(&inside))
            .min_by_key(|(_, r)| signed_area2(r))
            .map(|(i, _)| i);
        if let Some(i) = owner {
            interiors[i].push(world_ring(hole, transform));
        }
    }

    MultiPolygon::new(
        exteriors
            .iter()
            .zip(interiors)
            .map(|(r, inner)| Polygon::new(world_ring(r, transform), inner))
            .collect(),
    )
}

//! Uniform bucket grid over catchment bounding boxes
//!
//! Catchments tile the raster extent, so a regular grid of buckets sized to
//! hold a handful of catchments each keeps point lookups near O(1) without
//! an R-tree.

use geo::{BoundingRect, Coord, Intersects, MultiPolygon, Point, Rect};

#[derive(Debug, Clone)]
pub(crate) struct BucketIndex {
    min: Coord<f64>,
    bucket_w: f64,
    bucket_h: f64,
    nx: usize,
    ny: usize,
    /// Catchment ids per bucket, ascending
    buckets: Vec<Vec<u32>>,
}

impl BucketIndex {
    pub(crate) fn build(polygons: &[MultiPolygon<f64>]) -> Self {
        let rects: Vec<Option<Rect<f64>>> = polygons.iter().map(|p| p.bounding_rect()).collect();
        let extent = rects.iter().flatten().fold(None::<Rect<f64>>, |acc, r| {
            Some(match acc {
                None => *r,
                Some(a) => Rect::new(
                    Coord { x: a.min().x.min(r.min().x), y: a.min().y.min(r.min().y) },
                    Coord { x: a.max().x.max(r.max().x), y: a.max().y.max(r.max().y) },
                ),
            })
        });

        let Some(extent) = extent else {
            return Self {
                min: Coord { x: 0.0, y: 0.0 },
                bucket_w: 1.0,
                bucket_h: 1.0,
                nx: 0,
                ny: 0,
                buckets: Vec::new(),
            };
        };

        let side = ((polygons.len() as f64).sqrt().ceil() as usize).max(1);
        let bucket_w = (extent.width() / side as f64).max(f64::MIN_POSITIVE);
        let bucket_h = (extent.height() / side as f64).max(f64::MIN_POSITIVE);
        let mut index = Self {
            min: extent.min(),
            bucket_w,
            bucket_h,
            nx: side,
            ny: side,
            buckets: vec![Vec::new(); side * side],
        };

        for (id, rect) in rects.iter().enumerate() {
            let Some(rect) = rect else { continue };
            let (x0, y0) = index.bucket_of(rect.min());
            let (x1, y1) = index.bucket_of(rect.max());
            for by in y0..=y1 {
                for bx in x0..=x1 {
                    index.buckets[by * side + bx].push(id as u32);
                }
            }
        }
        index
    }

    fn bucket_of(&self, c: Coord<f64>) -> (usize, usize) {
        let bx = ((c.x - self.min.x) / self.bucket_w).floor().max(0.0) as usize;
        let by = ((c.y - self.min.y) / self.bucket_h).floor().max(0.0) as usize;
        (bx.min(self.nx.saturating_sub(1)), by.min(self.ny.saturating_sub(1)))
    }

    /// Lowest catchment id whose polygon intersects `point`
    pub(crate) fn locate(&self, point: Point<f64>, polygons: &[MultiPolygon<f64>]) -> Option<u32> {
        if self.buckets.is_empty() {
            return None;
        }
        let c = point.0;
        let max_x = self.min.x + self.bucket_w * self.nx as f64;
        let max_y = self.min.y + self.bucket_h * self.ny as f64;
        if c.x < self.min.x || c.y < self.min.y || c.x > max_x || c.y > max_y {
            return None;
        }
        let (bx, by) = self.bucket_of(c);
        self.buckets[by * self.nx + bx]
            .iter()
            .copied()
            .find(|&id| polygons[id as usize].intersects(&point))
    }
}

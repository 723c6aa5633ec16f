//! Elevation histograms on an absolute axis
//!
//! Every histogram with the same bin width shares one axis: bin edges sit on
//! multiples of the width. Merging two histograms is then a bin-wise sum
//! after shifting by a whole number of bins, which is what lets watershed
//! hypsometry be derived from per-catchment summaries without touching the
//! raw cells again.

use catchflow_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Parameters for per-catchment histograms
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramParams {
    /// Bin width in elevation units. Default: 10.0
    pub bin_width: f64,
}

impl Default for HistogramParams {
    fn default() -> Self {
        Self { bin_width: 10.0 }
    }
}

/// Fixed-width elevation histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationHistogram {
    /// Lower edge of bin 0, a multiple of `bin_width`
    pub base_value: f64,
    pub bin_width: f64,
    pub counts: Vec<u64>,
}

impl ElevationHistogram {
    /// Empty histogram
    pub fn new(bin_width: f64) -> Result<Self> {
        if !bin_width.is_finite() || bin_width <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "bin_width",
                value: bin_width.to_string(),
                reason: "must be finite and positive".into(),
            });
        }
        Ok(Self {
            base_value: 0.0,
            bin_width,
            counts: Vec::new(),
        })
    }

    /// Histogram of the finite values in `values`
    pub fn from_values(values: impl IntoIterator<Item = f64>, bin_width: f64) -> Result<Self> {
        let mut hist = Self::new(bin_width)?;
        for v in values {
            hist.add(v);
        }
        Ok(hist)
    }

    fn bin_of(&self, value: f64) -> i64 {
        ((value - self.base_value) / self.bin_width).floor() as i64
    }

    /// Count one value; non-finite values are ignored
    pub fn add(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        if self.counts.is_empty() {
            self.base_value = (value / self.bin_width).floor() * self.bin_width;
            self.counts.push(0);
        }
        let bin = self.bin_of(value);
        if bin < 0 {
            let shift = (-bin) as usize;
            let mut counts = vec![0; shift];
            counts.append(&mut self.counts);
            self.counts = counts;
            self.base_value -= shift as f64 * self.bin_width;
        }
        let bin = self.bin_of(value).max(0) as usize;
        if bin >= self.counts.len() {
            self.counts.resize(bin + 1, 0);
        }
        self.counts[bin] += 1;
    }

    /// Bin-wise sum on the shared axis
    pub fn merge(&self, other: &Self) -> Result<Self> {
        if (self.bin_width - other.bin_width).abs() > f64::EPSILON * self.bin_width.max(1.0) {
            return Err(Error::InvalidParameter {
                name: "bin_width",
                value: other.bin_width.to_string(),
                reason: format!("cannot merge with histogram of width {}", self.bin_width),
            });
        }
        if other.counts.is_empty() {
            return Ok(self.clone());
        }
        if self.counts.is_empty() {
            return Ok(other.clone());
        }

        let base_value = self.base_value.min(other.base_value);
        let offset = |h: &Self| ((h.base_value - base_value) / self.bin_width).round() as usize;
        let (a, b) = (offset(self), offset(other));
        let len = (a + self.counts.len()).max(b + other.counts.len());

        let mut counts = vec![0u64; len];
        for (i, &c) in self.counts.iter().enumerate() {
            counts[a + i] += c;
        }
        for (i, &c) in other.counts.iter().enumerate() {
            counts[b + i] += c;
        }
        Ok(Self {
            base_value,
            bin_width: self.bin_width,
            counts,
        })
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Upper edge of the last bin
    pub fn top(&self) -> f64 {
        self.base_value + self.counts.len() as f64 * self.bin_width
    }

    /// Hypsometric curve as (relative height, relative area above) pairs,
    /// one per bin edge from the lowest to the highest.
    pub fn hypsometric_curve(&self) -> Vec<(f64, f64)> {
        let total = self.total();
        if total == 0 {
            return Vec::new();
        }
        let bins = self.counts.len();
        let mut above = total;
        let mut curve = Vec::with_capacity(bins + 1);
        for k in 0..=bins {
            curve.push((k as f64 / bins as f64, above as f64 / total as f64));
            if k < bins {
                above -= self.counts[k];
            }
        }
        curve
    }

    /// Area under the hypsometric curve (0..1)
    pub fn hypsometric_integral(&self) -> f64 {
        self.hypsometric_curve()
            .windows(2)
            .map(|w| (w[1].0 - w[0].0) * (w[0].1 + w[1].1) / 2.0)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_base_is_multiple_of_width() {
        let h = ElevationHistogram::from_values([103.0, 117.0, 125.0], 10.0).unwrap();
        assert_eq!(h.base_value, 100.0);
        assert_eq!(h.counts, vec![1, 1, 1]);
    }

    #[test]
    fn test_lower_value_extends_front() {
        let h = ElevationHistogram::from_values([55.0, 31.0], 10.0).unwrap();
        assert_eq!(h.base_value, 30.0);
        assert_eq!(h.counts, vec![1, 0, 1]);
    }

    #[test]
    fn test_merge_aligns_bins() {
        let a = ElevationHistogram::from_values([100.0, 110.0], 10.0).unwrap();
        let b = ElevationHistogram::from_values([115.0, 140.0], 10.0).unwrap();
        let m = a.merge(&b).unwrap();
        assert_eq!(m.base_value, 100.0);
        assert_eq!(m.counts, vec![1, 2, 0, 0, 1]);
        assert_eq!(m.total(), 4);
    }

    #[test]
    fn test_merge_rejects_width_mismatch() {
        let a = ElevationHistogram::from_values([1.0], 1.0).unwrap();
        let b = ElevationHistogram::from_values([1.0], 2.0).unwrap();
        assert!(a.merge(&b).is_err());
    }

    #[test]
    fn test_uniform_distribution_integral_is_half() {
        let h = ElevationHistogram::from_values((0..100).map(|v| v as f64), 10.0).unwrap();
        assert_relative_eq!(h.hypsometric_integral(), 0.5, epsilon = 1e-12);
        let curve = h.hypsometric_curve();
        assert_eq!(curve.first(), Some(&(0.0, 1.0)));
        assert_eq!(curve.last(), Some(&(1.0, 0.0)));
    }

    #[test]
    fn test_invalid_width() {
        assert!(ElevationHistogram::new(0.0).is_err());
        assert!(ElevationHistogram::new(f64::NAN).is_err());
    }
}

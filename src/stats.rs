//! Statistics over converted temperature fields.

use ndarray::{s, Array2};
use serde_derive::*;
use std::ops::AddAssign;

/// Running statistics over pixel temperatures. `NaN` pixels are
/// counted separately and excluded from the aggregates.
///
/// Accumulates either pixel by pixel (`stats += temp`) or by
/// merging partial results (`stats += &other`), so it slots into
/// rayon fold/reduce pipelines.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PixelStats {
    count: usize,
    nan_count: usize,
    sum: f64,
    min: f64,
    max: f64,
}

impl Default for PixelStats {
    fn default() -> Self {
        PixelStats {
            count: 0,
            nan_count: 0,
            sum: 0.,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl AddAssign<f64> for PixelStats {
    fn add_assign(&mut self, temp: f64) {
        if temp.is_nan() {
            self.nan_count += 1;
            return;
        }
        self.count += 1;
        self.sum += temp;
        self.min = self.min.min(temp);
        self.max = self.max.max(temp);
    }
}

impl AddAssign<&PixelStats> for PixelStats {
    fn add_assign(&mut self, other: &PixelStats) {
        self.count += other.count;
        self.nan_count += other.nan_count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }
}

impl PixelStats {
    pub fn from_field(field: &Array2<f64>) -> Self {
        let mut stats = PixelStats::default();
        for &temp in field.iter() {
            stats += temp;
        }
        stats
    }

    /// Number of finite pixels accumulated.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of pixels that converted to `NaN`.
    pub fn invalid(&self) -> usize {
        self.nan_count
    }

    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }

    pub fn min(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.min)
        }
    }

    pub fn max(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.max)
        }
    }
}

/// Maximum finite temperature within the central region of a field.
///
/// `tolerance` is the fraction of each axis excluded from the edges
/// in total: each axis keeps `extent - 2 * floor(extent * tolerance / 2)`
/// central elements, so rows and columns are cropped independently
/// and non-square fields behave the same as square ones. Returns
/// `None` when `tolerance` is outside `[0, 1)` or the crop contains
/// no finite pixel.
pub fn central_maximum(field: &Array2<f64>, tolerance: f64) -> Option<f64> {
    if !(0. ..1.).contains(&tolerance) {
        return None;
    }
    let (height, width) = field.dim();
    let margin_rows = (height as f64 * tolerance / 2.) as usize;
    let margin_cols = (width as f64 * tolerance / 2.) as usize;

    field
        .slice(s![
            margin_rows..height - margin_rows,
            margin_cols..width - margin_cols
        ])
        .iter()
        .copied()
        .filter(|t| !t.is_nan())
        .fold(None, |acc, t| match acc {
            Some(max) if max >= t => Some(max),
            _ => Some(t),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn accumulates_and_merges() {
        let mut a = PixelStats::default();
        a += 10.;
        a += 20.;
        a += f64::NAN;

        let mut b = PixelStats::default();
        b += -5.;

        a += &b;
        assert_eq!(a.len(), 3);
        assert_eq!(a.invalid(), 1);
        assert!((a.mean().unwrap() - 25. / 3.).abs() < 1e-12);
        assert_eq!(a.min(), Some(-5.));
        assert_eq!(a.max(), Some(20.));
    }

    #[test]
    fn empty_stats_have_no_aggregates() {
        let stats = PixelStats::default();
        assert!(stats.is_empty());
        assert_eq!(stats.mean(), None);
        assert_eq!(stats.min(), None);
        assert_eq!(stats.max(), None);
    }

    #[test]
    fn from_field_counts_nans() {
        let field = array![[1., f64::NAN], [3., 2.]];
        let stats = PixelStats::from_field(&field);
        assert_eq!(stats.len(), 3);
        assert_eq!(stats.invalid(), 1);
        assert_eq!(stats.max(), Some(3.));
    }

    #[test]
    fn central_maximum_crops_both_axes() {
        // 4x6 field with hot edges; tolerance 0.5 keeps the central
        // 2x4 block on a non-square frame.
        let mut field = Array2::from_elem((4, 6), 10.);
        field[(0, 0)] = 99.;
        field[(3, 5)] = 98.;
        field[(0, 3)] = 97.;
        field[(2, 0)] = 96.;
        field[(1, 2)] = 42.;
        assert_eq!(central_maximum(&field, 0.5), Some(42.));
    }

    #[test]
    fn central_maximum_zero_tolerance_is_global() {
        let field = array![[1., 5.], [3., 2.]];
        assert_eq!(central_maximum(&field, 0.), Some(5.));
    }

    #[test]
    fn central_maximum_skips_nan() {
        let field = array![[f64::NAN, 2.], [1., f64::NAN]];
        assert_eq!(central_maximum(&field, 0.), Some(2.));

        let all_nan = Array2::from_elem((2, 2), f64::NAN);
        assert_eq!(central_maximum(&all_nan, 0.), None);
    }

    #[test]
    fn central_maximum_rejects_bad_tolerance() {
        let field = array![[1., 2.]];
        assert_eq!(central_maximum(&field, 1.), None);
        assert_eq!(central_maximum(&field, -0.1), None);
    }
}

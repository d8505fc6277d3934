//! Local peak/trough detection over a centered rolling window.

use serde::{Deserialize, Serialize};

use crate::series::{PriceField, Series};

/// Kind of local extremum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtremumKind {
    Peak,
    Trough,
}

/// A local extremum located on the series.
///
/// `price` is the bar's high for a peak and its low for a trough.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtremaPoint {
    pub position: usize,
    pub timestamp: i64,
    pub price: f64,
    pub kind: ExtremumKind,
}

/// Find all peaks and troughs.
///
/// Bar `i` qualifies only when `window / 2` bars exist on both sides. It is a
/// peak when its high is the first maximum of the highs in
/// `[i - window/2, i + window/2]` (earliest position wins ties), and a trough
/// symmetrically on lows. The result is ordered by position; a bar that is
/// both a peak and a trough yields the peak first.
pub fn find_extrema(series: &Series, window: usize) -> Vec<ExtremaPoint> {
    let half = window / 2;
    let n = series.len();
    let mut points = Vec::new();
    if n < 2 * half + 1 {
        return points;
    }

    for i in half..n - half {
        let range = i - half..=i + half;
        if first_extreme(series, range.clone(), PriceField::High, |a, b| a > b) == i {
            points.push(series.point(i, ExtremumKind::Peak));
        }
        if first_extreme(series, range, PriceField::Low, |a, b| a < b) == i {
            points.push(series.point(i, ExtremumKind::Trough));
        }
    }
    points
}

/// Peaks and troughs from a single pass, each ordered by position
pub fn find_peaks_and_troughs(
    series: &Series,
    window: usize,
) -> (Vec<ExtremaPoint>, Vec<ExtremaPoint>) {
    find_extrema(series, window)
        .into_iter()
        .partition(|p| p.kind == ExtremumKind::Peak)
}

/// Peaks only, ordered by position
pub fn find_peaks(series: &Series, window: usize) -> Vec<ExtremaPoint> {
    find_extrema(series, window)
        .into_iter()
        .filter(|p| p.kind == ExtremumKind::Peak)
        .collect()
}

/// Troughs only, ordered by position
pub fn find_troughs(series: &Series, window: usize) -> Vec<ExtremaPoint> {
    find_extrema(series, window)
        .into_iter()
        .filter(|p| p.kind == ExtremumKind::Trough)
        .collect()
}

fn first_extreme(
    series: &Series,
    range: std::ops::RangeInclusive<usize>,
    field: PriceField,
    better: impl Fn(f64, f64) -> bool,
) -> usize {
    let start = *range.start();
    let mut best = start;
    let mut best_value = series.price_at(start, field);
    for j in range {
        let v = series.price_at(j, field);
        if better(v, best_value) {
            best = j;
            best_value = v;
        }
    }
    best
}

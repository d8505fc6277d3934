//! Cup and handle continuation

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::helpers::{bullish_fibonacci, first_close_crossing, highest_high, lookahead, lowest_low, Cross};
use crate::{
    extrema::{find_peaks, ExtremumKind},
    params::{get_period, get_ratio, ParamMeta, ParameterizedDetector},
    series::Series,
    PatternCandidate, PatternError, PatternKind, PatternMatcher, PatternShape, Period, Ratio,
    Result,
};

impl_with_defaults!(CupAndHandleDetector);

/// Cup and Handle: a rounded base between two comparable rims, a shallow
/// pullback after the right rim, then a close above the right rim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CupAndHandleDetector {
    pub window: Period,
    pub min_cup_len: Period,
    pub max_cup_len: Period,
    /// Minimum cup depth relative to the left rim
    pub min_cup_depth: Ratio,
    pub rim_tolerance: Ratio,
    pub min_handle_len: Period,
    pub max_handle_len: Period,
    /// Handle depth bounds relative to the cup depth
    pub min_handle_depth: Ratio,
    pub max_handle_depth: Ratio,
    pub confirmation: Period,
    pub min_bars: Period,
}

impl Default for CupAndHandleDetector {
    fn default() -> Self {
        Self {
            window: Period::new_const(10),
            min_cup_len: Period::new_const(30),
            max_cup_len: Period::new_const(150),
            min_cup_depth: Ratio::new_const(0.15),
            rim_tolerance: Ratio::new_const(0.05),
            min_handle_len: Period::new_const(5),
            max_handle_len: Period::new_const(15),
            min_handle_depth: Ratio::new_const(0.03),
            max_handle_depth: Ratio::new_const(0.5),
            confirmation: Period::new_const(20),
            min_bars: Period::new_const(60),
        }
    }
}

impl PatternMatcher for CupAndHandleDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::CupAndHandle
    }

    fn min_bars(&self) -> usize {
        self.min_bars.get()
    }

    fn scan(&self, series: &Series) -> Option<PatternCandidate> {
        let n = series.len();
        let peaks = find_peaks(series, self.window.get());
        let cup_len = self.min_cup_len.get()..=self.max_cup_len.get();
        let handle_depth = self.min_handle_depth.get()..=self.max_handle_depth.get();

        for (i, left) in peaks.iter().enumerate() {
            for right in &peaks[i + 1..] {
                if !cup_len.contains(&(right.position - left.position)) {
                    continue;
                }
                if (left.price - right.price).abs() > left.price * self.rim_tolerance.get() {
                    continue;
                }

                let inside = left.position + 1..right.position;
                let rim = left.price.max(right.price);
                match highest_high(series, inside.clone()) {
                    Some(k) if series.high(k) > rim => continue,
                    _ => {}
                }
                let Some(bottom) = lowest_low(series, inside) else {
                    continue;
                };
                let depth = left.price - series.low(bottom);
                if !depth.is_finite() || depth < self.min_cup_depth.get() * left.price {
                    continue;
                }

                // Handle runs until price closes back above the right rim
                let handle_start = right.position + 1;
                let handle_cap = (handle_start + self.max_handle_len.get()).min(n);
                let handle_end = (handle_start..handle_cap)
                    .find(|&k| series.close(k) > right.price)
                    .unwrap_or(handle_cap);
                if handle_end - handle_start < self.min_handle_len.get() {
                    continue;
                }
                let Some(handle_low) = lowest_low(series, handle_start..handle_end) else {
                    continue;
                };
                let pullback = (right.price - series.low(handle_low)) / depth;
                if !handle_depth.contains(&pullback) {
                    continue;
                }

                let range = lookahead(handle_low, self.confirmation.get(), n);
                let breakout =
                    first_close_crossing(series, range, Cross::Above, |_| right.price);
                let anchor = breakout.map_or(right.price, |b| b.price);
                let bottom = series.point(bottom, ExtremumKind::Trough);

                return Some(
                    PatternCandidate::new(
                        PatternShape::CupAndHandle {
                            left_rim: *left,
                            bottom,
                            right_rim: *right,
                            handle_low: series.point(handle_low, ExtremumKind::Trough),
                            cup_depth: depth,
                        },
                        right.price,
                        breakout,
                    )
                    .with_target(anchor + depth)
                    .with_fibonacci(bullish_fibonacci(bottom.price, left.price, anchor)),
                );
            }
        }
        None
    }

    fn validate_config(&self) -> Result<()> {
        if self.min_cup_len > self.max_cup_len {
            return Err(PatternError::InvalidConfig(
                "min_cup_len exceeds max_cup_len".into(),
            ));
        }
        if self.min_handle_len > self.max_handle_len {
            return Err(PatternError::InvalidConfig(
                "min_handle_len exceeds max_handle_len".into(),
            ));
        }
        if self.min_handle_depth > self.max_handle_depth {
            return Err(PatternError::InvalidConfig(
                "min_handle_depth exceeds max_handle_depth".into(),
            ));
        }
        Ok(())
    }
}

static CUP_AND_HANDLE_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("window", 10.0, (6.0, 20.0, 2.0), "Centered window for rim peaks"),
    ParamMeta::period("min_cup_len", 30.0, (20.0, 60.0, 10.0), "Minimum bars between rims"),
    ParamMeta::period("max_cup_len", 150.0, (100.0, 250.0, 50.0), "Maximum bars between rims"),
    ParamMeta::ratio("min_cup_depth", 0.15, (0.1, 0.35, 0.05), "Minimum cup depth relative to the left rim"),
    ParamMeta::ratio("rim_tolerance", 0.05, (0.02, 0.1, 0.01), "Maximum relative rim difference"),
    ParamMeta::period("min_handle_len", 5.0, (3.0, 10.0, 1.0), "Minimum handle length"),
    ParamMeta::period("max_handle_len", 15.0, (10.0, 30.0, 5.0), "Maximum handle length"),
    ParamMeta::ratio("min_handle_depth", 0.03, (0.0, 0.1, 0.01), "Minimum handle depth relative to the cup depth"),
    ParamMeta::ratio("max_handle_depth", 0.5, (0.3, 0.6, 0.05), "Maximum handle depth relative to the cup depth"),
    ParamMeta::period("confirmation", 20.0, (10.0, 30.0, 5.0), "Bars searched for a breakout after the handle low"),
    ParamMeta::period("min_bars", 60.0, (40.0, 120.0, 20.0), "Minimum series length"),
];

impl ParameterizedDetector for CupAndHandleDetector {
    fn param_meta() -> &'static [ParamMeta] {
        CUP_AND_HANDLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            window: get_period(params, "window", 10)?,
            min_cup_len: get_period(params, "min_cup_len", 30)?,
            max_cup_len: get_period(params, "max_cup_len", 150)?,
            min_cup_depth: get_ratio(params, "min_cup_depth", 0.15)?,
            rim_tolerance: get_ratio(params, "rim_tolerance", 0.05)?,
            min_handle_len: get_period(params, "min_handle_len", 5)?,
            max_handle_len: get_period(params, "max_handle_len", 15)?,
            min_handle_depth: get_ratio(params, "min_handle_depth", 0.03)?,
            max_handle_depth: get_ratio(params, "max_handle_depth", 0.5)?,
            confirmation: get_period(params, "confirmation", 20)?,
            min_bars: get_period(params, "min_bars", 60)?,
        })
    }

    fn pattern_kind() -> PatternKind {
        PatternKind::CupAndHandle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{series::Bar, Detection, PatternStatus};

    fn series_from(anchors: &[(usize, f64)], len: usize) -> Series {
        let mut mids = vec![0.0; len];
        for w in anchors.windows(2) {
            let ((x0, y0), (x1, y1)) = (w[0], w[1]);
            for x in x0..=x1 {
                mids[x] = y0 + (y1 - y0) * (x - x0) as f64 / (x1 - x0) as f64;
            }
        }
        let bars = (0..len)
            .map(|i| Bar::new(i as i64 * 86_400, mids[i], mids[i] + 1.0, mids[i] - 1.0, mids[i], 500.0))
            .collect();
        Series::new(bars).unwrap()
    }

    #[test]
    fn test_cup_and_handle_confirmed() {
        let s = series_from(
            &[(0, 80.0), (10, 99.0), (30, 69.0), (50, 98.0), (57, 92.0), (70, 115.0), (79, 116.0)],
            80,
        );
        let c = CupAndHandleDetector::with_defaults().scan(&s).unwrap();
        assert_eq!(c.status, PatternStatus::Confirmed);
        assert_eq!(c.breakout_position(), Some(61));
        assert_eq!(c.trigger_level, 99.0);
        let PatternShape::CupAndHandle {
            left_rim,
            bottom,
            right_rim,
            handle_low,
            cup_depth,
        } = &c.shape
        else {
            panic!("wrong shape");
        };
        assert_eq!((left_rim.position, right_rim.position), (10, 50));
        assert_eq!(bottom.position, 30);
        assert_eq!(handle_low.position, 57);
        assert!((cup_depth - 32.0).abs() < 1e-9);
        let close = c.breakout.unwrap().price;
        assert!((c.target_price.unwrap() - (close + 32.0)).abs() < 1e-9);
        assert!(c.fibonacci.is_some());
    }

    #[test]
    fn test_shallow_cup_rejected() {
        // 5% deep cup is below the 15% minimum
        let s = series_from(
            &[(0, 80.0), (10, 99.0), (30, 94.0), (50, 98.0), (57, 96.0), (70, 115.0), (79, 116.0)],
            80,
        );
        assert!(CupAndHandleDetector::with_defaults().scan(&s).is_none());
    }

    #[test]
    fn test_short_series() {
        let s = series_from(&[(0, 80.0), (49, 90.0)], 50);
        assert!(matches!(
            CupAndHandleDetector::with_defaults().detect(&s),
            Detection::InsufficientData { need: 60, got: 50 }
        ));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let bad = CupAndHandleDetector {
            min_handle_len: Period::new_const(20),
            ..Default::default()
        };
        assert!(bad.validate_config().is_err());
    }
}

//! Double top and double bottom reversal matchers
//!
//! Two comparable extremes of the same kind separated by a swing of the
//! opposite kind. Confirmation is a close through that swing level.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::helpers::{bullish_fibonacci, first_close_crossing, lookahead, Cross};
use crate::{
    extrema::{find_peaks_and_troughs, ExtremaPoint},
    params::{get_period, get_ratio, ParamMeta, ParameterizedDetector},
    series::Series,
    Breakout, PatternCandidate, PatternError, PatternKind, PatternMatcher, PatternShape, Period,
    Ratio, Result,
};

impl_with_defaults!(DoubleTopDetector, DoubleBottomDetector);

/// Landmarks of a qualifying double extreme
struct DoubleMatch {
    first: ExtremaPoint,
    second: ExtremaPoint,
    /// Opposite swing between the two extremes
    middle: ExtremaPoint,
    height: f64,
    breakout: Option<Breakout>,
}

/// Shared search for both orientations.
///
/// `extremes` are the two candidates' kind, `swings` the opposite kind.
/// `top` selects the bearish orientation.
#[allow(clippy::too_many_arguments)]
fn scan_double(
    series: &Series,
    extremes: &[ExtremaPoint],
    swings: &[ExtremaPoint],
    top: bool,
    threshold: f64,
    min_distance: usize,
    min_depth: f64,
    confirmation: usize,
) -> Option<DoubleMatch> {
    for (i, first) in extremes.iter().enumerate() {
        for second in &extremes[i + 1..] {
            if second.position - first.position < min_distance {
                continue;
            }
            if (first.price - second.price).abs() >= first.price * threshold {
                continue;
            }

            let between = swings
                .iter()
                .filter(|s| s.position > first.position && s.position < second.position);
            let middle = if top {
                between.min_by(|a, b| a.price.total_cmp(&b.price))
            } else {
                between.max_by(|a, b| a.price.total_cmp(&b.price).then(b.position.cmp(&a.position)))
            };
            let Some(middle) = middle.copied() else {
                continue;
            };

            let (height, reference) = if top {
                let peak = first.price.max(second.price);
                (peak - middle.price, peak)
            } else {
                let bottom = first.price.min(second.price);
                (middle.price - bottom, middle.price)
            };
            if !height.is_finite() || height < min_depth * reference {
                continue;
            }

            let cross = if top { Cross::Below } else { Cross::Above };
            let range = lookahead(second.position, confirmation, series.len());
            let breakout = first_close_crossing(series, range, cross, |_| middle.price);

            return Some(DoubleMatch {
                first: *first,
                second: *second,
                middle,
                height,
                breakout,
            });
        }
    }
    None
}

fn check_config(
    window: Period,
    threshold: Ratio,
    min_distance: Period,
    min_bars: Period,
) -> Result<()> {
    if threshold.get() <= 0.0 {
        return Err(PatternError::InvalidConfig(
            "threshold must be positive".into(),
        ));
    }
    if window.get() >= min_bars.get() {
        return Err(PatternError::InvalidConfig(format!(
            "window {} must be below min_bars {}",
            window.get(),
            min_bars.get()
        )));
    }
    if min_distance.get() >= min_bars.get() {
        return Err(PatternError::InvalidConfig(format!(
            "min_distance {} must be below min_bars {}",
            min_distance.get(),
            min_bars.get()
        )));
    }
    Ok(())
}

// ============================================================
// DOUBLE TOP
// ============================================================

/// Double Top: two peaks of similar height, bearish on a close below the trough between them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DoubleTopDetector {
    pub window: Period,
    pub threshold: Ratio,
    pub min_distance: Period,
    pub min_depth: Ratio,
    pub confirmation: Period,
    pub min_bars: Period,
}

impl Default for DoubleTopDetector {
    fn default() -> Self {
        Self {
            window: Period::new_const(5),
            threshold: Ratio::new_const(0.05),
            min_distance: Period::new_const(10),
            min_depth: Ratio::new_const(0.03),
            confirmation: Period::new_const(30),
            min_bars: Period::new_const(20),
        }
    }
}

impl PatternMatcher for DoubleTopDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::DoubleTop
    }

    fn min_bars(&self) -> usize {
        self.min_bars.get()
    }

    fn scan(&self, series: &Series) -> Option<PatternCandidate> {
        let (peaks, troughs) = find_peaks_and_troughs(series, self.window.get());
        let m = scan_double(
            series,
            &peaks,
            &troughs,
            true,
            self.threshold.get(),
            self.min_distance.get(),
            self.min_depth.get(),
            self.confirmation.get(),
        )?;
        let support = m.middle.price;
        Some(
            PatternCandidate::new(
                PatternShape::DoubleTop {
                    first: m.first,
                    second: m.second,
                    support: m.middle,
                },
                support,
                m.breakout,
            )
            .with_target(support - m.height),
        )
    }

    fn validate_config(&self) -> Result<()> {
        check_config(self.window, self.threshold, self.min_distance, self.min_bars)
    }
}

// ============================================================
// DOUBLE BOTTOM
// ============================================================

/// Double Bottom: two troughs of similar depth, bullish on a close above the peak between them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DoubleBottomDetector {
    pub window: Period,
    pub threshold: Ratio,
    pub min_distance: Period,
    pub min_depth: Ratio,
    pub confirmation: Period,
    pub min_bars: Period,
}

impl Default for DoubleBottomDetector {
    fn default() -> Self {
        Self {
            window: Period::new_const(5),
            threshold: Ratio::new_const(0.05),
            min_distance: Period::new_const(10),
            min_depth: Ratio::new_const(0.03),
            confirmation: Period::new_const(30),
            min_bars: Period::new_const(20),
        }
    }
}

impl PatternMatcher for DoubleBottomDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::DoubleBottom
    }

    fn min_bars(&self) -> usize {
        self.min_bars.get()
    }

    fn scan(&self, series: &Series) -> Option<PatternCandidate> {
        let (peaks, troughs) = find_peaks_and_troughs(series, self.window.get());
        let m = scan_double(
            series,
            &troughs,
            &peaks,
            false,
            self.threshold.get(),
            self.min_distance.get(),
            self.min_depth.get(),
            self.confirmation.get(),
        )?;
        let resistance = m.middle.price;
        let bottom = m.first.price.min(m.second.price);
        let anchor = m.breakout.map_or(resistance, |b| b.price);
        Some(
            PatternCandidate::new(
                PatternShape::DoubleBottom {
                    first: m.first,
                    second: m.second,
                    resistance: m.middle,
                },
                resistance,
                m.breakout,
            )
            .with_target(resistance + m.height)
            .with_fibonacci(bullish_fibonacci(bottom, resistance, anchor)),
        )
    }

    fn validate_config(&self) -> Result<()> {
        check_config(self.window, self.threshold, self.min_distance, self.min_bars)
    }
}

// ============================================================
// PARAMETER METADATA
// ============================================================

static DOUBLE_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("window", 5.0, (3.0, 15.0, 2.0), "Centered window for local extrema"),
    ParamMeta::ratio("threshold", 0.05, (0.01, 0.1, 0.01), "Maximum relative difference between the two extremes"),
    ParamMeta::period("min_distance", 10.0, (5.0, 40.0, 5.0), "Minimum bars between the two extremes"),
    ParamMeta::ratio("min_depth", 0.03, (0.01, 0.1, 0.01), "Minimum swing height relative to the reference level"),
    ParamMeta::period("confirmation", 30.0, (10.0, 40.0, 10.0), "Bars searched for a confirming close"),
    ParamMeta::period("min_bars", 20.0, (20.0, 60.0, 10.0), "Minimum series length"),
];

impl ParameterizedDetector for DoubleTopDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DOUBLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            window: get_period(params, "window", 5)?,
            threshold: get_ratio(params, "threshold", 0.05)?,
            min_distance: get_period(params, "min_distance", 10)?,
            min_depth: get_ratio(params, "min_depth", 0.03)?,
            confirmation: get_period(params, "confirmation", 30)?,
            min_bars: get_period(params, "min_bars", 20)?,
        })
    }

    fn pattern_kind() -> PatternKind {
        PatternKind::DoubleTop
    }
}

impl ParameterizedDetector for DoubleBottomDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DOUBLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            window: get_period(params, "window", 5)?,
            threshold: get_ratio(params, "threshold", 0.05)?,
            min_distance: get_period(params, "min_distance", 10)?,
            min_depth: get_ratio(params, "min_depth", 0.03)?,
            confirmation: get_period(params, "confirmation", 30)?,
            min_bars: get_period(params, "min_bars", 20)?,
        })
    }

    fn pattern_kind() -> PatternKind {
        PatternKind::DoubleBottom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{series::Bar, Detection, PatternStatus};

    /// Piecewise-linear closes through `anchors`, highs and lows one point away.
    fn series_from(anchors: &[(usize, f64)], len: usize) -> Series {
        let mut mids = vec![0.0; len];
        for w in anchors.windows(2) {
            let ((x0, y0), (x1, y1)) = (w[0], w[1]);
            for (x, mid) in mids.iter_mut().enumerate().take(x1 + 1).skip(x0) {
                *mid = y0 + (y1 - y0) * (x - x0) as f64 / (x1 - x0) as f64;
            }
        }
        let bars = (0..len)
            .map(|i| {
                let open = if i == 0 { mids[0] } else { mids[i - 1] };
                Bar::new(i as i64 * 86_400, open, mids[i] + 1.0, mids[i] - 1.0, mids[i], 1_000.0)
            })
            .collect();
        Series::new(bars).unwrap()
    }

    #[test]
    fn test_double_top_confirmed() {
        let s = series_from(
            &[(0, 120.0), (20, 149.0), (40, 121.0), (60, 149.0), (80, 109.0), (99, 105.0)],
            100,
        );
        let c = DoubleTopDetector::with_defaults().scan(&s).unwrap();
        assert_eq!(c.status, PatternStatus::Confirmed);
        assert_eq!(c.breakout_position(), Some(75));
        assert_eq!(c.trigger_level, 120.0);
        assert!((c.target_price.unwrap() - 90.0).abs() < 1e-9);
        match c.shape {
            PatternShape::DoubleTop { first, second, support } => {
                assert_eq!(first.position, 20);
                assert_eq!(second.position, 60);
                assert_eq!(support.position, 40);
            }
            other => panic!("unexpected shape {other:?}"),
        }
    }

    #[test]
    fn test_double_top_forming() {
        let s = series_from(
            &[(0, 120.0), (20, 149.0), (40, 121.0), (60, 149.0), (99, 130.0)],
            100,
        );
        let c = DoubleTopDetector::with_defaults().scan(&s).unwrap();
        assert_eq!(c.status, PatternStatus::Forming);
        assert!(c.breakout.is_none());
        assert!((c.target_price.unwrap() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_double_top_rejects_unequal_peaks() {
        let s = series_from(
            &[(0, 100.0), (20, 149.0), (40, 121.0), (60, 130.0), (99, 100.0)],
            100,
        );
        assert!(DoubleTopDetector::with_defaults().scan(&s).is_none());
    }

    #[test]
    fn test_double_bottom_confirmed_with_fibonacci() {
        let s = series_from(
            &[(0, 150.0), (20, 121.0), (40, 149.0), (60, 121.0), (80, 161.0), (99, 165.0)],
            100,
        );
        let c = DoubleBottomDetector::with_defaults().scan(&s).unwrap();
        assert!(c.is_confirmed());
        assert_eq!(c.breakout_position(), Some(75));
        assert_eq!(c.breakout.unwrap().price, 151.0);
        assert!((c.target_price.unwrap() - 180.0).abs() < 1e-9);
        let fib = c.fibonacci.unwrap();
        assert!((fib.retracement(0.5).unwrap() - 135.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_series_is_insufficient() {
        let s = series_from(&[(0, 100.0), (9, 110.0)], 10);
        assert_eq!(
            DoubleBottomDetector::with_defaults().detect(&s),
            Detection::InsufficientData { need: 20, got: 10 }
        );
    }

    #[test]
    fn test_config_validation() {
        assert!(DoubleTopDetector::with_defaults().validate_config().is_ok());
        let bad = DoubleBottomDetector {
            window: Period::new_const(25),
            ..Default::default()
        };
        assert!(matches!(bad.validate_config(), Err(PatternError::InvalidConfig(_))));
    }

    #[test]
    fn test_with_params() {
        let mut params = HashMap::new();
        params.insert("min_distance", 15.0);
        let d = DoubleTopDetector::with_params(&params).unwrap();
        assert_eq!(d.min_distance.get(), 15);
        assert_eq!(d.window.get(), 5);
        params.insert("threshold", 1.5);
        assert!(DoubleTopDetector::with_params(&params).is_err());
    }
}

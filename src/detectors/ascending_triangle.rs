//! Ascending triangle: flat resistance over a rising support line

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::helpers::bullish_fibonacci;
use crate::{
    extrema::ExtremumKind,
    params::{get_period, get_ratio, ParamMeta, ParameterizedDetector},
    series::Series,
    trendline::Trendline,
    Breakout, PatternCandidate, PatternError, PatternKind, PatternMatcher, PatternShape, Period,
    Ratio, Result,
};

impl_with_defaults!(AscendingTriangleDetector);

/// Ascending Triangle
///
/// Resistance is the most populated bin of an equal-width histogram of the
/// window's highs; support is a least-squares line through the window's
/// strict local minima of lows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AscendingTriangleDetector {
    pub min_touches: Period,
    pub min_len: Period,
    pub max_len: Period,
    pub bins: Period,
    /// Close must exceed resistance by this fraction to confirm
    pub breakout_margin: Ratio,
    /// Without a breakout, the last close must stay above this fraction of resistance
    pub near_resistance: Ratio,
    pub convergence_window: Period,
    pub confirmation: Period,
    pub min_bars: Period,
}

impl Default for AscendingTriangleDetector {
    fn default() -> Self {
        Self {
            min_touches: Period::new_const(3),
            min_len: Period::new_const(15),
            max_len: Period::new_const(60),
            bins: Period::new_const(20),
            breakout_margin: Ratio::new_const(0.01),
            near_resistance: Ratio::new_const(0.95),
            convergence_window: Period::new_const(30),
            confirmation: Period::new_const(20),
            min_bars: Period::new_const(30),
        }
    }
}

/// Bounds of the first most-populated histogram bin
fn mode_zone(values: &[f64], bins: usize) -> Option<(f64, f64)> {
    let (mut lo, mut hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if !(lo.is_finite() && hi.is_finite()) || bins == 0 {
        return None;
    }
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &v in values {
        let bin = (((v - lo) / width) as usize).min(bins - 1);
        counts[bin] += 1;
    }
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = i;
        }
    }
    let zone_min = lo + width * best as f64;
    let zone_max = if best + 1 == bins {
        hi
    } else {
        lo + width * (best + 1) as f64
    };
    Some((zone_min, zone_max))
}

impl PatternMatcher for AscendingTriangleDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::AscendingTriangle
    }

    fn min_bars(&self) -> usize {
        self.min_bars.get()
    }

    fn scan(&self, series: &Series) -> Option<PatternCandidate> {
        let n = series.len();
        let min_len = self.min_len.get();
        let margin = 1.0 + self.breakout_margin.get();

        for start in 0..n.saturating_sub(min_len) {
            let end = (start + self.max_len.get()).min(n - 1);
            if end - start < min_len {
                continue;
            }

            let highs: Vec<f64> = (start..=end).map(|k| series.high(k)).collect();
            let Some((zone_min, zone_max)) = mode_zone(&highs, self.bins.get()) else {
                continue;
            };
            let touches: Vec<usize> = (start..=end)
                .filter(|&k| (zone_min..=zone_max).contains(&series.high(k)))
                .collect();
            if touches.len() < self.min_touches.get() {
                continue;
            }
            let resistance =
                touches.iter().map(|&k| series.high(k)).sum::<f64>() / touches.len() as f64;

            let minima: Vec<_> = (start + 1..end)
                .filter(|&k| series.low(k) < series.low(k - 1) && series.low(k) < series.low(k + 1))
                .map(|k| series.point(k, ExtremumKind::Trough))
                .collect();
            let Ok(support) = Trendline::fit(&minima) else {
                continue;
            };
            if support.slope <= 0.0 {
                continue;
            }

            let convergence = ((resistance - support.intercept) / support.slope).trunc();
            if !convergence.is_finite()
                || convergence < end as f64
                || convergence > (end + self.convergence_window.get()) as f64
            {
                continue;
            }

            let trigger = resistance * margin;
            let breakout = (end..(end + self.confirmation.get()).min(n - 1))
                .find(|&k| series.close(k) > trigger)
                .map(|k| Breakout {
                    position: k,
                    timestamp: series.timestamp(k),
                    price: series.close(k),
                });
            if breakout.is_none()
                && series.close(end) < resistance * self.near_resistance.get()
            {
                continue;
            }

            let base = support.at(start);
            let height = resistance - base;
            if !height.is_finite() {
                continue;
            }
            let anchor = breakout.map_or(resistance, |b| b.price);

            return Some(
                PatternCandidate::new(
                    PatternShape::AscendingTriangle {
                        start,
                        end,
                        resistance,
                        touches,
                        support,
                        convergence: convergence as usize,
                    },
                    trigger,
                    breakout,
                )
                .with_target(resistance + height)
                .with_fibonacci(bullish_fibonacci(base, resistance, anchor)),
            );
        }
        None
    }

    fn validate_config(&self) -> Result<()> {
        if self.min_len > self.max_len {
            return Err(PatternError::InvalidConfig(
                "min_len exceeds max_len".into(),
            ));
        }
        if self.min_len.get() >= self.min_bars.get() {
            return Err(PatternError::InvalidConfig(format!(
                "min_len {} must be below min_bars {}",
                self.min_len.get(),
                self.min_bars.get()
            )));
        }
        if self.near_resistance.get() == 0.0 {
            return Err(PatternError::InvalidConfig(
                "near_resistance must be positive".into(),
            ));
        }
        Ok(())
    }
}

static ASCENDING_TRIANGLE_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("min_touches", 3.0, (2.0, 5.0, 1.0), "Highs required inside the resistance zone"),
    ParamMeta::period("min_len", 15.0, (10.0, 30.0, 5.0), "Minimum window length"),
    ParamMeta::period("max_len", 60.0, (40.0, 100.0, 10.0), "Maximum window length"),
    ParamMeta::period("bins", 20.0, (10.0, 40.0, 5.0), "Histogram bins for the resistance zone"),
    ParamMeta::ratio("breakout_margin", 0.01, (0.0, 0.03, 0.005), "Margin above resistance for a breakout close"),
    ParamMeta::ratio("near_resistance", 0.95, (0.9, 0.99, 0.01), "Fraction of resistance the last close must hold"),
    ParamMeta::period("convergence_window", 30.0, (10.0, 60.0, 10.0), "Bars after the window where the lines may meet"),
    ParamMeta::period("confirmation", 20.0, (10.0, 30.0, 5.0), "Bars searched for a breakout"),
    ParamMeta::period("min_bars", 30.0, (30.0, 90.0, 10.0), "Minimum series length"),
];

impl ParameterizedDetector for AscendingTriangleDetector {
    fn param_meta() -> &'static [ParamMeta] {
        ASCENDING_TRIANGLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            min_touches: get_period(params, "min_touches", 3)?,
            min_len: get_period(params, "min_len", 15)?,
            max_len: get_period(params, "max_len", 60)?,
            bins: get_period(params, "bins", 20)?,
            breakout_margin: get_ratio(params, "breakout_margin", 0.01)?,
            near_resistance: get_ratio(params, "near_resistance", 0.95)?,
            convergence_window: get_period(params, "convergence_window", 30)?,
            confirmation: get_period(params, "confirmation", 20)?,
            min_bars: get_period(params, "min_bars", 30)?,
        })
    }

    fn pattern_kind() -> PatternKind {
        PatternKind::AscendingTriangle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{series::Bar, PatternStatus};

    fn series_from(anchors: &[(usize, f64)], len: usize) -> Series {
        let mut mids = vec![0.0; len];
        for w in anchors.windows(2) {
            let ((x0, y0), (x1, y1)) = (w[0], w[1]);
            for x in x0..=x1 {
                mids[x] = y0 + (y1 - y0) * (x - x0) as f64 / (x1 - x0) as f64;
            }
        }
        let bars = (0..len)
            .map(|i| Bar::new(i as i64 * 86_400, mids[i], mids[i] + 1.0, mids[i] - 1.0, mids[i], 0.0))
            .collect();
        Series::new(bars).unwrap()
    }

    fn triangle() -> Series {
        series_from(
            &[
                (0, 84.0),
                (4, 99.0),
                (6, 99.0),
                (12, 86.0),
                (16, 99.0),
                (18, 99.0),
                (24, 89.6),
                (28, 99.0),
                (30, 99.0),
                (36, 93.2),
                (40, 99.0),
                (42, 99.0),
                (48, 96.8),
                (52, 99.0),
                (54, 99.0),
                (60, 97.5),
                (64, 108.0),
                (99, 112.0),
            ],
            100,
        )
    }

    #[test]
    fn test_mode_zone_first_bin_wins() {
        let (lo, hi) = mode_zone(&[0.0, 0.0, 10.0, 10.0], 2).unwrap();
        assert_eq!((lo, hi), (0.0, 5.0));
        let (lo, hi) = mode_zone(&[0.0, 5.0, 5.0, 10.0], 2).unwrap();
        assert_eq!((lo, hi), (5.0, 10.0));
        let (lo, hi) = mode_zone(&[3.0, 3.0], 4).unwrap();
        assert!(lo < 3.0 && hi > 3.0);
        assert!(mode_zone(&[], 4).is_none());
    }

    #[test]
    fn test_triangle_breakout() {
        let c = AscendingTriangleDetector::with_defaults()
            .scan(&triangle())
            .unwrap();
        assert_eq!(c.status, PatternStatus::Confirmed);
        assert_eq!(c.breakout_position(), Some(62));
        let PatternShape::AscendingTriangle {
            start,
            end,
            resistance,
            ref touches,
            ref support,
            ..
        } = c.shape
        else {
            panic!("wrong shape");
        };
        assert_eq!((start, end), (0, 60));
        assert!(resistance > 99.5 && resistance <= 100.0);
        assert!(touches.len() >= 3);
        let minima: Vec<usize> = support.points.iter().map(|p| p.position).collect();
        assert_eq!(minima, vec![12, 24, 36, 48]);
        assert!((support.slope - 0.3).abs() < 1e-9);
        assert!((support.intercept - 81.4).abs() < 1e-9);
        let height = resistance - support.at(0);
        assert!((c.target_price.unwrap() - (resistance + height)).abs() < 1e-9);
    }

    #[test]
    fn test_status_follows_the_close_after_the_window() {
        // identical through bar 60, where the first window ends
        let base = [
            (0, 84.0),
            (4, 99.0),
            (6, 99.0),
            (12, 86.0),
            (16, 99.0),
            (18, 99.0),
            (24, 89.6),
            (28, 99.0),
            (30, 99.0),
            (36, 93.2),
            (40, 99.0),
            (42, 99.0),
            (48, 96.8),
            (52, 99.0),
            (54, 99.0),
        ];
        let cases: [(&[(usize, f64)], usize, Option<PatternStatus>); 3] = [
            (&[(60, 97.5), (64, 108.0), (99, 112.0)], 100, Some(PatternStatus::Confirmed)),
            (&[(60, 97.5), (99, 98.5)], 100, Some(PatternStatus::Forming)),
            (&[(60, 80.0)], 61, None),
        ];

        for (tail, len, expected) in cases {
            let anchors: Vec<_> = base.iter().chain(tail).copied().collect();
            let c = AscendingTriangleDetector::with_defaults().scan(&series_from(&anchors, len));
            assert_eq!(c.as_ref().map(|c| c.status), expected, "tail {tail:?}");
            if let Some(c) = c {
                assert_eq!(c.breakout.is_some(), c.is_confirmed());
                assert_eq!(c.shape.span(), (0, 60));
            }
        }
    }

    #[test]
    fn test_falling_lows_rejected() {
        let s = series_from(
            &[
                (0, 84.0),
                (4, 99.0),
                (12, 95.0),
                (16, 99.0),
                (24, 92.0),
                (28, 99.0),
                (36, 89.0),
                (40, 99.0),
                (48, 86.0),
                (52, 99.0),
                (60, 84.0),
                (69, 80.0),
            ],
            70,
        );
        assert!(AscendingTriangleDetector::with_defaults().scan(&s).is_none());
    }
}

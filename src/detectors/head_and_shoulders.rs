//! Head and shoulders top

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::helpers::{first_close_crossing, lookahead, lowest_low, Cross};
use crate::{
    extrema::{find_peaks, ExtremumKind},
    params::{get_period, get_ratio, ParamMeta, ParameterizedDetector},
    series::Series,
    trendline::Trendline,
    PatternCandidate, PatternError, PatternKind, PatternMatcher, PatternShape, Period, Ratio,
    Result,
};

impl_with_defaults!(HeadAndShouldersDetector);

/// Head and Shoulders: three peaks, the middle one highest, bearish on a
/// close below the neckline drawn through the two intervening lows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadAndShouldersDetector {
    pub window: Period,
    /// Maximum shoulder height difference relative to the higher shoulder
    pub shoulder_tolerance: Ratio,
    pub confirmation: Period,
    pub min_bars: Period,
}

impl Default for HeadAndShouldersDetector {
    fn default() -> Self {
        Self {
            window: Period::new_const(20),
            shoulder_tolerance: Ratio::new_const(0.10),
            confirmation: Period::new_const(30),
            min_bars: Period::new_const(60),
        }
    }
}

impl PatternMatcher for HeadAndShouldersDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::HeadAndShoulders
    }

    fn min_bars(&self) -> usize {
        self.min_bars.get()
    }

    fn scan(&self, series: &Series) -> Option<PatternCandidate> {
        let peaks = find_peaks(series, self.window.get());
        let tolerance = self.shoulder_tolerance.get();

        for (i, ls) in peaks.iter().enumerate() {
            for (j, head) in peaks.iter().enumerate().skip(i + 1) {
                if head.price <= ls.price {
                    continue;
                }
                for rs in &peaks[j + 1..] {
                    if head.price <= rs.price {
                        continue;
                    }
                    if (ls.price - rs.price).abs() > ls.price.max(rs.price) * tolerance {
                        continue;
                    }

                    let (Some(left_low), Some(right_low)) = (
                        lowest_low(series, ls.position + 1..head.position),
                        lowest_low(series, head.position + 1..rs.position),
                    ) else {
                        continue;
                    };
                    let Ok(neckline) = Trendline::fit(&[
                        series.point(left_low, ExtremumKind::Trough),
                        series.point(right_low, ExtremumKind::Trough),
                    ]) else {
                        continue;
                    };

                    if ls.price <= neckline.at(ls.position) || rs.price <= neckline.at(rs.position)
                    {
                        continue;
                    }
                    let height = head.price - neckline.at(head.position);
                    if !height.is_finite() || height <= 0.0 {
                        continue;
                    }

                    let range = lookahead(rs.position, self.confirmation.get(), series.len());
                    let breakout =
                        first_close_crossing(series, range, Cross::Below, |k| neckline.at(k));
                    let trigger_at = breakout.map_or(rs.position, |b| b.position);
                    let trigger = neckline.at(trigger_at);

                    return Some(
                        PatternCandidate::new(
                            PatternShape::HeadAndShoulders {
                                left_shoulder: *ls,
                                head: *head,
                                right_shoulder: *rs,
                                neckline,
                            },
                            trigger,
                            breakout,
                        )
                        .with_target(trigger - height),
                    );
                }
            }
        }
        None
    }

    fn validate_config(&self) -> Result<()> {
        // Three non-overlapping extrema windows must fit
        if self.window.get() * 3 > self.min_bars.get() {
            return Err(PatternError::InvalidConfig(format!(
                "window {} too wide for min_bars {}",
                self.window.get(),
                self.min_bars.get()
            )));
        }
        Ok(())
    }
}

static HEAD_AND_SHOULDERS_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("window", 20.0, (10.0, 20.0, 2.0), "Centered window for shoulder and head peaks"),
    ParamMeta::ratio("shoulder_tolerance", 0.10, (0.02, 0.2, 0.02), "Maximum relative difference between shoulders"),
    ParamMeta::period("confirmation", 30.0, (10.0, 40.0, 10.0), "Bars searched for a neckline break"),
    ParamMeta::period("min_bars", 60.0, (60.0, 120.0, 20.0), "Minimum series length"),
];

impl ParameterizedDetector for HeadAndShouldersDetector {
    fn param_meta() -> &'static [ParamMeta] {
        HEAD_AND_SHOULDERS_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            window: get_period(params, "window", 20)?,
            shoulder_tolerance: get_ratio(params, "shoulder_tolerance", 0.10)?,
            confirmation: get_period(params, "confirmation", 30)?,
            min_bars: get_period(params, "min_bars", 60)?,
        })
    }

    fn pattern_kind() -> PatternKind {
        PatternKind::HeadAndShoulders
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
            .map(|i| Bar::new(i as i64 * 60, mids[i], mids[i] + 1.0, mids[i] - 1.0, mids[i], 0.0))
            .collect();
        Series::new(bars).unwrap()
    }

    fn classic() -> Series {
        series_from(
            &[
                (0, 100.0),
                (20, 129.0),
                (35, 111.0),
                (50, 149.0),
                (65, 111.0),
                (80, 129.0),
                (110, 90.0),
                (119, 88.0),
            ],
            120,
        )
    }

    #[test]
    fn test_classic_top_confirmed() {
        let c = HeadAndShouldersDetector::with_defaults()
            .scan(&classic())
            .unwrap();
        assert_eq!(c.status, PatternStatus::Confirmed);
        assert_eq!(c.breakout_position(), Some(95));
        assert!((c.breakout.unwrap().price - 109.5).abs() < 1e-9);
        assert!((c.trigger_level - 110.0).abs() < 1e-9);
        assert!((c.target_price.unwrap() - 70.0).abs() < 1e-9);
        let PatternShape::HeadAndShoulders {
            left_shoulder,
            head,
            right_shoulder,
            neckline,
        } = c.shape
        else {
            panic!("wrong shape");
        };
        assert_eq!(
            (left_shoulder.position, head.position, right_shoulder.position),
            (20, 50, 80)
        );
        assert!(neckline.slope.abs() < 1e-12);
    }

    #[test]
    fn test_forming_while_above_neckline() {
        let s = series_from(
            &[
                (0, 100.0),
                (20, 129.0),
                (35, 111.0),
                (50, 149.0),
                (65, 111.0),
                (80, 129.0),
                (110, 115.0),
                (119, 114.0),
            ],
            120,
        );
        let c = HeadAndShouldersDetector::with_defaults().scan(&s).unwrap();
        assert_eq!(c.status, PatternStatus::Forming);
        assert!(c.breakout.is_none());
        assert!((c.trigger_level - 110.0).abs() < 1e-9);
        assert!((c.target_price.unwrap() - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_head_no_pattern() {
        // three equal peaks: the middle one is not strictly higher
        let s = series_from(
            &[
                (0, 100.0),
                (20, 129.0),
                (35, 111.0),
                (50, 129.0),
                (65, 111.0),
                (80, 129.0),
                (119, 100.0),
            ],
            120,
        );
        assert!(HeadAndShouldersDetector::with_defaults().scan(&s).is_none());
    }

    #[test]
    fn test_short_series() {
        let s = series_from(&[(0, 100.0), (39, 120.0)], 40);
        assert_eq!(
            HeadAndShouldersDetector::with_defaults().detect(&s),
            Detection::InsufficientData { need: 60, got: 40 }
        );
    }

    #[test]
    fn test_idempotent() {
        let d = HeadAndShouldersDetector::with_defaults();
        let s = classic();
        assert_eq!(d.detect(&s), d.detect(&s));
    }
}

//! Rising and falling wedge matchers
//!
//! Both lines slope the same way and converge. A rising wedge resolves
//! down through its lower line, a falling wedge up through its upper line.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::helpers::{bullish_fibonacci, first_close_crossing, lookahead, Cross};
use crate::{
    extrema::{find_peaks_and_troughs, ExtremaPoint},
    params::{get_period, get_ratio, ParamMeta, ParameterizedDetector},
    series::Series,
    trendline::Trendline,
    Breakout, PatternCandidate, PatternError, PatternKind, PatternMatcher, PatternShape, Period,
    Ratio, Result,
};

impl_with_defaults!(RisingWedgeDetector, FallingWedgeDetector);

struct WedgeMatch {
    upper: Trendline,
    lower: Trendline,
    start: usize,
    end: usize,
    height: f64,
    trigger: f64,
    breakout: Option<Breakout>,
}

#[derive(Debug, Clone, Copy)]
struct WedgeRules {
    rising: bool,
    window: usize,
    points_per_line: usize,
    min_r_squared: f64,
    min_convergence: f64,
    confirmation: usize,
}

impl WedgeRules {
    fn fit_run(&self, run: &[ExtremaPoint]) -> Option<Trendline> {
        let line = Trendline::fit(run).ok()?;
        let sloped = if self.rising {
            line.slope > 0.0
        } else {
            line.slope < 0.0
        };
        (sloped && line.r_squared >= self.min_r_squared).then_some(line)
    }

    /// Converging geometry between an upper and a lower line. The apex must
    /// lie to the right of the formation.
    fn converges(&self, upper: &Trendline, lower: &Trendline) -> Option<(usize, usize)> {
        let overlap = lower.first_position() <= upper.last_position()
            && upper.first_position() <= lower.last_position();
        if !overlap {
            return None;
        }
        let steeper = if self.rising {
            lower.steeper_than(upper, self.min_convergence)
        } else {
            upper.steeper_than(lower, self.min_convergence)
        };
        if !steeper {
            return None;
        }
        let start = upper.first_position().min(lower.first_position());
        let end = upper.last_position().max(lower.last_position());
        let apex = upper.intersection(lower)?;
        (upper.at(start) > lower.at(start) && upper.at(end) > lower.at(end) && apex > end as f64)
            .then_some((start, end))
    }

    fn scan(&self, series: &Series) -> Option<WedgeMatch> {
        let m = self.points_per_line;
        let (peaks, troughs) = find_peaks_and_troughs(series, self.window);
        if peaks.len() < m || troughs.len() < m {
            return None;
        }

        for peak_run in peaks.windows(m) {
            let Some(upper) = self.fit_run(peak_run) else {
                continue;
            };

            // Earliest trough run that converges with this upper line
            let Some((lower, start, end)) = troughs.windows(m).find_map(|trough_run| {
                let lower = self.fit_run(trough_run)?;
                let (start, end) = self.converges(&upper, &lower)?;
                Some((lower, start, end))
            }) else {
                continue;
            };

            let height = upper.at(start) - lower.at(start);
            if !height.is_finite() {
                continue;
            }
            let after = upper.last_position().max(lower.last_position());
            let range = lookahead(after, self.confirmation, series.len());
            let breakout = if self.rising {
                first_close_crossing(series, range, Cross::Below, |k| lower.at(k))
            } else {
                first_close_crossing(series, range, Cross::Above, |k| upper.at(k))
            };
            let trigger = match breakout {
                Some(b) => b.price,
                None if self.rising => lower.at(end),
                None => upper.at(end),
            };

            return Some(WedgeMatch {
                upper,
                lower,
                start,
                end,
                height,
                trigger,
                breakout,
            });
        }
        None
    }
}

fn check_config(points_per_line: Period, window: Period, min_bars: Period) -> Result<()> {
    if points_per_line.get() < 2 {
        return Err(PatternError::InvalidConfig(
            "points_per_line must be at least 2".into(),
        ));
    }
    if window.get() >= min_bars.get() {
        return Err(PatternError::InvalidConfig(format!(
            "window {} must be below min_bars {}",
            window.get(),
            min_bars.get()
        )));
    }
    Ok(())
}

// ============================================================
// RISING WEDGE
// ============================================================

/// Rising Wedge: rising lines with the lower one steeper, bearish on a close below the lower line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RisingWedgeDetector {
    pub window: Period,
    pub points_per_line: Period,
    pub min_r_squared: Ratio,
    /// Relative slope margin by which the steeper line must dominate
    pub min_convergence: Ratio,
    pub confirmation: Period,
    pub min_bars: Period,
}

impl Default for RisingWedgeDetector {
    fn default() -> Self {
        Self {
            window: Period::new_const(5),
            points_per_line: Period::new_const(3),
            min_r_squared: Ratio::new_const(0.8),
            min_convergence: Ratio::new_const(0.1),
            confirmation: Period::new_const(20),
            min_bars: Period::new_const(40),
        }
    }
}

impl RisingWedgeDetector {
    fn rules(&self) -> WedgeRules {
        WedgeRules {
            rising: true,
            window: self.window.get(),
            points_per_line: self.points_per_line.get(),
            min_r_squared: self.min_r_squared.get(),
            min_convergence: self.min_convergence.get(),
            confirmation: self.confirmation.get(),
        }
    }
}

impl PatternMatcher for RisingWedgeDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::RisingWedge
    }

    fn min_bars(&self) -> usize {
        self.min_bars.get()
    }

    fn scan(&self, series: &Series) -> Option<PatternCandidate> {
        let m = self.rules().scan(series)?;
        let lower_at_trigger = m
            .breakout
            .map_or(m.lower.at(m.end), |b| m.lower.at(b.position));
        Some(
            PatternCandidate::new(
                PatternShape::RisingWedge {
                    upper: m.upper,
                    lower: m.lower,
                    start: m.start,
                    end: m.end,
                },
                lower_at_trigger,
                m.breakout,
            )
            .with_target(m.trigger - m.height),
        )
    }

    fn validate_config(&self) -> Result<()> {
        check_config(self.points_per_line, self.window, self.min_bars)
    }
}

// ============================================================
// FALLING WEDGE
// ============================================================

/// Falling Wedge: falling lines with the upper one steeper, bullish on a close above the upper line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallingWedgeDetector {
    pub window: Period,
    pub points_per_line: Period,
    pub min_r_squared: Ratio,
    pub min_convergence: Ratio,
    pub confirmation: Period,
    pub min_bars: Period,
}

impl Default for FallingWedgeDetector {
    fn default() -> Self {
        Self {
            window: Period::new_const(5),
            points_per_line: Period::new_const(3),
            min_r_squared: Ratio::new_const(0.8),
            min_convergence: Ratio::new_const(0.1),
            confirmation: Period::new_const(20),
            min_bars: Period::new_const(40),
        }
    }
}

impl FallingWedgeDetector {
    fn rules(&self) -> WedgeRules {
        WedgeRules {
            rising: false,
            window: self.window.get(),
            points_per_line: self.points_per_line.get(),
            min_r_squared: self.min_r_squared.get(),
            min_convergence: self.min_convergence.get(),
            confirmation: self.confirmation.get(),
        }
    }
}

impl PatternMatcher for FallingWedgeDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::FallingWedge
    }

    fn min_bars(&self) -> usize {
        self.min_bars.get()
    }

    fn scan(&self, series: &Series) -> Option<PatternCandidate> {
        let m = self.rules().scan(series)?;
        let upper_at_trigger = m
            .breakout
            .map_or(m.upper.at(m.end), |b| m.upper.at(b.position));
        let swing_low = m
            .lower
            .points
            .iter()
            .map(|p| p.price)
            .fold(f64::INFINITY, f64::min);
        let swing_high = m
            .upper
            .points
            .iter()
            .map(|p| p.price)
            .fold(f64::NEG_INFINITY, f64::max);
        let fibonacci = bullish_fibonacci(swing_low, swing_high, m.trigger);
        Some(
            PatternCandidate::new(
                PatternShape::FallingWedge {
                    upper: m.upper,
                    lower: m.lower,
                    start: m.start,
                    end: m.end,
                },
                upper_at_trigger,
                m.breakout,
            )
            .with_target(m.trigger + m.height)
            .with_fibonacci(fibonacci),
        )
    }

    fn validate_config(&self) -> Result<()> {
        check_config(self.points_per_line, self.window, self.min_bars)
    }
}

// ============================================================
// PARAMETER METADATA
// ============================================================

static WEDGE_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("window", 5.0, (3.0, 11.0, 2.0), "Centered window for local extrema"),
    ParamMeta::period("points_per_line", 3.0, (2.0, 5.0, 1.0), "Consecutive extrema fit by each trendline"),
    ParamMeta::ratio("min_r_squared", 0.8, (0.6, 0.95, 0.05), "Minimum goodness of fit for both lines"),
    ParamMeta::ratio("min_convergence", 0.1, (0.0, 0.5, 0.05), "Relative slope margin of the steeper line"),
    ParamMeta::period("confirmation", 20.0, (10.0, 30.0, 5.0), "Bars searched for a breakout"),
    ParamMeta::period("min_bars", 40.0, (30.0, 80.0, 10.0), "Minimum series length"),
];

fn wedge_from_params<T>(
    params: &HashMap<&str, f64>,
    build: impl FnOnce(Period, Period, Ratio, Ratio, Period, Period) -> T,
) -> Result<T> {
    Ok(build(
        get_period(params, "window", 5)?,
        get_period(params, "points_per_line", 3)?,
        get_ratio(params, "min_r_squared", 0.8)?,
        get_ratio(params, "min_convergence", 0.1)?,
        get_period(params, "confirmation", 20)?,
        get_period(params, "min_bars", 40)?,
    ))
}

impl ParameterizedDetector for RisingWedgeDetector {
    fn param_meta() -> &'static [ParamMeta] {
        WEDGE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        wedge_from_params(
            params,
            |window, points_per_line, min_r_squared, min_convergence, confirmation, min_bars| {
                Self {
                    window,
                    points_per_line,
                    min_r_squared,
                    min_convergence,
                    confirmation,
                    min_bars,
                }
            },
        )
    }

    fn pattern_kind() -> PatternKind {
        PatternKind::RisingWedge
    }
}

impl ParameterizedDetector for FallingWedgeDetector {
    fn param_meta() -> &'static [ParamMeta] {
        WEDGE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        wedge_from_params(
            params,
            |window, points_per_line, min_r_squared, min_convergence, confirmation, min_bars| {
                Self {
                    window,
                    points_per_line,
                    min_r_squared,
                    min_convergence,
                    confirmation,
                    min_bars,
                }
            },
        )
    }

    fn pattern_kind() -> PatternKind {
        PatternKind::FallingWedge
    }
}

//! Shared scanning helpers for chart pattern matchers
//!
//! Breakout searches and range extrema used by several detector modules.

use std::ops::Range;

use crate::{series::Series, Breakout};

/// Which side of a level a close must end up on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cross {
    /// close > level
    Above,
    /// close < level
    Below,
}

impl Cross {
    #[inline]
    pub fn crossed(self, close: f64, level: f64) -> bool {
        match self {
            Cross::Above => close > level,
            Cross::Below => close < level,
        }
    }
}

/// Bars strictly after `after`, at most `window` of them, clipped to `n`.
#[inline]
pub fn lookahead(after: usize, window: usize, n: usize) -> Range<usize> {
    let start = (after + 1).min(n);
    let end = after.saturating_add(window).saturating_add(1).min(n);
    start..end.max(start)
}

/// First bar in `range` whose close crosses `level(position)` strictly.
pub fn first_close_crossing<F>(
    series: &Series,
    range: Range<usize>,
    cross: Cross,
    level: F,
) -> Option<Breakout>
where
    F: Fn(usize) -> f64,
{
    let end = range.end.min(series.len());
    (range.start..end)
        .find(|&k| cross.crossed(series.close(k), level(k)))
        .map(|k| Breakout {
            position: k,
            timestamp: series.timestamp(k),
            price: series.close(k),
        })
}

/// Position of the lowest low in `range` (earliest on ties)
pub fn lowest_low(series: &Series, range: Range<usize>) -> Option<usize> {
    let end = range.end.min(series.len());
    let mut best: Option<usize> = None;
    for k in range.start..end {
        match best {
            Some(b) if series.low(k) >= series.low(b) => {}
            _ => best = Some(k),
        }
    }
    best
}

/// Position of the highest high in `range` (earliest on ties)
pub fn highest_high(series: &Series, range: Range<usize>) -> Option<usize> {
    let end = range.end.min(series.len());
    let mut best: Option<usize> = None;
    for k in range.start..end {
        match best {
            Some(b) if series.high(k) <= series.high(b) => {}
            _ => best = Some(k),
        }
    }
    best
}

/// Fibonacci levels for a bullish formation, or `None` when inputs are unusable
#[inline]
pub fn bullish_fibonacci(
    swing_low: f64,
    swing_high: f64,
    breakout: f64,
) -> Option<crate::fibonacci::FibonacciLevels> {
    crate::fibonacci::calculate(swing_low, swing_high, breakout).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Bar;

    fn closes(values: &[f64]) -> Series {
        let bars = values
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(i as i64, c, c + 1.0, c - 1.0, c, 0.0))
            .collect();
        Series::new(bars).unwrap()
    }

    #[test]
    fn test_lookahead_clips() {
        assert_eq!(lookahead(5, 3, 100), 6..9);
        assert_eq!(lookahead(5, 30, 10), 6..10);
        assert_eq!(lookahead(9, 30, 10), 10..10);
        assert!(lookahead(20, 5, 10).is_empty());
    }

    #[test]
    fn test_crossing_is_strict() {
        let s = closes(&[10.0, 9.0, 8.0, 7.0]);
        let hit = first_close_crossing(&s, 0..4, Cross::Below, |_| 8.0).unwrap();
        assert_eq!(hit.position, 3);
        assert_eq!(hit.price, 7.0);
        assert!(first_close_crossing(&s, 0..4, Cross::Above, |_| 10.0).is_none());
    }

    #[test]
    fn test_range_extrema_first_on_ties() {
        let s = closes(&[5.0, 3.0, 3.0, 8.0, 8.0]);
        assert_eq!(lowest_low(&s, 0..5), Some(1));
        assert_eq!(highest_high(&s, 0..5), Some(3));
        assert_eq!(lowest_low(&s, 3..3), None);
    }
}

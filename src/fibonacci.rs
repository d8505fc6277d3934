//! Fibonacci retracement and extension levels.

use serde::{Deserialize, Serialize};

use crate::{PatternError, Result};

/// Standard retracement ratios
pub const RETRACEMENT_RATIOS: [f64; 5] = [0.236, 0.382, 0.5, 0.618, 0.786];
/// Standard extension ratios
pub const EXTENSION_RATIOS: [f64; 3] = [1.618, 2.618, 3.618];

/// One labelled price level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FibLevel {
    pub ratio: f64,
    pub price: f64,
}

/// Levels derived from a swing low, a swing high and a breakout price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibonacciLevels {
    pub swing_low: f64,
    pub swing_high: f64,
    pub breakout: f64,
    pub retracements: [FibLevel; 5],
    pub extensions: [FibLevel; 3],
}

/// Compute all levels.
///
/// Retracements are `low + range * ratio`, extensions are
/// `breakout + range * ratio`, with `range = high - low`.
pub fn calculate(swing_low: f64, swing_high: f64, breakout: f64) -> Result<FibonacciLevels> {
    if !(swing_low.is_finite() && swing_high.is_finite() && breakout.is_finite()) {
        return Err(PatternError::NumericInstability(
            "non-finite fibonacci landmark",
        ));
    }
    let range = swing_high - swing_low;
    let retracements = RETRACEMENT_RATIOS.map(|ratio| FibLevel {
        ratio,
        price: swing_low + range * ratio,
    });
    let extensions = EXTENSION_RATIOS.map(|ratio| FibLevel {
        ratio,
        price: breakout + range * ratio,
    });
    Ok(FibonacciLevels {
        swing_low,
        swing_high,
        breakout,
        retracements,
        extensions,
    })
}

impl FibonacciLevels {
    /// Price of a retracement ratio, if it is one of the standard ones
    pub fn retracement(&self, ratio: f64) -> Option<f64> {
        find(&self.retracements, ratio)
    }

    /// Price of an extension ratio, if it is one of the standard ones
    pub fn extension(&self, ratio: f64) -> Option<f64> {
        find(&self.extensions, ratio)
    }

    /// All levels, retracements first
    pub fn levels(&self) -> impl Iterator<Item = &FibLevel> {
        self.retracements.iter().chain(self.extensions.iter())
    }
}

fn find(levels: &[FibLevel], ratio: f64) -> Option<f64> {
    levels
        .iter()
        .find(|l| (l.ratio - ratio).abs() < 1e-9)
        .map(|l| l.price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_levels() {
        let fib = calculate(100.0, 200.0, 210.0).unwrap();
        assert!((fib.retracement(0.5).unwrap() - 150.0).abs() < 1e-9);
        assert!((fib.extension(1.618).unwrap() - 371.8).abs() < 1e-9);
        assert!((fib.retracement(0.236).unwrap() - 123.6).abs() < 1e-9);
        assert!((fib.extension(3.618).unwrap() - 571.8).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_ratio() {
        let fib = calculate(100.0, 200.0, 210.0).unwrap();
        assert!(fib.retracement(0.3).is_none());
        assert!(fib.extension(0.5).is_none());
        assert_eq!(fib.levels().count(), 8);
    }

    #[test]
    fn test_non_finite_input() {
        assert!(matches!(
            calculate(f64::NAN, 200.0, 210.0),
            Err(PatternError::NumericInstability(_))
        ));
        assert!(calculate(100.0, f64::INFINITY, 210.0).is_err());
    }
}

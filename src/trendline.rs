//! Least-squares trendlines through extrema.

use serde::{Deserialize, Serialize};

use crate::{extrema::ExtremaPoint, PatternError, Result};

/// Straight line `price = slope * position + intercept` fit through extrema.
///
/// The intercept is in bar-position units, so a trendline is only meaningful
/// against the series it was fit on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trendline {
    pub slope: f64,
    pub intercept: f64,
    pub points: Vec<ExtremaPoint>,
    pub r_squared: f64,
}

impl Trendline {
    /// Ordinary least squares of price against position.
    ///
    /// Needs at least two points at distinct positions. A flat set of prices
    /// fits perfectly (`r_squared == 1.0`).
    pub fn fit(points: &[ExtremaPoint]) -> Result<Self> {
        if points.len() < 2 {
            return Err(PatternError::InsufficientData {
                need: 2,
                got: points.len(),
            });
        }
        let n = points.len() as f64;
        let mean_x = points.iter().map(|p| p.position as f64).sum::<f64>() / n;
        let mean_y = points.iter().map(|p| p.price).sum::<f64>() / n;

        let (sxx, sxy) = points.iter().fold((0.0, 0.0), |(sxx, sxy), p| {
            let dx = p.position as f64 - mean_x;
            (sxx + dx * dx, sxy + dx * (p.price - mean_y))
        });
        if sxx <= f64::EPSILON {
            return Err(PatternError::NumericInstability(
                "trendline points share one position",
            ));
        }

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;

        let (ss_res, ss_tot) = points.iter().fold((0.0, 0.0), |(res, tot), p| {
            let fitted = slope * p.position as f64 + intercept;
            (
                res + (p.price - fitted).powi(2),
                tot + (p.price - mean_y).powi(2),
            )
        });
        let r_squared = if ss_tot <= 1e-12 {
            1.0
        } else {
            1.0 - ss_res / ss_tot
        };

        if !(slope.is_finite() && intercept.is_finite() && r_squared.is_finite()) {
            return Err(PatternError::NumericInstability(
                "non-finite trendline coefficients",
            ));
        }

        Ok(Self {
            slope,
            intercept,
            points: points.to_vec(),
            r_squared,
        })
    }

    /// Line value at a (possibly fractional) bar position
    #[inline]
    pub fn value_at(&self, position: f64) -> f64 {
        self.slope * position + self.intercept
    }

    /// Line value at a bar
    #[inline]
    pub fn at(&self, position: usize) -> f64 {
        self.value_at(position as f64)
    }

    pub fn first_position(&self) -> usize {
        self.points.first().map_or(0, |p| p.position)
    }

    pub fn last_position(&self) -> usize {
        self.points.last().map_or(0, |p| p.position)
    }

    /// True when this line's slope magnitude exceeds `other`'s by more than
    /// the relative margin `eps`.
    pub fn steeper_than(&self, other: &Trendline, eps: f64) -> bool {
        self.slope.abs() > other.slope.abs() * (1.0 + eps)
    }

    /// Position where two lines intersect, if they are not parallel
    pub fn intersection(&self, other: &Trendline) -> Option<f64> {
        let dslope = self.slope - other.slope;
        if dslope.abs() <= f64::EPSILON {
            return None;
        }
        let x = (other.intercept - self.intercept) / dslope;
        x.is_finite().then_some(x)
    }
}

//! Technical indicators over price columns.
//!
//! Every function returns a vector aligned with its input, holding `None`
//! wherever the indicator's warm-up window is not yet complete.

use serde::Serialize;

/// Simple moving average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    for i in period.saturating_sub(1)..values.len() {
        let window = &values[i + 1 - period..=i];
        out[i] = Some(window.iter().sum::<f64>() / period as f64);
    }
    out
}

/// Exponential moving average, `alpha = 2 / (period + 1)`, seeded with the
/// first value and reported once `period` values have been seen.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    smooth(values, alpha, period)
}

/// Recursive exponential smoothing without bias adjustment.
fn smooth(values: &[f64], alpha: f64, min_periods: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    let mut acc = match values.first() {
        Some(&v) => v,
        None => return out,
    };
    for (i, &v) in values.iter().enumerate() {
        if i > 0 {
            acc = alpha * v + (1.0 - alpha) * acc;
        }
        if i + 1 >= min_periods {
            out[i] = Some(acc);
        }
    }
    out
}

/// Relative strength index with Wilder smoothing (`alpha = 1 / period`).
///
/// Defined from index `period`. A window with no losses reads 100, a
/// completely flat window reads 50.
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < 2 {
        return out;
    }
    let diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let gains: Vec<f64> = diffs.iter().map(|d| d.max(0.0)).collect();
    let losses: Vec<f64> = diffs.iter().map(|d| (-d).max(0.0)).collect();
    let alpha = 1.0 / period as f64;
    let avg_gain = smooth(&gains, alpha, period);
    let avg_loss = smooth(&losses, alpha, period);

    for (i, (g, l)) in avg_gain.iter().zip(&avg_loss).enumerate() {
        if let (Some(g), Some(l)) = (g, l) {
            out[i + 1] = Some(if *l <= 0.0 {
                if *g <= 0.0 {
                    50.0
                } else {
                    100.0
                }
            } else {
                100.0 - 100.0 / (1.0 + g / l)
            });
        }
    }
    out
}

/// MACD line, signal line and histogram
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Macd {
    pub line: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

/// Moving average convergence/divergence.
///
/// The signal line is an EMA over the defined part of the MACD line, so with
/// the usual (12, 26, 9) it first appears at index 33.
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);
    let line: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    let mut signal_line = vec![None; values.len()];
    if let Some(start) = line.iter().position(Option::is_some) {
        let defined: Vec<f64> = line[start..].iter().map(|v| v.unwrap_or(0.0)).collect();
        for (offset, v) in ema(&defined, signal).into_iter().enumerate() {
            signal_line[start + offset] = v;
        }
    }

    let histogram = line
        .iter()
        .zip(&signal_line)
        .map(|(l, s)| Some((*l)? - (*s)?))
        .collect();

    Macd {
        line,
        signal: signal_line,
        histogram,
    }
}

/// Bollinger bands
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bollinger {
    pub middle: Vec<Option<f64>>,
    pub upper: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

/// Bollinger bands: SMA ± `width` population standard deviations.
pub fn bollinger(values: &[f64], period: usize, width: f64) -> Bollinger {
    let middle = sma(values, period);
    let mut upper = vec![None; values.len()];
    let mut lower = vec![None; values.len()];
    for (i, m) in middle.iter().enumerate() {
        if let Some(m) = *m {
            let window = &values[i + 1 - period..=i];
            let var = window.iter().map(|v| (v - m).powi(2)).sum::<f64>() / period as f64;
            let sd = var.sqrt();
            upper[i] = Some(m + width * sd);
            lower[i] = Some(m - width * sd);
        }
    }
    Bollinger {
        middle,
        upper,
        lower,
    }
}

/// Average directional index with both directional indicators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Adx {
    pub adx: Vec<Option<f64>>,
    pub plus_di: Vec<Option<f64>>,
    pub minus_di: Vec<Option<f64>>,
}

/// Average directional index with Wilder smoothing.
///
/// The directional indicators are defined from index `period`, the ADX from
/// index `2 * period - 1`.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Adx {
    let n = close.len().min(high.len()).min(low.len());
    let mut out = Adx {
        adx: vec![None; n],
        plus_di: vec![None; n],
        minus_di: vec![None; n],
    };
    if period == 0 || n < period * 2 {
        return out;
    }

    let mut tr = vec![0.0; n];
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up_move = high[i] - high[i - 1];
        let down_move = low[i - 1] - low[i];
        plus_dm[i] = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        minus_dm[i] = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };
        tr[i] = (high[i] - low[i])
            .max((high[i] - close[i - 1]).abs())
            .max((low[i] - close[i - 1]).abs());
    }

    let p = period as f64;
    let mut sm_tr: f64 = tr[1..=period].iter().sum();
    let mut sm_plus: f64 = plus_dm[1..=period].iter().sum();
    let mut sm_minus: f64 = minus_dm[1..=period].iter().sum();
    let mut dx = vec![0.0; n];

    for i in period..n {
        if i > period {
            sm_tr = sm_tr - sm_tr / p + tr[i];
            sm_plus = sm_plus - sm_plus / p + plus_dm[i];
            sm_minus = sm_minus - sm_minus / p + minus_dm[i];
        }
        if sm_tr > 0.0 {
            let pdi = 100.0 * sm_plus / sm_tr;
            let mdi = 100.0 * sm_minus / sm_tr;
            out.plus_di[i] = Some(pdi);
            out.minus_di[i] = Some(mdi);
            let sum = pdi + mdi;
            dx[i] = if sum > 0.0 {
                100.0 * (pdi - mdi).abs() / sum
            } else {
                0.0
            };
        }
    }

    let mut adx_val = dx[period..period * 2].iter().sum::<f64>() / p;
    out.adx[period * 2 - 1] = Some(adx_val);
    for i in period * 2..n {
        adx_val = (adx_val * (p - 1.0) + dx[i]) / p;
        out.adx[i] = Some(adx_val);
    }
    out
}

/// Last defined value of an indicator column
pub fn latest(values: &[Option<f64>]) -> Option<f64> {
    values.last().copied().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    #[test]
    fn test_sma_warmup_and_value() {
        let s = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(s, vec![None, None, Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn test_ema_constant_series() {
        let e = ema(&[5.0; 10], 4);
        assert!(e[2].is_none());
        assert_eq!(e[3], Some(5.0));
        assert_eq!(e[9], Some(5.0));
    }

    #[test]
    fn test_ema_recursion() {
        let e = ema(&[1.0, 2.0, 3.0], 3);
        // alpha = 0.5: 1 -> 1.5 -> 2.25
        assert_eq!(e, vec![None, None, Some(2.25)]);
    }

    #[test]
    fn test_rsi_bounds() {
        let up = rsi(&ramp(30), 14);
        assert!(up[13].is_none());
        assert_eq!(up[14], Some(100.0));

        let down: Vec<f64> = ramp(30).into_iter().rev().collect();
        let r = rsi(&down, 14);
        assert!(r[29].unwrap() < 1e-9);

        let flat = rsi(&[3.0; 20], 14);
        assert_eq!(flat[19], Some(50.0));
    }

    #[test]
    fn test_rsi_oscillating_is_mid_range() {
        let v: Vec<f64> = (0..60).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
        let r = latest(&rsi(&v, 14)).unwrap();
        assert!(r > 30.0 && r < 70.0);
    }

    #[test]
    fn test_macd_alignment() {
        let m = macd(&ramp(60), 12, 26, 9);
        assert!(m.line[24].is_none());
        assert!(m.line[25].is_some());
        assert!(m.signal[32].is_none());
        assert!(m.signal[33].is_some());
        assert!(m.histogram[33].is_some());
        // rising prices keep the fast EMA above the slow one
        assert!(latest(&m.line).unwrap() > 0.0);
    }

    #[test]
    fn test_bollinger_constant_has_zero_width() {
        let b = bollinger(&[7.0; 25], 20, 2.0);
        assert!(b.upper[18].is_none());
        assert_eq!(b.upper[19], Some(7.0));
        assert_eq!(b.lower[24], Some(7.0));
    }

    #[test]
    fn test_bollinger_population_std() {
        let b = bollinger(&[1.0, 3.0], 2, 1.0);
        assert_eq!(b.middle[1], Some(2.0));
        assert_eq!(b.upper[1], Some(3.0));
        assert_eq!(b.lower[1], Some(1.0));
    }

    #[test]
    fn test_adx_strong_uptrend() {
        let close = ramp(60);
        let high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
        let a = adx(&high, &low, &close, 14);
        assert!(a.adx[26].is_none());
        assert!(a.adx[27].is_some());
        assert!((latest(&a.adx).unwrap() - 100.0).abs() < 1e-9);
        assert!(latest(&a.plus_di).unwrap() > latest(&a.minus_di).unwrap());
    }

    #[test]
    fn test_adx_short_input() {
        let a = adx(&[1.0; 10], &[0.5; 10], &[0.8; 10], 14);
        assert!(a.adx.iter().all(Option::is_none));
    }
}

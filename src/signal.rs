//! Indicator voting.
//!
//! Each enabled indicator casts one vote on the latest bar. The majority
//! decides the direction and the vote margin sets the confidence.

use serde::{Deserialize, Serialize};

use crate::{
    indicators::{self, latest},
    series::{PriceField, Series},
    Direction, PatternError, Period, Result,
};

// ============================================================
// VOTES & SIGNAL
// ============================================================

/// One indicator's opinion on the latest bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorVote {
    pub indicator: &'static str,
    pub direction: Direction,
    /// Human-readable reading, e.g. "Overbought" or "Above Signal"
    pub detail: &'static str,
}

/// Final trading verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalDirection {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SignalDirection::Buy => "Buy",
            SignalDirection::Sell => "Sell",
            SignalDirection::Hold => "Hold",
        })
    }
}

/// Majority verdict with confidence in `0..=100`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub direction: SignalDirection,
    pub confidence: f64,
    pub votes: Vec<IndicatorVote>,
}

impl Signal {
    pub fn from_votes(votes: Vec<IndicatorVote>) -> Self {
        let bullish = votes.iter().filter(|v| v.direction.is_bullish()).count();
        let bearish = votes.iter().filter(|v| v.direction.is_bearish()).count();
        let direction = match bullish.cmp(&bearish) {
            std::cmp::Ordering::Greater => SignalDirection::Buy,
            std::cmp::Ordering::Less => SignalDirection::Sell,
            std::cmp::Ordering::Equal => SignalDirection::Hold,
        };
        let confidence = if votes.is_empty() {
            0.0
        } else {
            bullish.abs_diff(bearish) as f64 / votes.len() as f64 * 100.0
        };
        Self {
            direction,
            confidence,
            votes,
        }
    }

    pub fn explanation(&self) -> String {
        let readings = self
            .votes
            .iter()
            .map(|v| format!("{}: {}", v.indicator, v.detail))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{readings}. Overall signal is {} with {:.2}% confidence based on the indicators.",
            self.direction, self.confidence
        )
    }
}

/// Voter result: either a signal or a refusal for short input
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VoterOutcome {
    InsufficientData { need: usize, got: usize },
    Signal(Signal),
}

impl VoterOutcome {
    pub fn signal(&self) -> Option<&Signal> {
        match self {
            VoterOutcome::Signal(s) => Some(s),
            VoterOutcome::InsufficientData { .. } => None,
        }
    }

    /// `Hold` when data was insufficient
    pub fn direction(&self) -> SignalDirection {
        self.signal().map_or(SignalDirection::Hold, |s| s.direction)
    }

    /// Zero when data was insufficient
    pub fn confidence(&self) -> f64 {
        self.signal().map_or(0.0, |s| s.confidence)
    }

    pub fn explanation(&self) -> String {
        match self {
            VoterOutcome::Signal(s) => s.explanation(),
            VoterOutcome::InsufficientData { need, got } => format!(
                "Not enough historical data to perform reliable analysis: need {need} bars, got {got}."
            ),
        }
    }
}

// ============================================================
// SNAPSHOT
// ============================================================

/// Latest value of every indicator the voter may consult
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub close: f64,
    pub sma_short: Option<f64>,
    pub sma_long: Option<f64>,
    pub sma_trend: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_lower: Option<f64>,
    pub adx: Option<f64>,
    pub plus_di: Option<f64>,
    pub minus_di: Option<f64>,
}

// ============================================================
// VOTER
// ============================================================

/// Indicator periods, thresholds and optional voters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoterConfig {
    pub sma_short: Period,
    pub sma_long: Period,
    pub sma_trend: Period,
    /// Also require close and the short SMA to sit on the right side of the trend SMA
    pub use_trend_sma: bool,
    pub rsi_period: Period,
    pub oversold: f64,
    pub overbought: f64,
    pub macd_fast: Period,
    pub macd_slow: Period,
    pub macd_signal: Period,
    pub use_bollinger: bool,
    pub bollinger_period: Period,
    pub bollinger_width: f64,
    pub use_adx: bool,
    pub adx_period: Period,
    pub adx_threshold: f64,
    pub min_bars: usize,
}

impl Default for VoterConfig {
    fn default() -> Self {
        Self {
            sma_short: Period::new_const(20),
            sma_long: Period::new_const(50),
            sma_trend: Period::new_const(200),
            use_trend_sma: false,
            rsi_period: Period::new_const(14),
            oversold: 30.0,
            overbought: 70.0,
            macd_fast: Period::new_const(12),
            macd_slow: Period::new_const(26),
            macd_signal: Period::new_const(9),
            use_bollinger: false,
            bollinger_period: Period::new_const(20),
            bollinger_width: 2.0,
            use_adx: false,
            adx_period: Period::new_const(14),
            adx_threshold: 25.0,
            min_bars: 50,
        }
    }
}

impl VoterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sma_short >= self.sma_long {
            return Err(PatternError::InvalidConfig(
                "voter: sma_short must be shorter than sma_long".into(),
            ));
        }
        if self.macd_fast >= self.macd_slow {
            return Err(PatternError::InvalidConfig(
                "voter: macd_fast must be shorter than macd_slow".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.oversold)
            || !(0.0..=100.0).contains(&self.overbought)
            || self.oversold >= self.overbought
        {
            return Err(PatternError::InvalidConfig(format!(
                "voter: RSI thresholds {} / {} must satisfy 0 <= oversold < overbought <= 100",
                self.oversold, self.overbought
            )));
        }
        if !(self.bollinger_width.is_finite() && self.bollinger_width > 0.0) {
            return Err(PatternError::InvalidConfig(
                "voter: bollinger_width must be positive".into(),
            ));
        }
        if !self.adx_threshold.is_finite() {
            return Err(PatternError::InvalidValue("adx_threshold must be finite"));
        }
        Ok(())
    }
}

/// Combines SMA, RSI and MACD (plus optional Bollinger and ADX) votes
#[derive(Debug, Clone, Default)]
pub struct SignalVoter {
    config: VoterConfig,
}

impl SignalVoter {
    pub fn new(config: VoterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &VoterConfig {
        &self.config
    }

    /// Signal for the latest bar, or `InsufficientData` below `min_bars`.
    pub fn evaluate(&self, series: &Series) -> VoterOutcome {
        if series.len() < self.config.min_bars {
            return VoterOutcome::InsufficientData {
                need: self.config.min_bars,
                got: series.len(),
            };
        }
        VoterOutcome::Signal(self.tally(&self.snapshot(series)))
    }

    /// Compute the latest indicator readings.
    pub fn snapshot(&self, series: &Series) -> IndicatorSnapshot {
        let c = &self.config;
        let closes = series.values(PriceField::Close);
        let mut snap = IndicatorSnapshot {
            close: closes.last().copied().unwrap_or(f64::NAN),
            sma_short: latest(&indicators::sma(&closes, c.sma_short.get())),
            sma_long: latest(&indicators::sma(&closes, c.sma_long.get())),
            rsi: latest(&indicators::rsi(&closes, c.rsi_period.get())),
            ..Default::default()
        };
        if c.use_trend_sma {
            snap.sma_trend = latest(&indicators::sma(&closes, c.sma_trend.get()));
        }
        let macd = indicators::macd(
            &closes,
            c.macd_fast.get(),
            c.macd_slow.get(),
            c.macd_signal.get(),
        );
        snap.macd = latest(&macd.line);
        snap.macd_signal = latest(&macd.signal);
        if c.use_bollinger {
            let bands = indicators::bollinger(&closes, c.bollinger_period.get(), c.bollinger_width);
            snap.bollinger_upper = latest(&bands.upper);
            snap.bollinger_lower = latest(&bands.lower);
        }
        if c.use_adx {
            let adx = indicators::adx(
                &series.values(PriceField::High),
                &series.values(PriceField::Low),
                &closes,
                c.adx_period.get(),
            );
            snap.adx = latest(&adx.adx);
            snap.plus_di = latest(&adx.plus_di);
            snap.minus_di = latest(&adx.minus_di);
        }
        snap
    }

    /// Vote on a snapshot.
    pub fn tally(&self, snap: &IndicatorSnapshot) -> Signal {
        let c = &self.config;
        let mut votes = vec![
            self.sma_vote(snap),
            rsi_vote(snap.rsi, c.oversold, c.overbought),
            macd_vote(snap.macd, snap.macd_signal),
        ];
        if c.use_bollinger {
            votes.push(bollinger_vote(snap));
        }
        if c.use_adx {
            votes.push(adx_vote(snap, c.adx_threshold));
        }
        Signal::from_votes(votes)
    }

    fn sma_vote(&self, snap: &IndicatorSnapshot) -> IndicatorVote {
        let vote = |direction, detail| IndicatorVote {
            indicator: "SMA Trend",
            direction,
            detail,
        };
        let (Some(short), Some(long)) = (snap.sma_short, snap.sma_long) else {
            return vote(Direction::Neutral, "Unknown");
        };
        let trend = if self.config.use_trend_sma {
            match snap.sma_trend {
                Some(t) => Some(t),
                None => return vote(Direction::Neutral, "Unknown"),
            }
        } else {
            None
        };
        let close = snap.close;
        let above_trend = trend.map_or(true, |t| long > t);
        let below_trend = trend.map_or(true, |t| long < t);
        if close > short && short > long && above_trend {
            vote(Direction::Bullish, "Bullish")
        } else if close < short && short < long && below_trend {
            vote(Direction::Bearish, "Bearish")
        } else {
            vote(Direction::Neutral, "Neutral")
        }
    }
}

fn rsi_vote(rsi: Option<f64>, oversold: f64, overbought: f64) -> IndicatorVote {
    let (direction, detail) = match rsi {
        Some(r) if r > overbought => (Direction::Bearish, "Overbought"),
        Some(r) if r < oversold => (Direction::Bullish, "Oversold"),
        Some(_) => (Direction::Neutral, "Neutral"),
        None => (Direction::Neutral, "Unknown"),
    };
    IndicatorVote {
        indicator: "RSI Level",
        direction,
        detail,
    }
}

fn macd_vote(line: Option<f64>, signal: Option<f64>) -> IndicatorVote {
    let (direction, detail) = match (line, signal) {
        (Some(l), Some(s)) if l > s => (Direction::Bullish, "Above Signal"),
        (Some(_), Some(_)) => (Direction::Bearish, "Below Signal"),
        _ => (Direction::Neutral, "Unknown"),
    };
    IndicatorVote {
        indicator: "MACD Status",
        direction,
        detail,
    }
}

fn bollinger_vote(snap: &IndicatorSnapshot) -> IndicatorVote {
    let (direction, detail) = match (snap.bollinger_lower, snap.bollinger_upper) {
        (Some(lower), _) if snap.close < lower => (Direction::Bullish, "Below Lower Band"),
        (_, Some(upper)) if snap.close > upper => (Direction::Bearish, "Above Upper Band"),
        (Some(_), Some(_)) => (Direction::Neutral, "Inside Bands"),
        _ => (Direction::Neutral, "Unknown"),
    };
    IndicatorVote {
        indicator: "Bollinger Position",
        direction,
        detail,
    }
}

fn adx_vote(snap: &IndicatorSnapshot, threshold: f64) -> IndicatorVote {
    let (direction, detail) = match (snap.adx, snap.plus_di, snap.minus_di) {
        (Some(adx), Some(plus), Some(minus)) if adx > threshold => {
            if plus > minus {
                (Direction::Bullish, "Strong Uptrend")
            } else {
                (Direction::Bearish, "Strong Downtrend")
            }
        }
        (Some(_), _, _) => (Direction::Neutral, "Weak Trend"),
        _ => (Direction::Neutral, "Unknown"),
    };
    IndicatorVote {
        indicator: "ADX Strength",
        direction,
        detail,
    }
}

// ============================================================
// MOVING-AVERAGE CROSSOVER
// ============================================================

/// Per-bar reading of the crossover strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CrossoverSignal {
    StrongBuy,
    Buy,
    Sell,
    StrongSell,
}

/// Latest-bar result of the SMA crossover strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CrossoverDecision {
    pub signal: CrossoverSignal,
    pub decision: SignalDirection,
    pub sma_fast: f64,
    pub sma_slow: f64,
    pub rsi: f64,
}

/// SMA(50)/SMA(200) crossover confirmed by RSI divergence.
///
/// The base reading is Buy when the fast SMA is above the slow one, Sell
/// otherwise. An oversold RSI (< 30) on a rising close upgrades Buy to
/// StrongBuy; an overbought RSI (> 70) on a falling close upgrades Sell to
/// StrongSell. Only the strong readings turn into a Buy/Sell decision;
/// everything else is Hold.
pub fn crossover_decision(series: &Series) -> Result<CrossoverDecision> {
    const FAST: usize = 50;
    const SLOW: usize = 200;
    series.require_len(SLOW)?;

    let closes = series.values(PriceField::Close);
    let n = closes.len();
    let missing = || PatternError::InsufficientData { need: SLOW, got: n };
    let sma_fast = latest(&indicators::sma(&closes, FAST)).ok_or_else(missing)?;
    let sma_slow = latest(&indicators::sma(&closes, SLOW)).ok_or_else(missing)?;
    let rsi = latest(&indicators::rsi(&closes, 14)).ok_or_else(missing)?;

    let rising = closes[n - 1] > closes[n - 2];
    let falling = closes[n - 1] < closes[n - 2];
    let signal = if sma_fast > sma_slow {
        if rsi < 30.0 && rising {
            CrossoverSignal::StrongBuy
        } else {
            CrossoverSignal::Buy
        }
    } else if rsi > 70.0 && falling {
        CrossoverSignal::StrongSell
    } else {
        CrossoverSignal::Sell
    };
    let decision = match signal {
        CrossoverSignal::StrongBuy => SignalDirection::Buy,
        CrossoverSignal::StrongSell => SignalDirection::Sell,
        _ => SignalDirection::Hold,
    };
    Ok(CrossoverDecision {
        signal,
        decision,
        sma_fast,
        sma_slow,
        rsi,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Bar;

    fn series_from_closes(closes: &[f64]) -> Series {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(i as i64 * 86_400, c, c + 1.0, c - 1.0, c, 1_000.0))
            .collect();
        Series::new(bars).unwrap()
    }

    #[test]
    fn test_all_bullish_snapshot() {
        let voter = SignalVoter::new(VoterConfig {
            use_trend_sma: true,
            ..Default::default()
        })
        .unwrap();
        let snap = IndicatorSnapshot {
            close: 120.0,
            sma_short: Some(110.0),
            sma_long: Some(105.0),
            sma_trend: Some(100.0),
            rsi: Some(25.0),
            macd: Some(1.5),
            macd_signal: Some(1.0),
            ..Default::default()
        };
        let signal = voter.tally(&snap);
        assert_eq!(signal.direction, SignalDirection::Buy);
        assert_eq!(signal.confidence, 100.0);
        assert_eq!(signal.votes.len(), 3);
    }

    #[test]
    fn test_all_bearish_snapshot() {
        let voter = SignalVoter::default();
        let snap = IndicatorSnapshot {
            close: 90.0,
            sma_short: Some(95.0),
            sma_long: Some(100.0),
            rsi: Some(75.0),
            macd: Some(-1.0),
            macd_signal: Some(0.0),
            ..Default::default()
        };
        let signal = voter.tally(&snap);
        assert_eq!(signal.direction, SignalDirection::Sell);
        assert_eq!(signal.confidence, 100.0);
    }

    #[test]
    fn test_macd_tie_is_bearish() {
        assert_eq!(macd_vote(Some(1.0), Some(1.0)).direction, Direction::Bearish);
        assert_eq!(macd_vote(None, Some(1.0)).direction, Direction::Neutral);
    }

    #[test]
    fn test_split_vote_is_hold() {
        let voter = SignalVoter::default();
        let snap = IndicatorSnapshot {
            close: 100.0,
            sma_short: Some(100.0),
            sma_long: Some(100.0),
            rsi: Some(20.0),
            macd: Some(0.0),
            macd_signal: Some(1.0),
            ..Default::default()
        };
        let signal = voter.tally(&snap);
        assert_eq!(signal.direction, SignalDirection::Hold);
        assert_eq!(signal.confidence, 0.0);
    }

    #[test]
    fn test_insufficient_data() {
        let series = series_from_closes(&[100.0; 30]);
        let outcome = SignalVoter::default().evaluate(&series);
        assert_eq!(outcome, VoterOutcome::InsufficientData { need: 50, got: 30 });
        assert_eq!(outcome.direction(), SignalDirection::Hold);
        assert_eq!(outcome.confidence(), 0.0);
        assert!(outcome.explanation().contains("Not enough"));
    }

    #[test]
    fn test_linear_uptrend() {
        let closes: Vec<f64> = (0..120).map(|i| 100.0 + i as f64).collect();
        let outcome = SignalVoter::default().evaluate(&series_from_closes(&closes));
        let signal = outcome.signal().unwrap();
        // SMA bullish, RSI overbought, MACD above signal
        assert_eq!(signal.direction, SignalDirection::Buy);
        assert!((signal.confidence - 100.0 / 3.0).abs() < 1e-9);
        let explanation = signal.explanation();
        assert!(explanation.starts_with("SMA Trend: Bullish, RSI Level: Overbought"));
        assert!(explanation.contains("Overall signal is Buy with 33.33% confidence"));
    }

    #[test]
    fn test_optional_voters() {
        let voter = SignalVoter::new(VoterConfig {
            use_bollinger: true,
            use_adx: true,
            ..Default::default()
        })
        .unwrap();
        let closes: Vec<f64> = (0..120).map(|i| 100.0 + i as f64).collect();
        let signal = voter.tally(&voter.snapshot(&series_from_closes(&closes)));
        assert_eq!(signal.votes.len(), 5);
        let adx = signal
            .votes
            .iter()
            .find(|v| v.indicator == "ADX Strength")
            .unwrap();
        assert_eq!(adx.direction, Direction::Bullish);
    }

    #[test]
    fn test_invalid_config() {
        let config = VoterConfig {
            oversold: 80.0,
            ..Default::default()
        };
        assert!(SignalVoter::new(config).is_err());
        let config = VoterConfig {
            sma_short: Period::new_const(60),
            ..Default::default()
        };
        assert!(SignalVoter::new(config).is_err());
    }

    #[test]
    fn test_crossover_requires_history() {
        let series = series_from_closes(&[100.0; 150]);
        assert!(matches!(
            crossover_decision(&series),
            Err(PatternError::InsufficientData { need: 200, got: 150 })
        ));
    }

    #[test]
    fn test_crossover_uptrend_is_hold() {
        let closes: Vec<f64> = (0..250).map(|i| 100.0 + i as f64 * 0.5).collect();
        let d = crossover_decision(&series_from_closes(&closes)).unwrap();
        assert_eq!(d.signal, CrossoverSignal::Buy);
        assert_eq!(d.decision, SignalDirection::Hold);
        assert!(d.sma_fast > d.sma_slow);
    }

    #[test]
    fn test_crossover_strong_sell() {
        // long decline, then a sharp rally that rolls over on the last bar
        let mut closes: Vec<f64> = (0..230).map(|i| 400.0 - i as f64).collect();
        closes.extend((1..=19).map(|i| 170.0 + i as f64 * 3.0));
        closes.push(225.0);
        let d = crossover_decision(&series_from_closes(&closes)).unwrap();
        assert!(d.rsi > 70.0);
        assert_eq!(d.signal, CrossoverSignal::StrongSell);
        assert_eq!(d.decision, SignalDirection::Sell);
    }
}

//! # chartscan - classical chart pattern detection
//!
//! Finds double tops/bottoms, head-and-shoulders, rising/falling wedges,
//! cup-and-handle and ascending triangles in an OHLCV series, and votes a
//! Buy/Sell/Hold signal from SMA, RSI and MACD readings.
//!
//! ## Quick Start
//!
//! ```rust
//! use chartscan::prelude::*;
//!
//! let bars: Vec<Bar> = (0..120)
//!     .map(|i| {
//!         let c = 100.0 + (i as f64 * 0.3).sin() * 5.0;
//!         Bar::new(i * 86_400, c, c + 1.0, c - 1.0, c, 1_000.0)
//!     })
//!     .collect();
//! let series = Series::new(bars).unwrap();
//!
//! let engine = EngineBuilder::new()
//!     .with_all_defaults()
//!     .build()
//!     .unwrap();
//!
//! let analysis = engine.analyze(&series);
//! for outcome in &analysis.detections {
//!     println!("{}: {:?}", outcome.kind.name(), outcome.detection.status());
//! }
//! println!("{}", analysis.signal.explanation());
//! ```

pub mod config;
pub mod data;
pub mod detectors;
pub mod extrema;
pub mod fibonacci;
pub mod indicators;
#[cfg(feature = "cli")]
pub mod logging;
pub mod params;
pub mod report;
pub mod series;
pub mod signal;
pub mod trendline;

pub mod prelude {
    pub use crate::{
        // Configuration
        config::{AnalysisConfig, ParamOverride},
        // Detectors
        detectors::*,
        // Building blocks
        extrema::{
            find_extrema, find_peaks, find_peaks_and_troughs, find_troughs, ExtremaPoint,
            ExtremumKind,
        },
        fibonacci::{FibLevel, FibonacciLevels},
        // Parameters
        params::{get_period, get_ratio, ParamMeta, ParamType, ParameterizedDetector},
        // Reports
        report::{AnalysisReport, ArtifactId, ChartRenderer, JsonArtifactWriter, PatternReport},
        // Parallel
        scan_parallel,
        series::{Bar, PriceField, RawTable, Series},
        signal::{Signal, SignalDirection, SignalVoter, VoterConfig, VoterOutcome},
        trendline::Trendline,
        // Engine
        Analysis,
        Breakout,
        BuiltinMatcher,
        Detection,
        Direction,
        EngineBuilder,
        MatcherOutcome,
        OHLCVExt,
        PatternCandidate,
        // Errors
        PatternError,
        PatternEngine,
        PatternKind,
        // Core traits
        PatternMatcher,
        PatternShape,
        PatternStatus,
        Period,
        Ratio,
        Result,
        ScanError,
        ScanResult,
        OHLCV,
    };
}

use serde::{Deserialize, Serialize};

use crate::{
    extrema::ExtremaPoint,
    fibonacci::FibonacciLevels,
    series::{RawTable, Series},
    signal::{SignalVoter, VoterOutcome},
    trendline::Trendline,
};

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors that can occur during analysis
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Numeric instability: {0}")]
    NumericInstability(&'static str),

    #[error("Data source error: {0}")]
    DataSource(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Extension trait with checks shared by every OHLCV type
pub trait OHLCVExt: OHLCV {
    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| p.is_nan()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if prices.iter().any(|p| p.is_infinite()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if self.high() < self.low() {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

// ============================================================
// PATTERN KINDS
// ============================================================

/// Direction/bias of a pattern or indicator reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }
}

/// The fixed catalog of chart formations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternKind {
    DoubleTop,
    DoubleBottom,
    HeadAndShoulders,
    RisingWedge,
    FallingWedge,
    CupAndHandle,
    AscendingTriangle,
}

impl PatternKind {
    pub const ALL: [PatternKind; 7] = [
        PatternKind::DoubleTop,
        PatternKind::DoubleBottom,
        PatternKind::HeadAndShoulders,
        PatternKind::RisingWedge,
        PatternKind::FallingWedge,
        PatternKind::CupAndHandle,
        PatternKind::AscendingTriangle,
    ];

    /// Stable identifier, e.g. `"DOUBLE_TOP"`
    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::DoubleTop => "DOUBLE_TOP",
            PatternKind::DoubleBottom => "DOUBLE_BOTTOM",
            PatternKind::HeadAndShoulders => "HEAD_AND_SHOULDERS",
            PatternKind::RisingWedge => "RISING_WEDGE",
            PatternKind::FallingWedge => "FALLING_WEDGE",
            PatternKind::CupAndHandle => "CUP_AND_HANDLE",
            PatternKind::AscendingTriangle => "ASCENDING_TRIANGLE",
        }
    }

    /// Display name, e.g. `"Double Top"`
    pub fn name(self) -> &'static str {
        match self {
            PatternKind::DoubleTop => "Double Top",
            PatternKind::DoubleBottom => "Double Bottom",
            PatternKind::HeadAndShoulders => "Head and Shoulders",
            PatternKind::RisingWedge => "Rising Wedge",
            PatternKind::FallingWedge => "Falling Wedge",
            PatternKind::CupAndHandle => "Cup and Handle",
            PatternKind::AscendingTriangle => "Ascending Triangle",
        }
    }

    /// Direction the formation usually resolves in
    pub fn typical_direction(self) -> Direction {
        match self {
            PatternKind::DoubleBottom
            | PatternKind::FallingWedge
            | PatternKind::CupAndHandle
            | PatternKind::AscendingTriangle => Direction::Bullish,
            PatternKind::DoubleTop | PatternKind::HeadAndShoulders | PatternKind::RisingWedge => {
                Direction::Bearish
            }
        }
    }

    pub fn is_typically_bullish(self) -> bool {
        self.typical_direction().is_bullish()
    }

    pub fn is_typically_bearish(self) -> bool {
        self.typical_direction().is_bearish()
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PatternKind {
    type Err = PatternError;

    /// Accepts `DOUBLE_TOP`, `double-top`, `double_top` or `Double Top`.
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        PatternKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| PatternError::InvalidConfig(format!("unknown pattern '{s}'")))
    }
}

// ============================================================
// PATTERN CANDIDATE
// ============================================================

/// Whether a formation has broken out yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternStatus {
    Forming,
    Confirmed,
}

/// The bar whose close crossed the trigger level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakout {
    pub position: usize,
    pub timestamp: i64,
    pub price: f64,
}

/// Landmarks of a formation, one variant per pattern kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "pattern", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternShape {
    DoubleTop {
        first: ExtremaPoint,
        second: ExtremaPoint,
        support: ExtremaPoint,
    },
    DoubleBottom {
        first: ExtremaPoint,
        second: ExtremaPoint,
        resistance: ExtremaPoint,
    },
    HeadAndShoulders {
        left_shoulder: ExtremaPoint,
        head: ExtremaPoint,
        right_shoulder: ExtremaPoint,
        neckline: Trendline,
    },
    RisingWedge {
        upper: Trendline,
        lower: Trendline,
        start: usize,
        end: usize,
    },
    FallingWedge {
        upper: Trendline,
        lower: Trendline,
        start: usize,
        end: usize,
    },
    CupAndHandle {
        left_rim: ExtremaPoint,
        bottom: ExtremaPoint,
        right_rim: ExtremaPoint,
        handle_low: ExtremaPoint,
        cup_depth: f64,
    },
    AscendingTriangle {
        start: usize,
        end: usize,
        resistance: f64,
        touches: Vec<usize>,
        support: Trendline,
        convergence: usize,
    },
}

impl PatternShape {
    pub fn kind(&self) -> PatternKind {
        match self {
            PatternShape::DoubleTop { .. } => PatternKind::DoubleTop,
            PatternShape::DoubleBottom { .. } => PatternKind::DoubleBottom,
            PatternShape::HeadAndShoulders { .. } => PatternKind::HeadAndShoulders,
            PatternShape::RisingWedge { .. } => PatternKind::RisingWedge,
            PatternShape::FallingWedge { .. } => PatternKind::FallingWedge,
            PatternShape::CupAndHandle { .. } => PatternKind::CupAndHandle,
            PatternShape::AscendingTriangle { .. } => PatternKind::AscendingTriangle,
        }
    }

    /// Position of the first and last landmark
    pub fn span(&self) -> (usize, usize) {
        match self {
            PatternShape::DoubleTop { first, second, .. }
            | PatternShape::DoubleBottom { first, second, .. } => (first.position, second.position),
            PatternShape::HeadAndShoulders {
                left_shoulder,
                right_shoulder,
                ..
            } => (left_shoulder.position, right_shoulder.position),
            PatternShape::RisingWedge { start, end, .. }
            | PatternShape::FallingWedge { start, end, .. }
            | PatternShape::AscendingTriangle { start, end, .. } => (*start, *end),
            PatternShape::CupAndHandle {
                left_rim,
                handle_low,
                ..
            } => (left_rim.position, handle_low.position),
        }
    }
}

/// A formation found by a matcher
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternCandidate {
    pub status: PatternStatus,
    pub breakout: Option<Breakout>,
    /// Level whose crossing confirms the formation
    pub trigger_level: f64,
    /// Measured-move target
    pub target_price: Option<f64>,
    pub fibonacci: Option<FibonacciLevels>,
    pub shape: PatternShape,
}

impl PatternCandidate {
    /// Assemble a candidate; status follows from whether a breakout exists.
    pub fn new(shape: PatternShape, trigger_level: f64, breakout: Option<Breakout>) -> Self {
        Self {
            status: if breakout.is_some() {
                PatternStatus::Confirmed
            } else {
                PatternStatus::Forming
            },
            breakout,
            trigger_level,
            target_price: None,
            fibonacci: None,
            shape,
        }
    }

    pub fn with_target(mut self, target: f64) -> Self {
        self.target_price = target.is_finite().then_some(target);
        self
    }

    pub fn with_fibonacci(mut self, levels: Option<FibonacciLevels>) -> Self {
        self.fibonacci = levels;
        self
    }

    #[inline]
    pub fn kind(&self) -> PatternKind {
        self.shape.kind()
    }

    #[inline]
    pub fn breakout_position(&self) -> Option<usize> {
        self.breakout.map(|b| b.position)
    }

    #[inline]
    pub fn is_confirmed(&self) -> bool {
        self.status == PatternStatus::Confirmed
    }
}

/// Outcome of running one matcher on one series
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "candidate", rename_all = "snake_case")]
pub enum Detection {
    InsufficientData { need: usize, got: usize },
    NotFound,
    Found(PatternCandidate),
}

impl Detection {
    pub fn candidate(&self) -> Option<&PatternCandidate> {
        match self {
            Detection::Found(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_candidate(self) -> Option<PatternCandidate> {
        match self {
            Detection::Found(c) => Some(c),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<PatternStatus> {
        self.candidate().map(|c| c.status)
    }
}

// ============================================================
// PATTERN MATCHER TRAIT
// ============================================================

/// A pure, read-only chart pattern matcher
pub trait PatternMatcher: Send + Sync {
    fn kind(&self) -> PatternKind;
    fn min_bars(&self) -> usize;

    /// Shape search, confirmation search and target projection.
    ///
    /// Returns the first qualifying formation, or `None`.
    fn scan(&self, series: &Series) -> Option<PatternCandidate>;

    fn detect(&self, series: &Series) -> Detection {
        if series.len() < self.min_bars() {
            return Detection::InsufficientData {
                need: self.min_bars(),
                got: series.len(),
            };
        }
        match self.scan(series) {
            Some(candidate) => Detection::Found(candidate),
            None => Detection::NotFound,
        }
    }

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// BUILTIN MATCHERS - generated via macro
// ============================================================

use detectors::*;

/// Macro to generate BuiltinMatcher enum without boilerplate
macro_rules! define_builtin_matchers {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin matchers - fast path via enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinMatcher {
            $($variant($detector)),*
        }

        impl BuiltinMatcher {
            #[inline]
            pub fn detect(&self, series: &Series) -> Detection {
                match self {
                    $(Self::$variant(d) => PatternMatcher::detect(d, series)),*
                }
            }

            #[inline]
            pub fn kind(&self) -> PatternKind {
                match self {
                    $(Self::$variant(d) => PatternMatcher::kind(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternMatcher::min_bars(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternMatcher::validate_config(d)),*
                }
            }
        }
    };
}

define_builtin_matchers! {
    // Bearish reversals
    DoubleTop(DoubleTopDetector),
    HeadAndShoulders(HeadAndShouldersDetector),
    RisingWedge(RisingWedgeDetector),

    // Bullish reversals and continuations
    DoubleBottom(DoubleBottomDetector),
    FallingWedge(FallingWedgeDetector),
    CupAndHandle(CupAndHandleDetector),
    AscendingTriangle(AscendingTriangleDetector),
}

// ============================================================
// PATTERN ENGINE
// ============================================================

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub pattern_filter: Option<Vec<PatternKind>>,
}

/// Result of one matcher within an analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatcherOutcome {
    pub kind: PatternKind,
    pub detection: Detection,
}

/// Every matcher's outcome plus the voter's signal for one series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub bars: usize,
    pub detections: Vec<MatcherOutcome>,
    pub signal: VoterOutcome,
}

impl Analysis {
    /// Candidates that were actually found
    pub fn found(&self) -> impl Iterator<Item = &PatternCandidate> {
        self.detections.iter().filter_map(|o| o.detection.candidate())
    }
}

/// Main pattern detection engine
pub struct PatternEngine {
    builtin: Vec<BuiltinMatcher>,
    custom: Vec<Box<dyn PatternMatcher>>,
    voter: SignalVoter,
    config: EngineConfig,
}

impl PatternEngine {
    /// Run every matcher sequentially, in registration order.
    pub fn detect_all(&self, series: &Series) -> Vec<MatcherOutcome> {
        let mut outcomes: Vec<MatcherOutcome> = self
            .builtin
            .iter()
            .filter(|m| self.should_include(m.kind()))
            .map(|m| self.run(m.kind(), || m.detect(series)))
            .collect();
        outcomes.extend(
            self.custom
                .iter()
                .filter(|m| self.should_include(m.kind()))
                .map(|m| self.run(m.kind(), || m.detect(series))),
        );
        outcomes
    }

    /// Run every matcher on the rayon pool. Order matches [`detect_all`](Self::detect_all).
    pub fn detect_all_parallel(&self, series: &Series) -> Vec<MatcherOutcome> {
        let mut outcomes: Vec<MatcherOutcome> = self
            .builtin
            .par_iter()
            .filter(|m| self.should_include(m.kind()))
            .map(|m| self.run(m.kind(), || m.detect(series)))
            .collect();
        outcomes.extend(
            self.custom
                .par_iter()
                .filter(|m| self.should_include(m.kind()))
                .map(|m| self.run(m.kind(), || m.detect(series)))
                .collect::<Vec<_>>(),
        );
        outcomes
    }

    /// Full analysis: all matchers plus the signal voter.
    pub fn analyze(&self, series: &Series) -> Analysis {
        let (detections, signal) = rayon::join(
            || self.detect_all_parallel(series),
            || self.voter.evaluate(series),
        );
        tracing::info!(
            bars = series.len(),
            found = detections
                .iter()
                .filter(|o| o.detection.candidate().is_some())
                .count(),
            signal = %signal.direction(),
            confidence = signal.confidence(),
            "analysis complete"
        );
        Analysis {
            bars: series.len(),
            detections,
            signal,
        }
    }

    /// Validate a raw table and analyze it. Schema errors propagate.
    pub fn analyze_table(&self, table: &RawTable) -> Result<Analysis> {
        let series = Series::from_columns(table)?;
        Ok(self.analyze(&series))
    }

    pub fn voter(&self) -> &SignalVoter {
        &self.voter
    }

    /// Kinds of every registered matcher, in run order
    pub fn kinds(&self) -> Vec<PatternKind> {
        self.builtin
            .iter()
            .map(BuiltinMatcher::kind)
            .chain(self.custom.iter().map(|m| m.kind()))
            .filter(|k| self.should_include(*k))
            .collect()
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn run(&self, kind: PatternKind, detect: impl FnOnce() -> Detection) -> MatcherOutcome {
        let detection = detect();
        tracing::debug!(
            pattern = kind.as_str(),
            status = ?detection.status(),
            breakout = ?detection.candidate().and_then(PatternCandidate::breakout_position),
            "matcher finished"
        );
        MatcherOutcome { kind, detection }
    }

    fn should_include(&self, kind: PatternKind) -> bool {
        match self.config.pattern_filter {
            Some(ref filter) => filter.contains(&kind),
            None => true,
        }
    }

    fn validate(&self) -> Result<()> {
        for m in &self.builtin {
            m.validate_config()?;
        }
        for m in &self.custom {
            m.validate_config()?;
        }
        self.voter.config().validate()
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating PatternEngine instances
#[derive(Default)]
pub struct EngineBuilder {
    builtin: Vec<BuiltinMatcher>,
    custom: Vec<Box<dyn PatternMatcher>>,
    voter: SignalVoter,
    config: EngineConfig,
}

/// Generate an array of `BuiltinMatcher` variants using `Default::default()` for each inner type.
macro_rules! builtin_defaults {
  ($($variant:ident),* $(,)?) => {
    [$(BuiltinMatcher::$variant(Default::default())),*]
  };
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add all seven matchers with default parameters
    pub fn with_all_defaults(self) -> Self {
        self.with_bullish_defaults().with_bearish_defaults()
    }

    /// Add the bullish formations: cup and handle, double bottom, ascending triangle, falling wedge
    pub fn with_bullish_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            CupAndHandle,
            DoubleBottom,
            AscendingTriangle,
            FallingWedge,
        ]);
        self
    }

    /// Add the bearish formations: head and shoulders, double top, rising wedge
    pub fn with_bearish_defaults(mut self) -> Self {
        self.builtin
            .extend(builtin_defaults![HeadAndShoulders, DoubleTop, RisingWedge]);
        self
    }

    /// Build from a parsed configuration file
    pub fn from_config(config: &config::AnalysisConfig) -> Result<Self> {
        let mut builder = config
            .matchers()
            .into_iter()
            .fold(Self::new(), Self::add)
            .voter(SignalVoter::new(config.voter.clone())?);
        if let Some(ref patterns) = config.patterns {
            builder = builder.only_patterns(patterns.iter().copied());
        }
        Ok(builder)
    }

    /// Add a builtin matcher
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, matcher: BuiltinMatcher) -> Self {
        self.builtin.push(matcher);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, matcher: BuiltinMatcher) -> Result<Self> {
        matcher.validate_config()?;
        self.builtin.push(matcher);
        Ok(self)
    }

    /// Add a custom matcher (dynamic dispatch)
    pub fn add_custom<M: PatternMatcher + 'static>(mut self, matcher: M) -> Self {
        self.custom.push(Box::new(matcher));
        self
    }

    /// Replace the signal voter
    pub fn voter(mut self, voter: SignalVoter) -> Self {
        self.voter = voter;
        self
    }

    /// Filter to specific patterns only
    pub fn only_patterns(mut self, kinds: impl IntoIterator<Item = PatternKind>) -> Self {
        self.config.pattern_filter = Some(kinds.into_iter().collect());
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<PatternEngine> {
        let engine = PatternEngine {
            builtin: self.builtin,
            custom: self.custom,
            voter: self.voter,
            config: self.config,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Result of analyzing a single instrument
#[derive(Debug)]
pub struct ScanResult {
    pub symbol: String,
    pub analysis: Analysis,
}

/// Error from analyzing a single instrument
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: PatternError,
}

/// Parallel analysis of multiple instruments
pub fn scan_parallel<'a, I>(engine: &PatternEngine, instruments: I) -> (Vec<ScanResult>, Vec<ScanError>)
where
    I: IntoParallelIterator<Item = (&'a str, &'a RawTable)>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, table)| {
            engine
                .analyze_table(table)
                .map(|analysis| ScanResult {
                    symbol: symbol.to_string(),
                    analysis,
                })
                .map_err(|error| ScanError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => {
                tracing::warn!(symbol = %e.symbol, error = %e.error, "instrument skipped");
                errors.push(e)
            }
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================

//! Immutable OHLCV series.
//!
//! A [`Series`] is validated once on construction (finite prices, `high >= low`,
//! strictly increasing timestamps) and is read-only afterwards. Every per-bar
//! accessor returns exactly one `f64`, so matchers never compare containers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    extrema::{ExtremaPoint, ExtremumKind},
    OHLCVExt, PatternError, Result, OHLCV,
};

// ============================================================
// BAR
// ============================================================

/// One OHLCV bar. `timestamp` is seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

/// Named price column of a bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl PriceField {
    /// Columns without which no series can be built
    pub const REQUIRED: [PriceField; 4] = [
        PriceField::Open,
        PriceField::High,
        PriceField::Low,
        PriceField::Close,
    ];

    pub fn column(self) -> &'static str {
        match self {
            PriceField::Open => "open",
            PriceField::High => "high",
            PriceField::Low => "low",
            PriceField::Close => "close",
            PriceField::Volume => "volume",
        }
    }
}

// ============================================================
// RAW TABLE
// ============================================================

/// Untyped tabular input: a timestamp index plus named numeric columns.
///
/// Column names are matched case-insensitively, so `Close`, `close` and
/// `CLOSE` all refer to the same column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    timestamps: Vec<i64>,
    columns: HashMap<String, Vec<f64>>,
}

impl RawTable {
    pub fn new(timestamps: Vec<i64>) -> Self {
        Self {
            timestamps,
            columns: HashMap::new(),
        }
    }

    /// Builder-style column insertion
    pub fn with_column(mut self, name: &str, values: Vec<f64>) -> Self {
        self.insert_column(name, values);
        self
    }

    pub fn insert_column(&mut self, name: &str, values: Vec<f64>) {
        self.columns.insert(name.trim().to_ascii_lowercase(), values);
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .get(&name.trim().to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Tabulate already-typed bars
    pub fn from_bars(bars: &[Bar]) -> Self {
        let pick = |f: fn(&Bar) -> f64| bars.iter().map(f).collect::<Vec<_>>();
        Self::new(bars.iter().map(|b| b.timestamp).collect())
            .with_column("Open", pick(|b| b.open))
            .with_column("High", pick(|b| b.high))
            .with_column("Low", pick(|b| b.low))
            .with_column("Close", pick(|b| b.close))
            .with_column("Volume", pick(|b| b.volume))
    }
}

// ============================================================
// SERIES
// ============================================================

/// Validated, immutable OHLCV series
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    bars: Vec<Bar>,
}

impl Series {
    /// Validate and wrap a sequence of bars.
    pub fn new(bars: Vec<Bar>) -> Result<Self> {
        for (i, bar) in bars.iter().enumerate() {
            bar.validate().map_err(|e| match e {
                PatternError::InvalidOHLCV { reason, .. } => {
                    PatternError::InvalidOHLCV { index: i, reason }
                }
                other => other,
            })?;
            if !bar.volume.is_finite() {
                return Err(PatternError::InvalidOHLCV {
                    index: i,
                    reason: "non-finite volume",
                });
            }
        }
        if let Some(i) = bars
            .windows(2)
            .position(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(PatternError::InvalidOHLCV {
                index: i + 1,
                reason: "timestamps must be strictly increasing",
            });
        }
        Ok(Self { bars })
    }

    /// Build a series from a raw table.
    ///
    /// Missing `open`, `high`, `low` or `close` columns are a schema error;
    /// a missing `volume` column is filled with zeros.
    pub fn from_columns(table: &RawTable) -> Result<Self> {
        let len = table.len();
        let mut required = Vec::with_capacity(PriceField::REQUIRED.len());
        for field in PriceField::REQUIRED {
            let values = table.column(field.column()).ok_or_else(|| {
                PatternError::Schema(format!("missing required column '{}'", field.column()))
            })?;
            if values.len() != len {
                return Err(PatternError::Schema(format!(
                    "column '{}' has {} rows, index has {}",
                    field.column(),
                    values.len(),
                    len
                )));
            }
            required.push(values);
        }
        let volume = match table.column(PriceField::Volume.column()) {
            Some(v) if v.len() == len => Some(v),
            Some(v) => {
                return Err(PatternError::Schema(format!(
                    "column 'volume' has {} rows, index has {}",
                    v.len(),
                    len
                )))
            }
            None => None,
        };

        let bars = table
            .timestamps()
            .iter()
            .enumerate()
            .map(|(i, &ts)| Bar {
                timestamp: ts,
                open: required[0][i],
                high: required[1][i],
                low: required[2][i],
                close: required[3][i],
                volume: volume.map_or(0.0, |v| v[i]),
            })
            .collect();
        Self::new(bars)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    #[inline]
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    #[inline]
    pub fn bar(&self, position: usize) -> Option<&Bar> {
        self.bars.get(position)
    }

    /// Fail with `InsufficientData` when fewer than `need` bars are present.
    pub fn require_len(&self, need: usize) -> Result<()> {
        if self.bars.len() < need {
            return Err(PatternError::InsufficientData {
                need,
                got: self.bars.len(),
            });
        }
        Ok(())
    }

    /// Single scalar for one bar and one field.
    ///
    /// # Panics
    ///
    /// Panics if `position` is out of bounds, like slice indexing.
    #[inline]
    pub fn price_at(&self, position: usize, field: PriceField) -> f64 {
        let bar = &self.bars[position];
        match field {
            PriceField::Open => bar.open,
            PriceField::High => bar.high,
            PriceField::Low => bar.low,
            PriceField::Close => bar.close,
            PriceField::Volume => bar.volume,
        }
    }

    #[inline]
    pub fn high(&self, position: usize) -> f64 {
        self.bars[position].high
    }

    #[inline]
    pub fn low(&self, position: usize) -> f64 {
        self.bars[position].low
    }

    #[inline]
    pub fn close(&self, position: usize) -> f64 {
        self.bars[position].close
    }

    #[inline]
    pub fn timestamp(&self, position: usize) -> i64 {
        self.bars[position].timestamp
    }

    /// Last bar's close, if any
    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    /// Copy one column out as a plain vector
    pub fn values(&self, field: PriceField) -> Vec<f64> {
        (0..self.bars.len())
            .map(|i| self.price_at(i, field))
            .collect()
    }

    /// Extremum record for a bar: its high for a peak, its low for a trough.
    pub fn point(&self, position: usize, kind: ExtremumKind) -> ExtremaPoint {
        let field = match kind {
            ExtremumKind::Peak => PriceField::High,
            ExtremumKind::Trough => PriceField::Low,
        };
        ExtremaPoint {
            position,
            timestamp: self.timestamp(position),
            price: self.price_at(position, field),
            kind,
        }
    }

    pub fn summary(&self) -> Option<SeriesSummary> {
        SeriesSummary::of(self)
    }
}

// ============================================================
// SUMMARY
// ============================================================

/// Descriptive statistics of the close column
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1); zero for a single bar
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub first_timestamp: i64,
    pub last_timestamp: i64,
}

impl SeriesSummary {
    fn of(series: &Series) -> Option<Self> {
        let first = series.bars.first()?;
        let last = series.bars.last()?;
        let n = series.len() as f64;
        let closes = series.values(PriceField::Close);
        let mean = closes.iter().sum::<f64>() / n;
        let std = if series.len() > 1 {
            (closes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        Some(Self {
            count: series.len(),
            mean,
            std,
            min: closes.iter().copied().fold(f64::INFINITY, f64::min),
            max: closes.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            first_timestamp: first.timestamp,
            last_timestamp: last.timestamp,
        })
    }
}

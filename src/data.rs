//! Data sources: CSV files and a seeded synthetic fallback.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    series::{PriceField, RawTable},
    PatternError, Result,
};

/// First synthetic bar: 2020-01-01T00:00:00Z
const SYNTHETIC_EPOCH: i64 = 1_577_836_800;
const DAY: i64 = 86_400;

/// Where a table came from
#[derive(Debug, Clone, PartialEq)]
pub enum DataOrigin {
    Csv(PathBuf),
    Synthetic { seed: u64 },
}

/// Parse a timestamp cell: unix seconds or milliseconds, `YYYY-MM-DD`,
/// `YYYY-MM-DD HH:MM:SS` or RFC 3339.
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if let Ok(n) = s.parse::<f64>() {
        if !n.is_finite() {
            return None;
        }
        // 13-digit values are milliseconds
        let secs = if n.abs() > 1e12 { n / 1000.0 } else { n };
        return Some(secs as i64);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

/// Load an OHLCV table from a CSV file with a header row.
///
/// The timestamp column is the first one named `date`, `datetime`, `time` or
/// `timestamp` (case-insensitive), else column 0. Price and volume columns are
/// matched by name; other columns are ignored.
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<RawTable> {
    let path = path.as_ref();
    let source = |msg: String| PatternError::DataSource(format!("{}: {msg}", path.display()));

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| source(e.to_string()))?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| source(e.to_string()))?
        .iter()
        .map(str::to_lowercase)
        .collect();

    let ts_col = headers
        .iter()
        .position(|h| matches!(h.as_str(), "date" | "datetime" | "time" | "timestamp"))
        .unwrap_or(0);
    let value_cols: Vec<(usize, &'static str)> = [
        PriceField::Open,
        PriceField::High,
        PriceField::Low,
        PriceField::Close,
        PriceField::Volume,
    ]
    .into_iter()
    .filter_map(|field| {
        headers
            .iter()
            .position(|h| h == field.column())
            .map(|i| (i, field.column()))
    })
    .collect();

    let mut timestamps = Vec::new();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); value_cols.len()];
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| source(e.to_string()))?;
        let cell = record.get(ts_col).unwrap_or_default();
        let ts = parse_timestamp(cell)
            .ok_or_else(|| source(format!("row {}: bad timestamp '{cell}'", row + 1)))?;
        timestamps.push(ts);
        for (slot, &(col, name)) in values.iter_mut().zip(&value_cols) {
            let cell = record.get(col).unwrap_or_default();
            let v: f64 = cell
                .parse()
                .map_err(|_| source(format!("row {}: bad {name} '{cell}'", row + 1)))?;
            slot.push(v);
        }
    }
    if timestamps.is_empty() {
        return Err(source("no data rows".into()));
    }

    let mut table = RawTable::new(timestamps);
    for ((_, name), column) in value_cols.into_iter().zip(values) {
        table.insert_column(name, column);
    }
    tracing::debug!(path = %path.display(), rows = table.len(), "csv loaded");
    Ok(table)
}

/// Seeded random walk with daily bars.
///
/// The same `(seed, len)` always yields the same table.
pub fn synthetic_table(seed: u64, len: usize) -> RawTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut prev = 100.0_f64;
    let mut open = Vec::with_capacity(len);
    let mut high = Vec::with_capacity(len);
    let mut low = Vec::with_capacity(len);
    let mut close = Vec::with_capacity(len);
    let mut volume = Vec::with_capacity(len);

    for _ in 0..len {
        let o = prev;
        let c = (o * (1.0 + rng.gen_range(-0.02..0.02))).max(0.01);
        let h = o.max(c) * (1.0 + rng.gen_range(0.0..0.01));
        let l = o.min(c) * (1.0 - rng.gen_range(0.0..0.01));
        open.push(o);
        high.push(h);
        low.push(l);
        close.push(c);
        volume.push(rng.gen_range(100_000.0..1_000_000.0_f64).round());
        prev = c;
    }

    RawTable::new((0..len as i64).map(|i| SYNTHETIC_EPOCH + i * DAY).collect())
        .with_column("Open", open)
        .with_column("High", high)
        .with_column("Low", low)
        .with_column("Close", close)
        .with_column("Volume", volume)
}

/// Load `path` if given and usable, otherwise fall back to synthetic data.
pub fn load_or_synthetic(path: Option<&Path>, seed: u64, len: usize) -> (RawTable, DataOrigin) {
    if let Some(path) = path {
        match load_csv(path) {
            Ok(table) => return (table, DataOrigin::Csv(path.to_path_buf())),
            Err(e) => tracing::warn!(error = %e, seed, "falling back to synthetic data"),
        }
    }
    (synthetic_table(seed, len), DataOrigin::Synthetic { seed })
}

//! Report assembly.
//!
//! Turns engine outcomes into per-pattern messages, optional chart artifacts
//! and a Markdown or JSON document.

use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{
    series::{Bar, Series, SeriesSummary},
    signal::{CrossoverDecision, VoterOutcome},
    Analysis, Detection, PatternCandidate, PatternError, PatternKind, PatternStatus, Result,
};

// ============================================================
// ARTIFACT NAMING
// ============================================================

/// Deterministic artifact identity: one file per `(ticker, pattern, run)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactId {
    pub ticker: String,
    pub kind: PatternKind,
    pub run_id: String,
}

impl ArtifactId {
    pub fn new(ticker: impl Into<String>, kind: PatternKind, run_id: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            kind,
            run_id: run_id.into(),
        }
    }

    /// File stem `{ticker}_{PATTERN}_{run_id}` restricted to `[A-Za-z0-9_.-]`
    pub fn stem(&self) -> String {
        format!(
            "{}_{}_{}",
            sanitize(&self.ticker),
            self.kind.as_str(),
            sanitize(&self.run_id)
        )
    }

    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{extension}", self.stem())
    }
}

fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Run identifier derived from the current UTC time
pub fn default_run_id() -> String {
    chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string()
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| ts.to_string())
}

// ============================================================
// CHART RENDERING
// ============================================================

/// Persists a detected formation for later display
pub trait ChartRenderer: Send + Sync {
    fn render(
        &self,
        id: &ArtifactId,
        series: &Series,
        candidate: &PatternCandidate,
    ) -> Result<PathBuf>;
}

/// Chart payload: the candidate's landmarks plus the bars around them
#[derive(Debug, Serialize)]
struct ChartArtifact<'a> {
    ticker: &'a str,
    pattern: PatternKind,
    run_id: &'a str,
    first_position: usize,
    candidate: &'a PatternCandidate,
    bars: &'a [Bar],
}

/// Writes one pretty-printed JSON document per candidate
#[derive(Debug, Clone)]
pub struct JsonArtifactWriter {
    out_dir: PathBuf,
    /// Extra bars kept on each side of the formation
    padding: usize,
}

impl JsonArtifactWriter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            padding: 10,
        }
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }
}

impl ChartRenderer for JsonArtifactWriter {
    fn render(
        &self,
        id: &ArtifactId,
        series: &Series,
        candidate: &PatternCandidate,
    ) -> Result<PathBuf> {
        let (first, last) = candidate.shape.span();
        let last = candidate.breakout_position().unwrap_or(last).max(last);
        let from = first.saturating_sub(self.padding);
        let to = (last + self.padding + 1).min(series.len());
        let artifact = ChartArtifact {
            ticker: &id.ticker,
            pattern: id.kind,
            run_id: &id.run_id,
            first_position: from,
            candidate,
            bars: &series.bars()[from..to.max(from)],
        };

        let io_err = |e: std::io::Error| PatternError::DataSource(e.to_string());
        fs::create_dir_all(&self.out_dir).map_err(io_err)?;
        let path = self.out_dir.join(id.file_name("json"));
        let content = serde_json::to_string_pretty(&artifact)
            .map_err(|e| PatternError::DataSource(e.to_string()))?;
        fs::write(&path, content).map_err(io_err)?;
        Ok(path)
    }
}

// ============================================================
// PER-PATTERN REPORT
// ============================================================

/// `(message, artifact?)` for one matcher
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternReport {
    pub kind: PatternKind,
    pub status: &'static str,
    pub message: String,
    pub artifact: Option<PathBuf>,
}

impl PatternReport {
    /// Message only, no artifact
    pub fn describe(kind: PatternKind, detection: &Detection) -> Self {
        let name = kind.name();
        let (status, message) = match detection {
            Detection::InsufficientData { need, got } => (
                "insufficient data",
                format!(
                    "Insufficient data for {name} pattern detection (need {need} bars, got {got})."
                ),
            ),
            Detection::NotFound => (
                "not found",
                format!("No {name} pattern detected in the given timeframe."),
            ),
            Detection::Found(c) => match (c.status, c.breakout) {
                (PatternStatus::Confirmed, Some(b)) => (
                    "confirmed",
                    format!(
                        "{name} pattern confirmed: close {:.2} crossed {:.2} on {}.{}",
                        b.price,
                        c.trigger_level,
                        format_timestamp(b.timestamp),
                        target_suffix(c)
                    ),
                ),
                _ => (
                    "forming",
                    format!(
                        "{name} pattern forming: awaiting a close through {:.2}.{}",
                        c.trigger_level,
                        target_suffix(c)
                    ),
                ),
            },
        };
        Self {
            kind,
            status,
            message,
            artifact: None,
        }
    }

    /// Message plus an artifact when a candidate was found.
    ///
    /// Rendering failures are logged and leave `artifact` empty.
    pub fn build(
        kind: PatternKind,
        detection: &Detection,
        series: &Series,
        renderer: Option<&dyn ChartRenderer>,
        ticker: &str,
        run_id: &str,
    ) -> Self {
        let mut report = Self::describe(kind, detection);
        if let (Some(renderer), Some(candidate)) = (renderer, detection.candidate()) {
            let id = ArtifactId::new(ticker, kind, run_id);
            match renderer.render(&id, series, candidate) {
                Ok(path) => report.artifact = Some(path),
                Err(e) => tracing::warn!(pattern = kind.as_str(), error = %e, "chart artifact skipped"),
            }
        }
        report
    }
}

fn target_suffix(c: &PatternCandidate) -> String {
    let mut s = String::new();
    if let Some(target) = c.target_price {
        let _ = write!(s, " Measured-move target {target:.2}.");
    }
    if let Some(ref fib) = c.fibonacci {
        if let (Some(e1), Some(e2)) = (fib.extension(1.618), fib.extension(2.618)) {
            let _ = write!(s, " Fibonacci extensions 1.618: {e1:.2}, 2.618: {e2:.2}.");
        }
    }
    s
}

// ============================================================
// FULL REPORT
// ============================================================

/// Everything produced for one instrument in one run
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub ticker: String,
    pub interval: String,
    pub run_id: String,
    pub summary: Option<SeriesSummary>,
    pub patterns: Vec<PatternReport>,
    pub signal: VoterOutcome,
    pub crossover: Option<CrossoverDecision>,
}

impl AnalysisReport {
    pub fn new(
        ticker: impl Into<String>,
        interval: impl Into<String>,
        run_id: impl Into<String>,
        series: &Series,
        analysis: &Analysis,
        renderer: Option<&dyn ChartRenderer>,
    ) -> Self {
        let ticker = ticker.into();
        let run_id = run_id.into();
        let patterns = analysis
            .detections
            .iter()
            .map(|o| PatternReport::build(o.kind, &o.detection, series, renderer, &ticker, &run_id))
            .collect();
        Self {
            summary: series.summary(),
            crossover: crate::signal::crossover_decision(series).ok(),
            ticker,
            interval: interval.into(),
            run_id,
            patterns,
            signal: analysis.signal.clone(),
        }
    }

    /// `{ticker}_{run_id}_report.{extension}` with both parts sanitized like artifact stems
    pub fn file_name(&self, extension: &str) -> String {
        format!(
            "{}_{}_report.{extension}",
            sanitize(&self.ticker),
            sanitize(&self.run_id)
        )
    }

    /// Writes an already rendered `body` into `dir` under [`Self::file_name`]
    pub fn write_to(&self, dir: &Path, extension: &str, body: &str) -> Result<PathBuf> {
        let io_err = |e: std::io::Error| PatternError::DataSource(e.to_string());
        fs::create_dir_all(dir).map_err(io_err)?;
        let path = dir.join(self.file_name(extension));
        fs::write(&path, body).map_err(io_err)?;
        Ok(path)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PatternError::DataSource(e.to_string()))
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Technical Analysis Report: {}", self.ticker);
        let _ = writeln!(out);
        let _ = writeln!(out, "Interval: {} | Run: {}", self.interval, self.run_id);
        let _ = writeln!(out);

        if let Some(ref s) = self.summary {
            let _ = writeln!(out, "## Data Summary");
            let _ = writeln!(out);
            let _ = writeln!(out, "| Bars | From | To | Mean | Std | Min | Max |");
            let _ = writeln!(out, "|---:|---|---|---:|---:|---:|---:|");
            let _ = writeln!(
                out,
                "| {} | {} | {} | {:.2} | {:.2} | {:.2} | {:.2} |",
                s.count,
                format_timestamp(s.first_timestamp),
                format_timestamp(s.last_timestamp),
                s.mean,
                s.std,
                s.min,
                s.max
            );
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "## Pattern Results");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Pattern | Status | Chart |");
        let _ = writeln!(out, "|---|---|---|");
        for p in &self.patterns {
            let chart = p
                .artifact
                .as_ref()
                .map_or_else(|| "-".to_string(), |a| a.display().to_string());
            let _ = writeln!(out, "| {} | {} | {} |", p.kind.name(), p.status, chart);
        }
        let _ = writeln!(out);

        for p in &self.patterns {
            let _ = writeln!(out, "### {}", p.kind.name());
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", p.message);
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "## Trading Signal");
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "**{}** ({:.2}% confidence)",
            self.signal.direction(),
            self.signal.confidence()
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", self.signal.explanation());

        if let Some(ref c) = self.crossover {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Moving-Average Crossover");
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "SMA50 {:.2} / SMA200 {:.2}, RSI {:.2}: {:?} -> {}",
                c.sma_fast, c.sma_slow, c.rsi, c.signal, c.decision
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        extrema::ExtremumKind, signal::SignalDirection, Breakout, MatcherOutcome, PatternShape,
    };

    fn series(n: usize) -> Series {
        let bars = (0..n)
            .map(|i| {
                let c = 50.0 + (i % 7) as f64;
                Bar::new(1_700_000_000 + i as i64 * 86_400, c, c + 1.0, c - 1.0, c, 10.0)
            })
            .collect();
        Series::new(bars).unwrap()
    }

    fn candidate(s: &Series, breakout: Option<Breakout>) -> PatternCandidate {
        PatternCandidate::new(
            PatternShape::DoubleTop {
                first: s.point(2, ExtremumKind::Peak),
                second: s.point(8, ExtremumKind::Peak),
                support: s.point(5, ExtremumKind::Trough),
            },
            50.0,
            breakout,
        )
        .with_target(40.0)
    }

    struct FailingRenderer;

    impl ChartRenderer for FailingRenderer {
        fn render(&self, _: &ArtifactId, _: &Series, _: &PatternCandidate) -> Result<PathBuf> {
            Err(PatternError::DataSource("disk full".into()))
        }
    }

    #[test]
    fn test_artifact_id_is_deterministic() {
        let id = ArtifactId::new("BRK/B", PatternKind::CupAndHandle, "run 1");
        assert_eq!(id.stem(), "BRK_B_CUP_AND_HANDLE_run_1");
        assert_eq!(id.file_name("json"), "BRK_B_CUP_AND_HANDLE_run_1.json");
        assert_eq!(id, ArtifactId::new("BRK/B", PatternKind::CupAndHandle, "run 1"));
        assert_ne!(
            id.stem(),
            ArtifactId::new("BRK/B", PatternKind::DoubleTop, "run 1").stem()
        );
    }

    #[test]
    fn test_messages_distinguish_outcomes() {
        let s = series(20);
        let kind = PatternKind::DoubleTop;
        let insufficient =
            PatternReport::describe(kind, &Detection::InsufficientData { need: 20, got: 5 });
        assert!(insufficient.message.starts_with("Insufficient data for Double Top"));
        let none = PatternReport::describe(kind, &Detection::NotFound);
        assert_eq!(
            none.message,
            "No Double Top pattern detected in the given timeframe."
        );
        let forming = PatternReport::describe(kind, &Detection::Found(candidate(&s, None)));
        assert_eq!(forming.status, "forming");
        assert!(forming.message.contains("target 40.00"));
        let b = Breakout {
            position: 12,
            timestamp: s.timestamp(12),
            price: 49.0,
        };
        let confirmed = PatternReport::describe(kind, &Detection::Found(candidate(&s, Some(b))));
        assert_eq!(confirmed.status, "confirmed");
        assert!(confirmed.message.contains("close 49.00 crossed 50.00"));
    }

    #[test]
    fn test_render_failure_keeps_message() {
        let s = series(20);
        let detection = Detection::Found(candidate(&s, None));
        let report = PatternReport::build(
            PatternKind::DoubleTop,
            &detection,
            &s,
            Some(&FailingRenderer as &dyn ChartRenderer),
            "T",
            "r",
        );
        assert!(report.artifact.is_none());
        assert_eq!(report.status, "forming");
    }

    #[test]
    fn test_json_writer_round_trip() {
        let dir = std::env::temp_dir().join(format!("chartscan-report-{}", std::process::id()));
        let s = series(30);
        let writer = JsonArtifactWriter::new(&dir).with_padding(2);
        let id = ArtifactId::new("TEST", PatternKind::DoubleTop, "unit");
        let path = writer.render(&id, &s, &candidate(&s, None)).unwrap();
        assert!(path.ends_with("TEST_DOUBLE_TOP_unit.json"));

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["pattern"], "DOUBLE_TOP");
        assert_eq!(value["first_position"], 0);
        // bars 0..=10: padding is clipped at the start of the series
        assert_eq!(value["bars"].as_array().unwrap().len(), 11);
        assert_eq!(value["candidate"]["status"], "Forming");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_report_stays_inside_out_dir() {
        let dir = std::env::temp_dir().join(format!("chartscan-out-{}", std::process::id()));
        let s = series(30);
        let analysis = Analysis {
            bars: s.len(),
            detections: Vec::new(),
            signal: VoterOutcome::InsufficientData { need: 50, got: 30 },
        };

        for (ticker, run_id, expected) in [
            ("BRK/B", "r1", "BRK_B_r1_report.md"),
            ("../x", "r1", ".._x_r1_report.md"),
            ("AAPL", "../../etc", ".._.._etc_report.md"),
        ] {
            let report = AnalysisReport::new(ticker, "1d", run_id, &s, &analysis, None);
            assert_eq!(report.file_name("md"), expected);
            let path = report.write_to(&dir, "md", "body").unwrap();
            assert_eq!(path.parent(), Some(dir.as_path()));
            assert_eq!(fs::read_to_string(&path).unwrap(), "body");
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_markdown_sections() {
        let s = series(60);
        let analysis = Analysis {
            bars: 60,
            detections: vec![MatcherOutcome {
                kind: PatternKind::DoubleTop,
                detection: Detection::NotFound,
            }],
            signal: VoterOutcome::InsufficientData { need: 50, got: 40 },
        };
        let report = AnalysisReport::new("ACME", "1d", "r1", &s, &analysis, None);
        assert!(report.crossover.is_none());
        let md = report.to_markdown();
        assert!(md.starts_with("# Technical Analysis Report: ACME"));
        assert!(md.contains("| Double Top | not found | - |"));
        assert!(md.contains("## Trading Signal"));
        assert!(md.contains(&format!("**{}**", SignalDirection::Hold)));
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["ticker"], "ACME");
        assert_eq!(json["signal"]["outcome"], "insufficient_data");
    }
}

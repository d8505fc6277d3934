//! Analysis configuration.
//!
//! Loads matcher thresholds, voter settings and run metadata from TOML. Every
//! section is optional; missing keys fall back to the matcher defaults.
//!
//! ```toml
//! patterns = ["DOUBLE_TOP", "CUP_AND_HANDLE"]
//!
//! [run]
//! ticker = "AAPL"
//! interval = "1d"
//!
//! [double_top]
//! threshold = 0.03
//!
//! [voter]
//! use_trend_sma = true
//! ```
//!
//! Single thresholds can also be overridden after loading with
//! [`ParamOverride`] values such as `double_top.threshold=0.03`.

use std::{collections::HashMap, fs, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    detectors::{
        AscendingTriangleDetector, CupAndHandleDetector, DoubleBottomDetector, DoubleTopDetector,
        FallingWedgeDetector, HeadAndShouldersDetector, RisingWedgeDetector,
    },
    params::{param_meta_for, ParameterizedDetector},
    signal::VoterConfig,
    BuiltinMatcher, PatternError, PatternKind, Result,
};

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Restrict the run to these patterns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<PatternKind>>,
    pub run: RunConfig,
    pub double_top: DoubleTopDetector,
    pub double_bottom: DoubleBottomDetector,
    pub head_and_shoulders: HeadAndShouldersDetector,
    pub rising_wedge: RisingWedgeDetector,
    pub falling_wedge: FallingWedgeDetector,
    pub cup_and_handle: CupAndHandleDetector,
    pub ascending_triangle: AscendingTriangleDetector,
    pub voter: VoterConfig,
}

/// Run metadata used for reports and artifact names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub ticker: String,
    /// Bar interval label, e.g. "1d"
    pub interval: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ticker: "SYNTH".to_string(),
            interval: "1d".to_string(),
            run_id: None,
        }
    }
}

/// One `PATTERN.name=value` threshold override
#[derive(Debug, Clone, PartialEq)]
pub struct ParamOverride {
    pub kind: PatternKind,
    pub name: String,
    pub value: f64,
}

impl FromStr for ParamOverride {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid =
            || PatternError::InvalidConfig(format!("expected PATTERN.name=value, got '{s}'"));
        let (key, value) = s.split_once('=').ok_or_else(invalid)?;
        let (pattern, name) = key.rsplit_once('.').ok_or_else(invalid)?;
        let value: f64 = value.trim().parse().map_err(|_| invalid())?;
        Ok(Self {
            kind: pattern.parse()?,
            name: name.trim().to_string(),
            value,
        })
    }
}

/// Rebuilds a matcher from its current values with `overrides` applied on top
fn rebuild<D>(current: &D, overrides: &HashMap<&str, f64>) -> Result<D>
where
    D: ParameterizedDetector + Serialize,
{
    let value =
        serde_json::to_value(current).map_err(|e| PatternError::InvalidConfig(e.to_string()))?;
    let mut params: HashMap<&str, f64> = D::param_meta()
        .iter()
        .filter_map(|m| value.get(m.name).and_then(|v| v.as_f64()).map(|v| (m.name, v)))
        .collect();
    params.extend(overrides.iter().map(|(&k, &v)| (k, v)));
    D::with_params(&params)
}

impl AnalysisConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AnalysisConfig =
            toml::from_str(content).map_err(|e| PatternError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| PatternError::DataSource(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PatternError::InvalidConfig(e.to_string()))
    }

    /// Every matcher in its configured form, in bullish-then-bearish order
    pub fn matchers(&self) -> [BuiltinMatcher; 7] {
        [
            BuiltinMatcher::CupAndHandle(self.cup_and_handle.clone()),
            BuiltinMatcher::DoubleBottom(self.double_bottom.clone()),
            BuiltinMatcher::AscendingTriangle(self.ascending_triangle.clone()),
            BuiltinMatcher::FallingWedge(self.falling_wedge.clone()),
            BuiltinMatcher::HeadAndShoulders(self.head_and_shoulders.clone()),
            BuiltinMatcher::DoubleTop(self.double_top.clone()),
            BuiltinMatcher::RisingWedge(self.rising_wedge.clone()),
        ]
    }

    /// Applies threshold overrides; on error the configuration is unchanged.
    ///
    /// Every value must name a listed parameter of its pattern and lie inside
    /// that parameter's range. Later overrides of the same key win.
    pub fn apply_overrides(&mut self, overrides: &[ParamOverride]) -> Result<()> {
        let mut next = self.clone();
        for kind in PatternKind::ALL {
            let params: HashMap<&str, f64> = overrides
                .iter()
                .filter(|o| o.kind == kind)
                .map(|o| (o.name.as_str(), o.value))
                .collect();
            if params.is_empty() {
                continue;
            }
            let meta = param_meta_for(kind);
            for (&name, &value) in &params {
                meta.iter()
                    .find(|m| m.name == name)
                    .ok_or_else(|| {
                        PatternError::InvalidConfig(format!("{kind} has no parameter '{name}'"))
                    })?
                    .validate(value)?;
            }
            match kind {
                PatternKind::DoubleTop => next.double_top = rebuild(&next.double_top, &params)?,
                PatternKind::DoubleBottom => {
                    next.double_bottom = rebuild(&next.double_bottom, &params)?
                }
                PatternKind::HeadAndShoulders => {
                    next.head_and_shoulders = rebuild(&next.head_and_shoulders, &params)?
                }
                PatternKind::RisingWedge => {
                    next.rising_wedge = rebuild(&next.rising_wedge, &params)?
                }
                PatternKind::FallingWedge => {
                    next.falling_wedge = rebuild(&next.falling_wedge, &params)?
                }
                PatternKind::CupAndHandle => {
                    next.cup_and_handle = rebuild(&next.cup_and_handle, &params)?
                }
                PatternKind::AscendingTriangle => {
                    next.ascending_triangle = rebuild(&next.ascending_triangle, &params)?
                }
            }
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for matcher in self.matchers() {
            matcher.validate_config()?;
        }
        self.voter.validate()?;
        if self.run.ticker.trim().is_empty() {
            return Err(PatternError::InvalidConfig("run.ticker is empty".into()));
        }
        if let Some(ref patterns) = self.patterns {
            if patterns.is_empty() {
                return Err(PatternError::InvalidConfig(
                    "patterns filter selects nothing".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = AnalysisConfig::from_toml_str("").unwrap();
        assert_eq!(config.run, RunConfig::default());
        assert_eq!(config.double_top.min_distance.get(), 10);
        assert!(config.patterns.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = AnalysisConfig::from_toml_str(
            r#"
            patterns = ["DOUBLE_BOTTOM", "HEAD_AND_SHOULDERS"]

            [run]
            ticker = "MSFT"

            [double_bottom]
            min_distance = 30
            min_depth = 0.1

            [voter]
            use_trend_sma = true
            "#,
        )
        .unwrap();
        assert_eq!(config.run.ticker, "MSFT");
        assert_eq!(config.run.interval, "1d");
        assert_eq!(config.double_bottom.min_distance.get(), 30);
        assert!((config.double_bottom.min_depth.get() - 0.1).abs() < 1e-12);
        assert_eq!(config.double_bottom.window.get(), 5);
        assert!(config.voter.use_trend_sma);
        assert_eq!(
            config.patterns,
            Some(vec![PatternKind::DoubleBottom, PatternKind::HeadAndShoulders])
        );
    }

    #[test]
    fn test_rejects_out_of_range_ratio() {
        let err = AnalysisConfig::from_toml_str("[double_top]\nthreshold = 1.5\n").unwrap_err();
        assert!(matches!(err, PatternError::InvalidConfig(_)));
        assert!(AnalysisConfig::from_toml_str("[cup_and_handle]\nwindow = 0\n").is_err());
    }

    #[test]
    fn test_rejects_inconsistent_matcher() {
        let err = AnalysisConfig::from_toml_str("[double_top]\nmin_distance = 40\n").unwrap_err();
        assert!(matches!(err, PatternError::InvalidConfig(_)));
    }

    #[test]
    fn test_round_trip() {
        let mut config = AnalysisConfig::default();
        config.run.ticker = "NVDA".into();
        config.head_and_shoulders.shoulder_tolerance = crate::Ratio::new(0.05).unwrap();
        let text = config.to_toml_string().unwrap();
        let back = AnalysisConfig::from_toml_str(&text).unwrap();
        assert_eq!(back.run.ticker, "NVDA");
        assert!((back.head_and_shoulders.shoulder_tolerance.get() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_parse_param_override() {
        let o: ParamOverride = "double_top.threshold=0.02".parse().unwrap();
        assert_eq!(o.kind, PatternKind::DoubleTop);
        assert_eq!(o.name, "threshold");
        assert!((o.value - 0.02).abs() < 1e-12);

        let o: ParamOverride = "cup and handle.window = 12".parse().unwrap();
        assert_eq!(
            (o.kind, o.name.as_str(), o.value),
            (PatternKind::CupAndHandle, "window", 12.0)
        );

        for bad in [
            "threshold=0.02",
            "double_top.threshold",
            "double_top.threshold=x",
            "flag.window=5",
        ] {
            assert!(bad.parse::<ParamOverride>().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_overrides_keep_configured_values() {
        let mut config =
            AnalysisConfig::from_toml_str("[double_top]\nmin_distance = 15\n").unwrap();
        let overrides = [
            "double_top.threshold=0.02".parse().unwrap(),
            "rising_wedge.points_per_line=4".parse().unwrap(),
        ];
        config.apply_overrides(&overrides).unwrap();
        assert!((config.double_top.threshold.get() - 0.02).abs() < 1e-12);
        assert_eq!(config.double_top.min_distance.get(), 15);
        assert_eq!(config.double_top.window.get(), 5);
        assert_eq!(config.rising_wedge.points_per_line.get(), 4);
        assert_eq!(config.falling_wedge.points_per_line.get(), 3);
    }

    #[test]
    fn test_rejected_override_leaves_config_untouched() {
        let mut config = AnalysisConfig::default();
        for raw in [
            "double_top.tolerance=0.02",
            "double_top.threshold=0.5",
            "cup_and_handle.window=7.5",
        ] {
            let o: ParamOverride = raw.parse().unwrap();
            assert!(config.apply_overrides(&[o]).is_err(), "{raw}");
        }
        assert!((config.double_top.threshold.get() - 0.05).abs() < 1e-12);
        assert_eq!(config.cup_and_handle.window.get(), 10);
    }

    #[test]
    fn test_load_missing_file() {
        let err = AnalysisConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, PatternError::DataSource(_)));
    }
}

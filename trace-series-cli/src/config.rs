//! Configuration loading and parsing
//!
//! An optional TOML file supplies engine settings and user-defined chart
//! reports. Built-in reports never need one.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use trace_series::invoker::ENGINE_ENV_VAR;
use trace_series::{QueryInvoker, QuerySpec};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub report: Vec<ReportDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Engine program (default: $TRACE_SERIES_ENGINE, then `modality`)
    pub program: Option<PathBuf>,
    /// Extra environment for the engine process
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl EngineConfig {
    /// Build the invoker; an explicit program overrides config and environment
    pub fn invoker(&self, program_override: Option<&Path>) -> QueryInvoker {
        let base = match program_override.or(self.program.as_deref()) {
            Some(program) => QueryInvoker::new(program),
            None => QueryInvoker::from_env(),
        };
        log::debug!(
            "Using query engine {:?} (override with --engine or ${})",
            base.program(),
            ENGINE_ENV_VAR
        );
        self.env
            .iter()
            .fold(base, |invoker, (key, value)| invoker.with_env(key, value))
    }
}

/// A named chart: one query plus the data contract for its renderer
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReportDefinition {
    pub name: String,
    pub title: String,
    pub query: QuerySpec,
    /// Column plotted on the x axis
    pub x: String,
    /// Column plotted on the y axis
    pub y: String,
    #[serde(default)]
    pub x_title: Option<String>,
    #[serde(default)]
    pub y_title: Option<String>,
    /// Label for y values in hover text
    #[serde(default)]
    pub y_label: Option<String>,
    #[serde(default)]
    pub chart: ChartKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Line,
    Bar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Txt,
    Json,
    Html,
}

/// Problems with a loaded configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No report named '{0}' in configuration")]
    UnknownReport(String),

    #[error("Report '{report}' plots column '{column}', which the query does not produce")]
    MissingAxisColumn { report: String, column: String },

    #[error("Duplicate report name '{0}'")]
    DuplicateReport(String),
}

impl AppConfig {
    /// Look up a report by name
    pub fn report(&self, name: &str) -> Result<&ReportDefinition, ConfigError> {
        self.report
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| ConfigError::UnknownReport(name.to_string()))
    }

    /// Check report names are unique and every axis is a produced column
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (idx, report) in self.report.iter().enumerate() {
            if self.report[..idx].iter().any(|r| r.name == report.name) {
                return Err(ConfigError::DuplicateReport(report.name.clone()));
            }
            report.validate()?;
        }
        Ok(())
    }
}

impl ReportDefinition {
    /// Columns the query produces: projected names, then derived targets
    pub fn produced_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self.query.columns.iter().map(|c| c.name.clone()).collect();
        for rule in self.query.rules() {
            if !columns.iter().any(|c| c == rule.target()) {
                columns.push(rule.target().to_string());
            }
        }
        columns
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let produced = self.produced_columns();
        for column in [&self.x, &self.y] {
            if !produced.contains(column) {
                return Err(ConfigError::MissingAxisColumn {
                    report: self.name.clone(),
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use trace_series::ScalarType;

    const SAMPLE: &str = r#"
        [engine]
        program = "/opt/modality/bin/modality"

        [engine.env]
        MODALITY_WORKSPACE = "sim"

        [[report]]
        name = "sensor-stack"
        title = "Sensor Stack"
        x = "timestamp_sec"
        y = "low_mark"
        chart = "bar"

        [report.query]
        expression = 'UNUSED_STACK @ sensor'
        group_by = "task"

        [[report.query.columns]]
        source = "attributes.event.timestamp.Timestamp"
        name = "timestamp"
        type = "float"

        [[report.query.columns]]
        source = "attributes.event.task"
        name = "task"

        [[report.query.columns]]
        source = "attributes.event.low_mark"
        name = "low_mark"
        type = "float"

        [[report.query.derive]]
        kind = "nanos_to_seconds"
        target = "timestamp_sec"
        source = "timestamp"
    "#;

    #[test]
    fn test_config_deserialization() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(
            config.engine.program.as_deref(),
            Some(Path::new("/opt/modality/bin/modality"))
        );
        assert_eq!(config.engine.env["MODALITY_WORKSPACE"], "sim");

        let report = config.report("sensor-stack").unwrap();
        assert_eq!(report.chart, ChartKind::Bar);
        assert!(report.query.unwrap_envelope);
        assert_eq!(report.query.columns.len(), 3);
        assert_eq!(report.query.columns[1].ty, ScalarType::Natural);
        assert_eq!(
            report.produced_columns(),
            vec!["timestamp", "task", "low_mark", "timestamp_sec"]
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_report_and_bad_axis() {
        let mut config: AppConfig = toml::from_str(SAMPLE).unwrap();
        assert!(matches!(
            config.report("nope"),
            Err(ConfigError::UnknownReport(_))
        ));

        config.report[0].y = "high_water".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingAxisColumn { .. })
        ));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.report.len(), 1);

        let invoker = config.engine.invoker(Some(Path::new("/usr/bin/true")));
        assert_eq!(invoker.program(), Path::new("/usr/bin/true"));
    }

    #[test]
    fn test_empty_config() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.report.is_empty());
        assert!(config.engine.program.is_none());
    }
}

//! Query engine invocation
//!
//! Runs `<engine> query --format json <expression> [extra args...]` as a
//! subprocess and hands back its standard output as text. One process is
//! spawned per call; nothing is shared between calls.

use crate::types::{PipelineError, Result};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Default engine program looked up on `PATH`
pub const DEFAULT_ENGINE: &str = "modality";

/// Environment variable overriding the engine program
pub const ENGINE_ENV_VAR: &str = "TRACE_SERIES_ENGINE";

/// Anything that can answer a query expression with line-delimited JSON
pub trait QueryEngine {
    /// Execute a query and return the engine's standard output
    fn invoke(&self, expression: &str, extra_args: &[String]) -> Result<String>;
}

/// Runs the external query engine as a subprocess
#[derive(Debug, Clone)]
pub struct QueryInvoker {
    program: PathBuf,
    envs: Vec<(OsString, OsString)>,
}

impl Default for QueryInvoker {
    fn default() -> Self {
        Self::new(DEFAULT_ENGINE)
    }
}

impl QueryInvoker {
    /// Create an invoker for a specific engine program
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            envs: Vec::new(),
        }
    }

    /// Create an invoker honouring `TRACE_SERIES_ENGINE`, falling back to `modality`
    pub fn from_env() -> Self {
        match std::env::var_os(ENGINE_ENV_VAR) {
            Some(program) if !program.is_empty() => Self::new(program),
            _ => Self::default(),
        }
    }

    /// Builder method: set an environment variable for the engine process
    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    /// Full argument list passed to the engine for a query
    pub fn query_args(expression: &str, extra_args: &[String]) -> Vec<String> {
        let mut args = vec![
            "query".to_string(),
            "--format".to_string(),
            "json".to_string(),
            expression.to_string(),
        ];
        args.extend(extra_args.iter().cloned());
        args
    }
}

impl QueryEngine for QueryInvoker {
    fn invoke(&self, expression: &str, extra_args: &[String]) -> Result<String> {
        let args = Self::query_args(expression, extra_args);
        log::debug!("Running {:?} {:?}", self.program, args);

        let output = Command::new(&self.program)
            .args(&args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    PipelineError::EngineNotFound(self.program.display().to_string())
                }
                _ => PipelineError::Io(e),
            })?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            log::warn!(
                "Query engine failed ({}) for expression: {}",
                output.status,
                expression
            );
            if !stdout.is_empty() {
                log::debug!("engine stdout:\n{}", stdout);
            }
            if !stderr.is_empty() {
                log::debug!("engine stderr:\n{}", stderr);
            }
            return Err(PipelineError::QueryExecutionFailed {
                code: output.status.code(),
                stdout,
                stderr,
            });
        }

        let text = String::from_utf8(output.stdout)?;
        log::debug!("Query engine returned {} bytes", text.len());
        Ok(text)
    }
}

/// Engine that answers every query with the same canned output.
///
/// Useful for replaying captured query results without the engine installed.
#[derive(Debug, Clone, Default)]
pub struct StaticEngine {
    responses: Vec<(String, String)>,
    fallback: Option<String>,
}

impl StaticEngine {
    /// Answer every query with `output`
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            responses: Vec::new(),
            fallback: Some(output.into()),
        }
    }

    /// Builder method: answer one specific expression with `output`
    pub fn with_response(mut self, expression: impl Into<String>, output: impl Into<String>) -> Self {
        self.responses.push((expression.into(), output.into()));
        self
    }
}

impl QueryEngine for StaticEngine {
    fn invoke(&self, expression: &str, _extra_args: &[String]) -> Result<String> {
        self.responses
            .iter()
            .find(|(expr, _)| expr == expression)
            .map(|(_, output)| output.clone())
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| PipelineError::QueryExecutionFailed {
                code: Some(1),
                stdout: String::new(),
                stderr: format!("no canned response for '{}'", expression),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_args_layout() {
        let args = QueryInvoker::query_args("stats @ *", &["--limit".into(), "10".into()]);
        assert_eq!(args, vec!["query", "--format", "json", "stats @ *", "--limit", "10"]);
    }

    #[test]
    fn test_missing_engine() {
        let invoker = QueryInvoker::new("/nonexistent/trace-series-engine");
        let err = invoker.invoke("* @ *", &[]).unwrap_err();
        assert!(matches!(err, PipelineError::EngineNotFound(_)));
    }

    #[test]
    fn test_static_engine_responses() {
        let engine = StaticEngine::default().with_response("a", "{}\n");
        assert_eq!(engine.invoke("a", &[]).unwrap(), "{}\n");
        assert!(engine.invoke("b", &[]).is_err());

        let engine = StaticEngine::new("x");
        assert_eq!(engine.invoke("anything", &[]).unwrap(), "x");
    }
}

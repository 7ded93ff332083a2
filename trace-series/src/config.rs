//! Declarative query configuration
//!
//! A `QuerySpec` carries everything one caller needs to turn a query into
//! grouped series: the expression, the projection schema, derivation rules
//! and the grouping key. Specs can be built in code or deserialized.

use crate::derive::Rule;
use crate::schema::Schema;
use crate::types::{Result, ScalarType};
use serde::{Deserialize, Serialize};

/// Full description of one query and how to shape its results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Expression in the engine's query language
    pub expression: String,

    /// Extra engine flags appended after the expression
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Whether to unwrap the labeled event envelope before flattening
    #[serde(default = "default_true")]
    pub unwrap_envelope: bool,

    /// Projected columns, in order
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,

    /// Derivation rules, applied in order
    #[serde(default)]
    pub derive: Vec<DerivationSpec>,

    /// Column to group series by (None = a single series)
    #[serde(default)]
    pub group_by: Option<String>,

    /// Column to sort each series by
    #[serde(default)]
    pub sort_by: Option<String>,

    /// Optional aggregate query whose `Set` restricts and orders series keys
    #[serde(default)]
    pub series_filter: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Projection of one flattened key onto a named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub source: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: ScalarType,
    /// Keep rows where this column is missing
    #[serde(default)]
    pub optional: bool,
}

/// Declarative form of the built-in derivation rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DerivationSpec {
    NanosToSeconds {
        target: String,
        source: String,
    },
    RatioToPercent {
        target: String,
        source: String,
    },
    SharePercent {
        target: String,
        part: String,
        whole: String,
    },
    RemainingToUsedPercent {
        target: String,
        remaining: String,
        total: String,
    },
    ScaledDuration {
        target: String,
        ticks: String,
        resolution: String,
    },
}

impl DerivationSpec {
    pub fn to_rule(&self) -> Rule {
        match self.clone() {
            DerivationSpec::NanosToSeconds { target, source } => {
                Rule::nanos_to_seconds(target, source)
            }
            DerivationSpec::RatioToPercent { target, source } => {
                Rule::ratio_to_percent(target, source)
            }
            DerivationSpec::SharePercent {
                target,
                part,
                whole,
            } => Rule::share_percent(target, part, whole),
            DerivationSpec::RemainingToUsedPercent {
                target,
                remaining,
                total,
            } => Rule::remaining_to_used_percent(target, remaining, total),
            DerivationSpec::ScaledDuration {
                target,
                ticks,
                resolution,
            } => Rule::scaled_duration(target, ticks, resolution),
        }
    }
}

impl QuerySpec {
    /// Create a query spec with default settings
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            unwrap_envelope: true,
            ..Self::default()
        }
    }

    /// Builder method: append an extra engine argument
    pub fn with_extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Builder method: enable or disable envelope unwrapping
    pub fn with_envelope(mut self, enabled: bool) -> Self {
        self.unwrap_envelope = enabled;
        self
    }

    /// Builder method: add a projected column
    pub fn column(mut self, source: impl Into<String>, name: impl Into<String>, ty: ScalarType) -> Self {
        self.columns.push(ColumnSpec {
            source: source.into(),
            name: name.into(),
            ty,
            optional: false,
        });
        self
    }

    /// Builder method: add a column whose absence does not drop the row
    pub fn optional_column(mut self, source: impl Into<String>, name: impl Into<String>, ty: ScalarType) -> Self {
        self.columns.push(ColumnSpec {
            source: source.into(),
            name: name.into(),
            ty,
            optional: true,
        });
        self
    }

    /// Builder method: add a derivation rule
    pub fn derive(mut self, spec: DerivationSpec) -> Self {
        self.derive.push(spec);
        self
    }

    /// Builder method: set the grouping column
    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by = Some(column.into());
        self
    }

    /// Builder method: set the per-series sort column
    pub fn sort_by(mut self, column: impl Into<String>) -> Self {
        self.sort_by = Some(column.into());
        self
    }

    /// Builder method: restrict series to the members of an aggregate query
    pub fn with_series_filter(mut self, expression: impl Into<String>) -> Self {
        self.series_filter = Some(expression.into());
        self
    }

    /// Validated projection schema for this spec
    pub fn schema(&self) -> Result<Schema> {
        let schema = self
            .columns
            .iter()
            .fold(Schema::new(), |schema, c| {
                if c.optional {
                    schema.optional_column(&c.source, &c.name, c.ty)
                } else {
                    schema.column(&c.source, &c.name, c.ty)
                }
            });
        schema.validate()?;
        Ok(schema)
    }

    pub fn rules(&self) -> Vec<Rule> {
        self.derive.iter().map(DerivationSpec::to_rule).collect()
    }
}

//! Built-in telemetry reports
//!
//! Queries and schemas for the charts every RTOS target gets out of the box:
//! per-task CPU load and stack usage, from both dedicated events and the
//! periodic `stats` event, plus the system log.

use crate::config::{ChartKind, ReportDefinition};
use trace_series::{DerivationSpec, QuerySpec, ScalarType};

/// Per-task CPU utilization events
pub fn cpu_load() -> ReportDefinition {
    let query = QuerySpec::new(r#"* @ * (_.task != "IDLE" AND exists(_.cpu_utilization))"#)
        .column("attributes.event.total_runtime.Timestamp", "total_runtime", ScalarType::Float)
        .column("attributes.event.task", "task", ScalarType::Text)
        .column("attributes.event.cpu_utilization", "cpu_utilization", ScalarType::Float)
        .derive(DerivationSpec::NanosToSeconds {
            target: "total_run_time_sec".into(),
            source: "total_runtime".into(),
        })
        .derive(DerivationSpec::RatioToPercent {
            target: "cpu_utilization".into(),
            source: "cpu_utilization".into(),
        })
        .group_by("task")
        .with_series_filter(
            r#"* @ * (_.task != "IDLE" AND exists(_.cpu_utilization)) AS s AGGREGATE distinct(s.task)"#,
        );

    ReportDefinition {
        name: "cpu-load".into(),
        title: "Task CPU Load".into(),
        query,
        x: "total_run_time_sec".into(),
        y: "cpu_utilization".into(),
        x_title: Some("Time (seconds)".into()),
        y_title: Some("%".into()),
        y_label: Some("CPU Load".into()),
        chart: ChartKind::Line,
    }
}

/// CPU share computed from the run time counters in `stats` events
pub fn stats_cpu_load() -> ReportDefinition {
    let query = QuerySpec::new("stats @ *")
        .column("attributes.event.timestamp.Timestamp", "timestamp", ScalarType::Float)
        .column("attributes.timeline.time_resolution.Timestamp", "time_resolution", ScalarType::Float)
        .column("attributes.event.task", "task", ScalarType::Text)
        .column("attributes.event.stack_high_water", "stack_high_water", ScalarType::Float)
        .column("attributes.event.task_run_time", "task_run_time", ScalarType::Float)
        .column("attributes.event.total_run_time", "total_run_time", ScalarType::Float)
        .derive(DerivationSpec::NanosToSeconds {
            target: "timestamp_sec".into(),
            source: "timestamp".into(),
        })
        .derive(DerivationSpec::SharePercent {
            target: "task_cpu_usage".into(),
            part: "task_run_time".into(),
            whole: "total_run_time".into(),
        })
        .group_by("task")
        .with_series_filter("stats @ * AS s AGGREGATE distinct(s.task)");

    ReportDefinition {
        name: "stats-cpu-load".into(),
        title: "Task CPU Load".into(),
        query,
        x: "timestamp_sec".into(),
        y: "task_cpu_usage".into(),
        x_title: Some("Time (seconds)".into()),
        y_title: Some("%".into()),
        y_label: Some("CPU Load".into()),
        chart: ChartKind::Line,
    }
}

/// Stack low-water marks from `UNUSED_STACK` events
pub fn stack_usage() -> ReportDefinition {
    let query = QuerySpec::new(r#"UNUSED_STACK @ * (_.task != "IDLE")"#)
        .column("attributes.event.timestamp.Timestamp", "timestamp", ScalarType::Float)
        .column("attributes.event.task", "task", ScalarType::Text)
        .column("attributes.event.low_mark", "low_mark", ScalarType::Float)
        .derive(DerivationSpec::NanosToSeconds {
            target: "timestamp_sec".into(),
            source: "timestamp".into(),
        })
        .group_by("task")
        .with_series_filter(r#"UNUSED_STACK @ * (_.task != "IDLE") AS s AGGREGATE distinct(s.task)"#);

    ReportDefinition {
        name: "stack-usage".into(),
        title: "Task Stack Usage".into(),
        query,
        x: "timestamp_sec".into(),
        y: "low_mark".into(),
        x_title: Some("Time (seconds)".into()),
        y_title: Some("Low mark (bytes)".into()),
        y_label: Some("Low mark".into()),
        chart: ChartKind::Line,
    }
}

/// Percentage of each task's stack ever used, from `stats` events
pub fn stats_stack_usage() -> ReportDefinition {
    let query = QuerySpec::new(r#"stats @ * (_.task != "IDLE")"#)
        .column("attributes.timeline.time_resolution.Timestamp", "time_resolution", ScalarType::Float)
        .column("attributes.event.task", "task", ScalarType::Text)
        .column("attributes.event.stack_high_water", "stack_high_water", ScalarType::Float)
        .column("attributes.event.stack_size", "stack_size", ScalarType::Float)
        .column("attributes.event.task_run_time", "task_run_time", ScalarType::Float)
        .column("attributes.event.total_run_time", "total_run_time", ScalarType::Float)
        .derive(DerivationSpec::RemainingToUsedPercent {
            target: "task_stack_usage".into(),
            remaining: "stack_high_water".into(),
            total: "stack_size".into(),
        })
        .derive(DerivationSpec::ScaledDuration {
            target: "total_run_time_sec".into(),
            ticks: "total_run_time".into(),
            resolution: "time_resolution".into(),
        })
        .group_by("task")
        .with_series_filter(r#"stats @ * (_.task != "IDLE") AS s AGGREGATE distinct(s.task)"#);

    ReportDefinition {
        name: "stats-stack-usage".into(),
        title: "Task Stack Usage".into(),
        query,
        x: "total_run_time_sec".into(),
        y: "task_stack_usage".into(),
        x_title: Some("Time (seconds)".into()),
        y_title: Some("%".into()),
        y_label: Some("Stack Usage".into()),
        chart: ChartKind::Bar,
    }
}

/// Log lines on the error, warn and info channels
pub fn syslog() -> QuerySpec {
    QuerySpec::new(r#"* @ * (_.channel = "error" OR _.channel = "warn" OR _.channel = "info")"#)
        .column("attributes.event.timestamp.Timestamp", "timestamp", ScalarType::Float)
        .column("attributes.event.channel", "channel", ScalarType::Text)
        .optional_column("attributes.event.formatted_string", "msg", ScalarType::Text)
}

/// All built-in chart reports
pub fn charts() -> Vec<ReportDefinition> {
    vec![cpu_load(), stats_cpu_load(), stack_usage(), stats_stack_usage()]
}

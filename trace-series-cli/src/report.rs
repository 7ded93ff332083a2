//! Report generation
//!
//! Renders grouped series as plain text tables, JSON, or a self-contained
//! HTML page that draws one Plotly trace per series.

use crate::config::{ChartKind, OutputFormat, ReportDefinition};
use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use std::fmt::Write as _;
use trace_series::{Series, SeriesTable};

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.27.0.min.js";

/// Render a report in the requested format
pub fn render(format: OutputFormat, report: &ReportDefinition, series: &SeriesTable) -> Result<String> {
    match format {
        OutputFormat::Txt => Ok(render_txt(report, series)),
        OutputFormat::Json => render_json(report, series),
        OutputFormat::Html => render_html(report, series),
    }
}

fn render_txt(report: &ReportDefinition, series: &SeriesTable) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", report.title);
    let _ = writeln!(out, "{}", "=".repeat(report.title.chars().count()));

    if series.is_empty() {
        let _ = writeln!(out, "\n(no data)");
        return out;
    }

    for s in &series.series {
        let _ = writeln!(out, "\n[{}] {} rows", s.key, s.rows.len());
        let _ = writeln!(out, "{}", series.columns.join("\t"));
        for row in &s.rows {
            let cells: Vec<String> = series
                .columns
                .iter()
                .map(|c| row.get(c).map(ToString::to_string).unwrap_or_default())
                .collect();
            let _ = writeln!(out, "{}", cells.join("\t"));
        }
    }
    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    name: &'a str,
    title: &'a str,
    x: &'a str,
    y: &'a str,
    #[serde(flatten)]
    series: &'a SeriesTable,
}

fn render_json(report: &ReportDefinition, series: &SeriesTable) -> Result<String> {
    let doc = JsonReport {
        name: &report.name,
        title: &report.title,
        x: &report.x,
        y: &report.y,
        series,
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Plotly traces, one per series
fn traces(report: &ReportDefinition, series: &SeriesTable) -> serde_json::Value {
    let y_label = report.y_label.as_deref().unwrap_or(&report.y);
    let hovertemplate = format!("Time: %{{x}}<br>{}: %{{y}}", y_label);

    series
        .series
        .iter()
        .map(|s| {
            let (x, y) = points(s, &report.x, &report.y);
            let mut trace = json!({
                "x": x,
                "y": y,
                "name": s.key,
                "hovertemplate": hovertemplate,
            });
            match report.chart {
                ChartKind::Line => {
                    trace["type"] = json!("scatter");
                    trace["mode"] = json!("lines+markers");
                }
                ChartKind::Bar => trace["type"] = json!("bar"),
            }
            trace
        })
        .collect()
}

/// Paired x/y values; rows where either axis is not numeric are skipped together
fn points(series: &Series, x: &str, y: &str) -> (Vec<f64>, Vec<f64>) {
    series
        .rows
        .iter()
        .filter_map(|row| Some((row.get(x)?.as_f64()?, row.get(y)?.as_f64()?)))
        .unzip()
}

fn render_html(report: &ReportDefinition, series: &SeriesTable) -> Result<String> {
    let mut layout = json!({
        "title": report.title,
        "xaxis": {"title": report.x_title.as_deref().unwrap_or(&report.x)},
        "yaxis": {"title": report.y_title.as_deref().unwrap_or(&report.y)},
    });
    if report.chart == ChartKind::Bar {
        layout["barmode"] = json!("group");
    }

    let traces = serde_json::to_string(&traces(report, series))?;
    let layout = serde_json::to_string(&layout)?;

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<script src="{cdn}"></script>
</head>
<body>
<div id="chart" style="width:100%;height:90vh;"></div>
<script>
Plotly.newPlot("chart", {traces}, {layout});
</script>
</body>
</html>
"#,
        title = html_escape(&report.title),
        cdn = PLOTLY_CDN,
        traces = traces,
        layout = layout,
    ))
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

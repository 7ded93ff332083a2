//! Console log printing
//!
//! Prints log channel events in timestamp order, one line each, with the
//! channel name colored by severity.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat};
use console::style;
use std::io::Write;
use trace_series::{Row, Table};

/// How to render timestamps and channels
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStyle {
    /// Render timestamps as UTC wall clock instead of raw nanoseconds
    pub utc: bool,
    /// Color channel names
    pub color: bool,
}

/// Sort the table by timestamp and print every row
pub fn print_log(mut table: Table, log_style: LogStyle, out: &mut impl Write) -> Result<()> {
    table.sort_by("timestamp")?;
    for row in &table.rows {
        writeln!(out, "{}", format_line(row, log_style))?;
    }
    Ok(())
}

/// Format one log row as `[timestamp] channel: message`
pub fn format_line(row: &Row, log_style: LogStyle) -> String {
    let timestamp = row.float("timestamp").unwrap_or_default();
    let channel = row.text("channel").unwrap_or_default();
    let msg = row.get("msg").map(ToString::to_string).unwrap_or_default();

    let timestamp = if log_style.utc {
        wall_clock(timestamp)
    } else {
        format!("{:012}", timestamp as u64)
    };

    let channel = if log_style.color {
        paint_channel(channel)
    } else {
        channel.to_string()
    };

    format!("[{}] {}: {}", timestamp, channel, msg)
}

fn paint_channel(channel: &str) -> String {
    let styled = style(channel).force_styling(true);
    match channel {
        "error" => styled.red().to_string(),
        "warn" => styled.yellow().to_string(),
        _ => styled.green().to_string(),
    }
}

/// Nanoseconds since the epoch as an RFC 3339 UTC timestamp
fn wall_clock(nanos: f64) -> String {
    let nanos = nanos as i64;
    let secs = nanos.div_euclid(1_000_000_000);
    let subsec = nanos.rem_euclid(1_000_000_000) as u32;
    DateTime::from_timestamp(secs, subsec)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Nanos, true))
        .unwrap_or_else(|| nanos.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(t: f64, channel: &str, msg: &str) -> Row {
        Row::new()
            .with("timestamp", t)
            .with("channel", channel)
            .with("msg", msg)
    }

    #[test]
    fn test_plain_line() {
        let line = format_line(&row(1234.0, "warn", "deadline missed"), LogStyle::default());
        assert_eq!(line, "[000000001234] warn: deadline missed");
    }

    #[test]
    fn test_colored_channels() {
        let colored = LogStyle {
            utc: false,
            color: true,
        };
        assert!(format_line(&row(1.0, "error", "x"), colored).contains("\u{1b}[31merror"));
        assert!(format_line(&row(1.0, "warn", "x"), colored).contains("\u{1b}[33mwarn"));
        assert!(format_line(&row(1.0, "info", "x"), colored).contains("\u{1b}[32minfo"));
    }

    #[test]
    fn test_utc_timestamp() {
        let utc = LogStyle {
            utc: true,
            color: false,
        };
        let line = format_line(&row(1_500_000_000.0, "info", "boot"), utc);
        assert_eq!(line, "[1970-01-01T00:00:01.500000000Z] info: boot");
    }

    #[test]
    fn test_missing_message_prints_empty() {
        let row = Row::new().with("timestamp", 42.0).with("channel", "info");
        assert_eq!(format_line(&row, LogStyle::default()), "[000000000042] info: ");
    }

    #[test]
    fn test_print_log_sorts_by_timestamp() {
        let mut table = Table::new(vec!["timestamp".into(), "channel".into(), "msg".into()]);
        table.rows.push(row(30.0, "info", "third"));
        table.rows.push(row(10.0, "error", "first"));
        table.rows.push(row(20.0, "warn", "second"));

        let mut out = Vec::new();
        print_log(table, LogStyle::default(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let msgs: Vec<_> = text.lines().map(|l| l.rsplit(": ").next().unwrap()).collect();
        assert_eq!(msgs, vec!["first", "second", "third"]);
    }
}

use std::cmp::Ordering;

use crate::execution::{parse_timestamp, ExecutionRecord};
use crate::extensions::Extensions;

#[derive(Debug, Clone, Default)]
pub struct ProjectionOptions {
    pub compute_duration: bool,
    pub sort_attribute: Option<String>,
    /// Latest first when sorting.
    pub reversed: bool,
}

impl ProjectionOptions {
    pub fn sorted_by(attribute: impl Into<String>, reversed: bool) -> Self {
        Self {
            compute_duration: false,
            sort_attribute: Some(attribute.into()),
            reversed,
        }
    }

    pub fn with_duration(mut self) -> Self {
        self.compute_duration = true;
        self
    }
}

/// A record ready for rendering. The record itself is carried unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub key: String,
    pub duration: Option<String>,
    pub record: ExecutionRecord,
}

impl ReportRow {
    pub fn expandable(&self) -> bool {
        self.record.has_comment()
    }

    /// Comment shown under the row, if the row is expandable.
    pub fn detail(&self, extensions: &Extensions) -> Option<String> {
        if !self.expandable() {
            return None;
        }
        self.record
            .comment
            .as_deref()
            .map(|c| extensions.format_comment(c))
    }

    pub fn cell(&self, column: &Column) -> String {
        match column.key.as_str() {
            "duration" => self.duration.clone().unwrap_or_default(),
            "status" => self.record.status_label(),
            key => self.record.attribute(key).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub title: String,
    pub key: String,
}

impl Column {
    pub fn new(title: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            key: key.into(),
        }
    }
}

pub fn report_columns(show_duration: bool, previous_id: bool) -> Vec<Column> {
    let mut columns = vec![
        Column::new("ID", "id"),
        Column::new("NAME", "name"),
        Column::new("STATUS", "status"),
    ];
    if show_duration {
        columns.push(Column::new("DURATION", "duration"));
    }
    columns.push(Column::new("STARTED", "started"));
    columns.push(Column::new("FINISHED", "finished"));
    if previous_id {
        columns.push(Column::new("PREVIOUS", "previousId"));
    }
    columns
}

/// Derives rows from records: optional duration, then an optional stable
/// sort on a timestamp attribute. Rows whose attribute is missing or not a
/// timestamp go last in both directions.
pub fn project(records: &[ExecutionRecord], options: &ProjectionOptions) -> Vec<ReportRow> {
    let rows = records.iter().map(|record| ReportRow {
        key: record.id.clone(),
        duration: options
            .compute_duration
            .then(|| duration(record.started.as_deref(), record.finished.as_deref())),
        record: record.clone(),
    });

    let Some(attribute) = &options.sort_attribute else {
        return rows.collect();
    };

    let mut keyed: Vec<(Option<i64>, ReportRow)> = rows
        .map(|row| {
            let key = row
                .record
                .attribute(attribute)
                .and_then(|v| parse_timestamp(&v))
                .map(|ts| ts.timestamp_millis());
            (key, row)
        })
        .collect();
    keyed.sort_by(|(a, _), (b, _)| compare_keys(*a, *b, options.reversed));
    keyed.into_iter().map(|(_, row)| row).collect()
}

fn compare_keys(a: Option<i64>, b: Option<i64>, reversed: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if reversed => b.cmp(&a),
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Elapsed time between two timestamps as `MM:SS.ms`, milliseconds unpadded.
/// `?` when a bound is missing or unparsable, or finished precedes started.
pub fn duration(started: Option<&str>, finished: Option<&str>) -> String {
    let (Some(started), Some(finished)) = (
        started.and_then(parse_timestamp),
        finished.and_then(parse_timestamp),
    ) else {
        return "?".to_string();
    };
    let elapsed = (finished - started).num_milliseconds();
    if elapsed < 0 {
        return "?".to_string();
    }
    format_elapsed(elapsed as u64)
}

pub fn format_elapsed(ms: u64) -> String {
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;
    format!("{:02}:{:02}.{}", minutes, seconds, millis)
}

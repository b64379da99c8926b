use anyhow::Result;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use common::{Column, ExecutionRecord, Extensions, MenuEntry, PaginationState, ReportRow, StatusCategory};
use serde_json::Value;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

pub fn loading() {
    eprintln!("Loading...");
}

fn status_color(category: StatusCategory) -> Color {
    match category {
        StatusCategory::Success => Color::Green,
        StatusCategory::Failure => Color::Red,
        StatusCategory::Neutral => Color::Grey,
    }
}

fn status_cell(record: &ExecutionRecord) -> Cell {
    Cell::new(record.status_label()).fg(status_color(record.status_category()))
}

pub fn report_table(rows: &[ReportRow], columns: &[Column]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(columns.iter().map(|c| Cell::new(&c.title)).collect::<Vec<_>>());

    for row in rows {
        table.add_row(
            columns
                .iter()
                .map(|c| match c.key.as_str() {
                    "status" => status_cell(&row.record),
                    _ => Cell::new(row.cell(c)),
                })
                .collect::<Vec<_>>(),
        );
    }
    table
}

pub fn write_csv<W: Write>(rows: &[ReportRow], columns: &[Column], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(columns.iter().map(|c| c.title.as_str()))?;
    for row in rows {
        writer.write_record(columns.iter().map(|c| row.cell(c)))?;
    }
    writer.flush()?;
    Ok(())
}

/// Rows as JSON: the record with `key` and, when computed, `duration`.
pub fn rows_json(rows: &[ReportRow]) -> Result<Value> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut value = serde_json::to_value(&row.record)?;
        if let Value::Object(map) = &mut value {
            map.insert("key".into(), Value::String(row.key.clone()));
            if let Some(duration) = &row.duration {
                map.insert("duration".into(), Value::String(duration.clone()));
            }
        }
        out.push(value);
    }
    Ok(Value::Array(out))
}

/// Comment blocks of the expandable rows, one per row.
pub fn expanded_comments(rows: &[ReportRow], extensions: &Extensions) -> Vec<String> {
    rows.iter()
        .filter_map(|row| {
            row.detail(extensions)
                .map(|detail| format!("▸ {}\n{}", row.key, indent(&detail)))
        })
        .collect()
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|l| format!("    {}", l))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn print_rows(
    rows: &[ReportRow],
    columns: &[Column],
    format: OutputFormat,
    extensions: &Extensions,
) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", report_table(rows, columns));
            for block in expanded_comments(rows, extensions) {
                println!("{}", block);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows_json(rows)?)?),
        OutputFormat::Csv => write_csv(rows, columns, std::io::stdout())?,
    }
    Ok(())
}

pub fn details(record: &ExecutionRecord, duration: &str, extensions: &Extensions) -> Table {
    let comment = record
        .comment
        .as_deref()
        .map(|c| extensions.format_comment(c))
        .unwrap_or_default();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.add_row(vec![
        Cell::new("Name"),
        Cell::new(&record.name),
        Cell::new("Status"),
        status_cell(record),
    ]);
    table.add_row(vec![
        Cell::new("Started"),
        Cell::new(record.started.as_deref().unwrap_or("")),
        Cell::new("Finished"),
        Cell::new(record.finished.as_deref().unwrap_or("")),
    ]);
    table.add_row(vec![
        Cell::new("Duration"),
        Cell::new(duration),
        Cell::new("Comment"),
        Cell::new(comment),
    ]);
    table
}

pub fn batch_selector(names: &[String], selected: Option<&str>) -> String {
    let entries: Vec<String> = std::iter::once(("All", selected.is_none()))
        .chain(names.iter().map(|n| (n.as_str(), selected == Some(n.as_str()))))
        .map(|(name, active)| if active { format!("[{}]", name) } else { name.to_string() })
        .collect();
    format!("Batch: {}", entries.join(" | "))
}

pub fn page_footer(state: &PaginationState, total: u64) -> String {
    format!(
        "Page {}/{} ({} executions, {} per page)",
        state.page + 1,
        state.page_count(total),
        total,
        state.page_size
    )
}

pub fn menu(entries: &[MenuEntry]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Menu", "Path"]);
    for entry in entries {
        table.add_row(vec![&entry.title, &entry.path]);
    }
    table
}

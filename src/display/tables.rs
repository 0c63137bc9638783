//! Table formatting utilities for structured output.

use comfy_table::{
    Attribute, Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

use crate::engine::{BatchReport, IndexInfo, QueryHit};

/// Characters of chunk text shown per query result
const PREVIEW_CHARS: usize = 80;

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Add a row of prepared cells.
    pub fn add_cells(mut self, row: Vec<Cell>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// Query results, closest first.
pub fn create_query_table(hits: &[QueryHit]) -> String {
    hits.iter()
        .enumerate()
        .fold(
            TableBuilder::new().set_headers(vec!["#", "Document", "Distance", "Text"]),
            |table, (rank, hit)| {
                table.add_row(vec![
                    (rank + 1).to_string(),
                    hit.document_name.clone(),
                    format!("{:.4}", hit.distance),
                    preview(&hit.text),
                ])
            },
        )
        .build()
}

/// Store statistics; a drifted index is highlighted.
pub fn create_info_table(info: &IndexInfo, model: &str, dimension: usize, store: &str) -> String {
    let (state, color) = if info.is_drifted() {
        ("⚠ drifted, run update-index", Color::Yellow)
    } else {
        ("✓ in sync", Color::Green)
    };

    TableBuilder::new()
        .set_headers(vec!["Metric", "Value"])
        .add_row(vec!["Store".to_string(), store.to_string()])
        .add_row(vec!["Model".to_string(), model.to_string()])
        .add_row(vec!["Dimension".to_string(), dimension.to_string()])
        .add_row(vec!["Chunks".to_string(), info.chunk_count.to_string()])
        .add_row(vec!["Index entries".to_string(), info.index_size.to_string()])
        .add_cells(vec![
            Cell::new("Index"),
            Cell::new(state).fg(color).add_attribute(Attribute::Bold),
        ])
        .build()
}

/// Per-document outcome of a batch with a total row.
pub fn create_batch_table(report: &BatchReport) -> String {
    let mut table = TableBuilder::new().set_headers(vec!["Document", "Chunks", "Outcome"]);

    for document in &report.embedded {
        table = table.add_row(vec![
            document.name.clone(),
            document.chunks.to_string(),
            "embedded".to_string(),
        ]);
    }
    for name in &report.skipped_empty {
        table = table.add_row(vec![name.clone(), "0".to_string(), "empty".to_string()]);
    }
    for failed in &report.failed {
        table = table.add_cells(vec![
            Cell::new(&failed.name),
            Cell::new("-"),
            Cell::new(&failed.status_code).fg(Color::Red),
        ]);
    }

    table
        .add_cells(vec![
            Cell::new("TOTAL").add_attribute(Attribute::Bold),
            Cell::new(report.chunk_total()).add_attribute(Attribute::Bold),
            Cell::new(format!(
                "{} embedded, {} failed",
                report.embedded.len(),
                report.failed.len()
            ))
            .add_attribute(Attribute::Bold),
        ])
        .build()
}

fn preview(text: &str) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    if flat.chars().count() > PREVIEW_CHARS {
        let cut: String = flat.chars().take(PREVIEW_CHARS - 1).collect();
        format!("{cut}…")
    } else {
        flat
    }
}

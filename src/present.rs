//! Result presentation for askdb.
//!
//! Turns a `QueryResult` into a `DisplayModel`: a presentation-ready
//! structure independent of any rendering surface. The pipeline returns
//! these; it never prints.

use crate::db::{QueryResult, Value};
use serde::{Deserialize, Serialize};

/// Sparkline glyphs from lowest to highest.
const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// A presentation-ready rendering of a query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DisplayModel {
    /// A tabular grid, with an optional single-column chart offer.
    Table(TableView),

    /// A mutation outcome: the affected-row count as plain text.
    Mutation { affected: u64 },

    /// An explicit no-results indicator for empty row sets.
    NoResults,
}

/// A tabular grid built from a row-returning result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableView {
    /// Column headers, in result order.
    pub columns: Vec<String>,

    /// Stringified cell values; every row has `columns.len()` cells.
    pub rows: Vec<Vec<String>>,

    /// Indices of numeric-typed columns, in column order.
    pub numeric_columns: Vec<usize>,

    /// At most one chart offer over a numeric column.
    pub chart: Option<ChartSpec>,
}

/// A simple line-chart description over one numeric column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartSpec {
    /// Index of the charted column.
    pub column: usize,

    /// Header of the charted column.
    pub label: String,

    /// The column's numeric values in row order; NULLs are skipped.
    pub points: Vec<f64>,
}

impl TableView {
    /// Re-selects the charted column. Returns false (leaving the current
    /// chart untouched) when the index is not a numeric column.
    pub fn with_chart_column(&mut self, index: usize, values: &[Vec<Value>]) -> bool {
        if !self.numeric_columns.contains(&index) {
            return false;
        }
        self.chart = build_chart(index, &self.columns, values);
        true
    }
}

/// Formats a result for display.
///
/// Row-returning results become a table; when at least one column is numeric
/// and there is more than one row, the first numeric column is offered as a
/// line chart. Mutations render their affected-row count. Zero-row results
/// become an explicit no-results indicator rather than an empty table.
pub fn present(result: &QueryResult) -> DisplayModel {
    match result {
        QueryResult::Affected { count } => DisplayModel::Mutation { affected: *count },
        QueryResult::Rows { columns, rows } => {
            if rows.is_empty() {
                return DisplayModel::NoResults;
            }

            let headers: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
            let cells: Vec<Vec<String>> = rows
                .iter()
                .map(|row| row.iter().map(Value::to_display_string).collect())
                .collect();

            let numeric_columns = numeric_column_indices(columns.len(), rows);

            // A single row is immediately consumable as text; charting one
            // point says nothing.
            let chart = if rows.len() >= 2 {
                numeric_columns
                    .first()
                    .and_then(|&index| build_chart(index, &headers, rows))
            } else {
                None
            };

            DisplayModel::Table(TableView {
                columns: headers,
                rows: cells,
                numeric_columns,
                chart,
            })
        }
    }
}

/// Columns whose non-null values are all numeric, with at least one value.
fn numeric_column_indices(column_count: usize, rows: &[Vec<Value>]) -> Vec<usize> {
    (0..column_count)
        .filter(|&i| {
            let mut saw_numeric = false;
            for row in rows {
                match row.get(i) {
                    Some(value) if value.is_numeric() => saw_numeric = true,
                    Some(Value::Null) => {}
                    _ => return false,
                }
            }
            saw_numeric
        })
        .collect()
}

fn build_chart(index: usize, headers: &[String], rows: &[Vec<Value>]) -> Option<ChartSpec> {
    let points: Vec<f64> = rows
        .iter()
        .filter_map(|row| row.get(index).and_then(Value::as_f64))
        .collect();

    if points.is_empty() {
        return None;
    }

    Some(ChartSpec {
        column: index,
        label: headers.get(index).cloned().unwrap_or_default(),
        points,
    })
}

impl DisplayModel {
    /// Renders the model as plain text for a terminal surface.
    pub fn to_text(&self) -> String {
        match self {
            Self::NoResults => "No results found for this query.".to_string(),
            Self::Mutation { affected } => {
                if *affected == 1 {
                    "1 row affected.".to_string()
                } else {
                    format!("{affected} rows affected.")
                }
            }
            Self::Table(view) => {
                let mut out = render_grid(&view.columns, &view.rows);
                if let Some(chart) = &view.chart {
                    out.push('\n');
                    out.push_str(&render_sparkline(chart));
                }
                out
            }
        }
    }
}

/// Renders an aligned ASCII grid.
fn render_grid(columns: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let mut out = String::new();

    let header: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:<width$}", c, width = widths[i]))
        .collect();
    out.push_str(&header.join(" | "));
    out.push('\n');

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("-+-"));
    out.push('\n');

    for row in rows {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect();
        out.push_str(&line.join(" | "));
        out.push('\n');
    }

    out
}

/// Renders a chart spec as a one-line sparkline.
fn render_sparkline(chart: &ChartSpec) -> String {
    let min = chart.points.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = chart
        .points
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    let line: String = chart
        .points
        .iter()
        .map(|&p| {
            let level = if span == 0.0 {
                0
            } else {
                (((p - min) / span) * (SPARK_LEVELS.len() - 1) as f64).round() as usize
            };
            SPARK_LEVELS[level.min(SPARK_LEVELS.len() - 1)]
        })
        .collect();

    format!("{}: {} (min {}, max {})", chart.label, line, min, max)
}

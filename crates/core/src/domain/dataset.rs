use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// In-memory tabular dataset with named columns.
///
/// Column order is preserved for display; values are stored per column so the
/// forecasting and analysis tools can pull a numeric series without touching
/// the rest of the table. Cells are kept as strings and parsed on demand,
/// matching how CSV ingestion delivers them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: usize,
    values: BTreeMap<String, Vec<String>>,
}

/// Summary handed to the generation backend in the system prompt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub rows: usize,
    pub columns: Vec<String>,
}

impl Dataset {
    pub fn new(columns: Vec<String>) -> Self {
        let values = columns.iter().map(|c| (c.clone(), Vec::new())).collect();
        Self { columns, rows: 0, values }
    }

    /// Append one row. Cells beyond the declared columns are dropped; missing
    /// trailing cells are recorded as empty.
    pub fn push_row(&mut self, cells: Vec<String>) {
        for (index, column) in self.columns.iter().enumerate() {
            let cell = cells.get(index).cloned().unwrap_or_default();
            if let Some(column_values) = self.values.get_mut(column) {
                column_values.push(cell);
            }
        }
        self.rows += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn info(&self) -> DatasetInfo {
        DatasetInfo { rows: self.rows, columns: self.columns.clone() }
    }

    /// Exact-name column access.
    pub fn column(&self, name: &str) -> Option<&[String]> {
        self.values.get(name).map(Vec::as_slice)
    }

    /// Indicator lookup: case-insensitive substring match against column
    /// names, first declared column wins.
    pub fn find_column(&self, indicator: &str) -> Option<&str> {
        let needle = indicator.to_lowercase();
        self.columns
            .iter()
            .find(|column| column.to_lowercase().contains(&needle))
            .map(String::as_str)
    }

    /// Numeric series for a column, skipping cells that do not parse.
    pub fn numeric_series(&self, column: &str) -> Vec<f64> {
        self.column(column)
            .map(|cells| {
                cells
                    .iter()
                    .filter_map(|cell| cell.trim().replace(',', "").parse::<f64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Numeric series for `value_column` restricted to rows whose `Flow`-style
    /// column contains `flow_kind` (case-insensitive). Used by the trade
    /// balance tool to split exports from imports in a mixed table.
    pub fn numeric_series_where(
        &self,
        value_column: &str,
        flow_column: &str,
        flow_kind: &str,
    ) -> Vec<f64> {
        let (Some(values), Some(flows)) = (self.column(value_column), self.column(flow_column))
        else {
            return Vec::new();
        };
        let needle = flow_kind.to_lowercase();
        values
            .iter()
            .zip(flows.iter())
            .filter(|(_, flow)| flow.to_lowercase().contains(&needle))
            .filter_map(|(cell, _)| cell.trim().replace(',', "").parse::<f64>().ok())
            .collect()
    }

    /// Distinct values of a column with occurrence counts, most frequent
    /// first. Backs the `distribution` analysis.
    pub fn value_counts(&self, column: &str, top: usize) -> Vec<(String, usize)> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        if let Some(cells) = self.column(column) {
            for cell in cells {
                *counts.entry(cell.as_str()).or_default() += 1;
            }
        }
        let mut sorted: Vec<(String, usize)> =
            counts.into_iter().map(|(value, count)| (value.to_string(), count)).collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        sorted.truncate(top);
        sorted
    }
}

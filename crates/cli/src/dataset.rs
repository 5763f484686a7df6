//! CSV ingestion into the in-memory dataset.

use std::path::Path;

use anyhow::{bail, Context, Result};

use econ_core::Dataset;

/// Load a CSV file with a header row. Ragged rows are tolerated; the dataset
/// pads or truncates them against the header.
pub fn load_csv(path: &Path) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("could not open dataset `{}`", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("could not read headers from `{}`", path.display()))?;
    let columns: Vec<String> = headers.iter().map(|header| header.trim().to_string()).collect();
    if columns.is_empty() || columns.iter().all(|column| column.is_empty()) {
        bail!("dataset `{}` has no usable header row", path.display());
    }

    let mut dataset = Dataset::new(columns);
    for record in reader.records() {
        let record =
            record.with_context(|| format!("could not parse row in `{}`", path.display()))?;
        dataset.push_row(record.iter().map(|cell| cell.trim().to_string()).collect());
    }

    if dataset.is_empty() {
        bail!("dataset `{}` contains a header but no rows", path.display());
    }

    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::load_csv;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write");
        file
    }

    #[test]
    fn loads_headers_and_rows() {
        let file = write_csv("Year,Exports,Imports\n2020,100,120\n2021,110,125\n");
        let dataset = load_csv(file.path()).expect("load");
        assert_eq!(dataset.columns(), &["Year", "Exports", "Imports"]);
        assert_eq!(dataset.row_count(), 2);
        assert_eq!(dataset.numeric_series("Exports"), vec![100.0, 110.0]);
    }

    #[test]
    fn tolerates_ragged_rows() {
        let file = write_csv("A,B\n1\n2,3,4\n");
        let dataset = load_csv(file.path()).expect("load");
        assert_eq!(dataset.row_count(), 2);
        assert_eq!(dataset.column("B"), Some(&["".to_string(), "3".to_string()][..]));
    }

    #[test]
    fn rejects_empty_file() {
        let file = write_csv("");
        assert!(load_csv(file.path()).is_err());
    }

    #[test]
    fn rejects_header_only_file() {
        let file = write_csv("Year,Exports\n");
        assert!(load_csv(file.path()).is_err());
    }
}

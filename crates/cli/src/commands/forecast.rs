use std::path::Path;

use serde_json::json;

use econ_core::{ForecastMethod, Forecaster};

use crate::commands::CommandResult;
use crate::dataset;

pub fn run(
    data: &Path,
    indicator: &str,
    periods: u32,
    method: &str,
    json_output: bool,
) -> CommandResult {
    let dataset = match dataset::load_csv(data) {
        Ok(dataset) => dataset,
        Err(error) => return CommandResult::failure("forecast", "dataset", error.to_string(), 2),
    };

    let Some(column) = dataset.find_column(indicator) else {
        return CommandResult::failure(
            "forecast",
            "indicator",
            format!(
                "no column matching `{indicator}`; available columns: {}",
                dataset.columns().join(", ")
            ),
            2,
        );
    };
    let column = column.to_string();

    let method: ForecastMethod = match method.parse() {
        Ok(method) => method,
        Err(error) => return CommandResult::failure("forecast", "method", error.to_string(), 2),
    };

    let series = dataset.numeric_series(&column);
    let horizon = periods.clamp(1, 24) as usize;
    let mut outcome = match Forecaster::new().run(method, &series, horizon) {
        Ok(outcome) => outcome,
        Err(error) => return CommandResult::failure("forecast", "forecast", error.to_string(), 1),
    };
    outcome.annotate(&column, &series, horizon);

    let output = if json_output {
        serde_json::to_string_pretty(&outcome)
            .unwrap_or_else(|error| json!({"error": error.to_string()}).to_string())
    } else {
        render_human(&outcome)
    };
    CommandResult { exit_code: 0, output }
}

fn render_human(outcome: &econ_core::ForecastOutcome) -> String {
    let mut lines = Vec::new();
    if let Some(indicator) = &outcome.indicator {
        lines.push(format!("{indicator} ({} method)", outcome.method));
    } else {
        lines.push(format!("forecast ({} method)", outcome.method));
    }

    let values: Vec<String> = outcome.forecasts.iter().map(|value| format!("{value:.2}")).collect();
    lines.push(format!("forecast: [{}]", values.join(", ")));

    if let (Some(lower), Some(upper)) = (&outcome.lower_bound, &outcome.upper_bound) {
        let band: Vec<String> = lower
            .iter()
            .zip(upper.iter())
            .map(|(low, high)| format!("{low:.2}..{high:.2}"))
            .collect();
        lines.push(format!("range: [{}]", band.join(", ")));
    }
    if let Some(interpretation) = &outcome.interpretation {
        lines.push(interpretation.clone());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::run;

    fn trade_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(b"Year,Exports\n2020,100\n2021,110\n2022,121\n2023,133\n").expect("write");
        file
    }

    #[test]
    fn forecasts_named_column_as_json() {
        let file = trade_csv();
        let result = run(file.path(), "exports", 3, "trend", true);
        assert_eq!(result.exit_code, 0);
        let payload: serde_json::Value = serde_json::from_str(&result.output).expect("json");
        assert_eq!(payload["method"], "Linear Trend");
        assert_eq!(payload["forecasts"].as_array().expect("forecasts").len(), 3);
        assert_eq!(payload["indicator"], "Exports");
    }

    #[test]
    fn unknown_indicator_lists_columns() {
        let file = trade_csv();
        let result = run(file.path(), "inflation", 3, "trend", false);
        assert_eq!(result.exit_code, 2);
        assert!(result.output.contains("Exports"));
    }

    #[test]
    fn unknown_method_fails_cleanly() {
        let file = trade_csv();
        let result = run(file.path(), "exports", 3, "magic", false);
        assert_eq!(result.exit_code, 2);
        assert!(result.output.contains("unknown method"));
    }
}

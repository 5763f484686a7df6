//! Statistical forecasting engine
//!
//! Five closed-form estimators over a numeric time series plus a weighted
//! ensemble. Every estimator takes the observed values and a horizon and
//! returns a forecast sequence of exactly that length, or a typed error the
//! orchestrator can branch on (insufficient data is an expected outcome, not
//! an exception). No parameter fitting happens here beyond the closed forms;
//! values are plain `f64` with no unit or currency handling.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default smoothing factor for exponential smoothing.
pub const DEFAULT_ALPHA: f64 = 0.3;
/// Default window for the moving average estimator.
pub const DEFAULT_WINDOW: usize = 3;
/// Default season length for the seasonal naive estimator (monthly data).
pub const DEFAULT_SEASON_LENGTH: usize = 12;
/// Relative half-width of the ensemble confidence band.
const ENSEMBLE_BAND: f64 = 0.15;

/// Expected forecasting failures, returned as values so callers can react
/// (e.g. trigger auto-recovery) without exception-type inspection.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ForecastError {
    #[error("need at least {needed} data points, got {got}")]
    InsufficientData { needed: usize, got: usize },
    #[error("growth rate requires positive beginning and ending values")]
    NonPositiveValues,
    #[error("unknown method `{0}` (expected ensemble|trend|growth|smooth|moving_average)")]
    UnknownMethod(String),
}

/// Estimator selection as exposed in the tool catalogue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    Ensemble,
    Trend,
    Growth,
    Smooth,
    MovingAverage,
}

impl ForecastMethod {
    pub const ALL: [&'static str; 5] = ["ensemble", "trend", "growth", "smooth", "moving_average"];
}

impl std::str::FromStr for ForecastMethod {
    type Err = ForecastError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ensemble" => Ok(Self::Ensemble),
            "trend" => Ok(Self::Trend),
            "growth" => Ok(Self::Growth),
            "smooth" => Ok(Self::Smooth),
            "moving_average" => Ok(Self::MovingAverage),
            other => Err(ForecastError::UnknownMethod(other.to_string())),
        }
    }
}

/// Forecast result with method-specific diagnostics.
///
/// Diagnostics are optional so one shape serializes for every estimator; the
/// horizon-length forecast sequence is fixed at construction and the value is
/// immutable once handed to a tool result.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastOutcome {
    pub method: String,
    pub forecasts: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<Vec<f64>>,

    // Linear trend diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slope: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intercept: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r_squared: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,

    // Exponential smoothing diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_smoothed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mape: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<String>,

    // Moving average diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<usize>,

    // Compound growth diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cagr_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_period_growth: Option<f64>,

    // Seasonal naive diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season_length: Option<usize>,

    // Ensemble diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub methods_used: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,

    // Context attached by the forecasting tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indicator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub historical_periods: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast_periods: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_actual_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast_change_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<String>,
}

impl ForecastOutcome {
    fn new(method: impl Into<String>, forecasts: Vec<f64>) -> Self {
        Self { method: method.into(), forecasts, ..Self::default() }
    }

    /// Attach indicator context and a one-line interpretation comparing the
    /// first forecast step against the last observation.
    pub fn annotate(&mut self, indicator: &str, values: &[f64], horizon: usize) {
        self.indicator = Some(indicator.to_string());
        self.historical_periods = Some(values.len());
        self.forecast_periods = Some(horizon);
        if let Some(&last) = values.last() {
            self.last_actual_value = Some(last);
            let minimum = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let maximum = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            self.data_range = Some(format!("{minimum:.2} to {maximum:.2}"));
            if let Some(&first_forecast) = self.forecasts.first() {
                if last != 0.0 {
                    let change = (first_forecast - last) / last * 100.0;
                    self.forecast_change_percent = Some(change);
                    let direction = if change > 0.0 { "increase" } else { "decrease" };
                    self.interpretation = Some(format!(
                        "Forecast suggests {:.1}% {direction} in the next period",
                        change.abs()
                    ));
                }
            }
        }
    }
}

/// Stateless forecasting engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct Forecaster;

impl Forecaster {
    pub fn new() -> Self {
        Self
    }

    pub fn run(
        &self,
        method: ForecastMethod,
        values: &[f64],
        horizon: usize,
    ) -> Result<ForecastOutcome, ForecastError> {
        match method {
            ForecastMethod::Ensemble => self.ensemble(values, horizon),
            ForecastMethod::Trend => self.linear_trend(values, horizon),
            ForecastMethod::Growth => self.growth_rate(values, horizon),
            ForecastMethod::Smooth => self.exponential_smoothing(values, DEFAULT_ALPHA, horizon),
            ForecastMethod::MovingAverage => {
                self.moving_average(values, DEFAULT_WINDOW.min(values.len().max(1)), horizon)
            }
        }
    }

    /// Ordinary least squares on index vs. value.
    pub fn linear_trend(
        &self,
        values: &[f64],
        horizon: usize,
    ) -> Result<ForecastOutcome, ForecastError> {
        require_points(values, 2)?;
        let n = values.len() as f64;
        let x_mean = (n - 1.0) / 2.0;
        let y_mean = values.iter().sum::<f64>() / n;

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (index, &value) in values.iter().enumerate() {
            let dx = index as f64 - x_mean;
            numerator += dx * (value - y_mean);
            denominator += dx * dx;
        }
        let slope = numerator / denominator;
        let intercept = y_mean - slope * x_mean;

        let forecasts: Vec<f64> = (0..horizon)
            .map(|step| intercept + slope * (values.len() + step) as f64)
            .collect();

        let ss_res: f64 = values
            .iter()
            .enumerate()
            .map(|(index, &value)| {
                let fitted = intercept + slope * index as f64;
                (value - fitted).powi(2)
            })
            .sum();
        let ss_tot: f64 = values.iter().map(|&value| (value - y_mean).powi(2)).sum();
        let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

        let mut outcome = ForecastOutcome::new("Linear Trend", forecasts);
        outcome.slope = Some(slope);
        outcome.intercept = Some(intercept);
        outcome.r_squared = Some(r_squared);
        outcome.trend =
            Some(if slope > 0.0 { "increasing".to_string() } else { "decreasing".to_string() });
        outcome.quality = Some(
            if r_squared > 0.7 {
                "good"
            } else if r_squared > 0.4 {
                "moderate"
            } else {
                "poor"
            }
            .to_string(),
        );
        Ok(outcome)
    }

    /// S_t = alpha * Y_t + (1 - alpha) * S_(t-1); the forecast repeats the
    /// last smoothed level for every horizon step.
    pub fn exponential_smoothing(
        &self,
        values: &[f64],
        alpha: f64,
        horizon: usize,
    ) -> Result<ForecastOutcome, ForecastError> {
        require_points(values, 2)?;

        let mut smoothed = Vec::with_capacity(values.len());
        smoothed.push(values[0]);
        for &value in &values[1..] {
            let previous = *smoothed.last().unwrap_or(&values[0]);
            smoothed.push(alpha * value + (1.0 - alpha) * previous);
        }
        let level = *smoothed.last().unwrap_or(&values[0]);

        // One-step-behind MAPE over the fitted levels.
        let mut errors = Vec::new();
        for index in 1..values.len() {
            if values[index] != 0.0 {
                errors.push((values[index] - smoothed[index]).abs() / values[index] * 100.0);
            }
        }
        let mape = if errors.is_empty() {
            0.0
        } else {
            errors.iter().sum::<f64>() / errors.len() as f64
        };

        let mut outcome = ForecastOutcome::new("Exponential Smoothing", vec![level; horizon]);
        outcome.alpha = Some(alpha);
        outcome.last_smoothed = Some(level);
        outcome.mape = Some(mape);
        outcome.accuracy = Some(
            if mape < 10.0 {
                "excellent"
            } else if mape < 20.0 {
                "good"
            } else {
                "moderate"
            }
            .to_string(),
        );
        Ok(outcome)
    }

    /// Mean of the last `window` observations, repeated for every step.
    pub fn moving_average(
        &self,
        values: &[f64],
        window: usize,
        horizon: usize,
    ) -> Result<ForecastOutcome, ForecastError> {
        let window = window.max(1);
        require_points(values, window)?;
        let last_ma =
            values[values.len() - window..].iter().sum::<f64>() / window as f64;

        let mut outcome =
            ForecastOutcome::new(format!("{window}-Period Moving Average"), vec![last_ma; horizon]);
        outcome.window = Some(window);
        Ok(outcome)
    }

    /// Compound growth: r = (Y_end / Y_start)^(1 / (n - 1)) - 1, then
    /// forecast_i = Y_end * (1 + r)^i. Requires strictly positive endpoints.
    pub fn growth_rate(
        &self,
        values: &[f64],
        horizon: usize,
    ) -> Result<ForecastOutcome, ForecastError> {
        require_points(values, 2)?;
        let beginning = values[0];
        let ending = values[values.len() - 1];
        if beginning <= 0.0 || ending <= 0.0 {
            return Err(ForecastError::NonPositiveValues);
        }

        let periods = (values.len() - 1) as f64;
        let cagr = (ending / beginning).powf(1.0 / periods) - 1.0;

        let mut forecasts = Vec::with_capacity(horizon);
        let mut current = ending;
        for _ in 0..horizon {
            current *= 1.0 + cagr;
            forecasts.push(current);
        }

        let mut period_growth = Vec::new();
        for index in 1..values.len() {
            if values[index - 1] != 0.0 {
                period_growth.push(values[index] / values[index - 1] - 1.0);
            }
        }
        let avg_growth = if period_growth.is_empty() {
            0.0
        } else {
            period_growth.iter().sum::<f64>() / period_growth.len() as f64
        };

        let mut outcome = ForecastOutcome::new("Compound Growth Rate (CAGR)", forecasts);
        outcome.cagr_percent = Some(cagr * 100.0);
        outcome.avg_period_growth = Some(avg_growth * 100.0);
        Ok(outcome)
    }

    /// Repeats the value from `season_length` steps back, cyclically.
    pub fn seasonal_naive(
        &self,
        values: &[f64],
        season_length: usize,
        horizon: usize,
    ) -> Result<ForecastOutcome, ForecastError> {
        let season_length = season_length.max(1);
        require_points(values, season_length)?;

        let forecasts: Vec<f64> = (0..horizon)
            .map(|step| {
                let seasonal_index = (values.len() + step) % season_length;
                values[values.len() - season_length + seasonal_index]
            })
            .collect();

        let mut outcome =
            ForecastOutcome::new(format!("Seasonal Naive (season={season_length})"), forecasts);
        outcome.season_length = Some(season_length);
        Ok(outcome)
    }

    /// Weighted average of trend (0.3), smoothing (0.3), growth (0.2) and
    /// moving average (0.2), renormalized over whichever sub-methods
    /// succeeded. The confidence band is ±15% of each ensemble point.
    pub fn ensemble(
        &self,
        values: &[f64],
        horizon: usize,
    ) -> Result<ForecastOutcome, ForecastError> {
        require_points(values, 3)?;

        let mut members: Vec<(&str, Vec<f64>, f64)> = Vec::new();
        if let Ok(outcome) = self.linear_trend(values, horizon) {
            members.push(("Linear Trend", outcome.forecasts, 0.3));
        }
        if let Ok(outcome) = self.exponential_smoothing(values, DEFAULT_ALPHA, horizon) {
            members.push(("Exponential Smoothing", outcome.forecasts, 0.3));
        }
        if let Ok(outcome) = self.growth_rate(values, horizon) {
            members.push(("Growth Rate", outcome.forecasts, 0.2));
        }
        if let Ok(outcome) = self.moving_average(values, DEFAULT_WINDOW.min(values.len()), horizon)
        {
            members.push(("Moving Average", outcome.forecasts, 0.2));
        }

        if members.is_empty() {
            return Err(ForecastError::InsufficientData { needed: 3, got: values.len() });
        }

        let total_weight: f64 = members.iter().map(|(_, _, weight)| weight).sum();
        let forecasts: Vec<f64> = (0..horizon)
            .map(|step| {
                members
                    .iter()
                    .map(|(_, member_forecasts, weight)| member_forecasts[step] * weight)
                    .sum::<f64>()
                    / total_weight
            })
            .collect();

        let lower = forecasts.iter().map(|point| point * (1.0 - ENSEMBLE_BAND)).collect();
        let upper = forecasts.iter().map(|point| point * (1.0 + ENSEMBLE_BAND)).collect();

        let mut outcome = ForecastOutcome::new("Ensemble (Combined Methods)", forecasts);
        outcome.lower_bound = Some(lower);
        outcome.upper_bound = Some(upper);
        outcome.methods_used =
            Some(members.iter().map(|(name, _, _)| name.to_string()).collect());
        outcome.confidence = Some("moderate".to_string());
        Ok(outcome)
    }
}

fn require_points(values: &[f64], needed: usize) -> Result<(), ForecastError> {
    if values.len() < needed {
        return Err(ForecastError::InsufficientData { needed, got: values.len() });
    }
    Ok(())
}

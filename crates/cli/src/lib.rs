pub mod collaborators;
pub mod commands;
pub mod dataset;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "econ",
    about = "Economic data assistant CLI",
    long_about = "Ask questions over a CSV dataset with an LLM-driven tool loop, run forecasts directly, and inspect configuration and readiness.",
    after_help = "Examples:\n  econ ask --data trade.csv \"How are exports trending?\"\n  econ forecast --data trade.csv --indicator exports --periods 6\n  econ doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Answer a question about the dataset using the agent loop")]
    Ask {
        #[arg(help = "The question to answer")]
        question: String,
        #[arg(long, help = "Path to the CSV dataset")]
        data: PathBuf,
        #[arg(long, help = "Override the configured model")]
        model: Option<String>,
        #[arg(long, help = "Override the iteration budget")]
        iterations: Option<u32>,
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run a forecast on one dataset column without the LLM loop")]
    Forecast {
        #[arg(long, help = "Path to the CSV dataset")]
        data: PathBuf,
        #[arg(long, help = "Indicator name, matched against dataset columns")]
        indicator: String,
        #[arg(long, default_value_t = 6, help = "Forecast horizon in periods")]
        periods: u32,
        #[arg(long, default_value = "ensemble", help = "Estimator: ensemble|trend|growth|smooth|moving_average")]
        method: String,
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, guardrail patterns, and backend settings")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { question, data, model, iterations, json } => {
            commands::ask::run(&question, &data, model, iterations, json).await
        }
        Command::Forecast { data, indicator, periods, method, json } => {
            commands::forecast::run(&data, &indicator, periods, &method, json)
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json).await }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

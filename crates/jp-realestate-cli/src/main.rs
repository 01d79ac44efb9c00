mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::income_tax::IncomeTaxArgs;
use commands::mortgage::MortgageArgs;
use commands::scenario::{ScenarioArgs, SweepArgs};

/// After-tax economics of owning real estate in Japan
#[derive(Parser)]
#[command(
    name = "jre",
    version,
    about = "After-tax economics of owning real estate in Japan",
    long_about = "A CLI for evaluating Japanese real estate purchases with decimal \
                  precision. Covers the individual income tax assessment, fixed-rate \
                  mortgage amortization, and the full year-indexed property pro-forma \
                  from purchase through sale."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess national and local income tax for an individual
    IncomeTax(IncomeTaxArgs),
    /// Amortize a fixed-rate mortgage
    Mortgage(MortgageArgs),
    /// Evaluate a property scenario at a single year
    Scenario(ScenarioArgs),
    /// Evaluate a property scenario at every year up to a horizon
    Sweep(SweepArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::IncomeTax(args) => commands::income_tax::run_income_tax(args),
        Commands::Mortgage(args) => commands::mortgage::run_mortgage(args),
        Commands::Scenario(args) => commands::scenario::run_scenario(args),
        Commands::Sweep(args) => commands::scenario::run_sweep(args),
        Commands::Version => {
            println!("jre {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}

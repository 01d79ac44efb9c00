use clap::Args;
use serde::Serialize;
use serde_json::{json, Value};

use jp_realestate_core::income_tax::{IncomeTaxCalc, IncomeTaxInput};
use jp_realestate_core::real_estate::{RealEstateCalc, RealEstateInput};
use jp_realestate_core::Money;

use crate::input;

/// Arguments for a single-year property scenario
#[derive(Args)]
pub struct ScenarioArgs {
    /// Path to JSON property input file (reads stdin when omitted)
    #[arg(long)]
    pub input: Option<String>,

    /// Path to JSON tax profile of the owner, excluding the property.
    /// Without it no income tax is assessed.
    #[arg(long)]
    pub tax_input: Option<String>,
}

/// Arguments for a year-by-year property sweep
#[derive(Args)]
pub struct SweepArgs {
    /// Path to JSON property input file (reads stdin when omitted)
    #[arg(long)]
    pub input: Option<String>,

    /// Path to JSON tax profile of the owner, excluding the property
    #[arg(long)]
    pub tax_input: Option<String>,

    /// Last year of the sweep; defaults to the input's calc_year
    #[arg(long)]
    pub years: Option<u32>,
}

fn read_property_input(path: &Option<String>) -> Result<RealEstateInput, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        input::file::read_json(path)
    } else if let Some(data) = input::stdin::read_stdin()? {
        Ok(serde_json::from_value(data)?)
    } else {
        Err("--input <file.json> or stdin required for a property scenario".into())
    }
}

fn read_tax_profile(
    path: &Option<String>,
) -> Result<Option<IncomeTaxCalc>, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let tax_input: IncomeTaxInput = input::file::read_json(path)?;
            Ok(Some(IncomeTaxCalc::new(tax_input)?))
        }
        None => Ok(None),
    }
}

pub fn run_scenario(args: ScenarioArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let property_input = read_property_input(&args.input)?;
    let profile = read_tax_profile(&args.tax_input)?;

    let calc = RealEstateCalc::new(property_input, profile.as_ref())?;
    Ok(serde_json::to_value(calc)?)
}

/// One row of the year sweep
#[derive(Serialize)]
struct SweepRow {
    year: u32,
    net_income_before_taxes: Money,
    net_income_after_taxes: Money,
    cumulative_net_income: Money,
    mortgage_amount_outstanding: Money,
    book_value: Money,
    equity_value: Money,
    net_income_on_realestate: Money,
}

pub fn run_sweep(args: SweepArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let property_input = read_property_input(&args.input)?;
    let profile = read_tax_profile(&args.tax_input)?;
    let horizon = args.years.unwrap_or(property_input.calc_year);

    let mut calc = RealEstateCalc::new(property_input, profile.as_ref())?;
    let mut rows = Vec::with_capacity(horizon as usize + 1);
    for year in 0..=horizon {
        calc.input.calc_year = year;
        calc.recalculate()?;
        rows.push(SweepRow {
            year,
            net_income_before_taxes: calc.net_income_before_taxes,
            net_income_after_taxes: calc.net_income_after_taxes,
            cumulative_net_income: calc.cumulative_net_income,
            mortgage_amount_outstanding: calc.mortgage_amount_outstanding,
            book_value: calc.book_value,
            equity_value: calc.equity_value,
            net_income_on_realestate: calc.net_income_on_realestate,
        });
    }

    Ok(json!({ "results": rows }))
}

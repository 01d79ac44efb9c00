use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use jp_realestate_core::income_tax::{IncomeTaxCalc, IncomeTaxInput};

use crate::input;

/// Arguments for the income tax assessment
#[derive(Args)]
pub struct IncomeTaxArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Annual employment income before taxes
    #[arg(long)]
    pub employment_income: Option<Decimal>,

    /// Annual rent paid
    #[arg(long, default_value = "0")]
    pub rent: Decimal,

    /// Rent is paid through an employer rent program
    #[arg(long)]
    pub rent_program: bool,

    /// Taxable income from other sources
    #[arg(long, default_value = "0")]
    pub other_income: Decimal,

    /// Annual life insurance premium paid
    #[arg(long, default_value = "0")]
    pub life_insurance_premium: Decimal,

    /// Annual medical expenses paid
    #[arg(long, default_value = "0")]
    pub medical_expense: Decimal,

    /// Number of dependents claimed
    #[arg(long, default_value = "0")]
    pub dependents: u32,

    /// Annual social security paid; estimated from income when omitted
    #[arg(long)]
    pub social_security: Option<Decimal>,

    /// Credit subtracted directly from the tax owed
    #[arg(long, default_value = "0")]
    pub tax_deduction: Decimal,
}

pub fn run_income_tax(args: IncomeTaxArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let tax_input: IncomeTaxInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        let employment_income = args
            .employment_income
            .ok_or("--employment-income is required (or provide --input)")?;

        IncomeTaxInput {
            employment_income,
            rent: args.rent,
            is_rent_program: args.rent_program,
            other_income: args.other_income,
            life_insurance_premium: args.life_insurance_premium,
            medical_expense: args.medical_expense,
            number_of_dependents: args.dependents,
            social_security_expense: args.social_security,
            tax_deduction: args.tax_deduction,
            ..IncomeTaxInput::default()
        }
    };

    let calc = IncomeTaxCalc::new(tax_input)?;
    Ok(serde_json::to_value(calc)?)
}

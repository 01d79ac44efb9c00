use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use jp_realestate_core::mortgage::Mortgage;
use jp_realestate_core::Money;

/// Arguments for mortgage amortization
#[derive(Args)]
pub struct MortgageArgs {
    /// Total loan principal
    #[arg(long)]
    pub principal: Decimal,

    /// Term of the loan in years
    #[arg(long)]
    pub tenor: u32,

    /// Annual interest rate (0.01 for 1%)
    #[arg(long, default_value = "0")]
    pub rate: Decimal,

    /// Include the full monthly schedule in the output
    #[arg(long)]
    pub schedule: bool,
}

#[derive(Serialize)]
struct MortgageSummary {
    principal: Money,
    tenor: u32,
    rate: Decimal,
    monthly_payment: Money,
    annual_payment: Money,
    total_interest: Money,
    total_paid: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    interest_schedule: Option<Vec<Money>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    principal_schedule: Option<Vec<Money>>,
}

pub fn run_mortgage(args: MortgageArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let loan = Mortgage::new(args.principal, args.tenor, args.rate);

    let total_interest: Money = loan.interest_schedule.iter().sum();
    let total_paid: Money = loan.amortization_schedule.iter().sum();

    let summary = MortgageSummary {
        principal: loan.principal,
        tenor: loan.tenor,
        rate: loan.rate,
        monthly_payment: loan.monthly_payment.round_dp(2),
        annual_payment: (loan.monthly_payment * Decimal::from(12)).round_dp(2),
        total_interest: total_interest.round_dp(2),
        total_paid: total_paid.round_dp(2),
        interest_schedule: args
            .schedule
            .then(|| loan.interest_schedule.iter().map(|m| m.round_dp(2)).collect()),
        principal_schedule: args
            .schedule
            .then(|| loan.principal_schedule.iter().map(|m| m.round_dp(2)).collect()),
    };

    Ok(serde_json::to_value(summary)?)
}

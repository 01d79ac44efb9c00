use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::types::{Money, Rate};

/// Economics of a fixed-rate mortgage.
///
/// Schedules are monthly and keep full decimal precision; truncation to whole
/// yen is left to the caller, which applies it only where the tax rules say
/// so.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mortgage {
    /// Total loan principal
    pub principal: Money,
    /// Term of the loan in years
    pub tenor: u32,
    /// Annual interest rate (0.008 for 0.8%)
    pub rate: Rate,
    /// Interest portion of the payment, per month
    pub interest_schedule: Vec<Money>,
    /// Principal portion of the payment, per month
    pub principal_schedule: Vec<Money>,
    /// Total payment, per month
    pub amortization_schedule: Vec<Money>,
    /// Constant monthly payment, zero when the tenor is zero
    pub monthly_payment: Money,
}

impl Mortgage {
    pub fn new(principal: Money, tenor: u32, rate: Rate) -> Self {
        let periods = (tenor * 12) as usize;

        if periods == 0 {
            return Mortgage {
                principal,
                tenor,
                rate,
                interest_schedule: Vec::new(),
                principal_schedule: Vec::new(),
                amortization_schedule: Vec::new(),
                monthly_payment: Decimal::ZERO,
            };
        }

        if rate.is_zero() {
            // No interest, so the principal amortizes in equal installments
            let installment = principal / Decimal::from(periods as u64);
            return Mortgage {
                principal,
                tenor,
                rate,
                interest_schedule: vec![Decimal::ZERO; periods],
                principal_schedule: vec![installment; periods],
                amortization_schedule: vec![installment; periods],
                monthly_payment: installment,
            };
        }

        let monthly_rate = rate / dec!(12);

        // (1 + r)^n by repeated multiplication, then the standard annuity
        // payment P * r * (1+r)^n / ((1+r)^n - 1)
        let mut growth = Decimal::ONE;
        for _ in 0..periods {
            growth *= Decimal::ONE + monthly_rate;
        }
        let payment = principal * monthly_rate * growth / (growth - Decimal::ONE);

        let mut interest_schedule = Vec::with_capacity(periods);
        let mut principal_schedule = Vec::with_capacity(periods);
        let mut amortization_schedule = Vec::with_capacity(periods);

        let mut balance = principal;
        for _ in 0..periods {
            let interest = balance * monthly_rate;
            let principal_part = payment - interest;
            balance -= principal_part;

            interest_schedule.push(interest);
            principal_schedule.push(principal_part);
            amortization_schedule.push(payment);
        }

        Mortgage {
            principal,
            tenor,
            rate,
            interest_schedule,
            principal_schedule,
            amortization_schedule,
            monthly_payment: payment,
        }
    }

    /// Interest paid over the 12 months starting at `year * 12`.
    pub fn interest_for_year(&self, year: u32) -> Money {
        let month = (year * 12) as usize;
        self.interest_schedule.iter().skip(month).take(12).sum()
    }

    /// Sum of every payment still due from the start of `year` onward.
    pub fn payments_remaining_from_year(&self, year: u32) -> Money {
        let month = (year * 12) as usize;
        self.amortization_schedule.iter().skip(month).sum()
    }

    /// Principal still owed after `year` ends.
    pub fn principal_outstanding_after_year(&self, year: u32) -> Money {
        let month = ((year + 1) * 12) as usize;
        self.principal_schedule.iter().skip(month).sum()
    }
}

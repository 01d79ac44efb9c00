use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::brackets::{lookup, TaxBracket, EMPLOYMENT_INCOME_FOR_TAX_TABLE, NATIONAL_INCOME_TAX_TABLE};
use crate::types::{today, Money, Rate, RESTORATION_TAX, RESTORATION_TAX_EXPIRY};
use crate::JpRealEstateResult;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Basic deduction every tax individual receives
const DEDUCTION_BASIC: Money = dec!(380_000);
const DEDUCTION_PER_DEPENDENT: Money = dec!(380_000);
const MEDICAL_EXPENSE_DEDUCTION_CAP: Money = dec!(2_000_000);

/// Share of rent deducted from pre-tax salary under a company rent program
const LEGAL_RENT_RATE: Rate = dec!(0.95);

/// 4% prefectural plus 6% municipal
const LOCAL_INCOME_TAX_RATE: Rate = dec!(0.10);

/// Health insurance rate for Tokyo, on salary capped at 1,390,000/month
const HEALTH_INSURANCE_RATE: Rate = dec!(0.0996);
const HEALTH_INSURANCE_SALARY_CAP: Money = dec!(16_680_000);

/// Social pension rate, on salary capped at 635,000/month
const SOCIAL_PENSION_RATE: Rate = dec!(0.183);
const SOCIAL_PENSION_SALARY_CAP: Money = dec!(7_620_000);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Personal tax parameters for one calendar year.
///
/// Not exhaustive: occasional income, donations, earthquake insurance,
/// retirement income and spouse-specific deductions are all out of scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncomeTaxInput {
    /// Annual employment income, before any rent program deduction
    pub employment_income: Money,
    /// Annual rent actually paid to the landlord
    pub rent: Money,
    /// True when rent is deducted from pre-tax salary
    pub is_rent_program: bool,
    /// Annual net income from other sources. May be negative.
    pub other_income: Money,
    /// Annual premium paid for life insurance
    pub life_insurance_premium: Money,
    /// Annual medical expenses paid and not reimbursed
    pub medical_expense: Money,
    /// Number of claimed tax dependents
    pub number_of_dependents: u32,
    /// Annual employee share of social security. Estimated from the salary
    /// when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social_security_expense: Option<Money>,
    /// Credit against taxes due, not against taxable income. Home loan
    /// deductions on a primary residence land here.
    pub tax_deduction: Money,
    pub is_resident_for_tax_purposes: bool,
    /// Date the tax is assessed for. Defaults to today when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_date: Option<NaiveDate>,
}

impl Default for IncomeTaxInput {
    fn default() -> Self {
        IncomeTaxInput {
            employment_income: Decimal::ZERO,
            rent: Decimal::ZERO,
            is_rent_program: false,
            other_income: Decimal::ZERO,
            life_insurance_premium: Decimal::ZERO,
            medical_expense: Decimal::ZERO,
            number_of_dependents: 0,
            social_security_expense: None,
            tax_deduction: Decimal::ZERO,
            is_resident_for_tax_purposes: true,
            current_date: None,
        }
    }
}

/// Japanese income tax assessment for one person and one year.
///
/// Derived fields are recomputed as a whole by [`IncomeTaxCalc::recalculate`];
/// construction runs it once. After mutating `input`, call `recalculate`
/// again before reading any derived field, otherwise the values are stale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncomeTaxCalc {
    pub input: IncomeTaxInput,

    /// Date the assessment is pinned to
    pub current_date: NaiveDate,
    /// Actual cash flow income
    pub total_income: Money,
    /// Employment income after the rent program deduction
    pub employment_income_after_rent_program: Money,
    /// Employee share of social security, explicit or estimated
    pub social_security_expense: Money,
    /// Employment income converted to its taxable equivalent
    pub employment_income_for_tax: Money,
    /// Deduction granted on employment income. Informational.
    pub employment_income_deduction: Money,
    pub total_income_for_tax: Money,
    pub deduction_dependents: Money,
    pub deduction_total: Money,
    /// Floored at zero: tax losses are not carried
    pub taxable_income: Money,
    pub national_income_tax_bracket: TaxBracket,
    pub national_income_tax_rate: Rate,
    pub national_income_tax: Money,
    /// Inhabitant tax, zero for non-residents
    pub local_income_tax: Money,
    pub total_income_tax: Money,
    /// Cash left after taxes and social security
    pub net_income_after_tax: Money,
    pub effective_tax_rate: Rate,
}

// ---------------------------------------------------------------------------
// Derivation steps
// ---------------------------------------------------------------------------

/// Employee share of health insurance plus pension, truncated to whole yen.
/// The employer pays the other half.
fn estimate_social_security(income: Money) -> Money {
    let health = income.min(HEALTH_INSURANCE_SALARY_CAP) * HEALTH_INSURANCE_RATE;
    let pension = income.min(SOCIAL_PENSION_SALARY_CAP) * SOCIAL_PENSION_RATE;
    ((health + pension) * dec!(0.5)).trunc()
}

/// Convert gross employment income into the amount used for tax. Never more
/// than the gross amount itself.
fn employment_income_for_tax(income: Money) -> JpRealEstateResult<Money> {
    let band = lookup(income, &EMPLOYMENT_INCOME_FOR_TAX_TABLE, "employment income conversion")?;
    Ok(band.formula.apply(income).trunc().min(income))
}

/// Marginal tax within the bracket plus the tax on all lower brackets, with
/// the restoration surcharge applied while it is in force.
fn national_income_tax(taxable: Money, bracket: &TaxBracket, current_date: NaiveDate) -> Money {
    let marginal = (taxable - bracket.lower_bound) * bracket.rate;
    let mut total = bracket.previous_brackets_sum + marginal;
    if current_date < RESTORATION_TAX_EXPIRY {
        total *= Decimal::ONE + RESTORATION_TAX;
    }
    total.trunc()
}

impl IncomeTaxCalc {
    pub fn new(input: IncomeTaxInput) -> JpRealEstateResult<Self> {
        let mut calc = IncomeTaxCalc {
            input,
            current_date: today(),
            total_income: Decimal::ZERO,
            employment_income_after_rent_program: Decimal::ZERO,
            social_security_expense: Decimal::ZERO,
            employment_income_for_tax: Decimal::ZERO,
            employment_income_deduction: Decimal::ZERO,
            total_income_for_tax: Decimal::ZERO,
            deduction_dependents: Decimal::ZERO,
            deduction_total: Decimal::ZERO,
            taxable_income: Decimal::ZERO,
            national_income_tax_bracket: NATIONAL_INCOME_TAX_TABLE[0].clone(),
            national_income_tax_rate: Decimal::ZERO,
            national_income_tax: Decimal::ZERO,
            local_income_tax: Decimal::ZERO,
            total_income_tax: Decimal::ZERO,
            net_income_after_tax: Decimal::ZERO,
            effective_tax_rate: Decimal::ZERO,
        };
        calc.recalculate()?;
        Ok(calc)
    }

    /// Recompute every derived field from the current inputs, in dependency
    /// order. Idempotent for unchanged inputs.
    pub fn recalculate(&mut self) -> JpRealEstateResult<()> {
        self.current_date = self.input.current_date.unwrap_or_else(today);

        self.total_income = self.input.employment_income + self.input.other_income;

        let rent_deduction = if self.input.is_rent_program {
            self.input.rent * LEGAL_RENT_RATE
        } else {
            Decimal::ZERO
        };
        self.employment_income_after_rent_program = self.input.employment_income - rent_deduction;

        self.social_security_expense = match self.input.social_security_expense {
            Some(expense) => expense,
            None => estimate_social_security(self.employment_income_after_rent_program),
        };

        self.employment_income_for_tax =
            employment_income_for_tax(self.employment_income_after_rent_program)?;
        self.employment_income_deduction =
            self.employment_income_after_rent_program - self.employment_income_for_tax;
        self.total_income_for_tax = self.employment_income_for_tax + self.input.other_income;

        self.deduction_dependents =
            Decimal::from(self.input.number_of_dependents) * DEDUCTION_PER_DEPENDENT;
        self.deduction_total = self.input.medical_expense.min(MEDICAL_EXPENSE_DEDUCTION_CAP)
            + self.social_security_expense
            + self.input.life_insurance_premium
            + DEDUCTION_BASIC
            + self.deduction_dependents;
        self.taxable_income = (self.total_income_for_tax - self.deduction_total).max(Decimal::ZERO);

        let bracket = lookup(self.taxable_income, &NATIONAL_INCOME_TAX_TABLE, "national income tax")?;
        self.national_income_tax_bracket = bracket.clone();
        self.national_income_tax_rate = bracket.rate;
        self.national_income_tax =
            national_income_tax(self.taxable_income, bracket, self.current_date);

        self.local_income_tax = if self.input.is_resident_for_tax_purposes {
            self.taxable_income * LOCAL_INCOME_TAX_RATE
        } else {
            Decimal::ZERO
        };

        self.total_income_tax = (self.national_income_tax + self.local_income_tax
            - self.input.tax_deduction)
            .max(Decimal::ZERO);

        self.net_income_after_tax =
            self.total_income - self.total_income_tax - self.social_security_expense;

        self.effective_tax_rate = if self.total_income.is_zero() {
            Decimal::ZERO
        } else {
            Decimal::ONE - self.net_income_after_tax / self.total_income
        };

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_input() -> IncomeTaxInput {
        IncomeTaxInput {
            employment_income: dec!(20_000_000),
            rent: dec!(2_400_000),
            is_rent_program: true,
            other_income: dec!(1_000_000),
            life_insurance_premium: dec!(30_000),
            medical_expense: dec!(10_000),
            number_of_dependents: 2,
            social_security_expense: None,
            tax_deduction: dec!(100_000),
            is_resident_for_tax_purposes: true,
            current_date: NaiveDate::from_ymd_opt(2016, 1, 1),
        }
    }

    #[test]
    fn test_total_income() {
        let calc = IncomeTaxCalc::new(IncomeTaxInput {
            employment_income: dec!(10_000_000),
            other_income: dec!(1_000_000),
            ..IncomeTaxInput::default()
        })
        .unwrap();
        assert_eq!(calc.total_income, dec!(11_000_000));
    }

    #[test]
    fn test_rent_program_reduces_employment_income() {
        let mut input = IncomeTaxInput {
            employment_income: dec!(10_000_000),
            rent: dec!(1_800_000),
            is_rent_program: false,
            ..IncomeTaxInput::default()
        };
        let calc = IncomeTaxCalc::new(input.clone()).unwrap();
        assert_eq!(calc.employment_income_after_rent_program, dec!(10_000_000));

        input.is_rent_program = true;
        let calc = IncomeTaxCalc::new(input).unwrap();
        // 10,000,000 - 1,800,000 * 0.95
        assert_eq!(calc.employment_income_after_rent_program, dec!(8_290_000));
    }

    #[test]
    fn test_social_security_explicit_or_estimated() {
        let calc = IncomeTaxCalc::new(IncomeTaxInput {
            employment_income: dec!(10_000_000),
            social_security_expense: Some(dec!(200_000)),
            ..IncomeTaxInput::default()
        })
        .unwrap();
        assert_eq!(calc.social_security_expense, dec!(200_000));

        assert_eq!(estimate_social_security(dec!(10_000_000)), dec!(1_195_230));
    }

    #[test]
    fn test_employment_income_for_tax() {
        assert_eq!(
            employment_income_for_tax(dec!(10_000_000)).unwrap(),
            dec!(7_800_000)
        );
        // Below the first threshold nothing is taxable
        assert_eq!(employment_income_for_tax(dec!(500_000)).unwrap(), dec!(0));
        // Never exceeds the gross amount
        assert_eq!(
            employment_income_for_tax(dec!(651_000)).unwrap(),
            dec!(1_000)
        );
    }

    #[test]
    fn test_deductions() {
        let calc = IncomeTaxCalc::new(IncomeTaxInput {
            medical_expense: dec!(2_500_000),
            social_security_expense: Some(dec!(1_000_000)),
            life_insurance_premium: dec!(200_000),
            number_of_dependents: 3,
            ..IncomeTaxInput::default()
        })
        .unwrap();
        assert_eq!(calc.deduction_dependents, dec!(1_140_000));
        // Medical expenses are capped at 2,000,000
        assert_eq!(
            calc.deduction_total,
            dec!(2_000_000) + dec!(1_000_000) + dec!(200_000) + dec!(1_140_000) + dec!(380_000)
        );
    }

    #[test]
    fn test_taxable_income_floors_at_zero() {
        let calc = IncomeTaxCalc::new(IncomeTaxInput {
            other_income: dec!(-5_000_000),
            ..IncomeTaxInput::default()
        })
        .unwrap();
        assert_eq!(calc.taxable_income, dec!(0));
    }

    #[test]
    fn test_national_income_tax_with_and_without_surcharge() {
        let bracket = &NATIONAL_INCOME_TAX_TABLE[6];

        let after_expiry = NaiveDate::from_ymd_opt(2040, 12, 25).unwrap();
        assert_eq!(
            national_income_tax(dec!(50_000_000), bracket, after_expiry),
            dec!(17_703_999)
        );

        let before_expiry = NaiveDate::from_ymd_opt(2016, 12, 25).unwrap();
        assert_eq!(
            national_income_tax(dec!(50_000_000), bracket, before_expiry),
            dec!(18_075_783)
        );
    }

    #[test]
    fn test_local_income_tax_depends_on_residency() {
        // 10,380,000 of other income less the basic deduction leaves exactly
        // 10,000,000 taxable
        let mut input = IncomeTaxInput {
            other_income: dec!(10_380_000),
            is_resident_for_tax_purposes: false,
            ..IncomeTaxInput::default()
        };
        let calc = IncomeTaxCalc::new(input.clone()).unwrap();
        assert_eq!(calc.taxable_income, dec!(10_000_000));
        assert_eq!(calc.local_income_tax, dec!(0));

        input.is_resident_for_tax_purposes = true;
        let calc = IncomeTaxCalc::new(input).unwrap();
        assert_eq!(calc.local_income_tax, dec!(1_000_000));
    }

    #[test]
    fn test_total_income_tax_floors_at_zero() {
        let mut calc = IncomeTaxCalc::new(sample_input()).unwrap();
        calc.input.tax_deduction = dec!(100_000_000);
        calc.recalculate().unwrap();
        assert_eq!(calc.total_income_tax, dec!(0));
    }

    #[test]
    fn test_effective_tax_rate_zero_income() {
        let calc = IncomeTaxCalc::new(IncomeTaxInput::default()).unwrap();
        assert_eq!(calc.effective_tax_rate, dec!(0));
    }

    #[test]
    fn test_sample_profile_regression() {
        let calc = IncomeTaxCalc::new(sample_input()).unwrap();

        assert_eq!(calc.employment_income_after_rent_program, dec!(17_720_000));
        assert_eq!(calc.social_security_expense, dec!(1_527_894));
        assert_eq!(calc.employment_income_for_tax, dec!(15_420_000));
        assert_eq!(calc.taxable_income, dec!(13_712_106));
        assert_eq!(calc.national_income_tax_rate, dec!(0.33));
        assert_eq!(calc.national_income_tax, dec!(3_051_763));
        assert!((calc.effective_tax_rate - dec!(0.27861)).abs() < dec!(0.0001));
    }

    #[test]
    fn test_recalculate_is_idempotent() {
        let mut calc = IncomeTaxCalc::new(sample_input()).unwrap();
        let snapshot = calc.clone();
        calc.recalculate().unwrap();
        assert_eq!(calc, snapshot);
    }

    #[test]
    fn test_clone_is_independent() {
        let calc = IncomeTaxCalc::new(sample_input()).unwrap();
        let mut copied = calc.clone();
        copied.input.other_income += dec!(1_000_000);
        copied.recalculate().unwrap();
        assert!(copied.total_income_tax > calc.total_income_tax);
        assert_eq!(calc.total_income_tax, IncomeTaxCalc::new(sample_input()).unwrap().total_income_tax);
    }
}

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::JpRealEstateError;
use crate::income_tax::IncomeTaxCalc;
use crate::mortgage::Mortgage;
use crate::types::{add_years, today, Money, Rate, CONSUMPTION_TAX, RESTORATION_TAX, RESTORATION_TAX_EXPIRY};
use crate::JpRealEstateResult;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// 5% of rent is the usual management fee in Tokyo
const RENTAL_MANAGEMENT_FEE_DEFAULT: Rate = dec!(0.05);

/// One month for a new tenant, half a month for a renewal, a two-year cycle
/// and a 50/50 split between the two: (1/24 + 0.5/24) / 2
const RENTAL_MANAGEMENT_RENEWAL_DEFAULT: Rate = dec!(0.03125);

/// Second-hand buildings depreciate over useful_life - 0.8 * age
const DEPRECIATION_AGE_FACTOR_IF_SECOND_HAND: Rate = dec!(0.8);

const CAPITAL_GAINS_TAX_SHORT_NATIONAL: Rate = dec!(0.30);
const CAPITAL_GAINS_TAX_SHORT_MUNICIPAL: Rate = dec!(0.09);
const CAPITAL_GAINS_TAX_LONG_NATIONAL: Rate = dec!(0.15);
const CAPITAL_GAINS_TAX_LONG_MUNICIPAL: Rate = dec!(0.05);

/// Per owned share, so a jointly owned residence deducts twice this
const CAPITAL_GAINS_TAX_PRIMARY_RESIDENCE_DEDUCTION: Money = dec!(30_000_000);

/// Home loan deduction runs for the first ten years of ownership
const HOME_LOAN_DEDUCTION_YEARS: u32 = 10;
const HOME_LOAN_DEDUCTION_NEW: Money = dec!(400_000);
const HOME_LOAN_DEDUCTION_SECOND_HAND: Money = dec!(200_000);
const HOME_LOAN_DEDUCTION_MIN_SIZE: Decimal = dec!(50);
const HOME_LOAN_DEDUCTION_MAX_TAXABLE_INCOME: Money = dec!(30_000_000);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Parameters of one property scenario.
///
/// Excluded here, as in any single-property individual-ownership model:
/// intra-year cash flow timing, corporate contracts, mid-year purchases and
/// sales, multiple properties, and yield changes over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealEstateInput {
    // Initial purchase
    /// Date the property was purchased. Defaults to today when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<NaiveDate>,
    /// Market value of the property
    pub purchase_price: Money,
    /// Share of the price allocated to the building rather than the land.
    /// Normally stated in the contract, or derivable from the consumption
    /// tax charged (land carries none).
    pub building_to_land_ratio: Rate,
    /// Property size in square metres
    pub size: Decimal,
    /// Property age in years. Zero means brand new.
    pub age: u32,
    /// Share of the bank-assessed value that is financed. Zero means an
    /// all-cash purchase.
    pub mortgage_loan_to_value: Rate,
    /// Bank-assessed value over actual market value
    pub bank_valuation_to_actual: Rate,
    /// Term of the loan in years
    pub mortgage_tenor: u32,
    /// Annual interest rate (0.01 for 1%)
    pub mortgage_rate: Rate,
    /// Sum of all fees paid to initiate the mortgage
    pub mortgage_initiation_fees: Money,
    /// Amount paid to renovate the property after purchase
    pub renovation_cost: Money,

    // Applied both at purchase and at sale
    /// Agent fee as a share of the price
    pub agent_fee_variable: Rate,
    /// Agent fee paid on top of the variable part
    pub agent_fee_fixed: Money,
    /// Stamp duty, acquisition tax and scrivener fees, as a share of the
    /// price
    pub other_transaction_fees: Rate,

    // Ongoing concern
    /// Monthly building management and sinking fund fees
    pub monthly_fees: Money,
    /// Annual possession tax as a share of the purchase price
    pub property_tax_rate: Rate,
    /// Annual maintenance per square metre
    pub maintenance_per_m2: Money,
    /// Years for the building book value to depreciate to zero from
    /// construction. 47 for reinforced concrete.
    pub useful_life: u32,
    /// Year index the scenario is evaluated at. Zero is the purchase year;
    /// the property is bought at the start of year 0 and sold at the end of
    /// `calc_year`.
    pub calc_year: u32,

    // Renting out
    /// Rental yield as a share of the purchase price, before fees
    pub gross_rental_yield: Rate,
    /// Share of annual rent the tenant pays when initiating or renewing the
    /// lease, key money included. Defaults to one month every two years.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_income_rate: Option<Rate>,
    /// Agent's share of annual rent, before consumption tax
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rental_management_rental_fee: Option<Rate>,
    /// Agent's share of annual rent whenever the lease turns over, before
    /// consumption tax
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rental_management_renewal_fee: Option<Rate>,

    // Final disposal
    /// 0 = investment property, 1 = primary residence, 2 = jointly owned
    /// primary residence
    pub is_primary_residence: u8,
    pub is_resident_for_tax_purposes: bool,
    /// Sale price. Defaults to the depreciated book value when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<Money>,
}

impl Default for RealEstateInput {
    fn default() -> Self {
        RealEstateInput {
            purchase_date: None,
            purchase_price: Decimal::ZERO,
            building_to_land_ratio: dec!(0.7),
            size: Decimal::ZERO,
            age: 0,
            mortgage_loan_to_value: Decimal::ZERO,
            bank_valuation_to_actual: Decimal::ONE,
            mortgage_tenor: 0,
            mortgage_rate: Decimal::ZERO,
            mortgage_initiation_fees: Decimal::ZERO,
            renovation_cost: Decimal::ZERO,
            agent_fee_variable: Decimal::ZERO,
            agent_fee_fixed: Decimal::ZERO,
            other_transaction_fees: Decimal::ZERO,
            monthly_fees: Decimal::ZERO,
            property_tax_rate: Decimal::ZERO,
            maintenance_per_m2: dec!(1000),
            useful_life: 47,
            calc_year: 0,
            gross_rental_yield: Decimal::ZERO,
            renewal_income_rate: None,
            rental_management_rental_fee: None,
            rental_management_renewal_fee: None,
            is_primary_residence: 0,
            is_resident_for_tax_purposes: false,
            sale_price: None,
        }
    }
}

/// Per-year income and tax figures produced while accumulating the
/// cumulative sum.
struct YearEconomics {
    total_expense: Money,
    net_income_before_taxes: Money,
    depreciation: Money,
    net_income_taxable: Money,
    home_loan_deduction: Money,
    income_tax: Money,
    income_tax_real_estate: Money,
    income_tax_shield: Money,
    net_income_after_taxes: Money,
}

/// Year-indexed pro-forma for owning real estate in Japan as an individual.
///
/// Owns its [`Mortgage`]; borrows the attached [`IncomeTaxCalc`] and never
/// mutates it, cloning it for every hypothetical assessment instead. Derived
/// fields are recomputed as a whole by [`RealEstateCalc::recalculate`], which
/// construction runs once; reading them after mutating `input` without
/// recalculating yields stale values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealEstateCalc<'a> {
    pub input: RealEstateInput,

    /// Tax profile of the owner, excluding this property's income
    #[serde(skip)]
    pub income_tax_calculator: Option<&'a IncomeTaxCalc>,

    // Resolved optional inputs
    pub purchase_date: NaiveDate,
    pub renewal_income_rate: Rate,
    pub rental_management_rental_fee: Rate,
    pub rental_management_renewal_fee: Rate,

    // Acquisition
    /// Amount of the purchase price loaned by the bank
    pub purchase_price_financed: Money,
    #[serde(skip)]
    pub mortgage: Option<Mortgage>,
    /// Purchase price allocated to the building, with consumption tax when
    /// bought new from a developer
    pub purchase_price_building: Money,
    pub purchase_price_land: Money,
    pub purchase_agent_fee: Money,
    pub purchase_other_transaction_fees: Money,
    /// Total expense for the purchase including every fee and tax
    pub purchase_price_and_fees: Money,
    /// Unfinanced cash required upfront
    pub purchase_initial_outlay: Money,

    // Ongoing concern
    /// Years over which the building value depreciates to zero
    pub depreciation_years: u32,
    pub depreciation_annual: Money,
    pub rental_income: Money,
    pub renewal_income: Money,
    /// Annual income from the tenant
    pub total_income: Money,
    pub maintenance_expense: Money,
    pub monthly_fees_annualized: Money,
    pub rental_management_renewal_expense: Money,
    pub rental_management_rental_expense: Money,
    pub rental_management_total_expense: Money,
    pub property_tax_expense: Money,
    /// Date corresponding to `calc_year`
    pub calc_date: NaiveDate,
    /// Annual recurring expense at `calc_year`, mortgage payments included
    /// while the loan runs
    pub total_expense: Money,
    /// Actual cash flow income at `calc_year`
    pub net_income_before_taxes: Money,
    /// Depreciation recognized at `calc_year`
    pub depreciation: Money,
    /// Income used for tax at `calc_year`: cash income less depreciation and
    /// mortgage interest. Always zero for a primary residence.
    pub net_income_taxable: Money,
    /// Home loan tax credit at `calc_year`, for qualifying primary residences
    pub home_loan_deduction: Money,
    /// Total income tax owed at `calc_year` with this property's income
    /// included
    pub income_tax: Money,
    /// Portion of `income_tax` attributable to this property
    pub income_tax_real_estate: Money,
    /// Tax not paid because the property ran a tax loss this year
    pub income_tax_shield: Money,
    pub net_income_after_taxes: Money,
    /// Sum of `net_income_after_taxes` over years 0..=`calc_year`
    pub cumulative_net_income: Money,
    /// Loan principal still owed after `calc_year` ends
    pub mortgage_amount_outstanding: Money,

    // Disposal
    pub depreciation_cumulative: Money,
    pub depreciated_building_value: Money,
    /// Land value plus depreciated building value
    pub book_value: Money,
    /// Book value net of the outstanding loan
    pub equity_value: Money,
    pub sale_price: Money,
    pub sale_agent_fee: Money,
    pub sale_other_transaction_fees: Money,
    pub sale_proceeds_after_fees: Money,
    /// Capital gains basis. Mortgage and renovation costs are not part of it.
    pub acquisition_cost: Money,
    pub capital_gains_tax_primary_residence_deduction: Money,
    pub capital_gains: Money,
    pub capital_gains_tax_rate: Rate,
    pub capital_gains_tax: Money,
    pub sale_proceeds_net: Money,
    /// Headline all-in result: net sale proceeds plus cumulative income less
    /// everything paid to acquire
    pub net_income_on_realestate: Money,
}

// ---------------------------------------------------------------------------
// Derivation steps
// ---------------------------------------------------------------------------

/// Agent fee for a transaction at `price`, consumption tax included.
fn agent_fee(price: Money, variable: Rate, fixed: Money) -> Money {
    ((price * variable + fixed) * (Decimal::ONE + CONSUMPTION_TAX)).trunc()
}

/// Second-hand buildings lose 80% of their age from the remaining
/// depreciable life, truncated down. A building cannot depreciate longer
/// than its useful life.
fn depreciation_years(useful_life: u32, age: u32) -> u32 {
    if age == 0 {
        return useful_life;
    }
    let age_for_depreciation =
        Decimal::from(useful_life.min(age)) * DEPRECIATION_AGE_FACTOR_IF_SECOND_HAND;
    (Decimal::from(useful_life) - age_for_depreciation)
        .trunc()
        .to_u32()
        .unwrap_or(0)
}

/// Short-term gains (under five years) are taxed far heavier than long-term
/// ones; the municipal portion applies to residents only, and the
/// restoration surcharge while it is in force.
fn capital_gains_tax_rate(calc_year: u32, is_resident: bool, calc_date: NaiveDate) -> Rate {
    let mut rate = if calc_year < 5 {
        CAPITAL_GAINS_TAX_SHORT_NATIONAL
            + if is_resident {
                CAPITAL_GAINS_TAX_SHORT_MUNICIPAL
            } else {
                Decimal::ZERO
            }
    } else {
        CAPITAL_GAINS_TAX_LONG_NATIONAL
            + if is_resident {
                CAPITAL_GAINS_TAX_LONG_MUNICIPAL
            } else {
                Decimal::ZERO
            }
    };
    if calc_date < RESTORATION_TAX_EXPIRY {
        rate *= Decimal::ONE + RESTORATION_TAX;
    }
    rate
}

impl<'a> RealEstateCalc<'a> {
    pub fn new(
        input: RealEstateInput,
        income_tax_calculator: Option<&'a IncomeTaxCalc>,
    ) -> JpRealEstateResult<Self> {
        let placeholder = today();
        let mut calc = RealEstateCalc {
            input,
            income_tax_calculator,
            purchase_date: placeholder,
            renewal_income_rate: Decimal::ZERO,
            rental_management_rental_fee: Decimal::ZERO,
            rental_management_renewal_fee: Decimal::ZERO,
            purchase_price_financed: Decimal::ZERO,
            mortgage: None,
            purchase_price_building: Decimal::ZERO,
            purchase_price_land: Decimal::ZERO,
            purchase_agent_fee: Decimal::ZERO,
            purchase_other_transaction_fees: Decimal::ZERO,
            purchase_price_and_fees: Decimal::ZERO,
            purchase_initial_outlay: Decimal::ZERO,
            depreciation_years: 0,
            depreciation_annual: Decimal::ZERO,
            rental_income: Decimal::ZERO,
            renewal_income: Decimal::ZERO,
            total_income: Decimal::ZERO,
            maintenance_expense: Decimal::ZERO,
            monthly_fees_annualized: Decimal::ZERO,
            rental_management_renewal_expense: Decimal::ZERO,
            rental_management_rental_expense: Decimal::ZERO,
            rental_management_total_expense: Decimal::ZERO,
            property_tax_expense: Decimal::ZERO,
            calc_date: placeholder,
            total_expense: Decimal::ZERO,
            net_income_before_taxes: Decimal::ZERO,
            depreciation: Decimal::ZERO,
            net_income_taxable: Decimal::ZERO,
            home_loan_deduction: Decimal::ZERO,
            income_tax: Decimal::ZERO,
            income_tax_real_estate: Decimal::ZERO,
            income_tax_shield: Decimal::ZERO,
            net_income_after_taxes: Decimal::ZERO,
            cumulative_net_income: Decimal::ZERO,
            mortgage_amount_outstanding: Decimal::ZERO,
            depreciation_cumulative: Decimal::ZERO,
            depreciated_building_value: Decimal::ZERO,
            book_value: Decimal::ZERO,
            equity_value: Decimal::ZERO,
            sale_price: Decimal::ZERO,
            sale_agent_fee: Decimal::ZERO,
            sale_other_transaction_fees: Decimal::ZERO,
            sale_proceeds_after_fees: Decimal::ZERO,
            acquisition_cost: Decimal::ZERO,
            capital_gains_tax_primary_residence_deduction: Decimal::ZERO,
            capital_gains: Decimal::ZERO,
            capital_gains_tax_rate: Decimal::ZERO,
            capital_gains_tax: Decimal::ZERO,
            sale_proceeds_net: Decimal::ZERO,
            net_income_on_realestate: Decimal::ZERO,
        };
        calc.recalculate()?;
        Ok(calc)
    }

    /// Recompute every derived field from the current inputs, in dependency
    /// order. Idempotent for unchanged inputs.
    pub fn recalculate(&mut self) -> JpRealEstateResult<()> {
        self.resolve_defaults();
        self.compute_acquisition();
        self.compute_ongoing()?;
        self.compute_disposal()?;
        Ok(())
    }

    fn resolve_defaults(&mut self) {
        self.purchase_date = self.input.purchase_date.unwrap_or_else(today);
        // Lease renewed every two years with one month of rent paid by the
        // tenant
        self.renewal_income_rate = self
            .input
            .renewal_income_rate
            .unwrap_or(Decimal::ONE / dec!(24));
        self.rental_management_rental_fee = self
            .input
            .rental_management_rental_fee
            .unwrap_or(RENTAL_MANAGEMENT_FEE_DEFAULT);
        self.rental_management_renewal_fee = self
            .input
            .rental_management_renewal_fee
            .unwrap_or(RENTAL_MANAGEMENT_RENEWAL_DEFAULT);
    }

    fn compute_acquisition(&mut self) {
        let input = &self.input;

        self.purchase_price_financed = (input.purchase_price
            * input.bank_valuation_to_actual
            * input.mortgage_loan_to_value)
            .trunc();
        self.mortgage = if self.purchase_price_financed > Decimal::ZERO {
            Some(Mortgage::new(
                self.purchase_price_financed,
                input.mortgage_tenor,
                input.mortgage_rate,
            ))
        } else {
            None
        };

        let mut building = (input.purchase_price * input.building_to_land_ratio).trunc();
        // Brand new properties are bought from a developer, so the building
        // carries consumption tax; sales between individuals do not
        if input.age == 0 {
            building *= Decimal::ONE + CONSUMPTION_TAX;
        }
        self.purchase_price_building = building;
        self.purchase_price_land = input.purchase_price - building;

        self.purchase_agent_fee =
            agent_fee(input.purchase_price, input.agent_fee_variable, input.agent_fee_fixed);
        self.purchase_other_transaction_fees =
            (input.purchase_price * input.other_transaction_fees).trunc();
        self.purchase_price_and_fees = (input.purchase_price
            + self.purchase_agent_fee
            + self.purchase_other_transaction_fees
            + input.mortgage_initiation_fees
            + input.renovation_cost)
            .trunc();
        // Financing concern rather than investment economics, so not part of
        // any income figure
        self.purchase_initial_outlay = self.purchase_price_and_fees - self.purchase_price_financed;
    }

    fn compute_ongoing(&mut self) -> JpRealEstateResult<()> {
        let input = &self.input;

        self.depreciation_years = depreciation_years(input.useful_life, input.age);
        self.depreciation_annual = if self.depreciation_years == 0 {
            Decimal::ZERO
        } else {
            (self.purchase_price_building / Decimal::from(self.depreciation_years)).trunc()
        };

        self.rental_income = (input.purchase_price * input.gross_rental_yield).trunc();
        self.renewal_income = (self.renewal_income_rate * self.rental_income).trunc();
        self.total_income = self.rental_income + self.renewal_income;

        self.maintenance_expense = (input.maintenance_per_m2 * input.size).trunc();
        self.monthly_fees_annualized = input.monthly_fees * dec!(12);
        self.rental_management_renewal_expense = (self.rental_income
            * self.rental_management_renewal_fee
            * (Decimal::ONE + CONSUMPTION_TAX))
            .trunc();
        self.rental_management_rental_expense = (self.rental_income
            * self.rental_management_rental_fee
            * (Decimal::ONE + CONSUMPTION_TAX))
            .trunc();
        self.rental_management_total_expense =
            self.rental_management_renewal_expense + self.rental_management_rental_expense;
        self.property_tax_expense = (input.purchase_price * input.property_tax_rate).trunc();

        self.calc_date = add_years(self.purchase_date, input.calc_year);

        // The figures below vary by year because mortgage payments, their
        // interest component and depreciation do. One pass over
        // 0..=calc_year yields the cumulative sum without recomputing the
        // whole entity per year.
        let calc_year = input.calc_year;
        let mut cumulative = Decimal::ZERO;
        for year in 0..=calc_year {
            let economics = self.year_economics(year)?;
            cumulative += economics.net_income_after_taxes;
            if year == calc_year {
                self.total_expense = economics.total_expense;
                self.net_income_before_taxes = economics.net_income_before_taxes;
                self.depreciation = economics.depreciation;
                self.net_income_taxable = economics.net_income_taxable;
                self.home_loan_deduction = economics.home_loan_deduction;
                self.income_tax = economics.income_tax;
                self.income_tax_real_estate = economics.income_tax_real_estate;
                self.income_tax_shield = economics.income_tax_shield;
                self.net_income_after_taxes = economics.net_income_after_taxes;
            }
        }
        self.cumulative_net_income = cumulative;

        self.mortgage_amount_outstanding = match &self.mortgage {
            Some(mortgage) => mortgage.principal_outstanding_after_year(calc_year).trunc(),
            None => Decimal::ZERO,
        };

        Ok(())
    }

    /// Income, expense and tax figures for one year of ownership.
    fn year_economics(&self, year: u32) -> JpRealEstateResult<YearEconomics> {
        let input = &self.input;
        let mortgage_active = self.mortgage.as_ref().filter(|m| year < m.tenor);

        let mut total_expense = (self.maintenance_expense
            + self.monthly_fees_annualized
            + self.rental_management_total_expense
            + self.property_tax_expense)
            .trunc();
        if let Some(mortgage) = mortgage_active {
            total_expense += (mortgage.monthly_payment * dec!(12)).trunc();
        }

        let net_income_before_taxes = self.total_income - total_expense;
        let depreciation = self.depreciation_for_year(year);

        // Cash income and taxable income differ: depreciation is a tax
        // expense but not a cash one, and only the interest portion of the
        // mortgage is a tax expense. A primary residence can claim neither,
        // nor declare the income.
        let net_income_taxable = if input.is_primary_residence > 0 {
            Decimal::ZERO
        } else {
            let mut taxable = self.total_income - total_expense - depreciation;
            if let Some(mortgage) = mortgage_active {
                taxable -= mortgage.interest_for_year(year).trunc();
            }
            taxable
        };

        let mut home_loan_deduction = Decimal::ZERO;
        let qualifies = input.is_primary_residence > 0
            && year < HOME_LOAN_DEDUCTION_YEARS
            && input.size > HOME_LOAN_DEDUCTION_MIN_SIZE
            && mortgage_active.is_some()
            && self
                .income_tax_calculator
                .is_some_and(|calc| calc.taxable_income < HOME_LOAN_DEDUCTION_MAX_TAXABLE_INCOME);
        if qualifies {
            let base = if input.age == 0 {
                HOME_LOAN_DEDUCTION_NEW
            } else {
                HOME_LOAN_DEDUCTION_SECOND_HAND
            };
            if let Some(mortgage) = mortgage_active {
                let remaining = mortgage.payments_remaining_from_year(year);
                home_loan_deduction = base.min(remaining).trunc();
            }
        }

        let calc_date = add_years(self.purchase_date, year);
        let (income_tax, income_tax_real_estate, income_tax_shield) =
            match self.income_tax_calculator {
                Some(base_calc) => {
                    // Assess the owner's taxes with this year's property
                    // income and credit added, on a clone so the attached
                    // profile stays untouched
                    let mut with_property = base_calc.clone();
                    with_property.input.current_date = Some(calc_date);
                    with_property.input.other_income += net_income_taxable;
                    with_property.input.tax_deduction += home_loan_deduction;
                    with_property.recalculate()?;

                    let income_tax = with_property.total_income_tax.trunc();
                    let real_estate =
                        (income_tax - base_calc.total_income_tax).max(Decimal::ZERO).trunc();
                    let shield =
                        (base_calc.total_income_tax - income_tax).max(Decimal::ZERO).trunc();
                    (income_tax, real_estate, shield)
                }
                None => (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
            };

        let net_income_after_taxes = net_income_before_taxes - income_tax_real_estate;

        Ok(YearEconomics {
            total_expense,
            net_income_before_taxes,
            depreciation,
            net_income_taxable,
            home_loan_deduction,
            income_tax,
            income_tax_real_estate,
            income_tax_shield,
            net_income_after_taxes,
        })
    }

    /// Depreciation recognized in a given year of ownership.
    pub fn depreciation_for_year(&self, year: u32) -> Money {
        if year < self.depreciation_years {
            self.depreciation_annual
        } else {
            Decimal::ZERO
        }
    }

    fn compute_disposal(&mut self) -> JpRealEstateResult<()> {
        let input = &self.input;

        let mut cumulative = Decimal::ZERO;
        for year in 0..=input.calc_year {
            cumulative += self.depreciation_for_year(year);
        }
        self.depreciation_cumulative = cumulative;
        self.depreciated_building_value = (self.purchase_price_building - cumulative).trunc();
        self.book_value = (self.purchase_price_land + self.depreciated_building_value).trunc();
        self.equity_value = self.book_value - self.mortgage_amount_outstanding;

        // Book value is the conservative estimate: depreciation to zero over
        // the useful life and no capital gain
        self.sale_price = input.sale_price.unwrap_or(self.book_value);
        self.sale_agent_fee =
            agent_fee(self.sale_price, input.agent_fee_variable, input.agent_fee_fixed);
        self.sale_other_transaction_fees =
            (self.sale_price * input.other_transaction_fees).trunc();
        self.sale_proceeds_after_fees =
            self.sale_price - self.sale_agent_fee - self.sale_other_transaction_fees;

        self.acquisition_cost = input.purchase_price
            + self.purchase_agent_fee
            + self.purchase_other_transaction_fees;

        self.capital_gains_tax_primary_residence_deduction = match input.is_primary_residence {
            code @ (0 | 1 | 2) => {
                CAPITAL_GAINS_TAX_PRIMARY_RESIDENCE_DEDUCTION * Decimal::from(code)
            }
            other => {
                return Err(JpRealEstateError::InvalidInput {
                    field: "is_primary_residence".into(),
                    reason: format!("{} is not one of 0 (no), 1 (sole) or 2 (joint)", other),
                })
            }
        };

        self.capital_gains = (self.sale_proceeds_after_fees
            - (self.acquisition_cost - self.depreciation_cumulative))
            .max(Decimal::ZERO);
        self.capital_gains_tax_rate = capital_gains_tax_rate(
            input.calc_year,
            input.is_resident_for_tax_purposes,
            self.calc_date,
        );
        self.capital_gains_tax = (self.capital_gains * self.capital_gains_tax_rate
            - self.capital_gains_tax_primary_residence_deduction)
            .trunc()
            .max(Decimal::ZERO);
        self.sale_proceeds_net = self.sale_proceeds_after_fees - self.capital_gains_tax;

        self.net_income_on_realestate =
            self.sale_proceeds_net + self.cumulative_net_income - self.purchase_price_and_fees;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::income_tax::IncomeTaxInput;
    use pretty_assertions::assert_eq;

    fn sample_tax_input() -> IncomeTaxInput {
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

    fn tokyo_tower_input() -> RealEstateInput {
        RealEstateInput {
            purchase_date: NaiveDate::from_ymd_opt(2017, 1, 24),
            purchase_price: dec!(100_000_000),
            building_to_land_ratio: dec!(0.7),
            size: dec!(100),
            age: 0,
            mortgage_loan_to_value: dec!(0.9),
            bank_valuation_to_actual: dec!(1),
            mortgage_tenor: 30,
            mortgage_rate: dec!(0.01),
            mortgage_initiation_fees: dec!(10_000),
            agent_fee_variable: dec!(0.03),
            agent_fee_fixed: dec!(20_000),
            other_transaction_fees: dec!(0.01),
            monthly_fees: dec!(20_000),
            property_tax_rate: dec!(0.01),
            maintenance_per_m2: dec!(1000),
            useful_life: 47,
            calc_year: 32,
            gross_rental_yield: dec!(0.04),
            is_primary_residence: 0,
            is_resident_for_tax_purposes: true,
            sale_price: Some(dec!(47_000_000)),
            ..RealEstateInput::default()
        }
    }

    #[test]
    fn test_optional_inputs_resolve_to_defaults() {
        let calc = RealEstateCalc::new(RealEstateInput::default(), None).unwrap();
        assert_eq!(calc.renewal_income_rate, Decimal::ONE / dec!(24));
        assert_eq!(calc.rental_management_rental_fee, dec!(0.05));
        assert_eq!(calc.rental_management_renewal_fee, dec!(0.03125));
        assert_eq!(calc.purchase_date, today());

        let explicit = RealEstateInput {
            renewal_income_rate: Some(dec!(0)),
            rental_management_rental_fee: Some(dec!(0.04)),
            rental_management_renewal_fee: Some(dec!(0.06)),
            ..RealEstateInput::default()
        };
        let calc = RealEstateCalc::new(explicit, None).unwrap();
        assert_eq!(calc.renewal_income_rate, dec!(0));
        assert_eq!(calc.rental_management_rental_fee, dec!(0.04));
        assert_eq!(calc.rental_management_renewal_fee, dec!(0.06));
    }

    #[test]
    fn test_financed_amount_and_mortgage() {
        let input = RealEstateInput {
            purchase_price: dec!(10_000_000),
            mortgage_loan_to_value: dec!(0.25),
            bank_valuation_to_actual: dec!(0.5),
            mortgage_tenor: 30,
            mortgage_rate: dec!(0.01),
            ..RealEstateInput::default()
        };
        let calc = RealEstateCalc::new(input, None).unwrap();
        assert_eq!(calc.purchase_price_financed, dec!(1_250_000));
        let mortgage = calc.mortgage.as_ref().unwrap();
        assert_eq!(mortgage.principal, dec!(1_250_000));
        assert_eq!(mortgage.tenor, 30);
        assert_eq!(mortgage.rate, dec!(0.01));

        // All-cash purchase has no mortgage
        let calc = RealEstateCalc::new(RealEstateInput::default(), None).unwrap();
        assert!(calc.mortgage.is_none());
    }

    #[test]
    fn test_building_land_split_and_consumption_tax() {
        let mut input = RealEstateInput {
            purchase_price: dec!(100_000_000),
            building_to_land_ratio: dec!(0.5),
            age: 1,
            ..RealEstateInput::default()
        };
        let calc = RealEstateCalc::new(input.clone(), None).unwrap();
        assert_eq!(calc.purchase_price_building, dec!(50_000_000));
        assert_eq!(calc.purchase_price_land, dec!(50_000_000));

        // New construction carries consumption tax on the building portion
        input.age = 0;
        let calc = RealEstateCalc::new(input, None).unwrap();
        assert_eq!(calc.purchase_price_building, dec!(54_000_000));
        assert_eq!(calc.purchase_price_land, dec!(46_000_000));
    }

    #[test]
    fn test_depreciation_years() {
        // Brand new reinforced concrete
        assert_eq!(depreciation_years(47, 0), 47);
        // 10 year old reinforced concrete
        assert_eq!(depreciation_years(47, 10), 39);
        // 40 year old wooden house
        assert_eq!(depreciation_years(20, 40), 4);
    }

    #[test]
    fn test_depreciation_for_year() {
        let input = RealEstateInput {
            purchase_price: dec!(100_000_000),
            building_to_land_ratio: dec!(0.5),
            age: 27,
            useful_life: 47,
            ..RealEstateInput::default()
        };
        let calc = RealEstateCalc::new(input, None).unwrap();
        // 47 - 27 * 0.8 = 25 (truncated), 50M building over 25 years
        assert_eq!(calc.depreciation_years, 25);
        assert_eq!(calc.depreciation_annual, dec!(2_000_000));
        assert_eq!(calc.depreciation_for_year(24), dec!(2_000_000));
        assert_eq!(calc.depreciation_for_year(25), dec!(0));
    }

    #[test]
    fn test_mortgage_expense_only_while_loan_runs() {
        let base = RealEstateInput {
            purchase_price: dec!(10_000_000),
            gross_rental_yield: dec!(0.05),
            mortgage_loan_to_value: dec!(1),
            mortgage_rate: dec!(0.01),
            mortgage_tenor: 1,
            renewal_income_rate: Some(dec!(0)),
            rental_management_rental_fee: Some(dec!(0)),
            rental_management_renewal_fee: Some(dec!(0)),
            ..RealEstateInput::default()
        };

        let calc = RealEstateCalc::new(base.clone(), None).unwrap();
        let annual_payment =
            (calc.mortgage.as_ref().unwrap().monthly_payment * dec!(12)).trunc();
        assert_eq!(calc.total_expense, annual_payment);
        assert_eq!(calc.net_income_before_taxes, dec!(500_000) - annual_payment);

        // The year after the loan matures it no longer burdens expenses
        let calc = RealEstateCalc::new(
            RealEstateInput {
                calc_year: 1,
                ..base
            },
            None,
        )
        .unwrap();
        assert_eq!(calc.total_expense, dec!(0));
        assert_eq!(calc.net_income_before_taxes, dec!(500_000));
    }

    #[test]
    fn test_net_income_taxable_deducts_interest_and_depreciation() {
        // Building ratio 0 so depreciation is zero; financed in full
        let base = RealEstateInput {
            purchase_price: dec!(20_000_000),
            building_to_land_ratio: dec!(0),
            age: 1,
            gross_rental_yield: dec!(0.1),
            mortgage_loan_to_value: dec!(1),
            mortgage_rate: dec!(0.01),
            mortgage_tenor: 10,
            renewal_income_rate: Some(dec!(0)),
            rental_management_rental_fee: Some(dec!(0)),
            rental_management_renewal_fee: Some(dec!(0)),
            calc_year: 9,
            ..RealEstateInput::default()
        };

        let calc = RealEstateCalc::new(base.clone(), None).unwrap();
        let interest = calc.mortgage.as_ref().unwrap().interest_for_year(9).trunc();
        assert_eq!(interest, dec!(11_344));
        assert_eq!(
            calc.net_income_taxable,
            calc.net_income_before_taxes - interest
        );

        // Once matured the interest deduction disappears
        let calc = RealEstateCalc::new(
            RealEstateInput {
                calc_year: 10,
                ..base.clone()
            },
            None,
        )
        .unwrap();
        assert_eq!(calc.net_income_taxable, calc.net_income_before_taxes);

        // A primary residence declares nothing
        let calc = RealEstateCalc::new(
            RealEstateInput {
                is_primary_residence: 1,
                ..base
            },
            None,
        )
        .unwrap();
        assert_eq!(calc.net_income_taxable, dec!(0));
    }

    #[test]
    fn test_home_loan_deduction_qualification() {
        let profile = IncomeTaxCalc::new(sample_tax_input()).unwrap();
        let base = RealEstateInput {
            purchase_price: dec!(60_000_000),
            mortgage_loan_to_value: dec!(1),
            mortgage_rate: dec!(0.01),
            mortgage_tenor: 30,
            is_primary_residence: 1,
            size: dec!(60),
            age: 0,
            calc_year: 9,
            ..RealEstateInput::default()
        };

        // Brand new and qualifying
        let calc = RealEstateCalc::new(base.clone(), Some(&profile)).unwrap();
        assert_eq!(calc.home_loan_deduction, dec!(400_000));

        // Second hand and qualifying
        let calc = RealEstateCalc::new(
            RealEstateInput {
                age: 1,
                ..base.clone()
            },
            Some(&profile),
        )
        .unwrap();
        assert_eq!(calc.home_loan_deduction, dec!(200_000));

        // Capped at the remaining loan balance
        let calc = RealEstateCalc::new(
            RealEstateInput {
                purchase_price: dec!(1_000_000),
                mortgage_tenor: 11,
                age: 1,
                ..base.clone()
            },
            Some(&profile),
        )
        .unwrap();
        assert_eq!(calc.home_loan_deduction, dec!(192_077));

        // Disqualifications: not a residence, too small, past ten years,
        // no attached profile
        let calc = RealEstateCalc::new(
            RealEstateInput {
                is_primary_residence: 0,
                ..base.clone()
            },
            Some(&profile),
        )
        .unwrap();
        assert_eq!(calc.home_loan_deduction, dec!(0));

        let calc = RealEstateCalc::new(
            RealEstateInput {
                size: dec!(50),
                ..base.clone()
            },
            Some(&profile),
        )
        .unwrap();
        assert_eq!(calc.home_loan_deduction, dec!(0));

        let calc = RealEstateCalc::new(
            RealEstateInput {
                calc_year: 10,
                ..base.clone()
            },
            Some(&profile),
        )
        .unwrap();
        assert_eq!(calc.home_loan_deduction, dec!(0));

        let calc = RealEstateCalc::new(base, None).unwrap();
        assert_eq!(calc.home_loan_deduction, dec!(0));
    }

    #[test]
    fn test_income_tax_attribution() {
        let profile = IncomeTaxCalc::new(sample_tax_input()).unwrap();

        // A property yielding exactly 1,000,000 of taxable income:
        // no building, no expenses, no depreciation
        let input = RealEstateInput {
            purchase_date: NaiveDate::from_ymd_opt(2017, 1, 1),
            purchase_price: dec!(25_000_000),
            building_to_land_ratio: dec!(0),
            age: 1,
            gross_rental_yield: dec!(0.04),
            renewal_income_rate: Some(dec!(0)),
            rental_management_rental_fee: Some(dec!(0)),
            rental_management_renewal_fee: Some(dec!(0)),
            ..RealEstateInput::default()
        };
        let calc = RealEstateCalc::new(input, Some(&profile)).unwrap();
        assert_eq!(calc.net_income_taxable, dec!(1_000_000));
        assert_eq!(calc.income_tax, dec!(4_759_903));
        assert_eq!(
            calc.income_tax_real_estate,
            (calc.income_tax - profile.total_income_tax).trunc()
        );
        assert_eq!(calc.income_tax_shield, dec!(0));

        // The attached profile is left untouched
        let untouched = IncomeTaxCalc::new(sample_tax_input()).unwrap();
        assert_eq!(profile, untouched);

        // Without a profile no tax is assessed
        let calc = RealEstateCalc::new(RealEstateInput::default(), None).unwrap();
        assert_eq!(calc.income_tax, dec!(0));
        assert_eq!(calc.income_tax_real_estate, dec!(0));
    }

    #[test]
    fn test_cumulative_net_income_recurrence() {
        let base = RealEstateInput {
            purchase_price: dec!(10_000_000),
            gross_rental_yield: dec!(0.05),
            mortgage_loan_to_value: dec!(1),
            mortgage_rate: dec!(0.01),
            mortgage_tenor: 1,
            renewal_income_rate: Some(dec!(0)),
            rental_management_rental_fee: Some(dec!(0)),
            rental_management_renewal_fee: Some(dec!(0)),
            ..RealEstateInput::default()
        };

        // Year 0 pays a full year of mortgage out of the rent
        let calc = RealEstateCalc::new(base.clone(), None).unwrap();
        let annual_payment =
            (calc.mortgage.as_ref().unwrap().monthly_payment * dec!(12)).trunc();
        let year_0 = calc.net_income_after_taxes;
        assert_eq!(year_0, dec!(500_000) - annual_payment);
        assert_eq!(calc.cumulative_net_income, year_0);

        // Year 1 is pure rent, and the sum telescopes
        let mut calc = calc;
        calc.input.calc_year = 1;
        calc.recalculate().unwrap();
        assert_eq!(calc.net_income_after_taxes, dec!(500_000));
        assert_eq!(calc.cumulative_net_income, year_0 + dec!(500_000));

        calc.input.calc_year = 3;
        calc.recalculate().unwrap();
        assert_eq!(calc.cumulative_net_income, year_0 + dec!(500_000) * dec!(3));
    }

    #[test]
    fn test_mortgage_amount_outstanding() {
        let input = RealEstateInput {
            purchase_price: dec!(24_000_000),
            mortgage_loan_to_value: dec!(1),
            mortgage_tenor: 2,
            mortgage_rate: dec!(0),
            ..RealEstateInput::default()
        };
        let calc = RealEstateCalc::new(input.clone(), None).unwrap();
        assert_eq!(calc.mortgage_amount_outstanding, dec!(12_000_000));

        let calc = RealEstateCalc::new(
            RealEstateInput {
                calc_year: 1,
                ..input
            },
            None,
        )
        .unwrap();
        assert_eq!(calc.mortgage_amount_outstanding, dec!(0));

        let calc = RealEstateCalc::new(RealEstateInput::default(), None).unwrap();
        assert_eq!(calc.mortgage_amount_outstanding, dec!(0));
    }

    #[test]
    fn test_invalid_primary_residence_code() {
        let result = RealEstateCalc::new(
            RealEstateInput {
                is_primary_residence: 3,
                ..RealEstateInput::default()
            },
            None,
        );
        assert!(matches!(
            result,
            Err(JpRealEstateError::InvalidInput { ref field, .. }) if field == "is_primary_residence"
        ));
    }

    #[test]
    fn test_primary_residence_deduction_scales_with_share() {
        for (code, expected) in [(0u8, dec!(0)), (1, dec!(30_000_000)), (2, dec!(60_000_000))] {
            let calc = RealEstateCalc::new(
                RealEstateInput {
                    is_primary_residence: code,
                    ..RealEstateInput::default()
                },
                None,
            )
            .unwrap();
            assert_eq!(calc.capital_gains_tax_primary_residence_deduction, expected);
        }
    }

    #[test]
    fn test_capital_gains_tax_rate_matrix() {
        let with_surcharge = RESTORATION_TAX_EXPIRY.pred_opt().unwrap();
        let without_surcharge = RESTORATION_TAX_EXPIRY;

        for (date, multiple) in [
            (with_surcharge, Decimal::ONE + dec!(0.021)),
            (without_surcharge, Decimal::ONE),
        ] {
            // Short term
            assert_eq!(capital_gains_tax_rate(4, false, date), dec!(0.3) * multiple);
            assert_eq!(capital_gains_tax_rate(4, true, date), dec!(0.39) * multiple);
            // Long term
            assert_eq!(capital_gains_tax_rate(5, false, date), dec!(0.15) * multiple);
            assert_eq!(capital_gains_tax_rate(5, true, date), dec!(0.2) * multiple);
        }
    }

    #[test]
    fn test_tokyo_tower_regression() {
        let profile = IncomeTaxCalc::new(sample_tax_input()).unwrap();
        let calc = RealEstateCalc::new(tokyo_tower_input(), Some(&profile)).unwrap();

        // Acquisition
        assert_eq!(calc.purchase_price_financed, dec!(90_000_000));
        assert_eq!(calc.purchase_price_building, dec!(75_600_000));
        assert_eq!(calc.purchase_price_land, dec!(24_400_000));
        assert_eq!(calc.purchase_agent_fee, dec!(3_261_600));
        assert_eq!(calc.purchase_other_transaction_fees, dec!(1_000_000));
        assert_eq!(calc.purchase_price_and_fees, dec!(104_271_600));
        assert_eq!(calc.purchase_initial_outlay, dec!(14_271_600));

        // Ongoing
        assert_eq!(calc.depreciation_years, 47);
        assert_eq!(calc.depreciation_annual, dec!(1_608_510));
        assert_eq!(calc.rental_income, dec!(4_000_000));
        assert_eq!(calc.renewal_income, dec!(166_666));
        assert_eq!(calc.total_income, dec!(4_166_666));
        assert_eq!(calc.maintenance_expense, dec!(100_000));
        assert_eq!(calc.monthly_fees_annualized, dec!(240_000));
        assert_eq!(calc.rental_management_renewal_expense, dec!(135_000));
        assert_eq!(calc.rental_management_rental_expense, dec!(216_000));
        assert_eq!(calc.rental_management_total_expense, dec!(351_000));
        assert_eq!(calc.property_tax_expense, dec!(1_000_000));
        assert_eq!(
            calc.calc_date,
            NaiveDate::from_ymd_opt(2049, 1, 24).unwrap()
        );
        // Year 32 is past the 30 year mortgage
        assert_eq!(calc.total_expense, dec!(1_691_000));
        assert_eq!(calc.net_income_before_taxes, dec!(2_475_666));
        assert_eq!(calc.depreciation, dec!(1_608_510));
        assert_eq!(calc.net_income_taxable, dec!(867_156));
        assert_eq!(calc.home_loan_deduction, dec!(0));
        assert_eq!(calc.income_tax, dec!(4_633_082));
        assert_eq!(calc.income_tax_real_estate, dec!(310_108));
        assert_eq!(calc.income_tax_shield, dec!(0));
        assert_eq!(calc.net_income_after_taxes, dec!(2_165_558));
        assert_eq!(calc.mortgage_amount_outstanding, dec!(0));

        // Disposal
        assert_eq!(calc.depreciation_cumulative, dec!(53_080_830));
        assert_eq!(calc.depreciated_building_value, dec!(22_519_170));
        assert_eq!(calc.book_value, dec!(46_919_170));
        assert_eq!(calc.equity_value, dec!(46_919_170));
        assert_eq!(calc.sale_price, dec!(47_000_000));
        assert_eq!(calc.sale_agent_fee, dec!(1_544_400));
        assert_eq!(calc.sale_other_transaction_fees, dec!(470_000));
        assert_eq!(calc.sale_proceeds_after_fees, dec!(44_985_600));
        assert_eq!(calc.acquisition_cost, dec!(104_261_600));
        assert_eq!(calc.capital_gains, dec!(0));
        assert_eq!(calc.capital_gains_tax_rate, dec!(0.2));
        assert_eq!(calc.capital_gains_tax, dec!(0));
        assert_eq!(calc.sale_proceeds_net, dec!(44_985_600));
        assert_eq!(
            calc.net_income_on_realestate,
            dec!(44_985_600) + calc.cumulative_net_income - dec!(104_271_600)
        );
    }

    #[test]
    fn test_recalculate_is_idempotent() {
        let profile = IncomeTaxCalc::new(sample_tax_input()).unwrap();
        let mut calc = RealEstateCalc::new(tokyo_tower_input(), Some(&profile)).unwrap();
        let snapshot = calc.clone();
        calc.recalculate().unwrap();
        assert_eq!(calc, snapshot);
    }
}

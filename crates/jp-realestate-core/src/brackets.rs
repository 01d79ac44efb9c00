use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::error::JpRealEstateError;
use crate::types::{Money, Rate};
use crate::JpRealEstateResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One row of the progressive national income tax table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxBracket {
    /// Inclusive lower bound of taxable income covered by this bracket
    pub lower_bound: Money,
    /// Inclusive upper bound. The last bracket is effectively unbounded.
    pub upper_bound: Money,
    /// Marginal rate applied to income above `lower_bound`
    pub rate: Rate,
    /// Total tax due on all lower brackets combined
    pub previous_brackets_sum: Money,
}

/// Formula converting gross employment income into its taxable equivalent.
///
/// The statutory table mixes flat amounts, linear offsets and a
/// round-to-the-nearest-4000-yen step, so the conversion is an enum rather
/// than a single rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConversionFormula {
    Zero,
    Fixed(Money),
    LessOffset(Money),
    /// round(gross / 4000) * 1000 * multiplier - offset
    QuarterRounded { multiplier: Rate, offset: Money },
    /// gross * rate - offset
    Scaled { rate: Rate, offset: Money },
}

impl ConversionFormula {
    pub fn apply(&self, gross: Money) -> Money {
        match self {
            ConversionFormula::Zero => Decimal::ZERO,
            ConversionFormula::Fixed(amount) => *amount,
            ConversionFormula::LessOffset(offset) => gross - offset,
            ConversionFormula::QuarterRounded { multiplier, offset } => {
                // round() is half-to-even, which is what the tax office form
                // arrives at for these mid-range bands
                (gross / dec!(4000)).round() * dec!(1000) * multiplier - offset
            }
            ConversionFormula::Scaled { rate, offset } => gross * rate - offset,
        }
    }
}

/// One band of the employment income conversion table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmploymentIncomeBand {
    pub lower_bound: Money,
    pub upper_bound: Money,
    pub formula: ConversionFormula,
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// Anything with inclusive bounds that can be searched by `lookup`.
pub trait Band {
    fn bounds(&self) -> (Money, Money);
}

impl Band for TaxBracket {
    fn bounds(&self) -> (Money, Money) {
        (self.lower_bound, self.upper_bound)
    }
}

impl Band for EmploymentIncomeBand {
    fn bounds(&self) -> (Money, Money) {
        (self.lower_bound, self.upper_bound)
    }
}

/// Find the unique band whose inclusive bounds contain `value`.
///
/// The tables are contiguous from zero upward, so in practice only a negative
/// value can fail the lookup, but a malformed table must not be silently
/// tolerated either.
pub fn lookup<'a, T: Band>(
    value: Money,
    table: &'a [T],
    table_name: &'static str,
) -> JpRealEstateResult<&'a T> {
    table
        .iter()
        .find(|band| {
            let (lower, upper) = band.bounds();
            lower <= value && value <= upper
        })
        .ok_or(JpRealEstateError::OutOfDomain {
            table: table_name,
            value,
        })
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Progressive national income tax brackets.
pub static NATIONAL_INCOME_TAX_TABLE: [TaxBracket; 7] = [
    TaxBracket {
        lower_bound: dec!(0),
        upper_bound: dec!(1_950_000),
        rate: dec!(0.05),
        previous_brackets_sum: dec!(0),
    },
    TaxBracket {
        lower_bound: dec!(1_950_001),
        upper_bound: dec!(3_300_000),
        rate: dec!(0.1),
        previous_brackets_sum: dec!(97_500),
    },
    TaxBracket {
        lower_bound: dec!(3_300_001),
        upper_bound: dec!(6_950_000),
        rate: dec!(0.2),
        previous_brackets_sum: dec!(232_500),
    },
    TaxBracket {
        lower_bound: dec!(6_950_001),
        upper_bound: dec!(9_000_000),
        rate: dec!(0.23),
        previous_brackets_sum: dec!(962_500),
    },
    TaxBracket {
        lower_bound: dec!(9_000_001),
        upper_bound: dec!(18_000_000),
        rate: dec!(0.33),
        previous_brackets_sum: dec!(1_434_000),
    },
    TaxBracket {
        lower_bound: dec!(18_000_001),
        upper_bound: dec!(40_000_000),
        rate: dec!(0.40),
        previous_brackets_sum: dec!(4_404_000),
    },
    TaxBracket {
        lower_bound: dec!(40_000_001),
        upper_bound: Decimal::MAX,
        rate: dec!(0.45),
        previous_brackets_sum: dec!(13_204_000),
    },
];

/// Conversion from gross employment income to its taxable equivalent,
/// per the national tax agency's annual filing guide.
pub static EMPLOYMENT_INCOME_FOR_TAX_TABLE: [EmploymentIncomeBand; 12] = [
    EmploymentIncomeBand {
        lower_bound: dec!(0),
        upper_bound: dec!(650_999),
        formula: ConversionFormula::Zero,
    },
    EmploymentIncomeBand {
        lower_bound: dec!(651_000),
        upper_bound: dec!(1_618_999),
        formula: ConversionFormula::LessOffset(dec!(650_000)),
    },
    EmploymentIncomeBand {
        lower_bound: dec!(1_619_000),
        upper_bound: dec!(1_619_999),
        formula: ConversionFormula::Fixed(dec!(969_000)),
    },
    EmploymentIncomeBand {
        lower_bound: dec!(1_620_000),
        upper_bound: dec!(1_621_999),
        formula: ConversionFormula::Fixed(dec!(970_000)),
    },
    EmploymentIncomeBand {
        lower_bound: dec!(1_622_000),
        upper_bound: dec!(1_623_999),
        formula: ConversionFormula::Fixed(dec!(972_000)),
    },
    EmploymentIncomeBand {
        lower_bound: dec!(1_624_000),
        upper_bound: dec!(1_627_999),
        formula: ConversionFormula::Fixed(dec!(974_000)),
    },
    EmploymentIncomeBand {
        lower_bound: dec!(1_628_000),
        upper_bound: dec!(1_799_999),
        formula: ConversionFormula::QuarterRounded {
            multiplier: dec!(2.4),
            offset: dec!(0),
        },
    },
    EmploymentIncomeBand {
        lower_bound: dec!(1_800_000),
        upper_bound: dec!(3_599_999),
        formula: ConversionFormula::QuarterRounded {
            multiplier: dec!(2.8),
            offset: dec!(180_000),
        },
    },
    EmploymentIncomeBand {
        lower_bound: dec!(3_600_000),
        upper_bound: dec!(6_599_999),
        formula: ConversionFormula::QuarterRounded {
            multiplier: dec!(3.2),
            offset: dec!(540_000),
        },
    },
    EmploymentIncomeBand {
        lower_bound: dec!(6_600_000),
        upper_bound: dec!(9_999_999),
        formula: ConversionFormula::Scaled {
            rate: dec!(0.9),
            offset: dec!(1_200_000),
        },
    },
    EmploymentIncomeBand {
        lower_bound: dec!(10_000_000),
        upper_bound: dec!(11_999_999),
        formula: ConversionFormula::Scaled {
            rate: dec!(0.95),
            offset: dec!(1_700_000),
        },
    },
    EmploymentIncomeBand {
        lower_bound: dec!(12_000_000),
        upper_bound: Decimal::MAX,
        formula: ConversionFormula::LessOffset(dec!(2_300_000)),
    },
];

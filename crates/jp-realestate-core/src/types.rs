use chrono::{Datelike, Local, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// All monetary values, in yen. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Consumption tax charged on services and on buildings sold by a business.
pub const CONSUMPTION_TAX: Rate = dec!(0.08);

/// Surcharge on national income tax and capital gains tax, levied after the
/// '11 Tohoku earthquake.
pub const RESTORATION_TAX: Rate = dec!(0.021);

/// Dates on or after this day carry no restoration surcharge.
pub const RESTORATION_TAX_EXPIRY: NaiveDate = match NaiveDate::from_ymd_opt(2038, 1, 1) {
    Some(date) => date,
    None => panic!("restoration tax expiry date is invalid"),
};

/// Today in the local timezone. Used when an evaluation date is left unset.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Add whole years to a date. Feb 29 falls back to Feb 28 on non-leap years.
pub fn add_years(date: NaiveDate, years: u32) -> NaiveDate {
    let year = date.year() + years as i32;
    match NaiveDate::from_ymd_opt(year, date.month(), date.day()) {
        Some(shifted) => shifted,
        None => NaiveDate::from_ymd_opt(year, 2, 28).unwrap_or(date),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_years_plain() {
        let date = NaiveDate::from_ymd_opt(2017, 1, 24).unwrap();
        assert_eq!(
            add_years(date, 32),
            NaiveDate::from_ymd_opt(2049, 1, 24).unwrap()
        );
        assert_eq!(add_years(date, 0), date);
    }

    #[test]
    fn test_add_years_leap_day() {
        let date = NaiveDate::from_ymd_opt(2016, 2, 29).unwrap();
        assert_eq!(
            add_years(date, 1),
            NaiveDate::from_ymd_opt(2017, 2, 28).unwrap()
        );
        assert_eq!(
            add_years(date, 4),
            NaiveDate::from_ymd_opt(2020, 2, 29).unwrap()
        );
    }
}

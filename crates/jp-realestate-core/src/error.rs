use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JpRealEstateError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Value {value} is outside every band of the {table} table")]
    OutOfDomain { table: &'static str, value: Decimal },
}

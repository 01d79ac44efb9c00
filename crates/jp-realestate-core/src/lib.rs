pub mod brackets;
pub mod error;
pub mod income_tax;
pub mod mortgage;
pub mod real_estate;
pub mod types;

pub use error::JpRealEstateError;
pub use types::*;

/// Standard result type for all calculator operations
pub type JpRealEstateResult<T> = Result<T, JpRealEstateError>;

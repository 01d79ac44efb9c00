pub mod income_tax;
pub mod mortgage;
pub mod scenario;

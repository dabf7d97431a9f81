pub mod meter_source;
pub mod utils;

pub use meter_source::{MeterSource, MeterSpec};

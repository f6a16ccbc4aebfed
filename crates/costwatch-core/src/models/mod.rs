//! Data models for CostWatch

mod alert;
mod cost;
mod filter;

pub use alert::*;
pub use cost::*;
pub use filter::*;

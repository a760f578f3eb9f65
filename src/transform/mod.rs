//! Saved-object transformers

mod managed_flag;

pub use managed_flag::ManagedFlag;

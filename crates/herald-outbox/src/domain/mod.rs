//! Domain layer: the unit-of-work change set and hook reports.

pub mod change_set;
pub mod reports;

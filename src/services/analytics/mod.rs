//! Analytics Service
//!
//! Cost calculation against the versioned rate table and the append-only
//! usage audit trail.

mod accountant;
mod cost_calculator;

pub use accountant::*;
pub use cost_calculator::*;

//! Actuarial PV - Recursive derivation engine for life-contingent quantities
//!
//! This library provides:
//! - Typed identification of actuarial quantities (mortality, survival,
//!   lifetimes, pure endowments, insurance, annuities)
//! - A fact store for asserted values and a depth-bounded solver that
//!   backward-chains through the standard recursion identities
//! - Derivation traces with pluggable plain-text and JSON rendering
//! - Closed-form fallback evaluation against survival models (constant
//!   force, annual life tables, arbitrary survival functions)

pub mod closed_form;
pub mod interest;
pub mod recursion;
pub mod survival;
pub mod table;

mod numerics;

// Re-export commonly used types
pub use closed_form::ClosedFormCalculator;
pub use interest::{Interest, InterestError};
pub use recursion::{
    Family, FactStore, JsonFormatter, Moment, PlainFormatter, QuantityKey, RecursionEngine, Term,
    TraceFormatter, TraceLog,
};
pub use survival::{ConstantForce, SurvivalFn, SurvivalModel};
pub use table::{LifeTable, TableError};

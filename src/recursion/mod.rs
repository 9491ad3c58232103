//! Recursive derivation of life-contingent quantities
//!
//! This module answers "what does this actuarial quantity equal, given
//! the handful of facts I know?" by backward-chaining through the
//! standard recursion identities:
//! 1. **Facts**: asserted values in an owned [`FactStore`], exact-match only
//! 2. **Formulas**: ordered per-family catalogs of identities
//! 3. **Search**: depth-bounded resolution with a lateral side budget
//! 4. **Trace**: the surviving derivation chain, pluggably formatted
//!
//! When no derivation exists the engine can fall back to closed-form
//! evaluation against a survival model.
//!
//! # Example
//!
//! ```rust,ignore
//! use actuarial_pv::{Interest, QuantityKey, RecursionEngine};
//!
//! let mut engine = RecursionEngine::new(Interest::from_rate(0.05)?);
//! engine
//!     .set_q(60, 0.01)
//!     .assert_fact(QuantityKey::endowment_insurance(60, 3), 0.86545);
//! let q61 = engine.solve(&QuantityKey::mortality(61));
//! println!("{}", engine.format_trace(&actuarial_pv::PlainFormatter));
//! ```

mod formula;
mod solver;

pub mod key;
pub mod store;
pub mod trace;

pub use key::{Family, Moment, QuantityKey, Term};
pub use store::FactStore;
pub use trace::{JsonFormatter, PlainFormatter, TraceEntry, TraceFormatter, TraceLog};

use log::debug;

use crate::closed_form::ClosedFormCalculator;
use crate::interest::Interest;
use solver::{Budget, Solver};

/// Default maximum number of descent steps per solve
pub const DEFAULT_DEPTH: u32 = 6;

/// Derivation engine: facts, formula search, and optional fallback
#[derive(Debug)]
pub struct RecursionEngine {
    interest: Interest,
    facts: FactStore,
    depth: u32,
    fallback: Option<ClosedFormCalculator>,
    last_trace: TraceLog,
}

impl RecursionEngine {
    pub fn new(interest: Interest) -> Self {
        Self {
            interest,
            facts: FactStore::new(),
            depth: DEFAULT_DEPTH,
            fallback: None,
            last_trace: TraceLog::new(),
        }
    }

    /// Override the descent budget
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Attach a closed-form calculator for keys the search cannot reach
    pub fn with_fallback(mut self, fallback: ClosedFormCalculator) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn facts(&self) -> &FactStore {
        &self.facts
    }

    /// Assert a unit-benefit fact; overwrites any previous value
    pub fn assert_fact(&mut self, key: QuantityKey, value: f64) -> &mut Self {
        self.facts.assert_fact(key, value);
        self
    }

    /// Remove a fact; later solves re-derive from what remains
    pub fn retract_fact(&mut self, key: &QuantityKey) -> &mut Self {
        self.facts.retract(key);
        self
    }

    /// Assert a one-year mortality rate q_x
    pub fn set_q(&mut self, age: i32, value: f64) -> &mut Self {
        self.assert_fact(QuantityKey::mortality(age), value)
    }

    /// Assert a one-year survival probability p_x
    pub fn set_p(&mut self, age: i32, value: f64) -> &mut Self {
        self.assert_fact(QuantityKey::survival(age), value)
    }

    /// Resolve a key: facts, then formula search, then fallback
    ///
    /// On success the trace of the derivation is retained and available
    /// from [`last_trace`](Self::last_trace). A fallback answer carries
    /// an empty trace, as does a failed solve.
    pub fn solve(&mut self, key: &QuantityKey) -> Option<f64> {
        let mut log = TraceLog::new();
        let mut solver = Solver::new(&self.facts, &self.interest);
        let found = solver.resolve(key, Budget::new(self.depth), &mut log);
        debug!(
            "solve {}: {:?} after {} formula applications",
            key,
            found,
            solver.attempts()
        );

        match found {
            Some(value) => {
                self.last_trace = log;
                Some(value)
            }
            None => {
                self.last_trace = TraceLog::new();
                self.fallback.as_ref().and_then(|calc| calc.value(key))
            }
        }
    }

    /// Solve and hand back the derivation trace alongside the value
    pub fn solve_traced(&mut self, key: &QuantityKey) -> (Option<f64>, TraceLog) {
        let value = self.solve(key);
        (value, self.last_trace.clone())
    }

    /// Trace of the most recent successful derivation
    pub fn last_trace(&self) -> &TraceLog {
        &self.last_trace
    }

    /// Render the last trace with the given formatter
    pub fn format_trace(&self, formatter: &dyn TraceFormatter) -> String {
        formatter.format(&self.last_trace)
    }
}

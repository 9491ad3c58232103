//! Typed identity of a life-contingent quantity
//!
//! A [`QuantityKey`] names exactly one scalar the engine can be asked
//! for, in place of loose keyword tuples and sentinel values. Facts are
//! stored against keys, formulas pattern-match on them, and traces print
//! them in compact actuarial notation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Family of actuarial quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    /// Deferred mortality probability u|t_q_x
    Mortality,
    /// Survival probability t_p_x
    Survival,
    /// Expected future lifetime (curtate or complete)
    Lifetime,
    /// Pure endowment t_E_x
    PureEndowment,
    /// Life insurance A (whole life, term, or endowment)
    Insurance,
    /// Annually increasing insurance (IA)
    IncreasingInsurance,
    /// Annually decreasing insurance (DA)
    DecreasingInsurance,
    /// Life annuity a
    Annuity,
}

/// Coverage or summation horizon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    /// Lifetime coverage
    Whole,
    /// Fixed horizon in years
    Years(i32),
}

impl Term {
    pub fn years(&self) -> Option<i32> {
        match self {
            Term::Whole => None,
            Term::Years(t) => Some(*t),
        }
    }

    pub fn is_whole(&self) -> bool {
        matches!(self, Term::Whole)
    }

    /// Shorten a finite term by n years; Whole stays Whole
    pub fn shortened(&self, n: i32) -> Term {
        match self {
            Term::Whole => Term::Whole,
            Term::Years(t) => Term::Years(t - n),
        }
    }

    /// Lengthen a finite term by n years; Whole stays Whole
    pub fn extended(&self, n: i32) -> Term {
        match self {
            Term::Whole => Term::Whole,
            Term::Years(t) => Term::Years(t + n),
        }
    }
}

/// Statistical moment of the present-value random variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Moment {
    #[default]
    First,
    Second,
    Variance,
}

impl Moment {
    /// Discounting power for raw moments (None for variance keys)
    pub fn power(&self) -> Option<f64> {
        match self {
            Moment::First => Some(1.0),
            Moment::Second => Some(2.0),
            Moment::Variance => None,
        }
    }
}

/// Identity of one life-contingent scalar
///
/// Facts and derivation targets are both named this way. Benefits are
/// always per unit; callers scale monetary amounts outside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuantityKey {
    pub family: Family,
    pub age: i32,
    pub term: Term,
    /// Deferral period in years (u >= 0)
    pub deferral: i32,
    pub moment: Moment,
    /// Discrete basis: curtate lifetimes, annuities-due, end-of-year claims
    pub discrete: bool,
    /// Insurance only: endowment benefit of 1 payable on survival
    pub endowment: bool,
}

impl QuantityKey {
    fn base(family: Family, age: i32, term: Term) -> Self {
        Self {
            family,
            age,
            term,
            deferral: 0,
            moment: Moment::First,
            discrete: true,
            endowment: false,
        }
    }

    /// One-year mortality rate q_x
    pub fn mortality(age: i32) -> Self {
        Self::base(Family::Mortality, age, Term::Years(1))
    }

    /// t-year mortality probability t_q_x
    pub fn mortality_term(age: i32, t: i32) -> Self {
        Self::base(Family::Mortality, age, Term::Years(t))
    }

    /// One-year survival probability p_x
    pub fn survival(age: i32) -> Self {
        Self::base(Family::Survival, age, Term::Years(1))
    }

    /// t-year survival probability t_p_x
    pub fn survival_term(age: i32, t: i32) -> Self {
        Self::base(Family::Survival, age, Term::Years(t))
    }

    /// Curtate expectation of life e_x
    pub fn lifetime(age: i32) -> Self {
        Self::base(Family::Lifetime, age, Term::Whole)
    }

    /// Temporary curtate expectation e_{x:t}
    pub fn lifetime_term(age: i32, t: i32) -> Self {
        Self::base(Family::Lifetime, age, Term::Years(t))
    }

    /// Pure endowment t_E_x
    pub fn pure_endowment(age: i32, t: i32) -> Self {
        Self::base(Family::PureEndowment, age, Term::Years(t))
    }

    /// Whole life insurance A_x
    pub fn whole_life_insurance(age: i32) -> Self {
        Self::base(Family::Insurance, age, Term::Whole)
    }

    /// Term insurance A^1_{x:t} (death benefit only)
    pub fn term_insurance(age: i32, t: i32) -> Self {
        Self::base(Family::Insurance, age, Term::Years(t))
    }

    /// Endowment insurance A_{x:t}
    pub fn endowment_insurance(age: i32, t: i32) -> Self {
        let mut key = Self::base(Family::Insurance, age, Term::Years(t));
        key.endowment = true;
        key
    }

    /// Increasing term insurance (IA)^1_{x:t}
    pub fn increasing_insurance(age: i32, t: i32) -> Self {
        Self::base(Family::IncreasingInsurance, age, Term::Years(t))
    }

    /// Decreasing term insurance (DA)^1_{x:t}
    pub fn decreasing_insurance(age: i32, t: i32) -> Self {
        Self::base(Family::DecreasingInsurance, age, Term::Years(t))
    }

    /// Whole life annuity-due a_x
    pub fn whole_life_annuity(age: i32) -> Self {
        Self::base(Family::Annuity, age, Term::Whole)
    }

    /// Temporary annuity-due a_{x:t}
    pub fn temporary_annuity(age: i32, t: i32) -> Self {
        Self::base(Family::Annuity, age, Term::Years(t))
    }

    /// Defer the quantity by u years
    pub fn deferred(mut self, u: i32) -> Self {
        self.deferral = u;
        self
    }

    /// Second raw moment of the present-value variable
    pub fn second_moment(mut self) -> Self {
        self.moment = Moment::Second;
        self
    }

    /// Variance of the present-value variable
    pub fn variance(mut self) -> Self {
        self.moment = Moment::Variance;
        self
    }

    /// Continuous basis (complete lifetimes, claims at death)
    pub fn continuous(mut self) -> Self {
        self.discrete = false;
        self
    }

    /// Discrete basis (the default)
    pub fn curtate(mut self) -> Self {
        self.discrete = true;
        self
    }

    /// Finite term length, if any
    pub fn term_years(&self) -> Option<i32> {
        self.term.years()
    }
}

impl fmt::Display for QuantityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match (self.family, self.endowment) {
            (Family::Mortality, _) => "q",
            (Family::Survival, _) => "p",
            (Family::Lifetime, _) => "e",
            (Family::PureEndowment, _) => "E",
            (Family::Insurance, false) => "A",
            (Family::Insurance, true) => "AE",
            (Family::IncreasingInsurance, _) => "IA",
            (Family::DecreasingInsurance, _) => "DA",
            (Family::Annuity, _) => "a",
        };

        if self.moment == Moment::Variance {
            write!(f, "Var[")?;
        }
        if self.deferral > 0 {
            write!(f, "{}|", self.deferral)?;
        }
        write!(f, "{}({}", symbol, self.age)?;

        // One-year probabilities and whole-life horizons print bare
        let show_term = match (self.family, self.term) {
            (Family::Mortality | Family::Survival, Term::Years(1)) => false,
            (_, Term::Whole) => false,
            _ => true,
        };
        if show_term {
            if let Some(t) = self.term.years() {
                write!(f, ",:{}", t)?;
            }
        }
        if !self.discrete {
            write!(f, ",cont")?;
        }
        write!(f, ")")?;

        match self.moment {
            Moment::First => {}
            Moment::Second => write!(f, "^2")?,
            Moment::Variance => write!(f, "]")?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_expected_fields() {
        let key = QuantityKey::endowment_insurance(60, 3);
        assert_eq!(key.family, Family::Insurance);
        assert!(key.endowment);
        assert_eq!(key.term, Term::Years(3));
        assert!(key.discrete);

        let key = QuantityKey::whole_life_annuity(70).deferred(5);
        assert_eq!(key.deferral, 5);
        assert!(key.term.is_whole());
    }

    #[test]
    fn test_keys_are_value_equal() {
        let a = QuantityKey::term_insurance(50, 10).second_moment();
        let b = QuantityKey::term_insurance(50, 10).second_moment();
        assert_eq!(a, b);
        assert_ne!(a, QuantityKey::endowment_insurance(50, 10).second_moment());
    }

    #[test]
    fn test_term_arithmetic() {
        assert_eq!(Term::Years(3).shortened(1), Term::Years(2));
        assert_eq!(Term::Whole.shortened(1), Term::Whole);
        assert_eq!(Term::Years(3).extended(2), Term::Years(5));
        assert!(Term::Whole.years().is_none());
    }

    #[test]
    fn test_display_notation() {
        assert_eq!(QuantityKey::mortality(60).to_string(), "q(60)");
        assert_eq!(QuantityKey::mortality_term(60, 5).to_string(), "q(60,:5)");
        assert_eq!(
            QuantityKey::mortality_term(60, 5).deferred(2).to_string(),
            "2|q(60,:5)"
        );
        assert_eq!(QuantityKey::whole_life_insurance(60).to_string(), "A(60)");
        assert_eq!(QuantityKey::endowment_insurance(60, 3).to_string(), "AE(60,:3)");
        assert_eq!(
            QuantityKey::whole_life_insurance(60).second_moment().to_string(),
            "A(60)^2"
        );
        assert_eq!(
            QuantityKey::whole_life_annuity(60).variance().to_string(),
            "Var[a(60)]"
        );
        assert_eq!(
            QuantityKey::whole_life_insurance(60).continuous().to_string(),
            "A(60,cont)"
        );
    }
}

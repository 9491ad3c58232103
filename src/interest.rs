//! Interest rate model
//!
//! Holds the four equivalent views of a constant interest assumption
//! (effective rate i, discount factor v, discount rate d, force delta)
//! and the discounting helpers the derivation formulas need.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from constructing or converting interest assumptions
#[derive(Debug, Error)]
pub enum InterestError {
    #[error("effective rate must exceed -100%, got {0}")]
    RateOutOfRange(f64),

    #[error("discount rate must lie in [0, 1), got {0}")]
    DiscountOutOfRange(f64),

    #[error("discount factor must lie in (0, 1], got {0}")]
    FactorOutOfRange(f64),

    #[error("force of interest must be finite and nonnegative, got {0}")]
    ForceOutOfRange(f64),

    #[error("payment frequency must be positive, got {0}")]
    FrequencyOutOfRange(i32),
}

/// Constant interest assumption
///
/// All four representations are computed once at construction so the
/// formula combinators can read whichever is natural for the identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interest {
    i: f64,
    v: f64,
    d: f64,
    delta: f64,
}

impl Interest {
    /// Build from an annual effective rate i > -1
    pub fn from_rate(i: f64) -> Result<Self, InterestError> {
        if !(i > -1.0) || !i.is_finite() {
            return Err(InterestError::RateOutOfRange(i));
        }
        let v = 1.0 / (1.0 + i);
        Ok(Self {
            i,
            v,
            d: i * v,
            delta: (1.0 + i).ln(),
        })
    }

    /// Build from an annual discount rate d in [0, 1)
    pub fn from_discount(d: f64) -> Result<Self, InterestError> {
        if !(0.0..1.0).contains(&d) {
            return Err(InterestError::DiscountOutOfRange(d));
        }
        Self::from_rate(d / (1.0 - d))
    }

    /// Build from an annual discount factor v in (0, 1]
    pub fn from_v(v: f64) -> Result<Self, InterestError> {
        if !(v > 0.0 && v <= 1.0) {
            return Err(InterestError::FactorOutOfRange(v));
        }
        Self::from_rate(1.0 / v - 1.0)
    }

    /// Build from a force of interest delta >= 0
    pub fn from_delta(delta: f64) -> Result<Self, InterestError> {
        if !delta.is_finite() || delta < 0.0 {
            return Err(InterestError::ForceOutOfRange(delta));
        }
        Self::from_rate(delta.exp() - 1.0)
    }

    /// Zero-interest assumption (v = 1)
    pub fn zero() -> Self {
        Self {
            i: 0.0,
            v: 1.0,
            d: 0.0,
            delta: 0.0,
        }
    }

    /// Annual effective rate
    pub fn i(&self) -> f64 {
        self.i
    }

    /// One-year discount factor
    pub fn v(&self) -> f64 {
        self.v
    }

    /// Annual discount rate d = i / (1 + i)
    pub fn d(&self) -> f64 {
        self.d
    }

    /// Force of interest
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Discount factor over t years
    pub fn v_t(&self, t: f64) -> f64 {
        if self.i == 0.0 {
            1.0
        } else {
            self.v.powf(t)
        }
    }

    /// Present value of a t-year annuity-certain of 1 per year
    ///
    /// Due annuities divide by d, immediate by i. At zero interest the
    /// value degenerates to t.
    pub fn annuity_certain(&self, t: f64, due: bool) -> f64 {
        if self.i == 0.0 {
            return t;
        }
        let numerator = 1.0 - self.v_t(t);
        if due {
            numerator / self.d
        } else {
            numerator / self.i
        }
    }

    /// Nominal rate convertible m-thly: i(m) = m((1+i)^(1/m) - 1)
    pub fn i_mthly(&self, m: i32) -> Result<f64, InterestError> {
        if m <= 0 {
            return Err(InterestError::FrequencyOutOfRange(m));
        }
        Ok(m as f64 * ((1.0 + self.i).powf(1.0 / m as f64) - 1.0))
    }

    /// Nominal discount rate convertible m-thly: d(m) = m(1 - v^(1/m))
    pub fn d_mthly(&self, m: i32) -> Result<f64, InterestError> {
        if m <= 0 {
            return Err(InterestError::FrequencyOutOfRange(m));
        }
        Ok(m as f64 * (1.0 - self.v.powf(1.0 / m as f64)))
    }
}

impl Default for Interest {
    fn default() -> Self {
        Self::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equivalent_representations() {
        let int = Interest::from_rate(0.05).unwrap();
        assert!((int.v() - 1.0 / 1.05).abs() < 1e-12);
        assert!((int.d() - 0.05 / 1.05).abs() < 1e-12);
        assert!((int.delta() - 1.05_f64.ln()).abs() < 1e-12);

        let from_d = Interest::from_discount(int.d()).unwrap();
        assert!((from_d.i() - 0.05).abs() < 1e-12);

        let from_v = Interest::from_v(int.v()).unwrap();
        assert!((from_v.i() - 0.05).abs() < 1e-12);

        let from_delta = Interest::from_delta(int.delta()).unwrap();
        assert!((from_delta.i() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_discounting() {
        let int = Interest::from_rate(0.06).unwrap();
        assert!((int.v_t(3.0) - 1.06_f64.powf(-3.0)).abs() < 1e-12);

        // 3-year annuity-due at 6%: 1 + v + v^2
        let expected = 1.0 + int.v() + int.v() * int.v();
        assert!((int.annuity_certain(3.0, true) - expected).abs() < 1e-10);
    }

    #[test]
    fn test_zero_interest() {
        let int = Interest::zero();
        assert_eq!(int.v_t(10.0), 1.0);
        assert_eq!(int.annuity_certain(5.0, true), 5.0);
        assert_eq!(int.d(), 0.0);
    }

    #[test]
    fn test_mthly_conversions() {
        let int = Interest::from_rate(0.05).unwrap();
        let i12 = int.i_mthly(12).unwrap();
        // (1 + i12/12)^12 recovers the effective rate
        assert!(((1.0 + i12 / 12.0).powi(12) - 1.05).abs() < 1e-12);
        assert!(int.i_mthly(0).is_err());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(Interest::from_rate(-1.0).is_err());
        assert!(Interest::from_discount(1.0).is_err());
        assert!(Interest::from_v(0.0).is_err());
        assert!(Interest::from_v(1.5).is_err());
        assert!(matches!(
            Interest::from_delta(-0.1),
            Err(InterestError::ForceOutOfRange(_))
        ));
        assert!(matches!(
            Interest::from_delta(f64::NAN),
            Err(InterestError::ForceOutOfRange(_))
        ));
    }
}

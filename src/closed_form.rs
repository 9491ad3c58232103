//! Closed-form evaluation from a survival model
//!
//! When the recursive engine has no facts to chain from, any quantity
//! can still be priced directly against a survival model: discrete
//! quantities by exact summation over curtate years, continuous ones by
//! numerical integration. This is the fallback path, and the reference
//! answer the derivation engine is tested against.

use crate::interest::Interest;
use crate::numerics::integrate;
use crate::recursion::key::{Family, Moment, QuantityKey, Term};
use crate::survival::SurvivalModel;

/// Prices quantity keys directly from a survival model
pub struct ClosedFormCalculator {
    model: Box<dyn SurvivalModel>,
    interest: Interest,
}

impl ClosedFormCalculator {
    pub fn new<M: SurvivalModel + 'static>(model: M, interest: Interest) -> Self {
        Self {
            model: Box::new(model),
            interest,
        }
    }

    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    /// Evaluate a key, or None for unsupported moment combinations
    pub fn value(&self, key: &QuantityKey) -> Option<f64> {
        match key.family {
            Family::Mortality => self.mortality(key),
            Family::Survival => self.survival(key),
            Family::Lifetime => self.lifetime(key),
            Family::PureEndowment => self.pure_endowment(key),
            Family::Insurance => self.insurance(key),
            Family::IncreasingInsurance => self.varying(key, false),
            Family::DecreasingInsurance => self.varying(key, true),
            Family::Annuity => self.annuity(key),
        }
    }

    /// Horizon in whole years, clipped to the model's maximum age
    fn bounded_years(&self, age: i32, term: Term, deferral: i32) -> i32 {
        let to_end = (self.model.max_age() - age - deferral).max(0);
        match term {
            Term::Whole => to_end,
            Term::Years(t) => t.min(to_end).max(0),
        }
    }

    fn p(&self, age: i32, t: f64) -> f64 {
        self.model.survival(age, t)
    }

    /// Probability of death in year k+1 (between times k and k+1)
    fn death_in_year(&self, age: i32, k: i32) -> f64 {
        (self.p(age, k as f64) - self.p(age, (k + 1) as f64)).max(0.0)
    }

    /// Density of the time-of-death variable
    fn death_density(&self, age: i32, s: f64) -> f64 {
        self.p(age, s) * self.model.force(age, s)
    }

    fn mortality(&self, key: &QuantityKey) -> Option<f64> {
        if key.moment != Moment::First {
            return None;
        }
        let u = key.deferral as f64;
        let beyond = match key.term {
            Term::Whole => 0.0,
            Term::Years(t) => self.p(key.age, u + t as f64),
        };
        Some(self.p(key.age, u) - beyond)
    }

    fn survival(&self, key: &QuantityKey) -> Option<f64> {
        if key.moment != Moment::First {
            return None;
        }
        match key.term {
            Term::Whole => Some(0.0),
            Term::Years(t) => Some(self.p(key.age, t as f64)),
        }
    }

    fn lifetime(&self, key: &QuantityKey) -> Option<f64> {
        if key.deferral != 0 {
            return None;
        }
        let n = self.bounded_years(key.age, key.term, 0);
        let mean = if key.discrete {
            (1..=n).map(|k| self.p(key.age, k as f64)).sum::<f64>()
        } else {
            integrate(|s| self.p(key.age, s), 0.0, n as f64)
        };
        match key.moment {
            Moment::First => Some(mean),
            Moment::Second | Moment::Variance => {
                let second = if key.discrete {
                    (1..=n)
                        .map(|k| (2 * k - 1) as f64 * self.p(key.age, k as f64))
                        .sum::<f64>()
                } else {
                    integrate(|s| 2.0 * s * self.p(key.age, s), 0.0, n as f64)
                };
                if key.moment == Moment::Second {
                    Some(second)
                } else {
                    Some(second - mean * mean)
                }
            }
        }
    }

    fn pure_endowment(&self, key: &QuantityKey) -> Option<f64> {
        let t = match key.term {
            Term::Whole => return Some(0.0),
            Term::Years(t) => t as f64,
        };
        let p = self.p(key.age, t);
        match key.moment {
            Moment::First => Some(self.interest.v_t(t) * p),
            Moment::Second => Some(self.interest.v_t(2.0 * t) * p),
            Moment::Variance => Some(self.interest.v_t(2.0 * t) * p * (1.0 - p)),
        }
    }

    /// Raw moment of an insurance with per-year death benefit `benefit(k)`
    /// and an endowment benefit of 1 at expiry when `endow` is set
    fn insurance_moment(
        &self,
        key: &QuantityKey,
        m: f64,
        benefit: &dyn Fn(i32) -> f64,
        endow: bool,
    ) -> f64 {
        let u = key.deferral;
        let n = self.bounded_years(key.age, key.term, u);
        if key.discrete {
            let mut total = 0.0;
            for k in 0..n {
                let time = (u + k + 1) as f64;
                total += benefit(k).powf(m)
                    * self.interest.v_t(m * time)
                    * self.death_in_year(key.age, u + k);
            }
            if endow {
                let time = (u + n) as f64;
                total += self.interest.v_t(m * time) * self.p(key.age, time);
            }
            total
        } else {
            let start = u as f64;
            let end = (u + n) as f64;
            let mut total = integrate(
                |s| {
                    let b = benefit((s - start).floor() as i32);
                    b.powf(m) * self.interest.v_t(m * s) * self.death_density(key.age, s)
                },
                start,
                end,
            );
            if endow {
                total += self.interest.v_t(m * end) * self.p(key.age, end);
            }
            total
        }
    }

    fn insurance(&self, key: &QuantityKey) -> Option<f64> {
        let level = |_k: i32| 1.0;
        match key.moment {
            Moment::First => Some(self.insurance_moment(key, 1.0, &level, key.endowment)),
            Moment::Second => Some(self.insurance_moment(key, 2.0, &level, key.endowment)),
            Moment::Variance => {
                let first = self.insurance_moment(key, 1.0, &level, key.endowment);
                let second = self.insurance_moment(key, 2.0, &level, key.endowment);
                Some(second - first * first)
            }
        }
    }

    fn varying(&self, key: &QuantityKey, decreasing: bool) -> Option<f64> {
        if key.moment != Moment::First {
            return None;
        }
        let n = self.bounded_years(key.age, key.term, key.deferral);
        let benefit = move |k: i32| {
            if decreasing {
                (n - k) as f64
            } else {
                (k + 1) as f64
            }
        };
        Some(self.insurance_moment(key, 1.0, &benefit, false))
    }

    fn annuity(&self, key: &QuantityKey) -> Option<f64> {
        let u = key.deferral;
        let n = self.bounded_years(key.age, key.term, u);
        match key.moment {
            Moment::First => {
                if key.discrete {
                    // Annuity-due: payments at the start of each survived year
                    let total = (0..n)
                        .map(|k| {
                            let time = (u + k) as f64;
                            self.interest.v_t(time) * self.p(key.age, time)
                        })
                        .sum::<f64>();
                    Some(total)
                } else {
                    let start = u as f64;
                    let end = (u + n) as f64;
                    Some(integrate(
                        |s| self.interest.v_t(s) * self.p(key.age, s),
                        start,
                        end,
                    ))
                }
            }
            Moment::Second => None,
            Moment::Variance => {
                if key.deferral != 0 || self.interest.d() == 0.0 {
                    return None;
                }
                // Var[a] = Var[A] / d^2 with the twin insurance
                let twin = QuantityKey {
                    family: Family::Insurance,
                    endowment: !key.term.is_whole(),
                    moment: Moment::Variance,
                    ..*key
                };
                let var_a = self.insurance(&twin)?;
                let rate = if key.discrete {
                    self.interest.d()
                } else {
                    self.interest.delta()
                };
                Some(var_a / (rate * rate))
            }
        }
    }
}

impl std::fmt::Debug for ClosedFormCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosedFormCalculator")
            .field("interest", &self.interest)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survival::ConstantForce;

    fn calc(mu: f64, i: f64) -> ClosedFormCalculator {
        ClosedFormCalculator::new(ConstantForce::new(mu), Interest::from_rate(i).unwrap())
    }

    #[test]
    fn test_survival_and_mortality() {
        let c = calc(0.04, 0.05);
        let p = c.value(&QuantityKey::survival_term(50, 10)).unwrap();
        assert!((p - (-0.4_f64).exp()).abs() < 1e-12);
        let q = c.value(&QuantityKey::mortality_term(50, 10)).unwrap();
        assert!((q - (1.0 - (-0.4_f64).exp())).abs() < 1e-12);

        // deferred mortality: 5|10_q = 5_p - 15_p
        let dq = c
            .value(&QuantityKey::mortality_term(50, 10).deferred(5))
            .unwrap();
        assert!((dq - ((-0.2_f64).exp() - (-0.6_f64).exp())).abs() < 1e-12);
    }

    #[test]
    fn test_whole_life_insurance_constant_force_discrete() {
        // Under constant force, A_x = q / (q + i) with q = 1 - e^-mu
        let mu = 0.05;
        let i = 0.06;
        let c = calc(mu, i);
        let a = c.value(&QuantityKey::whole_life_insurance(40)).unwrap();
        let q = 1.0 - (-mu).exp();
        let expected = q / (q + i);
        assert!((a - expected).abs() < 1e-9, "got {} want {}", a, expected);
    }

    #[test]
    fn test_continuous_whole_life_constant_force() {
        // Abar_x = mu / (mu + delta)
        let mu = 0.04;
        let c = calc(mu, 0.05);
        let a = c
            .value(&QuantityKey::whole_life_insurance(40).continuous())
            .unwrap();
        let expected = mu / (mu + 1.05_f64.ln());
        assert!((a - expected).abs() < 1e-6, "got {} want {}", a, expected);
    }

    #[test]
    fn test_endowment_equals_term_plus_pure_endowment() {
        let c = calc(0.03, 0.05);
        let endow = c.value(&QuantityKey::endowment_insurance(60, 10)).unwrap();
        let term = c.value(&QuantityKey::term_insurance(60, 10)).unwrap();
        let pe = c.value(&QuantityKey::pure_endowment(60, 10)).unwrap();
        assert!((endow - (term + pe)).abs() < 1e-10);
    }

    #[test]
    fn test_annuity_twin_holds() {
        let c = calc(0.03, 0.05);
        let a = c.value(&QuantityKey::whole_life_annuity(60)).unwrap();
        let ins = c.value(&QuantityKey::whole_life_insurance(60)).unwrap();
        let d = c.interest().d();
        assert!((ins - (1.0 - d * a)).abs() < 1e-9);
    }

    #[test]
    fn test_varying_insurance_identity() {
        let c = calc(0.03, 0.05);
        let n = 10;
        let ia = c.value(&QuantityKey::increasing_insurance(60, n)).unwrap();
        let da = c.value(&QuantityKey::decreasing_insurance(60, n)).unwrap();
        let term = c.value(&QuantityKey::term_insurance(60, n)).unwrap();
        assert!((ia + da - (n as f64 + 1.0) * term).abs() < 1e-9);
    }

    #[test]
    fn test_curtate_lifetime_constant_force() {
        // e_x = p / (1 - p) under constant force
        let mu = 0.05;
        let c = calc(mu, 0.05);
        let e = c.value(&QuantityKey::lifetime(30)).unwrap();
        let p = (-mu).exp();
        assert!((e - p / (1.0 - p)).abs() < 1e-6);
    }

    #[test]
    fn test_insurance_variance_is_moment_difference() {
        let c = calc(0.04, 0.05);
        let first = c.value(&QuantityKey::whole_life_insurance(50)).unwrap();
        let second = c
            .value(&QuantityKey::whole_life_insurance(50).second_moment())
            .unwrap();
        let var = c
            .value(&QuantityKey::whole_life_insurance(50).variance())
            .unwrap();
        assert!((var - (second - first * first)).abs() < 1e-10);
    }

    #[test]
    fn test_unsupported_moments_return_none() {
        let c = calc(0.04, 0.05);
        assert!(c
            .value(&QuantityKey::whole_life_annuity(50).second_moment())
            .is_none());
        assert!(c
            .value(&QuantityKey::increasing_insurance(50, 10).second_moment())
            .is_none());
    }
}

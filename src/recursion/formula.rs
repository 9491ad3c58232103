//! Derivation formula library
//!
//! Every identity the solver may apply lives here, grouped by quantity
//! family into ordered static catalogs. A formula inspects the target
//! key, and if its preconditions hold it returns a [`Plan`]: the
//! dependency keys (each tagged with how the search budget flows into
//! it), a printable statement of the identity, and a combinator that
//! turns resolved dependency values into the result.
//!
//! Catalog order is the search order. Terminals come first, then cheap
//! complementary identities, then chain rules and recursions, then the
//! back-outs and twins that invert a recursion.

use crate::interest::Interest;
use crate::recursion::key::{Family, Moment, QuantityKey, Term};

/// How the search budget flows into a dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edge {
    /// Real recursion step; consumes one unit of descent budget
    Descent,
    /// Same-level hop; child may use lateral identities but not search
    Lateral,
}

/// When the solver may attempt a formula
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tier {
    /// Boundary value with no dependencies; any budget
    Terminal,
    /// Complementary identity; needs descent budget or the lateral flag
    Lateral,
    /// Recursion or back-out; needs descent budget
    Search,
}

/// One applicable instance of a formula against a concrete key
pub(crate) struct Plan {
    pub deps: Vec<(QuantityKey, Edge)>,
    pub statement: String,
    pub combine: Box<dyn Fn(&[f64]) -> f64>,
}

/// Catalog entry
pub(crate) struct Formula {
    pub name: &'static str,
    pub tier: Tier,
    pub plan: fn(&QuantityKey, &Interest) -> Option<Plan>,
}

/// Dispatch table: the ordered catalog for a family
pub(crate) fn catalog(family: Family) -> &'static [Formula] {
    match family {
        Family::Mortality => MORTALITY,
        Family::Survival => SURVIVAL,
        Family::Lifetime => LIFETIME,
        Family::PureEndowment => PURE_ENDOWMENT,
        Family::Insurance => INSURANCE,
        Family::IncreasingInsurance => INCREASING,
        Family::DecreasingInsurance => DECREASING,
        Family::Annuity => ANNUITY,
    }
}

fn terminal(key: &QuantityKey, value: f64) -> Plan {
    Plan {
        deps: Vec::new(),
        statement: format!("{} = {}", key, value),
        combine: Box::new(move |_| value),
    }
}

/// Insurance dependency sharing the target's moment, basis, and benefit shape
fn insurance_like(base: &QuantityKey, age: i32, term: Term, deferral: i32) -> QuantityKey {
    QuantityKey {
        family: Family::Insurance,
        age,
        term,
        deferral,
        moment: base.moment,
        discrete: base.discrete,
        endowment: base.endowment,
    }
}

fn endowment_key(age: i32, t: i32, moment: Moment) -> QuantityKey {
    QuantityKey {
        family: Family::PureEndowment,
        age,
        term: Term::Years(t),
        deferral: 0,
        moment,
        discrete: true,
        endowment: false,
    }
}

fn annuity_like(base: &QuantityKey, age: i32, term: Term, deferral: i32) -> QuantityKey {
    QuantityKey {
        family: Family::Annuity,
        age,
        term,
        deferral,
        moment: base.moment,
        discrete: base.discrete,
        endowment: false,
    }
}

fn lifetime_like(base: &QuantityKey, age: i32, term: Term) -> QuantityKey {
    QuantityKey {
        family: Family::Lifetime,
        age,
        term,
        deferral: 0,
        moment: base.moment,
        discrete: base.discrete,
        endowment: false,
    }
}

// ---------------------------------------------------------------------------
// Mortality: u|t_q_x
// ---------------------------------------------------------------------------

static MORTALITY: &[Formula] = &[
    Formula { name: "empty mortality horizon", tier: Tier::Terminal, plan: q_zero_term },
    Formula { name: "certain eventual death", tier: Tier::Terminal, plan: q_whole_life },
    Formula { name: "deferred mortality", tier: Tier::Lateral, plan: q_deferral_split },
    Formula { name: "limited mortality", tier: Tier::Lateral, plan: q_deferral_difference },
    Formula { name: "complement of survival", tier: Tier::Search, plan: q_from_survival },
];

fn q_zero_term(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    (key.term == Term::Years(0)).then(|| terminal(key, 0.0))
}

fn q_whole_life(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    (key.term.is_whole() && key.deferral == 0).then(|| terminal(key, 1.0))
}

/// u|t_q_x = u_p_x * t_q_{x+u}
fn q_deferral_split(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    if key.deferral < 1 {
        return None;
    }
    let pu = QuantityKey::survival_term(key.age, key.deferral);
    let mut qt = *key;
    qt.age += key.deferral;
    qt.deferral = 0;
    Some(Plan {
        statement: format!("{} = {} * {}", key, pu, qt),
        deps: vec![(pu, Edge::Lateral), (qt, Edge::Lateral)],
        combine: Box::new(|v| v[0] * v[1]),
    })
}

/// u|t_q_x = (u+t)_q_x - u_q_x
fn q_deferral_difference(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    if key.deferral < 1 {
        return None;
    }
    let t = key.term.years()?;
    let q_long = QuantityKey::mortality_term(key.age, key.deferral + t);
    let q_short = QuantityKey::mortality_term(key.age, key.deferral);
    Some(Plan {
        statement: format!("{} = {} - {}", key, q_long, q_short),
        deps: vec![(q_long, Edge::Lateral), (q_short, Edge::Lateral)],
        combine: Box::new(|v| v[0] - v[1]),
    })
}

/// u|t_q_x = u_p_x - (u+t)_p_x
fn q_from_survival(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    let p_defer = QuantityKey::survival_term(key.age, key.deferral);
    let p_beyond = match key.term {
        Term::Whole => {
            let mut k = QuantityKey::survival(key.age);
            k.term = Term::Whole;
            k
        }
        Term::Years(t) => QuantityKey::survival_term(key.age, key.deferral + t),
    };
    Some(Plan {
        statement: format!("{} = {} - {}", key, p_defer, p_beyond),
        deps: vec![(p_defer, Edge::Descent), (p_beyond, Edge::Descent)],
        combine: Box::new(|v| v[0] - v[1]),
    })
}

// ---------------------------------------------------------------------------
// Survival: t_p_x
// ---------------------------------------------------------------------------

static SURVIVAL: &[Formula] = &[
    Formula { name: "empty survival horizon", tier: Tier::Terminal, plan: p_zero_term },
    Formula { name: "vanishing lifetime survival", tier: Tier::Terminal, plan: p_whole_life },
    Formula { name: "complement of mortality", tier: Tier::Lateral, plan: p_from_mortality },
    Formula { name: "survival chain rule", tier: Tier::Search, plan: p_chain_inverse_age },
    Formula { name: "survival chain rule", tier: Tier::Search, plan: p_chain_inverse_term },
    Formula { name: "survival chain rule", tier: Tier::Search, plan: p_chain_split_age },
    Formula { name: "survival chain rule", tier: Tier::Search, plan: p_chain_split_term },
    Formula { name: "pure endowment discount", tier: Tier::Search, plan: p_from_endowment },
    Formula { name: "annuity back-out", tier: Tier::Search, plan: p_from_annuity_whole },
    Formula { name: "annuity back-out", tier: Tier::Search, plan: p_from_annuity_2 },
    Formula { name: "annuity back-out", tier: Tier::Search, plan: p_from_annuity_3 },
    Formula { name: "insurance back-out", tier: Tier::Search, plan: p_from_insurance_whole },
    Formula { name: "insurance back-out", tier: Tier::Search, plan: p_from_endow_insurance_2 },
    Formula { name: "insurance back-out", tier: Tier::Search, plan: p_from_endow_insurance_3 },
    Formula { name: "insurance back-out", tier: Tier::Search, plan: p_from_term_insurance_2 },
    Formula { name: "insurance back-out", tier: Tier::Search, plan: p_from_term_insurance_3 },
];

fn p_zero_term(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    (key.term == Term::Years(0)).then(|| terminal(key, 1.0))
}

fn p_whole_life(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    key.term.is_whole().then(|| terminal(key, 0.0))
}

/// t_p_x = 1 - t_q_x
fn p_from_mortality(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    let t = key.term.years()?;
    if t < 1 {
        return None;
    }
    let q = QuantityKey::mortality_term(key.age, t);
    Some(Plan {
        statement: format!("{} = 1 - {}", key, q),
        deps: vec![(q, Edge::Lateral)],
        combine: Box::new(|v| 1.0 - v[0]),
    })
}

/// t_p_x = (t+1)_p_{x-1} / p_{x-1}
fn p_chain_inverse_age(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    let t = key.term.years()?;
    if t < 1 {
        return None;
    }
    let numer = QuantityKey::survival_term(key.age - 1, t + 1);
    let denom = QuantityKey::survival(key.age - 1);
    Some(Plan {
        statement: format!("{} = {} / {}", key, numer, denom),
        deps: vec![(numer, Edge::Descent), (denom, Edge::Descent)],
        combine: Box::new(|v| v[0] / v[1]),
    })
}

/// t_p_x = (t+1)_p_x / p_{x+t}
fn p_chain_inverse_term(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    let t = key.term.years()?;
    if t < 1 {
        return None;
    }
    let numer = QuantityKey::survival_term(key.age, t + 1);
    let denom = QuantityKey::survival(key.age + t);
    Some(Plan {
        statement: format!("{} = {} / {}", key, numer, denom),
        deps: vec![(numer, Edge::Descent), (denom, Edge::Descent)],
        combine: Box::new(|v| v[0] / v[1]),
    })
}

/// t_p_x = p_x * (t-1)_p_{x+1}
fn p_chain_split_age(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    let t = key.term.years()?;
    if t < 2 {
        return None;
    }
    let first = QuantityKey::survival(key.age);
    let rest = QuantityKey::survival_term(key.age + 1, t - 1);
    Some(Plan {
        statement: format!("{} = {} * {}", key, first, rest),
        deps: vec![(first, Edge::Descent), (rest, Edge::Descent)],
        combine: Box::new(|v| v[0] * v[1]),
    })
}

/// t_p_x = (t-1)_p_x * p_{x+t-1}
fn p_chain_split_term(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    let t = key.term.years()?;
    if t < 2 {
        return None;
    }
    let head = QuantityKey::survival_term(key.age, t - 1);
    let last = QuantityKey::survival(key.age + t - 1);
    Some(Plan {
        statement: format!("{} = {} * {}", key, head, last),
        deps: vec![(head, Edge::Descent), (last, Edge::Descent)],
        combine: Box::new(|v| v[0] * v[1]),
    })
}

/// t_p_x = t_E_x / v^t
fn p_from_endowment(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    let t = key.term.years()?;
    if t < 1 {
        return None;
    }
    let endow = endowment_key(key.age, t, Moment::First);
    let discount = int.v_t(t as f64);
    Some(Plan {
        statement: format!("{} = {} / v^{}", key, endow, t),
        deps: vec![(endow, Edge::Descent)],
        combine: Box::new(move |v| v[0] / discount),
    })
}

/// p_x = (a_{x:n} - 1) / (v * a_{x+1:n-1}), from the annuity recursion
fn p_from_annuity(key: &QuantityKey, int: &Interest, horizon: Term) -> Option<Plan> {
    if key.term != Term::Years(1) {
        return None;
    }
    let a_x = QuantityKey {
        family: Family::Annuity,
        age: key.age,
        term: horizon,
        deferral: 0,
        moment: Moment::First,
        discrete: true,
        endowment: false,
    };
    let a_next = QuantityKey { age: key.age + 1, term: horizon.shortened(1), ..a_x };
    let v = int.v();
    Some(Plan {
        statement: format!("{} = [ {} - 1 ] / [ v * {} ]", key, a_x, a_next),
        deps: vec![(a_x, Edge::Descent), (a_next, Edge::Descent)],
        combine: Box::new(move |vals| (vals[0] - 1.0) / (v * vals[1])),
    })
}

fn p_from_annuity_whole(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    p_from_annuity(key, int, Term::Whole)
}

fn p_from_annuity_2(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    p_from_annuity(key, int, Term::Years(2))
}

fn p_from_annuity_3(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    p_from_annuity(key, int, Term::Years(3))
}

/// p_x = (v - A_{x:n}) / (v * (1 - A_{x+1:n-1})), from the insurance recursion
///
/// Valid for whole life, term, and endowment insurance pairs alike,
/// since all three satisfy A = v(q + p A').
fn p_from_insurance(key: &QuantityKey, int: &Interest, horizon: Term, endow: bool) -> Option<Plan> {
    if key.term != Term::Years(1) {
        return None;
    }
    let a_x = QuantityKey {
        family: Family::Insurance,
        age: key.age,
        term: horizon,
        deferral: 0,
        moment: Moment::First,
        discrete: true,
        endowment: endow,
    };
    let a_next = QuantityKey { age: key.age + 1, term: horizon.shortened(1), ..a_x };
    let v = int.v();
    Some(Plan {
        statement: format!("{} = [ v - {} ] / [ v * (1 - {}) ]", key, a_x, a_next),
        deps: vec![(a_x, Edge::Descent), (a_next, Edge::Descent)],
        combine: Box::new(move |vals| (v - vals[0]) / (v * (1.0 - vals[1]))),
    })
}

fn p_from_insurance_whole(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    p_from_insurance(key, int, Term::Whole, false)
}

fn p_from_endow_insurance_2(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    p_from_insurance(key, int, Term::Years(2), true)
}

fn p_from_endow_insurance_3(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    p_from_insurance(key, int, Term::Years(3), true)
}

fn p_from_term_insurance_2(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    p_from_insurance(key, int, Term::Years(2), false)
}

fn p_from_term_insurance_3(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    p_from_insurance(key, int, Term::Years(3), false)
}

// ---------------------------------------------------------------------------
// Lifetime: e_x and e_{x:t}
// ---------------------------------------------------------------------------

static LIFETIME: &[Formula] = &[
    Formula { name: "empty lifetime horizon", tier: Tier::Terminal, plan: e_zero_term },
    Formula { name: "one-year curtate lifetime", tier: Tier::Lateral, plan: e_one_year_curtate },
    Formula { name: "temporary lifetime split", tier: Tier::Search, plan: e_temporary_split },
    Formula { name: "backward recursion", tier: Tier::Search, plan: e_backward },
    Formula { name: "forward recursion", tier: Tier::Search, plan: e_forward },
];

fn e_applicable(key: &QuantityKey) -> bool {
    key.deferral == 0 && key.moment == Moment::First
}

fn e_zero_term(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    (key.term == Term::Years(0)).then(|| terminal(key, 0.0))
}

/// e_{x:1} = p_x (curtate)
fn e_one_year_curtate(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    if !e_applicable(key) || !key.discrete || key.term != Term::Years(1) {
        return None;
    }
    let p = QuantityKey::survival(key.age);
    Some(Plan {
        statement: format!("{} = {}", key, p),
        deps: vec![(p, Edge::Lateral)],
        combine: Box::new(|v| v[0]),
    })
}

/// e_{x:t} = e_x - t_p_x * e_{x+t}
fn e_temporary_split(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    if !e_applicable(key) {
        return None;
    }
    let t = key.term.years()?;
    if t < 1 {
        return None;
    }
    let whole = lifetime_like(key, key.age, Term::Whole);
    let p = QuantityKey::survival_term(key.age, t);
    let tail = lifetime_like(key, key.age + t, Term::Whole);
    Some(Plan {
        statement: format!("{} = {} - {} * {}", key, whole, p, tail),
        deps: vec![(whole, Edge::Descent), (p, Edge::Lateral), (tail, Edge::Descent)],
        combine: Box::new(|v| v[0] - v[1] * v[2]),
    })
}

/// e_{x:t} = e_{x:1} + p_x * e_{x+1:t-1}
fn e_backward(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    if !e_applicable(key) {
        return None;
    }
    if let Some(t) = key.term.years() {
        if t < 2 {
            return None;
        }
    }
    let head = lifetime_like(key, key.age, Term::Years(1));
    let p = QuantityKey::survival(key.age);
    let tail = lifetime_like(key, key.age + 1, key.term.shortened(1));
    Some(Plan {
        statement: format!("{} = {} + {} * {}", key, head, p, tail),
        deps: vec![(head, Edge::Descent), (p, Edge::Lateral), (tail, Edge::Descent)],
        combine: Box::new(|v| v[0] + v[1] * v[2]),
    })
}

/// e_{x:t} = (e_{x-1:t+1} - e_{x-1:1}) / p_{x-1}
fn e_forward(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    if !e_applicable(key) {
        return None;
    }
    let longer = lifetime_like(key, key.age - 1, key.term.extended(1));
    let head = lifetime_like(key, key.age - 1, Term::Years(1));
    let p = QuantityKey::survival(key.age - 1);
    Some(Plan {
        statement: format!("{} = [ {} - {} ] / {}", key, longer, head, p),
        deps: vec![(longer, Edge::Descent), (head, Edge::Descent), (p, Edge::Lateral)],
        combine: Box::new(|v| (v[0] - v[1]) / v[2]),
    })
}

// ---------------------------------------------------------------------------
// Pure endowment: t_E_x
// ---------------------------------------------------------------------------

static PURE_ENDOWMENT: &[Formula] = &[
    Formula { name: "vanishing lifetime endowment", tier: Tier::Terminal, plan: end_whole_life },
    Formula { name: "immediate endowment", tier: Tier::Terminal, plan: end_zero_term },
    Formula { name: "survival discount", tier: Tier::Lateral, plan: end_from_survival },
    Formula { name: "moment scaling", tier: Tier::Search, plan: end_moment_scaling },
    Formula { name: "endowment minus term insurance", tier: Tier::Search, plan: end_from_insurance },
    Formula { name: "pure endowment chain rule", tier: Tier::Search, plan: end_chain },
    Formula { name: "Bernoulli variance", tier: Tier::Search, plan: end_variance },
];

fn end_whole_life(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    key.term.is_whole().then(|| terminal(key, 0.0))
}

fn end_zero_term(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    (key.term == Term::Years(0)).then(|| terminal(key, 1.0))
}

/// t_E_x = v^(m t) * t_p_x
fn end_from_survival(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    let t = key.term.years()?;
    let m = key.moment.power()?;
    if t < 1 {
        return None;
    }
    let p = QuantityKey::survival_term(key.age, t);
    let discount = int.v_t(m * t as f64);
    Some(Plan {
        statement: format!("{} = v^{} * {}", key, m * t as f64, p),
        deps: vec![(p, Edge::Lateral)],
        combine: Box::new(move |v| discount * v[0]),
    })
}

/// 2E_x:t = v^t * E_x:t
fn end_moment_scaling(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    if key.moment != Moment::Second {
        return None;
    }
    let t = key.term.years()?;
    let first = endowment_key(key.age, t, Moment::First);
    let discount = int.v_t(t as f64);
    Some(Plan {
        statement: format!("{} = v^{} * {}", key, t, first),
        deps: vec![(first, Edge::Descent)],
        combine: Box::new(move |v| discount * v[0]),
    })
}

/// t_E_x = A_{x:t} - A^1_{x:t}
fn end_from_insurance(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    let t = key.term.years()?;
    key.moment.power()?;
    if t < 1 {
        return None;
    }
    let endow_ins = QuantityKey {
        family: Family::Insurance,
        age: key.age,
        term: Term::Years(t),
        deferral: 0,
        moment: key.moment,
        discrete: true,
        endowment: true,
    };
    let term_ins = QuantityKey { endowment: false, ..endow_ins };
    Some(Plan {
        statement: format!("{} = {} - {}", key, endow_ins, term_ins),
        deps: vec![(endow_ins, Edge::Descent), (term_ins, Edge::Descent)],
        combine: Box::new(|v| v[0] - v[1]),
    })
}

/// t_E_x = E_x * (t-1)_E_{x+1}
fn end_chain(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    let t = key.term.years()?;
    key.moment.power()?;
    if t < 2 {
        return None;
    }
    let first = endowment_key(key.age, 1, key.moment);
    let rest = endowment_key(key.age + 1, t - 1, key.moment);
    Some(Plan {
        statement: format!("{} = {} * {}", key, first, rest),
        deps: vec![(first, Edge::Descent), (rest, Edge::Descent)],
        combine: Box::new(|v| v[0] * v[1]),
    })
}

/// Var = v^2t * p (1 - p)
fn end_variance(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    if key.moment != Moment::Variance {
        return None;
    }
    let t = key.term.years()?;
    let p = QuantityKey::survival_term(key.age, t);
    let discount = int.v_t(2.0 * t as f64);
    Some(Plan {
        statement: format!("{} = v^{} * {} * (1 - {})", key, 2 * t, p, p),
        deps: vec![(p, Edge::Descent)],
        combine: Box::new(move |v| discount * v[0] * (1.0 - v[0])),
    })
}

// ---------------------------------------------------------------------------
// Insurance: A (whole life / term / endowment), moments 1 and 2
// ---------------------------------------------------------------------------

static INSURANCE: &[Formula] = &[
    Formula { name: "expired insurance", tier: Tier::Terminal, plan: ins_zero_term },
    Formula { name: "one-year endowment insurance", tier: Tier::Terminal, plan: ins_one_year_endowment },
    Formula { name: "deferred insurance", tier: Tier::Search, plan: ins_deferral_backward },
    Formula { name: "deferred insurance", tier: Tier::Search, plan: ins_deferral_forward },
    Formula { name: "endowment decomposition", tier: Tier::Search, plan: ins_endowment_split },
    Formula { name: "endowment decomposition", tier: Tier::Search, plan: ins_term_from_endowment },
    Formula { name: "one-year term insurance", tier: Tier::Search, plan: ins_one_year_term },
    Formula { name: "backward recursion", tier: Tier::Search, plan: ins_backward },
    Formula { name: "forward recursion", tier: Tier::Search, plan: ins_forward },
    Formula { name: "annuity twin", tier: Tier::Search, plan: ins_annuity_twin },
];

fn ins_zero_term(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    if key.term != Term::Years(0) || key.deferral != 0 {
        return None;
    }
    let value = if key.endowment { 1.0 } else { 0.0 };
    Some(terminal(key, value))
}

/// A_{x:1} = v^m for a discrete endowment insurance
fn ins_one_year_endowment(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    if !key.endowment || !key.discrete || key.deferral != 0 || key.term != Term::Years(1) {
        return None;
    }
    let m = key.moment.power()?;
    Some(terminal(key, int.v_t(m)))
}

/// u|A_x = E_x * (u-1)|A_{x+1}
fn ins_deferral_backward(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    if key.deferral < 1 {
        return None;
    }
    key.moment.power()?;
    let endow = endowment_key(key.age, 1, key.moment);
    let rest = insurance_like(key, key.age + 1, key.term, key.deferral - 1);
    Some(Plan {
        statement: format!("{} = {} * {}", key, endow, rest),
        deps: vec![(endow, Edge::Descent), (rest, Edge::Descent)],
        combine: Box::new(|v| v[0] * v[1]),
    })
}

/// u|A_x = (u+1)|A_{x-1} / E_{x-1}
fn ins_deferral_forward(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    if key.deferral < 1 {
        return None;
    }
    key.moment.power()?;
    let longer = insurance_like(key, key.age - 1, key.term, key.deferral + 1);
    let endow = endowment_key(key.age - 1, 1, key.moment);
    Some(Plan {
        statement: format!("{} = {} / {}", key, longer, endow),
        deps: vec![(longer, Edge::Descent), (endow, Edge::Descent)],
        combine: Box::new(|v| v[0] / v[1]),
    })
}

/// A_{x:t} = A^1_{x:t} + t_E_x
fn ins_endowment_split(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    if !key.endowment || key.deferral != 0 {
        return None;
    }
    let t = key.term.years()?;
    key.moment.power()?;
    if t < 1 {
        return None;
    }
    let term_ins = QuantityKey { endowment: false, ..*key };
    let endow = endowment_key(key.age, t, key.moment);
    Some(Plan {
        statement: format!("{} = {} + {}", key, term_ins, endow),
        deps: vec![(term_ins, Edge::Descent), (endow, Edge::Descent)],
        combine: Box::new(|v| v[0] + v[1]),
    })
}

/// A^1_{x:t} = A_{x:t} - t_E_x
fn ins_term_from_endowment(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    if key.endowment || key.deferral != 0 {
        return None;
    }
    let t = key.term.years()?;
    key.moment.power()?;
    if t < 1 {
        return None;
    }
    let endow_ins = QuantityKey { endowment: true, ..*key };
    let endow = endowment_key(key.age, t, key.moment);
    Some(Plan {
        statement: format!("{} = {} - {}", key, endow_ins, endow),
        deps: vec![(endow_ins, Edge::Descent), (endow, Edge::Descent)],
        combine: Box::new(|v| v[0] - v[1]),
    })
}

/// A^1_{x:1} = v^m * q_x
fn ins_one_year_term(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    if key.endowment || !key.discrete || key.deferral != 0 || key.term != Term::Years(1) {
        return None;
    }
    let m = key.moment.power()?;
    let p = QuantityKey::survival(key.age);
    let discount = int.v_t(m);
    Some(Plan {
        statement: format!("{} = v^{} * (1 - {})", key, m, p),
        deps: vec![(p, Edge::Lateral)],
        combine: Box::new(move |v| discount * (1.0 - v[0])),
    })
}

/// A_x = v^m * (q_x + p_x * A_{x+1})
fn ins_backward(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    if !key.discrete || key.deferral != 0 {
        return None;
    }
    let m = key.moment.power()?;
    if let Some(t) = key.term.years() {
        if t < 2 {
            return None;
        }
    }
    let p = QuantityKey::survival(key.age);
    let rest = insurance_like(key, key.age + 1, key.term.shortened(1), 0);
    let discount = int.v_t(m);
    Some(Plan {
        statement: format!("{} = v^{} * [ (1 - {}) + {} * {} ]", key, m, p, p, rest),
        deps: vec![(p, Edge::Lateral), (rest, Edge::Descent)],
        combine: Box::new(move |v| discount * ((1.0 - v[0]) + v[0] * v[1])),
    })
}

/// A_{x+1} = (A_x / v^m - q_x) / p_x, shifted to solve for the target
fn ins_forward(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    if !key.discrete || key.deferral != 0 {
        return None;
    }
    let m = key.moment.power()?;
    if key.term == Term::Years(0) {
        return None;
    }
    let prev = insurance_like(key, key.age - 1, key.term.extended(1), 0);
    let p = QuantityKey::survival(key.age - 1);
    let discount = int.v_t(m);
    Some(Plan {
        statement: format!("{} = [ {} / v^{} - (1 - {}) ] / {}", key, prev, m, p, p),
        deps: vec![(prev, Edge::Descent), (p, Edge::Lateral)],
        combine: Box::new(move |v| (v[0] / discount - (1.0 - v[1])) / v[1]),
    })
}

/// A = 1 - d * a (discrete) or 1 - delta * a (continuous)
///
/// Undefined at zero interest, where insurance and annuity decouple.
fn ins_annuity_twin(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    if key.moment != Moment::First || key.deferral != 0 {
        return None;
    }
    // Twin exists for whole life and endowment insurance, not plain term
    match (key.endowment, key.term) {
        (false, Term::Whole) | (true, Term::Years(_)) => {}
        _ => return None,
    }
    let rate = if key.discrete { int.d() } else { int.delta() };
    if rate == 0.0 {
        return None;
    }
    let annuity = annuity_like(key, key.age, key.term, 0);
    Some(Plan {
        statement: format!("{} = 1 - d * {}", key, annuity),
        deps: vec![(annuity, Edge::Descent)],
        combine: Box::new(move |v| 1.0 - rate * v[0]),
    })
}

// ---------------------------------------------------------------------------
// Increasing and decreasing term insurance
// ---------------------------------------------------------------------------

static INCREASING: &[Formula] = &[
    Formula { name: "expired insurance", tier: Tier::Terminal, plan: ia_zero_term },
    Formula { name: "varying insurance identity", tier: Tier::Search, plan: ia_from_decreasing },
    Formula { name: "backward recursion", tier: Tier::Search, plan: ia_backward },
];

static DECREASING: &[Formula] = &[
    Formula { name: "expired insurance", tier: Tier::Terminal, plan: da_zero_term },
    Formula { name: "varying insurance identity", tier: Tier::Search, plan: da_from_increasing },
    Formula { name: "backward recursion", tier: Tier::Search, plan: da_backward },
];

fn varying_applicable(key: &QuantityKey) -> Option<i32> {
    if key.deferral != 0 || key.moment != Moment::First {
        return None;
    }
    key.term.years()
}

fn ia_zero_term(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    (key.term == Term::Years(0)).then(|| terminal(key, 0.0))
}

fn da_zero_term(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    (key.term == Term::Years(0)).then(|| terminal(key, 0.0))
}

/// IA + DA = (n + 1) A^1 discrete, n A^1 continuous
fn ia_from_decreasing(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    let t = varying_applicable(key)?;
    if t < 1 {
        return None;
    }
    let n = t as f64 + if key.discrete { 1.0 } else { 0.0 };
    let term_ins = QuantityKey { family: Family::Insurance, ..*key };
    let da = QuantityKey { family: Family::DecreasingInsurance, ..*key };
    Some(Plan {
        statement: format!("{} = {} * {} - {}", key, n, term_ins, da),
        deps: vec![(term_ins, Edge::Descent), (da, Edge::Descent)],
        combine: Box::new(move |v| n * v[0] - v[1]),
    })
}

fn da_from_increasing(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    let t = varying_applicable(key)?;
    if t < 1 {
        return None;
    }
    let n = t as f64 + if key.discrete { 1.0 } else { 0.0 };
    let term_ins = QuantityKey { family: Family::Insurance, ..*key };
    let ia = QuantityKey { family: Family::IncreasingInsurance, ..*key };
    Some(Plan {
        statement: format!("{} = {} * {} - {}", key, n, term_ins, ia),
        deps: vec![(term_ins, Edge::Descent), (ia, Edge::Descent)],
        combine: Box::new(move |v| n * v[0] - v[1]),
    })
}

/// (IA)_{x:t} = A^1_{x:t} + v p_x (IA)_{x+1:t-1}
fn ia_backward(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    let t = varying_applicable(key)?;
    if t < 1 {
        return None;
    }
    let term_ins = QuantityKey { family: Family::Insurance, ..*key };
    let p = QuantityKey::survival(key.age);
    let rest = QuantityKey {
        family: Family::IncreasingInsurance,
        age: key.age + 1,
        term: Term::Years(t - 1),
        ..*key
    };
    let v = int.v();
    Some(Plan {
        statement: format!("{} = {} + v * {} * {}", key, term_ins, p, rest),
        deps: vec![(term_ins, Edge::Descent), (p, Edge::Lateral), (rest, Edge::Descent)],
        combine: Box::new(move |vals| vals[0] + v * vals[1] * vals[2]),
    })
}

/// (DA)_{x:t} = v * (t q_x + p_x (DA)_{x+1:t-1})
fn da_backward(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    let t = varying_applicable(key)?;
    if t < 1 || !key.discrete {
        return None;
    }
    let p = QuantityKey::survival(key.age);
    let rest = QuantityKey {
        family: Family::DecreasingInsurance,
        age: key.age + 1,
        term: Term::Years(t - 1),
        ..*key
    };
    let v = int.v();
    let years = t as f64;
    Some(Plan {
        statement: format!("{} = v * [ {} * (1 - {}) + {} * {} ]", key, t, p, p, rest),
        deps: vec![(p, Edge::Lateral), (rest, Edge::Descent)],
        combine: Box::new(move |vals| v * (years * (1.0 - vals[0]) + vals[0] * vals[1])),
    })
}

// ---------------------------------------------------------------------------
// Annuity: a (whole life / temporary / deferred)
// ---------------------------------------------------------------------------

static ANNUITY: &[Formula] = &[
    Formula { name: "expired annuity", tier: Tier::Terminal, plan: ann_zero_term },
    Formula { name: "one-year annuity-due", tier: Tier::Terminal, plan: ann_one_year_due },
    Formula { name: "deferred annuity", tier: Tier::Search, plan: ann_deferral_backward },
    Formula { name: "deferred annuity", tier: Tier::Search, plan: ann_deferral_forward },
    Formula { name: "deferred annuity", tier: Tier::Search, plan: ann_deferral_split },
    Formula { name: "backward recursion", tier: Tier::Search, plan: ann_backward },
    Formula { name: "forward recursion", tier: Tier::Search, plan: ann_forward },
    Formula { name: "insurance twin", tier: Tier::Search, plan: ann_insurance_twin },
];

fn ann_zero_term(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    (key.term == Term::Years(0)).then(|| terminal(key, 0.0))
}

/// a_{x:1} = 1 for an annuity-due: the single payment is certain
fn ann_one_year_due(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    if key.term == Term::Years(1)
        && key.deferral == 0
        && key.discrete
        && key.moment == Moment::First
    {
        Some(terminal(key, 1.0))
    } else {
        None
    }
}

fn ann_applicable(key: &QuantityKey) -> bool {
    key.moment == Moment::First
}

/// u|a_x = E_x * (u-1)|a_{x+1}
fn ann_deferral_backward(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    if key.deferral < 1 || !ann_applicable(key) {
        return None;
    }
    let endow = endowment_key(key.age, 1, Moment::First);
    let rest = annuity_like(key, key.age + 1, key.term, key.deferral - 1);
    Some(Plan {
        statement: format!("{} = {} * {}", key, endow, rest),
        deps: vec![(endow, Edge::Descent), (rest, Edge::Descent)],
        combine: Box::new(|v| v[0] * v[1]),
    })
}

/// u|a_x = (u+1)|a_{x-1} / E_{x-1}
fn ann_deferral_forward(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    if key.deferral < 1 || !ann_applicable(key) {
        return None;
    }
    let longer = annuity_like(key, key.age - 1, key.term, key.deferral + 1);
    let endow = endowment_key(key.age - 1, 1, Moment::First);
    Some(Plan {
        statement: format!("{} = {} / {}", key, longer, endow),
        deps: vec![(longer, Edge::Descent), (endow, Edge::Descent)],
        combine: Box::new(|v| v[0] / v[1]),
    })
}

/// u|a_{x:t} = a_{x:u+t} - a_{x:u}
fn ann_deferral_split(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    if key.deferral < 1 || !ann_applicable(key) {
        return None;
    }
    let combined = match key.term {
        Term::Whole => Term::Whole,
        Term::Years(t) => Term::Years(key.deferral + t),
    };
    let long = annuity_like(key, key.age, combined, 0);
    let short = annuity_like(key, key.age, Term::Years(key.deferral), 0);
    Some(Plan {
        statement: format!("{} = {} - {}", key, long, short),
        deps: vec![(long, Edge::Descent), (short, Edge::Descent)],
        combine: Box::new(|v| v[0] - v[1]),
    })
}

/// a_{x:t} = 1 + E_x * a_{x+1:t-1}
fn ann_backward(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    if key.deferral != 0 || !ann_applicable(key) || !key.discrete {
        return None;
    }
    if let Some(t) = key.term.years() {
        if t < 2 {
            return None;
        }
    }
    let endow = endowment_key(key.age, 1, Moment::First);
    let rest = annuity_like(key, key.age + 1, key.term.shortened(1), 0);
    Some(Plan {
        statement: format!("{} = 1 + {} * {}", key, endow, rest),
        deps: vec![(endow, Edge::Lateral), (rest, Edge::Descent)],
        combine: Box::new(|v| 1.0 + v[0] * v[1]),
    })
}

/// a_{x:t} = (a_{x-1:t+1} - 1) / E_{x-1}
fn ann_forward(key: &QuantityKey, _int: &Interest) -> Option<Plan> {
    if key.deferral != 0 || !ann_applicable(key) || !key.discrete {
        return None;
    }
    if key.term == Term::Years(0) {
        return None;
    }
    let longer = annuity_like(key, key.age - 1, key.term.extended(1), 0);
    let endow = endowment_key(key.age - 1, 1, Moment::First);
    Some(Plan {
        statement: format!("{} = [ {} - 1 ] / {}", key, longer, endow),
        deps: vec![(longer, Edge::Descent), (endow, Edge::Lateral)],
        combine: Box::new(|v| (v[0] - 1.0) / v[1]),
    })
}

/// a = (1 - A) / d, against whole life or endowment insurance
fn ann_insurance_twin(key: &QuantityKey, int: &Interest) -> Option<Plan> {
    if key.deferral != 0 || !ann_applicable(key) {
        return None;
    }
    let rate = if key.discrete { int.d() } else { int.delta() };
    if rate == 0.0 {
        return None;
    }
    let insurance = QuantityKey {
        family: Family::Insurance,
        age: key.age,
        term: key.term,
        deferral: 0,
        moment: Moment::First,
        discrete: key.discrete,
        endowment: !key.term.is_whole(),
    };
    Some(Plan {
        statement: format!("{} = [ 1 - {} ] / d", key, insurance),
        deps: vec![(insurance, Edge::Descent)],
        combine: Box::new(move |v| (1.0 - v[0]) / rate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int() -> Interest {
        Interest::from_rate(0.05).unwrap()
    }

    fn first_plan(key: &QuantityKey, name: &str) -> Plan {
        catalog(key.family)
            .iter()
            .filter(|f| f.name == name)
            .find_map(|f| (f.plan)(key, &int()))
            .unwrap_or_else(|| panic!("no applicable formula named {}", name))
    }

    #[test]
    fn test_terminal_values() {
        let plan = first_plan(&QuantityKey::survival_term(60, 0), "empty survival horizon");
        assert_eq!((plan.combine)(&[]), 1.0);

        let plan = first_plan(&QuantityKey::mortality_term(60, 0), "empty mortality horizon");
        assert_eq!((plan.combine)(&[]), 0.0);

        let mut whole_p = QuantityKey::survival(60);
        whole_p.term = Term::Whole;
        let plan = first_plan(&whole_p, "vanishing lifetime survival");
        assert_eq!((plan.combine)(&[]), 0.0);

        let plan = first_plan(&QuantityKey::endowment_insurance(60, 0), "expired insurance");
        assert_eq!((plan.combine)(&[]), 1.0);
        let plan = first_plan(&QuantityKey::term_insurance(60, 0), "expired insurance");
        assert_eq!((plan.combine)(&[]), 0.0);
    }

    #[test]
    fn test_complement_combinators() {
        let plan = first_plan(&QuantityKey::survival_term(60, 2), "complement of mortality");
        assert_eq!(plan.deps.len(), 1);
        assert_eq!(plan.deps[0].0, QuantityKey::mortality_term(60, 2));
        assert!(((plan.combine)(&[0.03]) - 0.97).abs() < 1e-12);
    }

    #[test]
    fn test_deferral_split_shifts_age() {
        let key = QuantityKey::mortality_term(50, 3).deferred(2);
        let plan = first_plan(&key, "deferred mortality");
        assert_eq!(plan.deps[0].0, QuantityKey::survival_term(50, 2));
        assert_eq!(plan.deps[1].0, QuantityKey::mortality_term(52, 3));
        assert!(((plan.combine)(&[0.9, 0.1]) - 0.09).abs() < 1e-12);
    }

    #[test]
    fn test_one_year_endowment_is_pure_discount() {
        let plan = first_plan(
            &QuantityKey::endowment_insurance(62, 1),
            "one-year endowment insurance",
        );
        assert!(((plan.combine)(&[]) - 1.0 / 1.05).abs() < 1e-12);

        let plan = first_plan(
            &QuantityKey::endowment_insurance(62, 1).second_moment(),
            "one-year endowment insurance",
        );
        assert!(((plan.combine)(&[]) - (1.0 / 1.05f64).powi(2)).abs() < 1e-12);
    }

    #[test]
    fn test_insurance_backward_combinator() {
        // A_{60:3} = v(q + p A_{61:2})
        let key = QuantityKey::endowment_insurance(60, 3);
        let plan = first_plan(&key, "backward recursion");
        assert_eq!(plan.deps[0].0, QuantityKey::survival(60));
        assert_eq!(plan.deps[1].0, QuantityKey::endowment_insurance(61, 2));
        let v = 1.0 / 1.05;
        let got = (plan.combine)(&[0.99, 0.9078]);
        let expected = v * (0.01 + 0.99 * 0.9078);
        assert!((got - expected).abs() < 1e-12);
    }

    #[test]
    fn test_backward_recursion_declines_one_year_term() {
        // One-year cases belong to the dedicated formulas
        let key = QuantityKey::term_insurance(60, 1);
        let applicable = catalog(Family::Insurance)
            .iter()
            .filter(|f| f.name == "backward recursion")
            .any(|f| (f.plan)(&key, &int()).is_some());
        assert!(!applicable);
    }

    #[test]
    fn test_twin_declines_zero_interest() {
        let zero = Interest::zero();
        let key = QuantityKey::whole_life_annuity(60);
        let applicable = catalog(Family::Annuity)
            .iter()
            .filter(|f| f.name == "insurance twin")
            .any(|f| (f.plan)(&key, &zero).is_some());
        assert!(!applicable);
    }

    #[test]
    fn test_twin_pairs_temporary_annuity_with_endowment_insurance() {
        let plan = first_plan(&QuantityKey::temporary_annuity(60, 3), "insurance twin");
        assert_eq!(plan.deps[0].0, QuantityKey::endowment_insurance(60, 3));
        let d = 0.05 / 1.05;
        assert!(((plan.combine)(&[0.86545]) - (1.0 - 0.86545) / d).abs() < 1e-12);
    }

    #[test]
    fn test_varying_identity_is_mutual() {
        let ia = QuantityKey::increasing_insurance(60, 5);
        let plan = first_plan(&ia, "varying insurance identity");
        assert_eq!(plan.deps[1].0, QuantityKey::decreasing_insurance(60, 5));
        // discrete: IA = (n+1) A - DA
        assert!(((plan.combine)(&[0.1, 0.3]) - (6.0 * 0.1 - 0.3)).abs() < 1e-12);

        let da = QuantityKey::decreasing_insurance(60, 5);
        let plan = first_plan(&da, "varying insurance identity");
        assert_eq!(plan.deps[1].0, QuantityKey::increasing_insurance(60, 5));
    }

    #[test]
    fn test_annuity_backout_inverts_backward_recursion() {
        let plan = first_plan(&QuantityKey::survival(61), "annuity back-out");
        // whole-life variant listed first
        assert_eq!(plan.deps[0].0, QuantityKey::whole_life_annuity(61));
        assert_eq!(plan.deps[1].0, QuantityKey::whole_life_annuity(62));
        // a_x = 1 + v p a_{x+1} with p = 0.98, a_{x+1} = 11.0
        let v = 1.0 / 1.05;
        let a_x = 1.0 + v * 0.98 * 11.0;
        assert!(((plan.combine)(&[a_x, 11.0]) - 0.98).abs() < 1e-12);
    }

    #[test]
    fn test_insurance_backout_inverts_backward_recursion() {
        let key = QuantityKey::survival(61);
        // endowment pair with a 2-year horizon
        let plan = catalog(Family::Survival)
            .iter()
            .filter(|f| f.name == "insurance back-out")
            .filter_map(|f| (f.plan)(&key, &int()))
            .find(|p| p.deps[0].0 == QuantityKey::endowment_insurance(61, 2))
            .unwrap();
        assert_eq!(plan.deps[1].0, QuantityKey::endowment_insurance(62, 1));
        // A_{61:2} = v(q + p A_{62:1}) with p = 0.983, A_{62:1} = v
        let v: f64 = 1.0 / 1.05;
        let a = v * ((1.0 - 0.983) + 0.983 * v);
        assert!(((plan.combine)(&[a, v]) - 0.983).abs() < 1e-12);
    }

    #[test]
    fn test_search_formulas_decline_variance_keys() {
        let key = QuantityKey::whole_life_annuity(60).variance();
        let any = catalog(Family::Annuity)
            .iter()
            .filter(|f| f.tier != Tier::Terminal)
            .any(|f| (f.plan)(&key, &int()).is_some());
        assert!(!any);
    }
}

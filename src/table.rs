//! Annual life table survival model
//!
//! Stores one-year mortality rates by attained age and exposes them as a
//! [`SurvivalModel`], with uniform distribution of deaths inside each
//! year. Tables load from CSV (`age,q` columns) or from in-memory rates.

use std::error::Error;
use std::fs::File;
use std::path::Path;

use thiserror::Error as ThisError;

use crate::survival::SurvivalModel;

/// Errors from building a life table in memory
#[derive(Debug, ThisError)]
pub enum TableError {
    #[error("life table needs at least one rate")]
    Empty,

    #[error("mortality rate at age {age} must lie in [0, 1], got {rate}")]
    RateOutOfRange { age: i32, rate: f64 },
}

/// Annual mortality table indexed by attained age
///
/// Ages below the table start carry no mortality; survival past the end
/// of the table is zero.
#[derive(Debug, Clone)]
pub struct LifeTable {
    start_age: i32,
    q: Vec<f64>,
}

impl LifeTable {
    /// Build from one-year rates starting at `start_age`
    pub fn from_rates(start_age: i32, q: Vec<f64>) -> Result<Self, TableError> {
        if q.is_empty() {
            return Err(TableError::Empty);
        }
        for (offset, &rate) in q.iter().enumerate() {
            if !(0.0..=1.0).contains(&rate) {
                return Err(TableError::RateOutOfRange {
                    age: start_age + offset as i32,
                    rate,
                });
            }
        }
        Ok(Self { start_age, q })
    }

    /// Load from a CSV file with `age,q` columns (header row expected)
    ///
    /// Missing ages inside the covered range default to zero mortality.
    pub fn load_csv(path: &Path) -> Result<Self, Box<dyn Error>> {
        let file = File::open(path)?;
        let mut reader = csv::Reader::from_reader(file);

        let mut rows: Vec<(i32, f64)> = Vec::new();
        for result in reader.records() {
            let record = result?;
            let age: i32 = record[0].trim().parse()?;
            let rate: f64 = record[1].trim().parse()?;
            rows.push((age, rate));
        }
        if rows.is_empty() {
            return Err(Box::new(TableError::Empty));
        }

        let start_age = rows.iter().map(|r| r.0).min().unwrap_or(0);
        let end_age = rows.iter().map(|r| r.0).max().unwrap_or(0);
        let mut q = vec![0.0; (end_age - start_age + 1) as usize];
        for (age, rate) in rows {
            q[(age - start_age) as usize] = rate;
        }

        Ok(Self::from_rates(start_age, q)?)
    }

    pub fn start_age(&self) -> i32 {
        self.start_age
    }

    /// One-year mortality rate at integer age
    pub fn q_at(&self, age: i32) -> f64 {
        if age < self.start_age {
            return 0.0;
        }
        let offset = (age - self.start_age) as usize;
        self.q.get(offset).copied().unwrap_or(1.0)
    }

    /// Survival over whole years only
    fn survival_integer(&self, age: i32, years: i32) -> f64 {
        let mut p = 1.0;
        for k in 0..years {
            p *= 1.0 - self.q_at(age + k);
            if p == 0.0 {
                break;
            }
        }
        p
    }
}

impl SurvivalModel for LifeTable {
    fn survival(&self, age: i32, t: f64) -> f64 {
        if t <= 0.0 {
            return 1.0;
        }
        let whole = t.floor() as i32;
        let frac = t - whole as f64;
        let mut p = self.survival_integer(age, whole);
        if frac > 0.0 {
            // UDD within the year
            p *= 1.0 - frac * self.q_at(age + whole);
        }
        p
    }

    fn max_age(&self) -> i32 {
        self.start_age + self.q.len() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_integer_survival_is_rate_product() {
        let table = LifeTable::from_rates(60, vec![0.01, 0.02, 0.03]).unwrap();
        let expected = 0.99 * 0.98 * 0.97;
        assert!((table.survival(60, 3.0) - expected).abs() < 1e-12);
        assert!((table.survival(61, 1.0) - 0.98).abs() < 1e-12);
    }

    #[test]
    fn test_udd_fractional_year() {
        let table = LifeTable::from_rates(60, vec![0.01, 0.02, 0.03]).unwrap();
        let expected = 0.99 * (1.0 - 0.5 * 0.02);
        assert!((table.survival(60, 1.5) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_table_bounds() {
        let table = LifeTable::from_rates(60, vec![0.01, 0.02]).unwrap();
        // Below the table: no mortality data, rates of zero
        assert_eq!(table.q_at(40), 0.0);
        // Past the end: certain death
        assert_eq!(table.q_at(62), 1.0);
        assert_eq!(table.survival(60, 3.0), 0.0);
        assert_eq!(table.max_age(), 62);
    }

    #[test]
    fn test_rejects_bad_rates() {
        assert!(LifeTable::from_rates(60, vec![]).is_err());
        assert!(LifeTable::from_rates(60, vec![0.5, 1.2]).is_err());
        assert!(LifeTable::from_rates(60, vec![-0.1]).is_err());
    }

    #[test]
    fn test_load_csv() {
        let path = std::env::temp_dir().join("actuarial_pv_test_table.csv");
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "age,q").unwrap();
            writeln!(file, "60,0.01").unwrap();
            writeln!(file, "62,0.03").unwrap();
            writeln!(file, "61,0.02").unwrap();
        }

        let table = LifeTable::load_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(table.start_age(), 60);
        assert!((table.q_at(61) - 0.02).abs() < 1e-12);
        assert!((table.survival(60, 3.0) - 0.99 * 0.98 * 0.97).abs() < 1e-12);
    }
}

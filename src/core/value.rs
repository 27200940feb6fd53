use crate::statistics::{mean, percentile};
use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

/// A market quantity that is either a point value or a vector of Monte-Carlo
/// samples. Arithmetic broadcasts over samples, so calculation code never
/// needs to branch on which variant it is holding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Point(f64),
    Distribution(Vec<f64>),
}

impl Value {
    pub const ZERO: Value = Value::Point(0.);
    pub const ONE: Value = Value::Point(1.);

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Point(v) => Value::Point(f(*v)),
            Value::Distribution(samples) => {
                Value::Distribution(samples.iter().map(|v| f(*v)).collect())
            }
        }
    }

    /// Combines two values elementwise, broadcasting a point value across the
    /// samples of a distribution. Distributions within one run share a sample
    /// count.
    pub fn zip_with(&self, other: &Value, f: impl Fn(f64, f64) -> f64) -> Value {
        match (self, other) {
            (Value::Point(a), Value::Point(b)) => Value::Point(f(*a, *b)),
            (Value::Point(a), Value::Distribution(bs)) => {
                Value::Distribution(bs.iter().map(|b| f(*a, *b)).collect())
            }
            (Value::Distribution(all_a), Value::Point(b)) => {
                Value::Distribution(all_a.iter().map(|a| f(*a, *b)).collect())
            }
            (Value::Distribution(all_a), Value::Distribution(all_b)) => {
                debug_assert_eq!(all_a.len(), all_b.len());
                Value::Distribution(
                    all_a
                        .iter()
                        .zip(all_b.iter())
                        .map(|(a, b)| f(*a, *b))
                        .collect(),
                )
            }
        }
    }

    /// Elementwise division defaulting to `default` wherever the denominator
    /// is zero.
    pub fn div_or(&self, denominator: &Value, default: f64) -> Value {
        self.zip_with(denominator, |n, d| if d == 0. { default } else { n / d })
    }

    pub fn min_with(&self, cap: f64) -> Value {
        self.map(|v| v.min(cap))
    }

    pub fn max_with(&self, floor: f64) -> Value {
        self.map(|v| v.max(floor))
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Value::Point(v) => *v == 0.,
            Value::Distribution(samples) => samples.iter().all(|v| *v == 0.),
        }
    }

    pub fn sample_count(&self) -> usize {
        match self {
            Value::Point(_) => 1,
            Value::Distribution(samples) => samples.len(),
        }
    }

    /// The i-th sample, with point values broadcasting to every index.
    pub fn sample(&self, i: usize) -> f64 {
        match self {
            Value::Point(v) => *v,
            Value::Distribution(samples) if samples.is_empty() => 0.,
            Value::Distribution(samples) => samples[i.min(samples.len() - 1)],
        }
    }

    pub fn mean(&self) -> f64 {
        match self {
            Value::Point(v) => *v,
            Value::Distribution(samples) => mean(samples),
        }
    }

    /// 5th-percentile summary (degenerates to the point value).
    pub fn low(&self) -> f64 {
        match self {
            Value::Point(v) => *v,
            Value::Distribution(samples) => percentile(samples, 5),
        }
    }

    /// 95th-percentile summary (degenerates to the point value).
    pub fn high(&self) -> f64 {
        match self {
            Value::Point(v) => *v,
            Value::Distribution(samples) => percentile(samples, 95),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::ZERO
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Point(value)
    }
}

macro_rules! impl_value_op {
    ($op_trait:ident, $method:ident, $op:tt) => {
        impl $op_trait for &Value {
            type Output = Value;

            fn $method(self, rhs: &Value) -> Value {
                self.zip_with(rhs, |a, b| a $op b)
            }
        }

        impl $op_trait for Value {
            type Output = Value;

            fn $method(self, rhs: Value) -> Value {
                self.zip_with(&rhs, |a, b| a $op b)
            }
        }

        impl $op_trait<f64> for &Value {
            type Output = Value;

            fn $method(self, rhs: f64) -> Value {
                self.map(|a| a $op rhs)
            }
        }
    };
}

impl_value_op!(Add, add, +);
impl_value_op!(Sub, sub, -);
impl_value_op!(Mul, mul, *);
impl_value_op!(Div, div, /);

impl Neg for &Value {
    type Output = Value;

    fn neg(self) -> Value {
        self.map(|v| -v)
    }
}

impl AddAssign<&Value> for Value {
    fn add_assign(&mut self, rhs: &Value) {
        *self = &*self + rhs;
    }
}

impl Sum for Value {
    fn sum<I: Iterator<Item = Value>>(iter: I) -> Value {
        iter.fold(Value::ZERO, |acc, v| &acc + &v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn distribution() -> Value {
        Value::Distribution(vec![1., 2., 3., 4.])
    }

    #[rstest]
    fn point_arithmetic_stays_a_point() {
        assert_eq!(&Value::Point(2.) + &Value::Point(3.), Value::Point(5.));
        assert_eq!(&Value::Point(2.) * &Value::Point(3.), Value::Point(6.));
    }

    #[rstest]
    fn point_broadcasts_over_distribution(distribution: Value) {
        assert_eq!(
            &Value::Point(10.) * &distribution,
            Value::Distribution(vec![10., 20., 30., 40.])
        );
        assert_eq!(
            &distribution - &Value::Point(1.),
            Value::Distribution(vec![0., 1., 2., 3.])
        );
    }

    #[rstest]
    fn distributions_combine_elementwise(distribution: Value) {
        assert_eq!(
            &distribution + &distribution,
            Value::Distribution(vec![2., 4., 6., 8.])
        );
    }

    #[rstest]
    fn division_by_zero_yields_default() {
        assert_eq!(
            Value::Point(5.).div_or(&Value::Point(0.), 1.),
            Value::Point(1.)
        );
        assert_eq!(
            Value::Distribution(vec![4., 6.]).div_or(&Value::Distribution(vec![2., 0.]), 0.),
            Value::Distribution(vec![2., 0.])
        );
    }

    #[rstest]
    fn summaries_degenerate_for_points() {
        let value = Value::Point(7.5);
        assert_eq!(value.mean(), 7.5);
        assert_eq!(value.low(), 7.5);
        assert_eq!(value.high(), 7.5);
    }

    #[rstest]
    fn summaries_over_distribution(distribution: Value) {
        assert_relative_eq!(distribution.mean(), 2.5);
        assert!(distribution.low() < distribution.mean());
        assert!(distribution.high() > distribution.mean());
    }

    #[rstest]
    fn deserializes_untagged_from_json() {
        let point: Value = serde_json::from_str("2.25").unwrap();
        assert_eq!(point, Value::Point(2.25));
        let dist: Value = serde_json::from_str("[1.0, 2.0]").unwrap();
        assert_eq!(dist, Value::Distribution(vec![1., 2.]));
    }
}

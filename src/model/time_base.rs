use std::ops::Add;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Discretized time grid shared by every model of one optimization run.
///
/// `dt[i]` is the duration of step `i` in seconds. Models hold `n` flow values
/// (one per step) and `n + 1` state values (one per step boundary).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBase {
    dt: Vec<f64>,
}

impl TimeBase {
    pub fn new(dt: Vec<f64>) -> ModelResult<Self> {
        if dt.is_empty() {
            return Err(ModelError::dimension("time base steps", 1, 0));
        }
        if let Some((i, d)) = dt.iter().enumerate().find(|(_, d)| !(d.is_finite() && **d > 0.0)) {
            return Err(ModelError::InvalidParameter(format!(
                "dt[{i}] = {d} must be a positive number of seconds"
            )));
        }
        Ok(Self { dt })
    }

    /// `steps` intervals of `step_seconds` each.
    pub fn uniform(steps: usize, step_seconds: f64) -> ModelResult<Self> {
        Self::new(vec![step_seconds; steps])
    }

    pub fn n(&self) -> usize {
        self.dt.len()
    }

    pub fn dt(&self) -> &[f64] {
        &self.dt
    }

    /// Step durations in hours (`dt / 3600`), the factor turning kW into kWh.
    pub fn hours(&self) -> Vec<f64> {
        self.dt.iter().map(|d| d / SECONDS_PER_HOUR).collect()
    }

    /// Offset in seconds from the start of the horizon to the start of each step.
    pub fn step_offsets(&self) -> Vec<f64> {
        let mut elapsed = 0.0;
        self.dt
            .iter()
            .map(|d| {
                let start = elapsed;
                elapsed += d;
                start
            })
            .collect()
    }

    /// Fails fast when an array does not match the step count.
    pub fn expect_steps(&self, what: &str, len: usize) -> ModelResult<()> {
        if len != self.n() {
            return Err(ModelError::dimension(what, self.n(), len));
        }
        Ok(())
    }

    /// Fails fast when an array does not match the boundary count (`n + 1`).
    pub fn expect_boundaries(&self, what: &str, len: usize) -> ModelResult<()> {
        if len != self.n() + 1 {
            return Err(ModelError::dimension(what, self.n() + 1, len));
        }
        Ok(())
    }
}

/// Running sum of `items`. A single item is returned as is.
pub fn cumulative_sum<T>(items: &[T]) -> Vec<T>
where
    T: Clone + Add<Output = T>,
{
    if items.len() <= 1 {
        return items.to_vec();
    }
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        let next = match out.last() {
            Some(prev) => prev.clone() + item.clone(),
            None => item.clone(),
        };
        out.push(next);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn test_rejects_empty_horizon() {
        assert!(matches!(
            TimeBase::new(vec![]),
            Err(ModelError::DimensionMismatch { expected: 1, actual: 0, .. })
        ));
    }

    #[rstest]
    #[case(0.0)]
    #[case(-900.0)]
    #[case(f64::NAN)]
    fn test_rejects_non_positive_steps(#[case] bad: f64) {
        let err = TimeBase::new(vec![900.0, bad]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidParameter(_)));
    }

    #[test]
    fn test_hours_and_offsets() {
        let tb = TimeBase::new(vec![900.0, 1800.0, 3600.0]).unwrap();
        assert_eq!(tb.n(), 3);
        assert_eq!(tb.hours(), vec![0.25, 0.5, 1.0]);
        assert_eq!(tb.step_offsets(), vec![0.0, 900.0, 2700.0]);
    }

    #[test]
    fn test_dimension_checks() {
        let tb = TimeBase::uniform(4, 900.0).unwrap();
        assert!(tb.expect_steps("load", 4).is_ok());
        assert!(tb.expect_steps("load", 5).is_err());
        assert!(tb.expect_boundaries("energy", 5).is_ok());
        assert!(tb.expect_boundaries("energy", 4).is_err());
    }

    #[test]
    fn test_cumulative_sum_single_step_is_identity() {
        assert_eq!(cumulative_sum(&[7.5]), vec![7.5]);
    }

    #[test]
    fn test_cumulative_sum_running_total() {
        assert_eq!(cumulative_sum(&[1.0, 2.0, 3.0]), vec![1.0, 3.0, 6.0]);
    }

    proptest! {
        #[test]
        fn prop_cumulative_sum_of_zeros_is_zero(n in 1usize..200) {
            let sums = cumulative_sum(&vec![0.0_f64; n]);
            prop_assert_eq!(sums.len(), n);
            prop_assert!(sums.iter().all(|v| *v == 0.0));
        }

        #[test]
        fn prop_cumulative_sum_ends_at_total(
            values in prop::collection::vec(-100.0f64..100.0, 1..100)
        ) {
            let sums = cumulative_sum(&values);
            let total: f64 = values.iter().sum();
            prop_assert_eq!(sums.len(), values.len());
            prop_assert!((sums[sums.len() - 1] - total).abs() < 1e-9);
        }
    }
}

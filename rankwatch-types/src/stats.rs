//! Cross-participant statistics.

use alloc::vec::Vec;

/// Statistics for one key across every snapshot that contained it.
///
/// `values` holds one entry per contributing participant, in rank order.
/// With exactly one value, `mean` and `std_dev` both equal that value; this
/// keeps single-participant runs readable instead of reporting a zero or
/// undefined deviation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AggregateStat {
    /// Number of participants that contributed a value.
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator).
    pub std_dev: f64,
    pub values: Vec<f64>,
}

impl AggregateStat {
    /// Compute statistics from the collected values.
    ///
    /// Returns `None` for an empty set rather than fabricating zeros.
    #[cfg(feature = "std")]
    pub fn from_values(values: Vec<f64>) -> Option<Self> {
        match values.len() {
            0 => None,
            1 => Some(Self {
                count: 1,
                mean: values[0],
                std_dev: values[0],
                values,
            }),
            n => {
                let mean = values.iter().sum::<f64>() / n as f64;
                let variance =
                    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
                Some(Self {
                    count: n,
                    mean,
                    std_dev: variance.sqrt(),
                    values,
                })
            }
        }
    }

    /// Smallest contributed value.
    pub fn min(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Largest contributed value.
    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn empty_values_have_no_stat() {
        assert!(AggregateStat::from_values(Vec::new()).is_none());
    }

    #[test]
    fn single_value_is_its_own_mean_and_deviation() {
        let stat = AggregateStat::from_values(vec![4.2]).unwrap();
        assert_eq!(stat.count, 1);
        assert_eq!(stat.mean, 4.2);
        assert_eq!(stat.std_dev, 4.2);
    }

    #[test]
    fn three_participants() {
        let stat = AggregateStat::from_values(vec![10.0, 12.0, 11.0]).unwrap();
        assert_eq!(stat.count, 3);
        assert!((stat.mean - 11.0).abs() < 1e-12);
        assert!((stat.std_dev - 1.0).abs() < 1e-12);
        assert_eq!(stat.min(), 10.0);
        assert_eq!(stat.max(), 12.0);
    }

    #[test]
    fn sample_deviation_uses_n_minus_one() {
        // population stdev would be 2.0; sample stdev is sqrt(32/7)
        let stat =
            AggregateStat::from_values(vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((stat.mean - 5.0).abs() < 1e-12);
        assert!((stat.std_dev - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn identical_values_have_zero_deviation() {
        let stat = AggregateStat::from_values(vec![3.0, 3.0]).unwrap();
        assert_eq!(stat.std_dev, 0.0);
    }
}

/// Summary of a set of throughput samples (one sample per worker).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub count: usize,
    pub min: f64,
    pub median: f64,
    pub mean: f64,
    pub max: f64,
    /// Population standard deviation.
    pub std: f64,
}

impl Statistics {
    /// Summarise `samples`. Returns `None` for an empty slice.
    ///
    /// The median of an even-sized sample is the mean of the two middle
    /// values.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len();
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };

        Some(Statistics {
            count: n,
            min: sorted[0],
            median,
            mean: Self::mean(&sorted)?,
            max: sorted[n - 1],
            std: Self::std_deviation(&sorted)?,
        })
    }

    fn mean(data: &[f64]) -> Option<f64> {
        let sum = data.iter().sum::<f64>();
        let count = data.len();

        match count {
            positive if positive > 0 => Some(sum / count as f64),
            _ => None,
        }
    }

    fn std_deviation(data: &[f64]) -> Option<f64> {
        match (Self::mean(data), data.len()) {
            (Some(data_mean), count) if count > 0 => {
                let variance = data
                    .iter()
                    .map(|value| {
                        let diff = data_mean - (*value);

                        diff * diff
                    })
                    .sum::<f64>()
                    / count as f64;

                Some(variance.sqrt())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Statistics;

    fn assert_close(actual: f64, expected: f64) {
        let eps = 1e-9_f64;
        assert!(
            (actual - expected).abs() <= eps,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn empty_samples_have_no_statistics() {
        assert_eq!(Statistics::from_samples(&[]), None);
    }

    #[test]
    fn single_sample() {
        let stats = Statistics::from_samples(&[5.0]).unwrap();

        assert_eq!(stats.count, 1);
        assert_close(stats.min, 5.0);
        assert_close(stats.median, 5.0);
        assert_close(stats.mean, 5.0);
        assert_close(stats.max, 5.0);
        assert_close(stats.std, 0.0);
    }

    #[test]
    fn odd_count_computes_mean_min_max_and_population_std() {
        let stats = Statistics::from_samples(&[3.0, 1.0, 2.0]).unwrap();

        assert_eq!(stats.count, 3);
        assert_close(stats.min, 1.0);
        assert_close(stats.median, 2.0);
        assert_close(stats.mean, 2.0);
        assert_close(stats.max, 3.0);

        // population variance = ((1-2)^2 + (2-2)^2 + (3-2)^2) / 3 = 2/3
        assert_close(stats.std, (2.0_f64 / 3.0).sqrt());
    }

    #[test]
    fn even_count_median_averages_middle_pair() {
        let stats = Statistics::from_samples(&[10.0, 40.0, 20.0, 30.0]).unwrap();

        assert_close(stats.median, 25.0);
        assert_close(stats.mean, 25.0);
        assert_close(stats.min, 10.0);
        assert_close(stats.max, 40.0);
    }

    #[test]
    fn infinite_samples_sort_last() {
        let stats = Statistics::from_samples(&[f64::INFINITY, 1.0, 2.0]).unwrap();

        assert_close(stats.min, 1.0);
        assert_close(stats.median, 2.0);
        assert!(stats.max.is_infinite());
    }
}

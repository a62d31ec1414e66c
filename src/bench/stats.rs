//! Latency summary statistics.

/// Summary of a latency sample, in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencySummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation; needs at least two values.
    pub stdev: Option<f64>,
}

impl LatencySummary {
    /// Summarize a sample. `None` when it is empty.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let mid = count / 2;
        let median = if count % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };
        let stdev = (count > 1).then(|| {
            let variance =
                sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            variance.sqrt()
        });

        Some(Self {
            count,
            mean,
            median,
            min: sorted[0],
            max: sorted[count - 1],
            stdev,
        })
    }
}

//! Latency summary statistics.

use std::fmt;

/// Summary of a latency sample, in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencySummary {
    pub count: usize,
    pub average: f64,
    pub max: f64,
    pub min: f64,
    pub median: f64,
    pub p99: f64,
}

impl LatencySummary {
    /// `None` for an empty sample.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        Some(Self {
            count,
            average: sorted.iter().sum::<f64>() / count as f64,
            max: sorted[count - 1],
            min: sorted[0],
            median: percentile(&sorted, 50.0),
            p99: percentile(&sorted, 99.0),
        })
    }
}

/// Linear interpolation between closest ranks over sorted, non-empty input.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

impl fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary of Latencies ({} executions):", self.count)?;
        writeln!(f, "Average Latency: {:.2} milliseconds", self.average)?;
        writeln!(f, "Max Latency: {:.2} milliseconds", self.max)?;
        writeln!(f, "Min Latency: {:.2} milliseconds", self.min)?;
        writeln!(f, "Median Latency: {:.2} milliseconds", self.median)?;
        write!(f, "99th Percentile Latency: {:.2} milliseconds", self.p99)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sample() {
        assert!(LatencySummary::from_samples(&[]).is_none());
    }

    #[test]
    fn test_single_sample() {
        let s = LatencySummary::from_samples(&[4.0]).unwrap();
        assert_eq!(s.min, 4.0);
        assert_eq!(s.median, 4.0);
        assert_eq!(s.p99, 4.0);
    }

    #[test]
    fn test_summary_interpolates() {
        let s = LatencySummary::from_samples(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(s.count, 4);
        assert_eq!(s.average, 2.5);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 4.0);
        assert_eq!(s.median, 2.5);
        assert!((s.p99 - 3.97).abs() < 1e-9);
    }

    #[test]
    fn test_display() {
        let s = LatencySummary::from_samples(&[1.0, 2.0, 3.0]).unwrap();
        let text = s.to_string();
        assert!(text.contains("Median Latency: 2.00 milliseconds"));
        assert!(text.starts_with("Summary of Latencies (3 executions):"));
    }
}

use crate::error::ConfigError;
use simlog_summary_model::ApdexRating;

/// Default satisfied threshold, in seconds
pub const DEFAULT_APDEX_THRESHOLD_SECS: f64 = 1.5;

/// The Apdex satisfied threshold `T`.
///
/// Requests at or below `T` are satisfied, requests up to `4T` are tolerated and anything slower
/// is frustrated. Validated on construction so classification itself cannot fail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApdexThreshold(f64);

impl ApdexThreshold {
    pub fn new(seconds: f64) -> Result<Self, ConfigError> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(ConfigError::InvalidApdexThreshold(seconds));
        }

        Ok(Self(seconds))
    }

    pub fn seconds(&self) -> f64 {
        self.0
    }

    pub fn millis(&self) -> f64 {
        self.0 * 1000.0
    }
}

impl Default for ApdexThreshold {
    fn default() -> Self {
        Self(DEFAULT_APDEX_THRESHOLD_SECS)
    }
}

/// Apdex sample counts for one set of latencies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Apdex {
    pub satisfied: u64,
    pub tolerated: u64,
    pub frustrated: u64,
}

impl Apdex {
    /// Classify latency samples, in milliseconds, against the threshold
    pub fn classify(samples_ms: &[u64], threshold: &ApdexThreshold) -> Self {
        let satisfied_ms = threshold.millis();
        let tolerated_ms = satisfied_ms * 4.0;

        samples_ms.iter().fold(Apdex::default(), |mut apdex, &sample| {
            let sample = sample as f64;
            if sample <= satisfied_ms {
                apdex.satisfied += 1;
            } else if sample <= tolerated_ms {
                apdex.tolerated += 1;
            } else {
                apdex.frustrated += 1;
            }
            apdex
        })
    }

    pub fn total(&self) -> u64 {
        self.satisfied + self.tolerated + self.frustrated
    }

    /// Score between 0 and 1, defined as 1 when there are no samples
    pub fn score(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 1.0;
        }

        (self.satisfied as f64 + self.tolerated as f64 / 2.0) / total as f64
    }

    pub fn rating(&self) -> ApdexRating {
        ApdexRating::from_score(self.score())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_threshold() {
        assert_eq!(
            Err(ConfigError::InvalidApdexThreshold(0.0)),
            ApdexThreshold::new(0.0)
        );
        assert!(ApdexThreshold::new(-1.5).is_err());
        assert!(ApdexThreshold::new(f64::NAN).is_err());
        assert!(ApdexThreshold::new(f64::INFINITY).is_err());
    }

    #[test]
    fn default_threshold() {
        assert_eq!(1.5, ApdexThreshold::default().seconds());
        assert_eq!(1500.0, ApdexThreshold::default().millis());
    }

    #[test]
    fn classify_with_quarter_second_threshold() -> anyhow::Result<()> {
        let threshold = ApdexThreshold::new(0.25)?;
        let apdex = Apdex::classify(&[100, 200, 300, 400, 500], &threshold);

        assert_eq!(
            Apdex {
                satisfied: 2,
                tolerated: 3,
                frustrated: 0,
            },
            apdex
        );
        assert!((apdex.score() - 0.70).abs() < 1e-9);
        assert_eq!(ApdexRating::Fair, apdex.rating());
        Ok(())
    }

    #[test]
    fn boundaries_are_inclusive() -> anyhow::Result<()> {
        let threshold = ApdexThreshold::new(1.0)?;
        let apdex = Apdex::classify(&[1000, 1001, 4000, 4001], &threshold);

        assert_eq!(1, apdex.satisfied);
        assert_eq!(2, apdex.tolerated);
        assert_eq!(1, apdex.frustrated);
        Ok(())
    }

    #[test]
    fn empty_samples_score_one() {
        let apdex = Apdex::classify(&[], &ApdexThreshold::default());

        assert_eq!(0, apdex.total());
        assert_eq!(1.0, apdex.score());
        assert_eq!(ApdexRating::Excellent, apdex.rating());
    }

    #[test]
    fn all_frustrated_is_unacceptable() {
        let apdex = Apdex::classify(&[10_000, 20_000], &ApdexThreshold::default());

        assert_eq!(0.0, apdex.score());
        assert_eq!(ApdexRating::Unacceptable, apdex.rating());
    }
}

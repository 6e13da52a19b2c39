use crate::apdex::{Apdex, ApdexThreshold};
use crate::event::{RequestEvent, Status};
use simlog_summary_model::{millis_between, RequestStat};
use thiserror::Error;

/// A completion that cannot be used as a latency sample
#[derive(Error, Debug, PartialEq)]
pub enum InvalidSample {
    #[error("Negative duration of {duration_ms}ms for request {label}")]
    NegativeDuration { label: String, duration_ms: i64 },
    #[error("Duration of request {label} from {start_millis} to {end_millis} is out of range")]
    OutOfRange {
        label: String,
        start_millis: i64,
        end_millis: i64,
    },
}

/// Collects every latency sample for one request label.
///
/// All samples are kept, not running aggregates, because exact percentiles need the full order
/// statistics. Memory grows with the number of completions for the label. A sketch such as a
/// t-digest or an HDR histogram would bound it at the cost of exactness.
#[derive(Debug, Clone)]
pub struct RequestStatAccumulator {
    scenario: String,
    label: String,
    samples: Vec<u64>,
    success_count: u64,
    error_count: u64,
    start: Option<i64>,
    end: Option<i64>,
}

impl RequestStatAccumulator {
    pub fn new(scenario: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            label: label.into(),
            samples: Vec::new(),
            success_count: 0,
            error_count: 0,
            start: None,
            end: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of accepted samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Fold one completed request into the sample set.
    ///
    /// A negative duration is rejected and leaves the accumulator untouched.
    pub fn add(&mut self, event: &RequestEvent) -> Result<(), InvalidSample> {
        let Some(duration_ms) = event.duration_millis() else {
            return Err(InvalidSample::OutOfRange {
                label: event.label.clone(),
                start_millis: event.start_millis,
                end_millis: event.end_millis,
            });
        };
        let Ok(latency) = u64::try_from(duration_ms) else {
            return Err(InvalidSample::NegativeDuration {
                label: event.label.clone(),
                duration_ms,
            });
        };

        self.samples.push(latency);
        match event.status {
            Status::Ok => self.success_count += 1,
            Status::Ko => self.error_count += 1,
        }
        self.start = Some(
            self.start
                .map_or(event.start_millis, |start| start.min(event.start_millis)),
        );
        self.end = Some(
            self.end
                .map_or(event.end_millis, |end| end.max(event.end_millis)),
        );

        Ok(())
    }

    /// Merge all the samples of another accumulator into this one
    pub fn absorb(&mut self, other: &RequestStatAccumulator) {
        self.samples.extend_from_slice(&other.samples);
        self.success_count += other.success_count;
        self.error_count += other.error_count;
        self.start = match (self.start, other.start) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    /// Freeze the sample set into a [RequestStat]
    pub fn finish(self, simulation: &str, threshold: &ApdexThreshold) -> RequestStat {
        let mut samples = self.samples;
        samples.sort_unstable();

        let apdex = Apdex::classify(&samples, threshold);
        let start = self.start.unwrap_or(0);
        let end = self.end.unwrap_or(0);
        let duration_seconds = millis_between(start, end) as f64 / 1000.0;
        let count = self.success_count + self.error_count;
        let (mean, stddev) = mean_and_stddev(&samples);

        RequestStat {
            simulation: simulation.to_string(),
            scenario: self.scenario,
            label: self.label,
            success_count: self.success_count,
            error_count: self.error_count,
            start,
            end,
            duration_seconds,
            min: samples.first().copied().unwrap_or(0),
            p50: percentile(&samples, 50.0),
            p90: percentile(&samples, 90.0),
            p95: percentile(&samples, 95.0),
            p99: percentile(&samples, 99.0),
            max: samples.last().copied().unwrap_or(0),
            mean,
            stddev,
            rps: if duration_seconds > 0.0 {
                count as f64 / duration_seconds
            } else {
                0.0
            },
            apdex_score: apdex.score(),
            apdex_rating: apdex.rating(),
        }
    }
}

/// Nearest-rank percentile of ascending sorted samples.
///
/// Returns the sample at `ceil(p / 100 * n) - 1`, clamped to the sample range, or `0` when there
/// are no samples. The result is always one of the samples.
pub fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }

    let n = sorted.len();
    let rank = (p * n as f64 / 100.0).ceil();
    let idx = if rank.is_nan() || rank < 1.0 {
        0
    } else {
        (rank as usize - 1).min(n - 1)
    };

    sorted[idx]
}

/// Mean and population standard deviation, both `0` for an empty sample set
fn mean_and_stddev(samples: &[u64]) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }

    let n = samples.len() as f64;
    let sum = samples.iter().map(|&s| s as u128).sum::<u128>();
    let mean = sum as f64 / n;
    let variance = samples
        .iter()
        .map(|&s| {
            let diff = s as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;

    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use simlog_summary_model::ApdexRating;

    fn completion(label: &str, start: i64, end: i64, status: Status) -> RequestEvent {
        RequestEvent {
            scenario: "browse".to_string(),
            group: None,
            label: label.to_string(),
            start_millis: start,
            end_millis: end,
            status,
            message: None,
        }
    }

    #[test]
    fn nearest_rank_percentiles() {
        let samples = (1..=10).map(|v| v * 10).collect::<Vec<u64>>();

        assert_eq!(50, percentile(&samples, 50.0));
        assert_eq!(90, percentile(&samples, 90.0));
        assert_eq!(100, percentile(&samples, 95.0));
        assert_eq!(100, percentile(&samples, 99.0));
        assert_eq!(100, percentile(&samples, 100.0));
        assert_eq!(10, percentile(&samples, 0.1));
    }

    #[test]
    fn percentile_of_single_sample() {
        assert_eq!(42, percentile(&[42], 50.0));
        assert_eq!(42, percentile(&[42], 99.0));
    }

    #[test]
    fn percentile_of_nothing_is_zero() {
        assert_eq!(0, percentile(&[], 50.0));
    }

    #[test]
    fn finish_computes_statistics() {
        let mut acc = RequestStatAccumulator::new("browse", "home");
        for (start, latency, status) in [
            (1000, 300, Status::Ok),
            (1100, 100, Status::Ok),
            (1200, 500, Status::Ko),
            (1300, 200, Status::Ok),
            (1400, 400, Status::Ok),
        ] {
            acc.add(&completion("home", start, start + latency, status))
                .unwrap();
        }

        let stat = acc.finish("sim", &ApdexThreshold::new(0.25).unwrap());

        assert_eq!("sim", stat.simulation);
        assert_eq!("browse", stat.scenario);
        assert_eq!(4, stat.success_count);
        assert_eq!(1, stat.error_count);
        assert_eq!(1000, stat.start);
        assert_eq!(1800, stat.end);
        assert_eq!(0.8, stat.duration_seconds);
        assert_eq!(100, stat.min);
        assert_eq!(300, stat.p50);
        assert_eq!(500, stat.p90);
        assert_eq!(500, stat.p95);
        assert_eq!(500, stat.p99);
        assert_eq!(500, stat.max);
        assert_eq!(300.0, stat.mean);
        assert!((stat.stddev - 141.421356).abs() < 1e-6);
        assert!((stat.rps - 6.25).abs() < 1e-9);
        assert_eq!(ApdexRating::Fair, stat.apdex_rating);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let mut acc = RequestStatAccumulator::new("browse", "home");
        acc.add(&completion("home", 1000, 1100, Status::Ok)).unwrap();

        let err = acc
            .add(&completion("home", 2000, 1900, Status::Ko))
            .unwrap_err();

        assert_eq!(
            InvalidSample::NegativeDuration {
                label: "home".to_string(),
                duration_ms: -100,
            },
            err
        );
        let stat = acc.finish("sim", &ApdexThreshold::default());
        assert_eq!(1, stat.success_count);
        assert_eq!(0, stat.error_count);
        assert_eq!(1100, stat.end);
    }

    #[test]
    fn unrepresentable_duration_is_rejected() {
        let mut acc = RequestStatAccumulator::new("browse", "home");
        acc.add(&completion("home", 1000, 1100, Status::Ok)).unwrap();

        let err = acc
            .add(&completion("home", i64::MIN, 1000, Status::Ok))
            .unwrap_err();

        assert_eq!(
            InvalidSample::OutOfRange {
                label: "home".to_string(),
                start_millis: i64::MIN,
                end_millis: 1000,
            },
            err
        );
        assert_eq!(1, acc.len());
        let stat = acc.finish("sim", &ApdexThreshold::default());
        assert_eq!((1000, 1100), (stat.start, stat.end));
    }

    #[test]
    fn window_spanning_the_whole_timeline() {
        let mut acc = RequestStatAccumulator::new("browse", "home");
        let far = 9_000_000_000_000_000_000;
        acc.add(&completion("home", -far, -far + 100, Status::Ok))
            .unwrap();
        acc.add(&completion("home", far - 100, far, Status::Ok))
            .unwrap();

        let stat = acc.finish("sim", &ApdexThreshold::default());

        assert_eq!(2, stat.count());
        assert_eq!((100, 100), (stat.min, stat.max));
        assert_eq!(18_000_000_000_000_000.0, stat.duration_seconds);
        assert!(stat.rps > 0.0 && stat.rps.is_finite());
    }

    #[test]
    fn empty_accumulator_finishes_with_zeros() {
        let stat =
            RequestStatAccumulator::new("browse", "home").finish("sim", &ApdexThreshold::default());

        assert_eq!(0, stat.count());
        assert_eq!((0, 0), (stat.start, stat.end));
        assert_eq!(
            [0, 0, 0, 0, 0, 0],
            [stat.min, stat.p50, stat.p90, stat.p95, stat.p99, stat.max]
        );
        assert_eq!(0.0, stat.mean);
        assert_eq!(0.0, stat.stddev);
        assert_eq!(0.0, stat.rps);
        assert_eq!(1.0, stat.apdex_score);
        assert_eq!(ApdexRating::Excellent, stat.apdex_rating);
    }

    #[test]
    fn zero_duration_has_zero_rps() {
        let mut acc = RequestStatAccumulator::new("browse", "home");
        acc.add(&completion("home", 1000, 1000, Status::Ok)).unwrap();

        let stat = acc.finish("sim", &ApdexThreshold::default());

        assert_eq!(1, stat.count());
        assert_eq!(0.0, stat.rps);
    }

    #[test]
    fn absorb_merges_samples_and_window() {
        let mut home = RequestStatAccumulator::new("browse", "home");
        home.add(&completion("home", 1000, 1100, Status::Ok)).unwrap();
        let mut login = RequestStatAccumulator::new("browse", "login");
        login.add(&completion("login", 500, 900, Status::Ko)).unwrap();

        let mut all = RequestStatAccumulator::new("browse", "_all");
        all.absorb(&home);
        all.absorb(&login);
        all.absorb(&RequestStatAccumulator::new("browse", "empty"));

        assert_eq!(2, all.len());
        let stat = all.finish("sim", &ApdexThreshold::default());
        assert_eq!((500, 1100), (stat.start, stat.end));
        assert_eq!((1, 1), (stat.success_count, stat.error_count));
        assert_eq!((100, 400), (stat.min, stat.max));
    }
}

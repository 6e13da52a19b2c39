use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;

/// Label of the synthetic [RequestStat] that covers every request of a simulation.
pub const ALL_REQUESTS_LABEL: &str = "_all";

/// Discrete Apdex rating derived from an Apdex score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
pub enum ApdexRating {
    Excellent,
    Good,
    Fair,
    Poor,
    Unacceptable,
}

impl ApdexRating {
    /// Map an Apdex score onto a rating.
    ///
    /// Thresholds are evaluated highest first and are inclusive of their lower bound.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.94 {
            ApdexRating::Excellent
        } else if score >= 0.85 {
            ApdexRating::Good
        } else if score >= 0.70 {
            ApdexRating::Fair
        } else if score >= 0.50 {
            ApdexRating::Poor
        } else {
            ApdexRating::Unacceptable
        }
    }
}

/// Statistics for one request label of one simulation run.
///
/// Produced once all the events of a run have been read, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestStat {
    /// The simulation this request belongs to
    pub simulation: String,
    /// The scenario that first issued this request
    pub scenario: String,
    /// The request label, unique within its [SimulationContext]
    pub label: String,
    /// Number of requests with an OK status
    pub success_count: u64,
    /// Number of requests with a KO status
    pub error_count: u64,
    /// Epoch millis of the first accepted request start, `0` when there were no samples
    pub start: i64,
    /// Epoch millis of the last accepted request end, `0` when there were no samples
    pub end: i64,
    /// Wall clock span the label was active, in seconds.
    ///
    /// This is not a latency.
    pub duration_seconds: f64,
    /// Latencies in milliseconds
    pub min: u64,
    pub p50: u64,
    pub p90: u64,
    pub p95: u64,
    pub p99: u64,
    pub max: u64,
    /// Mean latency in milliseconds
    pub mean: f64,
    /// Population standard deviation of the latency in milliseconds
    pub stddev: f64,
    /// Requests per second over [RequestStat::duration_seconds]
    pub rps: f64,
    pub apdex_score: f64,
    pub apdex_rating: ApdexRating,
}

impl RequestStat {
    /// Total number of accepted requests
    pub fn count(&self) -> u64 {
        self.success_count + self.error_count
    }

    /// The start of this label's activity as a UTC date time
    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.start)
    }

    /// Lower case letters of the label, suitable as a stable identifier for renderers
    pub fn identifier(&self) -> String {
        self.label
            .chars()
            .filter(|c| c.is_alphabetic())
            .flat_map(char::to_lowercase)
            .collect()
    }
}

/// The summary of one parsed simulation log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationContext {
    /// Simulation name from the run header, or the log file stem when there was no header
    pub simulation: String,
    /// Run id from the run header
    pub run_id: Option<String>,
    /// Epoch millis the load generator recorded as the run start
    pub run_start: Option<i64>,
    /// Free text description from the run header
    pub description: Option<String>,
    /// Version of the load generator that wrote the log
    pub generator_version: Option<String>,
    /// The log file this context was built from
    pub source: Option<PathBuf>,
    /// Scenario names in the order they were first seen
    pub scenarios: Vec<String>,
    /// Peak number of concurrently active virtual users
    pub max_users: u64,
    /// Request statistics in the order their labels were first seen
    pub req_stats: Vec<RequestStat>,
    /// Statistics over every request of the simulation, labelled [ALL_REQUESTS_LABEL]
    pub all: RequestStat,
    /// Epoch millis, minimum start over all non-empty request stats
    pub global_start: i64,
    /// Epoch millis, maximum end over all non-empty request stats
    pub global_end: i64,
    /// Number of recognised records that were dropped because they were malformed
    pub skipped_lines: u64,
    /// Number of request records rejected because their duration was negative
    pub rejected_samples: u64,
}

impl SimulationContext {
    /// Look up the statistics for a request label
    pub fn request(&self, label: &str) -> Option<&RequestStat> {
        self.req_stats.iter().find(|stat| stat.label == label)
    }

    /// Request labels in the order they were first seen
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.req_stats.iter().map(|stat| stat.label.as_str())
    }

    /// Wall clock span of the whole simulation, in seconds
    pub fn duration_seconds(&self) -> f64 {
        millis_between(self.global_start, self.global_end) as f64 / 1000.0
    }

    /// Compute a fingerprint for the shape of this simulation
    ///
    /// Two runs of the same simulation exercising the same scenarios and requests share a
    /// fingerprint, regardless of their timings. It uses the
    ///     - Simulation name
    ///     - Scenario names
    ///     - Request labels
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        hash_field(&mut hasher, &self.simulation);
        Digest::update(&mut hasher, (self.scenarios.len() as u64).to_le_bytes());
        self.scenarios.iter().sorted().for_each(|scenario| {
            hash_field(&mut hasher, scenario);
        });
        Digest::update(&mut hasher, (self.req_stats.len() as u64).to_le_bytes());
        self.labels().sorted().for_each(|label| {
            hash_field(&mut hasher, label);
        });

        format!("{:x}", hasher.finalize())
    }
}

/// Length prefixed so adjacent fields cannot run into each other
fn hash_field(hasher: &mut sha3::Sha3_256, value: &str) {
    Digest::update(hasher, (value.len() as u64).to_le_bytes());
    Digest::update(hasher, value.as_bytes());
}

/// Span from `start` to `end` in milliseconds, wide enough for any pair of epoch millis
pub fn millis_between(start: i64, end: i64) -> i128 {
    i128::from(end) - i128::from(start)
}

/// Serialize simulation reports to a writer as a pretty printed JSON array
pub fn store_simulation_reports<W: Write>(
    reports: &[SimulationContext],
    writer: W,
) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(writer, reports)?;
    Ok(())
}

/// Load simulation reports written by [store_simulation_reports]
pub fn load_simulation_reports<R: Read>(reader: R) -> anyhow::Result<Vec<SimulationContext>> {
    let reader = BufReader::new(reader);
    let reports: Vec<SimulationContext> = serde_json::from_reader(reader)?;
    Ok(reports)
}

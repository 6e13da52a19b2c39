use simlog_summary_model::SimulationContext;
use std::path::{Path, PathBuf};

mod accumulator;
mod apdex;
mod config;
mod context;
mod error;
mod event;
pub mod filter;
mod parser;
mod source;

pub use accumulator::{percentile, InvalidSample, RequestStatAccumulator};
pub use apdex::{Apdex, ApdexThreshold, DEFAULT_APDEX_THRESHOLD_SECS};
pub use config::SummariserConfig;
pub use context::{summarise_reader, summarise_simulation_log, ContextBuilder};
pub use error::{ConfigError, SummariseError};
pub use event::{LogEvent, RequestEvent, RunHeader, Status};
pub use filter::{LogCandidate, RunGroup, RunSelector};
pub use parser::LogRecordParser;
pub use source::{find_candidates, is_simulation_log, open_simulation_log};

/// Find the simulation logs of a source and keep the latest one of each run.
///
/// Fails with [SummariseError::InputNotFound] when the source holds no simulation log.
pub fn select_simulation_logs(
    source: &Path,
    selector: &RunSelector,
) -> Result<Vec<PathBuf>, SummariseError> {
    let candidates = find_candidates(source)?;
    let found = candidates.len();

    let selected = selector
        .select(candidates)
        .into_iter()
        .map(|candidate| candidate.path)
        .collect::<Vec<_>>();

    log::info!(
        "Selected {} of {} simulation logs from {}",
        selected.len(),
        found,
        source.display()
    );

    Ok(selected)
}

/// Summarise simulation logs in parallel, one blocking task per file.
///
/// Results are returned in the same order as the paths. A failure only affects its own file.
pub async fn summarise_logs(
    paths: Vec<PathBuf>,
    config: SummariserConfig,
) -> Vec<Result<SimulationContext, SummariseError>> {
    futures::future::join_all(paths.into_iter().map(|path| async move {
        let worker_path = path.clone();
        tokio::task::spawn_blocking(move || summarise_simulation_log(&worker_path, config))
            .await
            .map_err(|source| SummariseError::Worker { path, source })?
    }))
    .await
}

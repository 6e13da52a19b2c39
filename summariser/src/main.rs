use anyhow::{bail, Context};
use chrono::Utc;
use itertools::Itertools;
use log::{debug, info, warn};
use simlog_summariser::{select_simulation_logs, summarise_logs, RunSelector, SummariserConfig};
use simlog_summary_model::store_simulation_reports;
use std::fs::File;
use std::path::PathBuf;

/// Environment variable name to set the sources to summarise, as a platform path list
const SIMULATION_SOURCES_ENV: &str = "SIMULATION_SOURCES";
/// Default source, a directory of simulation results
const DEFAULT_SIMULATION_SOURCE: &str = "results";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let ignore_errors = std::env::var("IGNORE_SUMMARY_ERRORS").is_ok();

    let config = SummariserConfig::from_env().context("Invalid summariser configuration")?;
    debug!("Using {config:?}");

    let sources = std::env::var_os(SIMULATION_SOURCES_ENV)
        .map(|value| std::env::split_paths(&value).collect::<Vec<_>>())
        .unwrap_or_else(|| vec![PathBuf::from(DEFAULT_SIMULATION_SOURCE)]);

    let selector = RunSelector::default();
    let mut source_failures = vec![];
    let mut selected = vec![];

    for source in &sources {
        match select_simulation_logs(source, &selector) {
            Ok(paths) => selected.extend(paths),
            Err(e) => {
                log::error!("Skipping source {}: {e}", source.display());
                source_failures.push(e);
            }
        }
    }

    let total_logs = selected.len();
    let mut log_failures = vec![];
    let mut reports = vec![];

    for result in summarise_logs(selected, config).await {
        match result {
            Ok(context) => {
                for stat in context.req_stats.iter().chain(std::iter::once(&context.all)) {
                    debug!(
                        "{} {}: count={} p95={}ms apdex={:.2} ({})",
                        context.simulation,
                        stat.label,
                        stat.count(),
                        stat.p95,
                        stat.apdex_score,
                        stat.apdex_rating
                    );
                }
                reports.push(context);
            }
            Err(e) => {
                log::error!("{e}");
                log_failures.push(e);
            }
        }
    }

    let report_path = format!(
        "summariser-report-{}.json",
        Utc::now().format("%Y-%m-%dT%H.%M.%S%.fZ")
    );
    let report = File::create_new(&report_path)
        .with_context(|| format!("Cannot create report file {report_path}"))?;
    store_simulation_reports(&reports, report)?;
    info!(
        "Wrote {} of {} simulation summaries to {report_path}",
        reports.len(),
        total_logs
    );

    if source_failures.is_empty() && log_failures.is_empty() {
        return Ok(());
    }

    let failed_sources = source_failures.len();
    let failed_logs = log_failures.len();
    let details = source_failures
        .into_iter()
        .chain(log_failures)
        .map(|e| format!("  - {:#}", anyhow::Error::from(e)))
        .join("\n");
    let summary = format!(
        "Incomplete report, {} of {} sources and {} of {} simulation logs failed:\n{details}",
        failed_sources,
        sources.len(),
        failed_logs,
        total_logs,
    );

    if ignore_errors {
        warn!("{summary}");
        Ok(())
    } else {
        bail!(summary)
    }
}

use crate::accumulator::RequestStatAccumulator;
use crate::config::SummariserConfig;
use crate::error::SummariseError;
use crate::event::{LogEvent, RequestEvent, RunHeader};
use crate::parser::LogRecordParser;
use crate::source::open_simulation_log;
use simlog_summary_model::{SimulationContext, ALL_REQUESTS_LABEL};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Simulation name used when neither a run header nor a file name is available
const UNNAMED_SIMULATION: &str = "simulation";

/// Builds a [SimulationContext] from the events of a single simulation log.
///
/// Holds no state shared with other logs, one builder is used per file.
pub struct ContextBuilder {
    config: SummariserConfig,
    source: Option<PathBuf>,
    simulation: Option<String>,
    header: Option<RunHeader>,
    scenarios: Vec<String>,
    active_users: u64,
    max_users: u64,
    label_index: HashMap<String, usize>,
    accumulators: Vec<RequestStatAccumulator>,
    rejected_samples: u64,
}

impl ContextBuilder {
    pub fn new(config: SummariserConfig) -> Self {
        Self {
            config,
            source: None,
            simulation: None,
            header: None,
            scenarios: Vec::new(),
            active_users: 0,
            max_users: 0,
            label_index: HashMap::new(),
            accumulators: Vec::new(),
            rejected_samples: 0,
        }
    }

    /// Record the file the events come from
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn add_event(&mut self, event: LogEvent) {
        match event {
            LogEvent::RunHeader(header) => {
                self.simulation = Some(header.simulation.clone());
                self.header = Some(header);
            }
            LogEvent::UserStart { scenario } => {
                self.note_scenario(&scenario);
                self.active_users += 1;
                self.max_users = self.max_users.max(self.active_users);
            }
            LogEvent::UserEnd { .. } => {
                self.active_users = self.active_users.saturating_sub(1);
            }
            LogEvent::Request(request) => self.add_request(request),
        }
    }

    fn add_request(&mut self, request: RequestEvent) {
        self.note_scenario(&request.scenario);

        let idx = match self.label_index.get(&request.label) {
            Some(idx) => *idx,
            None => {
                let idx = self.accumulators.len();
                self.accumulators.push(RequestStatAccumulator::new(
                    request.scenario.clone(),
                    request.label.clone(),
                ));
                self.label_index.insert(request.label.clone(), idx);
                idx
            }
        };

        if let Err(e) = self.accumulators[idx].add(&request) {
            self.rejected_samples += 1;
            log::warn!("Rejected sample: {e}");
        }
    }

    fn note_scenario(&mut self, scenario: &str) {
        if !scenario.is_empty() && !self.scenarios.iter().any(|s| s == scenario) {
            self.scenarios.push(scenario.to_string());
        }
    }

    fn simulation_name(&self) -> String {
        self.simulation
            .clone()
            .or_else(|| self.source.as_deref().and_then(simulation_name_from_path))
            .unwrap_or_else(|| UNNAMED_SIMULATION.to_string())
    }

    /// Freeze every request accumulator and attach the Apdex ratings
    pub fn finish(self, skipped_lines: u64) -> SimulationContext {
        let simulation = self.simulation_name();
        let threshold = self.config.apdex_threshold;

        let mut all = RequestStatAccumulator::new(self.scenarios.join(","), ALL_REQUESTS_LABEL);
        for acc in &self.accumulators {
            all.absorb(acc);
        }

        let req_stats = self
            .accumulators
            .into_iter()
            .map(|acc| acc.finish(&simulation, &threshold))
            .collect::<Vec<_>>();

        let non_empty = || req_stats.iter().filter(|stat| stat.count() > 0);
        let global_start = non_empty().map(|stat| stat.start).min().unwrap_or(0);
        let global_end = non_empty().map(|stat| stat.end).max().unwrap_or(0);

        let header = self.header;
        SimulationContext {
            all: all.finish(&simulation, &threshold),
            simulation,
            run_id: header.as_ref().map(|h| h.run_id.clone()),
            run_start: header.as_ref().map(|h| h.start_millis),
            description: header.as_ref().and_then(|h| h.description.clone()),
            generator_version: header.and_then(|h| h.version),
            source: self.source,
            scenarios: self.scenarios,
            max_users: self.max_users,
            req_stats,
            global_start,
            global_end,
            skipped_lines,
            rejected_samples: self.rejected_samples,
        }
    }
}

/// Drain a simulation log stream into a [SimulationContext].
///
/// `source` is only used to name the simulation and to report read errors.
pub fn summarise_reader<R: BufRead>(
    reader: R,
    config: SummariserConfig,
    source: Option<&Path>,
) -> Result<SimulationContext, SummariseError> {
    let mut builder = ContextBuilder::new(config);
    if let Some(source) = source {
        builder = builder.with_source(source);
    }

    let mut parser = LogRecordParser::new(reader);
    for event in parser.by_ref() {
        let event = event.map_err(|e| SummariseError::Unreadable {
            path: source.map(Path::to_path_buf).unwrap_or_default(),
            source: e,
        })?;
        builder.add_event(event);
    }

    if parser.skipped_lines() > 0 {
        log::warn!(
            "Skipped {} malformed records out of {} lines",
            parser.skipped_lines(),
            parser.line_number()
        );
    }

    Ok(builder.finish(parser.skipped_lines()))
}

/// Open, parse and summarise one simulation log file, gzip compressed or not
pub fn summarise_simulation_log(
    path: &Path,
    config: SummariserConfig,
) -> Result<SimulationContext, SummariseError> {
    log::debug!("Parsing {}", path.display());

    let reader = open_simulation_log(path)?;
    let context = summarise_reader(reader, config, Some(path))?;

    log::debug!(
        "Summarised {} requests for simulation {} ({}) from {}",
        context.req_stats.len(),
        context.simulation,
        context.fingerprint(),
        path.display()
    );

    Ok(context)
}

fn simulation_name_from_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let name = name.strip_suffix(".gz").unwrap_or(name);
    let name = name.strip_suffix(".log").unwrap_or(name);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

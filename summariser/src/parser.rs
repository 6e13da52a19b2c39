use crate::event::{LogEvent, RequestEvent, RunHeader, Status};
use std::collections::HashMap;
use std::io::{self, BufRead};
use thiserror::Error;

const RUN_RECORD: &str = "RUN";
const USER_RECORD: &str = "USER";
const REQUEST_RECORD: &str = "REQUEST";
const USER_START: &str = "START";
const USER_END: &str = "END";

/// Why a recognised record was dropped
#[derive(Error, Debug, PartialEq)]
pub(crate) enum RecordError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("invalid {field}: {value:?}")]
    Invalid { field: &'static str, value: String },
}

/// Streams [LogEvent]s out of a tab separated simulation log.
///
/// Both the record layout that carries a virtual user id and the newer one without it are
/// understood. Blank lines and record kinds that are not summarised are skipped. A recognised
/// record that is malformed is logged, counted in [LogRecordParser::skipped_lines] and skipped.
///
/// The parser reads one line at a time and ends at the end of the stream, or after the first I/O
/// error which is returned to the caller.
pub struct LogRecordParser<R> {
    reader: R,
    line: Vec<u8>,
    state: ParserState,
    done: bool,
}

#[derive(Default)]
struct ParserState {
    line_number: u64,
    skipped_lines: u64,
    simulation: Option<String>,
    last_scenario: Option<String>,
    /// Scenario of each active user, only populated for layouts that carry a user id
    user_scenarios: HashMap<String, String>,
}

impl<R: BufRead> LogRecordParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(256),
            state: ParserState::default(),
            done: false,
        }
    }

    /// Number of recognised records dropped so far because they were malformed
    pub fn skipped_lines(&self) -> u64 {
        self.state.skipped_lines
    }

    /// Number of lines read so far
    pub fn line_number(&self) -> u64 {
        self.state.line_number
    }
}

impl<R: BufRead> Iterator for LogRecordParser<R> {
    type Item = io::Result<LogEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => {
                    self.done = true;
                }
                Ok(_) => {
                    let line = String::from_utf8_lossy(&self.line);
                    if let Some(event) = self.state.parse_line(&line) {
                        return Some(Ok(event));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        None
    }
}

impl ParserState {
    fn parse_line(&mut self, line: &str) -> Option<LogEvent> {
        self.line_number += 1;

        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            return None;
        }

        let fields = line.split('\t').collect::<Vec<_>>();
        let kind = fields[0];
        let parsed = match kind {
            RUN_RECORD => self.parse_run(&fields),
            USER_RECORD => self.parse_user(&fields),
            REQUEST_RECORD => self.parse_request(&fields),
            _ => return None,
        };

        match parsed {
            Ok(event) => Some(event),
            Err(e) => {
                self.skipped_lines += 1;
                log::warn!(
                    "Skipping malformed {kind} record on line {}: {e}",
                    self.line_number
                );
                None
            }
        }
    }

    /// `RUN <simulation> <run id> <start> [<description>] [<version>]`
    fn parse_run(&mut self, fields: &[&str]) -> Result<LogEvent, RecordError> {
        let simulation = required_text(fields, 1, "simulation")?;
        let run_id = required_text(fields, 2, "run id")?;
        let start_millis = required_millis(fields, 3, "run start")?;

        self.simulation = Some(simulation.to_string());

        Ok(LogEvent::RunHeader(RunHeader {
            simulation: simulation.to_string(),
            run_id: run_id.to_string(),
            start_millis,
            description: optional_text(fields, 4),
            version: optional_text(fields, 5),
        }))
    }

    /// `USER <scenario> [<user id>] START|END <timestamp> [<end>]`
    fn parse_user(&mut self, fields: &[&str]) -> Result<LogEvent, RecordError> {
        let scenario = required_text(fields, 1, "scenario")?.to_string();

        let (user_id, action_idx) = match fields.get(2).copied() {
            Some(USER_START) | Some(USER_END) => (None, 2),
            Some(user_id) => (Some(user_id), 3),
            None => return Err(RecordError::Missing("user action")),
        };

        match fields.get(action_idx).copied() {
            Some(USER_START) => {
                // Only checked, concurrency is derived from the order of records
                required_millis(fields, action_idx + 1, "user start")?;
                if let Some(user_id) = user_id {
                    self.user_scenarios
                        .insert(user_id.to_string(), scenario.clone());
                }
                self.last_scenario = Some(scenario.clone());

                Ok(LogEvent::UserStart { scenario })
            }
            Some(USER_END) => {
                // The user id layout writes both the start and the end of the user
                let end_idx = match fields.get(action_idx + 2).map(|s| s.trim()) {
                    Some(value) if !value.is_empty() => action_idx + 2,
                    _ => action_idx + 1,
                };
                required_millis(fields, end_idx, "user end")?;
                if let Some(user_id) = user_id {
                    self.user_scenarios.remove(user_id);
                }

                Ok(LogEvent::UserEnd { scenario })
            }
            Some(other) => Err(RecordError::Invalid {
                field: "user action",
                value: other.to_string(),
            }),
            None => Err(RecordError::Missing("user action")),
        }
    }

    /// `REQUEST [<user id>] <groups> <label> <start> <end> OK|KO [<message>]`
    fn parse_request(&mut self, fields: &[&str]) -> Result<LogEvent, RecordError> {
        // With a user id both fields 4 and 5 are timestamps, without one field 5 is the status
        let has_user_id = fields.len() >= 7
            && fields[4].trim().parse::<i64>().is_ok()
            && fields[5].trim().parse::<i64>().is_ok();
        let (user_id, offset) = if has_user_id {
            (Some(fields[1]), 1)
        } else {
            (None, 0)
        };

        let group = optional_text(fields, offset + 1);
        let label = required_text(fields, offset + 2, "request label")?;
        let start_millis = required_millis(fields, offset + 3, "request start")?;
        let end_millis = required_millis(fields, offset + 4, "request end")?;
        let status = match fields.get(offset + 5).map(|s| s.trim()) {
            None | Some("") => return Err(RecordError::Missing("status")),
            Some(value) => Status::parse(value).ok_or_else(|| RecordError::Invalid {
                field: "status",
                value: value.to_string(),
            })?,
        };

        Ok(LogEvent::Request(RequestEvent {
            scenario: self.scenario_for(user_id),
            group,
            label: label.to_string(),
            start_millis,
            end_millis,
            status,
            message: optional_text(fields, offset + 6),
        }))
    }

    fn scenario_for(&self, user_id: Option<&str>) -> String {
        user_id
            .and_then(|user_id| self.user_scenarios.get(user_id))
            .or(self.last_scenario.as_ref())
            .or(self.simulation.as_ref())
            .cloned()
            .unwrap_or_default()
    }
}

fn required_text<'a>(
    fields: &[&'a str],
    idx: usize,
    name: &'static str,
) -> Result<&'a str, RecordError> {
    match fields.get(idx).map(|s| s.trim()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(RecordError::Missing(name)),
    }
}

fn optional_text(fields: &[&str], idx: usize) -> Option<String> {
    fields
        .get(idx)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required_millis(fields: &[&str], idx: usize, name: &'static str) -> Result<i64, RecordError> {
    let value = required_text(fields, idx, name)?;
    value.parse::<i64>().map_err(|_| RecordError::Invalid {
        field: name,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(log: &str) -> (Vec<LogEvent>, u64) {
        let mut parser = LogRecordParser::new(log.as_bytes());
        let events = parser
            .by_ref()
            .collect::<io::Result<Vec<_>>>()
            .expect("in memory reads do not fail");
        (events, parser.skipped_lines())
    }

    fn request(events: &[LogEvent], idx: usize) -> &RequestEvent {
        match &events[idx] {
            LogEvent::Request(request) => request,
            other => panic!("Expected a request, got {other:?}"),
        }
    }

    #[test]
    fn parses_layout_without_user_id() {
        let log = "RUN\tcomputerdatabase.BasicSimulation\tbasicsimulation-20240101\t1704067200000\t \t3.9.5\n\
                   USER\tbrowse\tSTART\t1704067200100\n\
                   REQUEST\t\thome\t1704067200200\t1704067200350\tOK\t \n\
                   REQUEST\tsearch group\tsearch\t1704067200400\t1704067200900\tKO\tstatus.find.is(200), but actually found 500\n\
                   USER\tbrowse\tEND\t1704067201000\n";

        let (events, skipped) = parse_all(log);

        assert_eq!(0, skipped);
        assert_eq!(5, events.len());
        assert_eq!(
            LogEvent::RunHeader(RunHeader {
                simulation: "computerdatabase.BasicSimulation".to_string(),
                run_id: "basicsimulation-20240101".to_string(),
                start_millis: 1704067200000,
                description: None,
                version: Some("3.9.5".to_string()),
            }),
            events[0]
        );
        assert_eq!(
            LogEvent::UserStart {
                scenario: "browse".to_string(),
            },
            events[1]
        );

        let home = request(&events, 2);
        assert_eq!("browse", home.scenario);
        assert_eq!("home", home.label);
        assert_eq!(None, home.group);
        assert_eq!(Some(150), home.duration_millis());
        assert_eq!(Status::Ok, home.status);

        let search = request(&events, 3);
        assert_eq!(Some("search group".to_string()), search.group);
        assert_eq!(Status::Ko, search.status);
        assert_eq!(
            Some("status.find.is(200), but actually found 500".to_string()),
            search.message
        );
    }

    #[test]
    fn parses_layout_with_user_id() {
        let log = "USER\tbrowse\t1\tSTART\t1000\t1000\n\
                   USER\tcheckout\t2\tSTART\t1010\t1010\n\
                   REQUEST\t1\t\thome\t1100\t1200\tOK\t \n\
                   REQUEST\t2\t\tpay\t1150\t1400\tKO\ttimeout\n\
                   USER\tbrowse\t1\tEND\t1000\t2000\n";

        let (events, skipped) = parse_all(log);

        assert_eq!(0, skipped);
        assert_eq!("browse", request(&events, 2).scenario);
        assert_eq!("home", request(&events, 2).label);
        assert_eq!("checkout", request(&events, 3).scenario);
        assert_eq!(Some(250), request(&events, 3).duration_millis());
        assert_eq!(
            LogEvent::UserEnd {
                scenario: "browse".to_string(),
            },
            events[4]
        );
    }

    #[test]
    fn skips_blank_and_unknown_records_silently() {
        let log = "\n   \nGROUP\tgroup\t1000\t2000\t10\tOK\nERROR\tsomething\t1000\nASSERTION\tx\n\
                   REQUEST\t\thome\t1000\t1010\tOK\n";

        let (events, skipped) = parse_all(log);

        assert_eq!(0, skipped);
        assert_eq!(1, events.len());
    }

    #[test]
    fn skips_malformed_requests_and_counts_them() {
        let log = "REQUEST\t\thome\t1000\t1010\tOK\n\
                   REQUEST\t\thome\tnot-a-time\t1010\tOK\n\
                   REQUEST\t\thome\t1000\t1010\n\
                   REQUEST\t\thome\t1000\t1010\tMAYBE\n\
                   REQUEST\t\t\t1000\t1010\tOK\n\
                   REQUEST\t\thome\t1020\t1030\tKO\n";

        let (events, skipped) = parse_all(log);

        assert_eq!(4, skipped);
        assert_eq!(2, events.len());
    }

    #[test]
    fn scenario_falls_back_to_simulation() {
        let log = "RUN\tsim.Checkout\tcheckout-1\t1000\t \t3.9.5\n\
                   REQUEST\t\tpay\t1000\t1010\tOK\n";

        let (events, _) = parse_all(log);

        assert_eq!("sim.Checkout", request(&events, 1).scenario);
    }

    #[test]
    fn handles_crlf_and_invalid_utf8() {
        let mut log = b"REQUEST\t\thome\t1000\t1010\tOK\r\n".to_vec();
        log.extend_from_slice(b"REQUEST\t\t\xff\xfe\t1000\t1020\tOK\r\n");

        let mut parser = LogRecordParser::new(log.as_slice());
        let events = parser
            .by_ref()
            .collect::<io::Result<Vec<_>>>()
            .expect("in memory reads do not fail");

        assert_eq!(2, events.len());
        assert_eq!(Status::Ok, request(&events, 0).status);
        assert_eq!(Some(20), request(&events, 1).duration_millis());
        assert_eq!(2, parser.line_number());
    }

    #[test]
    fn stops_after_read_error() {
        struct FailingReader;

        impl io::Read for FailingReader {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::InvalidData, "corrupt deflate stream"))
            }
        }

        let mut parser = LogRecordParser::new(io::BufReader::new(FailingReader));

        assert!(matches!(parser.next(), Some(Err(_))));
        assert!(parser.next().is_none());
    }
}

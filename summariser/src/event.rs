/// Outcome of a request as recorded by the load generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Ko,
}

impl Status {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "OK" => Some(Status::Ok),
            "KO" => Some(Status::Ko),
            _ => None,
        }
    }
}

/// One typed record read from a simulation log.
///
/// Events are produced by [crate::LogRecordParser] and consumed straight away, they are never
/// retained.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    RunHeader(RunHeader),
    UserStart { scenario: String },
    UserEnd { scenario: String },
    Request(RequestEvent),
}

/// Metadata written once at the top of a simulation log
#[derive(Debug, Clone, PartialEq)]
pub struct RunHeader {
    pub simulation: String,
    pub run_id: String,
    pub start_millis: i64,
    pub description: Option<String>,
    pub version: Option<String>,
}

/// A completed request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEvent {
    pub scenario: String,
    /// Group hierarchy the request ran in, if any
    pub group: Option<String>,
    pub label: String,
    pub start_millis: i64,
    pub end_millis: i64,
    pub status: Status,
    pub message: Option<String>,
}

impl RequestEvent {
    /// Latency in milliseconds, negative when the record is inconsistent.
    ///
    /// `None` when the timestamps are too far apart to be represented.
    pub fn duration_millis(&self) -> Option<i64> {
        self.end_millis.checked_sub(self.start_millis)
    }
}

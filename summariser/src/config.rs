use crate::apdex::ApdexThreshold;
use crate::error::ConfigError;

/// Environment variable name to set the Apdex satisfied threshold, in seconds
const APDEX_THRESHOLD_ENV: &str = "APDEX_T";

/// Configuration for summarising simulation logs.
///
/// Passed explicitly to everything that needs it, nothing reads configuration from ambient state
/// once this has been built.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SummariserConfig {
    pub apdex_threshold: ApdexThreshold,
}

impl SummariserConfig {
    pub fn new(apdex_threshold: ApdexThreshold) -> Self {
        Self { apdex_threshold }
    }

    /// Build the configuration from the environment, falling back to defaults for unset values
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_apdex_value(std::env::var(APDEX_THRESHOLD_ENV).ok())
    }

    fn from_apdex_value(value: Option<String>) -> Result<Self, ConfigError> {
        let Some(value) = value else {
            return Ok(Self::default());
        };

        let seconds = value
            .trim()
            .parse::<f64>()
            .map_err(|_| ConfigError::NotANumber {
                var: APDEX_THRESHOLD_ENV,
                value: value.clone(),
            })?;

        Ok(Self::new(ApdexThreshold::new(seconds)?))
    }
}

use std::fmt;

use thiserror::Error;

/// One out-of-range configuration value.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// Dotted path of the offending parameter, e.g. `segments.new[2].default_probability`.
    pub parameter: String,
    pub value: f64,
    pub reason: &'static str,
}

impl Violation {
    pub fn new(parameter: impl Into<String>, value: f64, reason: &'static str) -> Self {
        Violation { parameter: parameter.into(), value, reason }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {} ({})", self.parameter, self.value, self.reason)
    }
}

/// Raised at construction when any parameter is outside its valid range.
/// Carries every violation found, not just the first.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid configuration: {}", render(.violations))]
pub struct ConfigurationError {
    pub violations: Vec<Violation>,
}

fn render(violations: &[Violation]) -> String {
    violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl ConfigurationError {
    /// `Ok(())` when nothing was collected, otherwise the collected violations.
    pub fn check(violations: Vec<Violation>) -> Result<(), ConfigurationError> {
        if violations.is_empty() { Ok(()) } else { Err(ConfigurationError { violations }) }
    }

    pub fn mentions(&self, parameter: &str) -> bool {
        self.violations.iter().any(|v| v.parameter == parameter)
    }
}

#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid argument {name}: {reason}")]
    InvalidArgument { name: String, reason: String },
}

pub type SimResult<T> = Result<T, SimError>;

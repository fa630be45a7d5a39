use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Simulation time in weeks (1 unit = 1 simulated week).
/// Week 1 is the first cohort; there is no week 0 cohort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Week(pub u32);

impl Week {
    pub const DAYS_PER_WEEK: f64 = 7.0;

    /// Advance by a number of weeks.
    pub fn offset(self, weeks: u32) -> Self {
        Week(self.0 + weeks)
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64
    }
}

impl fmt::Display for Week {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Population class of an applicant: first-time or returning client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopulationClass {
    New,
    Repeat,
}

impl PopulationClass {
    pub const ALL: [PopulationClass; 2] = [PopulationClass::New, PopulationClass::Repeat];

    pub fn as_str(self) -> &'static str {
        match self {
            PopulationClass::New => "new",
            PopulationClass::Repeat => "repeat",
        }
    }

    pub fn is_repeat(self) -> bool {
        self == PopulationClass::Repeat
    }
}

impl fmt::Display for PopulationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Identifier of one loan application: `<class>_<week>_<n>`, `n` starting at 1.
/// Unique across a run because the origin week is part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApplicationId {
    pub class: PopulationClass,
    pub week: Week,
    pub seq: u32,
}

impl ApplicationId {
    pub fn new(class: PopulationClass, week: Week, seq: u32) -> Self {
        ApplicationId { class, week, seq }
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.class, self.week.0, self.seq)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed application id {0:?}")]
pub struct ParseApplicationIdError(pub String);

impl FromStr for ApplicationId {
    type Err = ParseApplicationIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseApplicationIdError(s.to_string());
        let mut parts = s.splitn(3, '_');
        let class = match parts.next() {
            Some("new") => PopulationClass::New,
            Some("repeat") => PopulationClass::Repeat,
            _ => return Err(err()),
        };
        let week = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let seq = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        Ok(ApplicationId { class, week: Week(week), seq })
    }
}

impl Serialize for ApplicationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ApplicationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

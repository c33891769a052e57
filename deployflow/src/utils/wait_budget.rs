//! Wait budget parsing.
//!
//! Step harnesses hand over a wait time as free text. A plain integer is a
//! number of milliseconds; `Nmilli`, `Nsec` and `Nmin` carry an explicit unit.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

static BUDGET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d+)\s*(milli|sec|min)?$").expect("wait budget pattern is valid")
});

/// Errors that can occur while parsing a wait budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitBudgetError {
    /// The budget string is empty.
    #[error("Empty wait time")]
    Empty,

    /// The budget is not a non-negative integer with an optional unit.
    #[error("Invalid wait time '{0}': expected N, Nmilli, Nsec or Nmin")]
    InvalidFormat(String),

    /// The budget does not fit in a duration.
    #[error("Wait time '{0}' is too large")]
    Overflow(String),
}

/// How long a step may wait for its desired state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaitBudget(Duration);

impl WaitBudget {
    /// Creates a budget from a duration.
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self(duration)
    }

    /// Creates a budget from milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    /// Creates a budget from seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    /// The budget as a duration.
    #[must_use]
    pub const fn as_duration(&self) -> Duration {
        self.0
    }

    /// The budget in whole milliseconds.
    #[must_use]
    pub fn as_millis(&self) -> u64 {
        u64::try_from(self.0.as_millis()).unwrap_or(u64::MAX)
    }

    /// Parses a budget string.
    pub fn parse(input: &str) -> Result<Self, WaitBudgetError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(WaitBudgetError::Empty);
        }
        let captures = BUDGET_PATTERN
            .captures(trimmed)
            .ok_or_else(|| WaitBudgetError::InvalidFormat(trimmed.to_string()))?;

        let amount: u64 = captures[1]
            .parse()
            .map_err(|_| WaitBudgetError::Overflow(trimmed.to_string()))?;
        let unit = captures
            .get(2)
            .map(|m| m.as_str().to_ascii_lowercase());

        let millis = match unit.as_deref() {
            None | Some("milli") => Some(amount),
            Some("sec") => amount.checked_mul(1_000),
            Some("min") => amount.checked_mul(60_000),
            Some(_) => None,
        }
        .ok_or_else(|| WaitBudgetError::Overflow(trimmed.to_string()))?;

        Ok(Self::from_millis(millis))
    }
}

impl Default for WaitBudget {
    fn default() -> Self {
        Self::from_secs(60)
    }
}

impl From<Duration> for WaitBudget {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}

impl FromStr for WaitBudget {
    type Err = WaitBudgetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for WaitBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.as_millis())
    }
}

impl Serialize for WaitBudget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.as_millis())
    }
}

impl<'de> Deserialize<'de> for WaitBudget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Millis(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Millis(millis) => Ok(Self::from_millis(millis)),
            Raw::Text(text) => Self::parse(&text).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_integer_is_millis() {
        assert_eq!(WaitBudget::parse("1500").unwrap(), WaitBudget::from_millis(1500));
    }

    #[test]
    fn test_unit_suffixes() {
        assert_eq!(WaitBudget::parse("250milli").unwrap().as_millis(), 250);
        assert_eq!(WaitBudget::parse("30sec").unwrap().as_millis(), 30_000);
        assert_eq!(WaitBudget::parse("2min").unwrap().as_millis(), 120_000);
    }

    #[test]
    fn test_case_and_whitespace() {
        assert_eq!(WaitBudget::parse("  5 SEC ").unwrap().as_millis(), 5_000);
        assert_eq!(WaitBudget::parse("1Min").unwrap().as_millis(), 60_000);
    }

    #[test]
    fn test_invalid_budgets() {
        assert_eq!(WaitBudget::parse(""), Err(WaitBudgetError::Empty));
        assert_eq!(WaitBudget::parse("   "), Err(WaitBudgetError::Empty));
        assert!(matches!(
            WaitBudget::parse("-5"),
            Err(WaitBudgetError::InvalidFormat(_))
        ));
        assert!(matches!(
            WaitBudget::parse("10hours"),
            Err(WaitBudgetError::InvalidFormat(_))
        ));
        assert!(matches!(
            WaitBudget::parse("soon"),
            Err(WaitBudgetError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_overflow() {
        assert!(matches!(
            WaitBudget::parse("99999999999999999999"),
            Err(WaitBudgetError::Overflow(_))
        ));
        assert!(matches!(
            WaitBudget::parse("18446744073709551615min"),
            Err(WaitBudgetError::Overflow(_))
        ));
    }

    #[test]
    fn test_deserialize_string_or_number() {
        let from_text: WaitBudget = serde_json::from_str(r#""3sec""#).unwrap();
        assert_eq!(from_text.as_millis(), 3_000);

        let from_number: WaitBudget = serde_json::from_str("750").unwrap();
        assert_eq!(from_number.as_millis(), 750);

        assert!(serde_json::from_str::<WaitBudget>(r#""later""#).is_err());
    }
}

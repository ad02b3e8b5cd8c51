//! Subscription parameters: price precision, update frequency and book depth

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FeedError;

/// Price aggregation level requested from the feed.
///
/// Ordered coarsest (`P4`) to finest (`P0`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Precision {
    P4,
    #[default]
    P3,
    P2,
    P1,
    P0,
}

impl Precision {
    /// All recognized levels, coarsest first
    pub const ALL: [Precision; 5] = [
        Precision::P4,
        Precision::P3,
        Precision::P2,
        Precision::P1,
        Precision::P0,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::P4 => "P4",
            Precision::P3 => "P3",
            Precision::P2 => "P2",
            Precision::P1 => "P1",
            Precision::P0 => "P0",
        }
    }

    fn index(&self) -> usize {
        Self::ALL.iter().position(|p| p == self).unwrap_or_default()
    }

    /// Move `steps` levels along the ordering; positive is finer.
    ///
    /// Clamps at the coarsest and finest levels.
    pub fn step(&self, steps: i32) -> Precision {
        let last = Self::ALL.len() - 1;
        let target = self
            .index()
            .saturating_add_signed(steps as isize)
            .min(last);
        Self::ALL[target]
    }
}

impl AsRef<str> for Precision {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Precision {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| FeedError::InvalidPrecision(s.to_string()))
    }
}

/// A request to change the subscribed precision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecisionChange {
    /// Relative move along the ordering (positive is finer)
    Step(i32),
    /// Explicit level
    Level(Precision),
}

impl PrecisionChange {
    /// Resolve against the currently requested precision
    pub fn resolve(&self, current: Precision) -> Precision {
        match *self {
            PrecisionChange::Level(p) => p,
            PrecisionChange::Step(steps) => current.step(steps),
        }
    }
}

/// Update frequency of the book channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Frequency {
    /// Realtime
    #[default]
    F0,
    /// Every two seconds
    F1,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::F0 => f.write_str("F0"),
            Frequency::F1 => f.write_str("F1"),
        }
    }
}

impl FromStr for Frequency {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "F0" => Ok(Frequency::F0),
            "F1" => Ok(Frequency::F1),
            other => Err(FeedError::ConfigError(format!(
                "Frequency \"{}\" is not valid",
                other
            ))),
        }
    }
}

/// Number of price levels per side requested from the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BookDepth(u32);

impl BookDepth {
    pub const ALLOWED: [u32; 4] = [1, 25, 100, 250];

    pub fn new(levels: u32) -> crate::Result<Self> {
        if Self::ALLOWED.contains(&levels) {
            Ok(Self(levels))
        } else {
            Err(FeedError::ConfigError(format!(
                "Book depth {} is not one of {:?}",
                levels,
                Self::ALLOWED
            )))
        }
    }

    pub fn levels(&self) -> u32 {
        self.0
    }
}

impl Default for BookDepth {
    fn default() -> Self {
        Self(25)
    }
}

impl TryFrom<u32> for BookDepth {
    type Error = FeedError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BookDepth> for u32 {
    fn from(depth: BookDepth) -> Self {
        depth.0
    }
}

impl fmt::Display for BookDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_precision() {
        assert_eq!("P0".parse::<Precision>().unwrap(), Precision::P0);
        assert_eq!("P4".parse::<Precision>().unwrap(), Precision::P4);
        assert!(matches!(
            "P5".parse::<Precision>(),
            Err(FeedError::InvalidPrecision(s)) if s == "P5"
        ));
        assert!("p3".parse::<Precision>().is_err());
    }

    #[test]
    fn test_step_moves_towards_finer_levels() {
        assert_eq!(Precision::P3.step(1), Precision::P2);
        assert_eq!(Precision::P3.step(-1), Precision::P4);
        assert_eq!(Precision::P3.step(3), Precision::P0);
        assert_eq!(Precision::P2.step(0), Precision::P2);
    }

    #[test]
    fn test_step_clamps_at_both_ends() {
        assert_eq!(Precision::P0.step(1), Precision::P0);
        assert_eq!(Precision::P4.step(-1), Precision::P4);
        assert_eq!(Precision::P0.step(-10), Precision::P4);
        assert_eq!(Precision::P4.step(i32::MAX), Precision::P0);
        assert_eq!(Precision::P2.step(i32::MIN), Precision::P4);
    }

    #[test]
    fn test_resolve_change() {
        assert_eq!(
            PrecisionChange::Level(Precision::P1).resolve(Precision::P4),
            Precision::P1
        );
        assert_eq!(
            PrecisionChange::Step(-2).resolve(Precision::P1),
            Precision::P3
        );
        assert_eq!(
            PrecisionChange::Step(1).resolve(Precision::P0),
            Precision::P0
        );
    }

    #[test]
    fn test_book_depth() {
        assert_eq!(BookDepth::new(100).unwrap().levels(), 100);
        assert!(BookDepth::new(50).is_err());
        assert_eq!(BookDepth::default().to_string(), "25");
    }

    #[test]
    fn test_frequency() {
        assert_eq!("F1".parse::<Frequency>().unwrap(), Frequency::F1);
        assert!("F2".parse::<Frequency>().is_err());
        assert_eq!(Frequency::default().to_string(), "F0");
    }
}

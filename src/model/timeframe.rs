use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Chart interval an indicator event was computed on, ordered low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1MIN")]
    Min1,
    #[serde(rename = "5MIN")]
    Min5,
    #[serde(rename = "15MIN")]
    Min15,
    #[serde(rename = "30MIN")]
    Min30,
    #[serde(rename = "1HR")]
    Hour1,
    #[serde(rename = "2HR")]
    Hour2,
    #[serde(rename = "4HR")]
    Hour4,
    #[serde(rename = "1DAY")]
    Day1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 8] = [
        Timeframe::Min1,
        Timeframe::Min5,
        Timeframe::Min15,
        Timeframe::Min30,
        Timeframe::Hour1,
        Timeframe::Hour2,
        Timeframe::Hour4,
        Timeframe::Day1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min1 => "1MIN",
            Self::Min5 => "5MIN",
            Self::Min15 => "15MIN",
            Self::Min30 => "30MIN",
            Self::Hour1 => "1HR",
            Self::Hour2 => "2HR",
            Self::Hour4 => "4HR",
            Self::Day1 => "1DAY",
        }
    }

    /// Short token appended to alert tags (`C5`, `PUT1H`, `SQZ1D`).
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Min1 => "1",
            Self::Min5 => "5",
            Self::Min15 => "15",
            Self::Min30 => "30",
            Self::Hour1 => "1H",
            Self::Hour2 => "2H",
            Self::Hour4 => "4H",
            Self::Day1 => "1D",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    /// Next entry in the fixed ordering; `None` at the top.
    pub fn next_higher(self) -> Option<Timeframe> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Map a quantity + unit pair (`5`, `min`) onto the enumeration.
    /// Units accept compact and verbose spellings; anything that does not land
    /// exactly on one of the eight intervals is rejected.
    pub fn from_parts(quantity: u32, unit: &str) -> Option<Timeframe> {
        let unit = unit.trim().to_ascii_uppercase();
        let unit = match unit.as_str() {
            "M" | "MIN" | "MINS" | "MINUTE" | "MINUTES" => "MIN",
            "H" | "HR" | "HRS" | "HOUR" | "HOURS" => "HR",
            "D" | "DAY" | "DAYS" => "DAY",
            _ => return None,
        };
        match (quantity, unit) {
            (1, "MIN") => Some(Self::Min1),
            (5, "MIN") => Some(Self::Min5),
            (15, "MIN") => Some(Self::Min15),
            (30, "MIN") => Some(Self::Min30),
            (60, "MIN") | (1, "HR") => Some(Self::Hour1),
            (120, "MIN") | (2, "HR") => Some(Self::Hour2),
            (240, "MIN") | (4, "HR") => Some(Self::Hour4),
            (1, "DAY") => Some(Self::Day1),
            _ => None,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    /// Parses the canonical names (`1MIN`, `1HR`, `1DAY`) as well as the
    /// spaced/verbose forms accepted by the event parser (`5 min`, `1 hour`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let split = compact
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("invalid timeframe '{}'", s))?;
        let (num, unit) = compact.split_at(split);
        let quantity: u32 = num
            .parse()
            .map_err(|_| format!("invalid timeframe '{}': missing quantity", s))?;
        Self::from_parts(quantity, unit).ok_or_else(|| format!("unknown timeframe '{}'", s))
    }
}

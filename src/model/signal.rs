use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::timeframe::Timeframe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    EmaCross,
    MacdCross,
    SqueezeFire,
}

impl SignalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmaCross => "EMA_CROSS",
            Self::MacdCross => "MACD_CROSS",
            Self::SqueezeFire => "SQUEEZE_FIRE",
        }
    }

    /// Which stored status this kind mutates. Squeezes are stateless.
    pub fn crossover_type(self) -> Option<CrossoverType> {
        match self {
            Self::EmaCross => Some(CrossoverType::Ema),
            Self::MacdCross => Some(CrossoverType::Macd),
            Self::SqueezeFire => None,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bullish => "BULLISH",
            Self::Bearish => "BEARISH",
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Self::Bullish => Self::Bearish,
            Self::Bearish => Self::Bullish,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored directional memory for one indicator on one timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndicatorStatus {
    Bullish,
    Bearish,
    #[default]
    Unknown,
}

impl IndicatorStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bullish => "BULLISH",
            Self::Bearish => "BEARISH",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn direction(self) -> Option<Direction> {
        match self {
            Self::Bullish => Some(Direction::Bullish),
            Self::Bearish => Some(Direction::Bearish),
            Self::Unknown => None,
        }
    }

    pub fn is(self, direction: Direction) -> bool {
        self.direction() == Some(direction)
    }
}

impl From<Direction> for IndicatorStatus {
    fn from(value: Direction) -> Self {
        match value {
            Direction::Bullish => Self::Bullish,
            Direction::Bearish => Self::Bearish,
        }
    }
}

impl FromStr for IndicatorStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BULLISH" => Ok(Self::Bullish),
            "BEARISH" => Ok(Self::Bearish),
            "UNKNOWN" | "" => Ok(Self::Unknown),
            other => Err(format!("invalid indicator status '{}'", other)),
        }
    }
}

impl fmt::Display for IndicatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrossoverType {
    Ema,
    Macd,
}

impl CrossoverType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ema => "EMA",
            Self::Macd => "MACD",
        }
    }
}

impl FromStr for CrossoverType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EMA" => Ok(Self::Ema),
            "MACD" => Ok(Self::Macd),
            other => Err(format!("invalid crossover type '{}'", other)),
        }
    }
}

impl fmt::Display for CrossoverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed indicator event. Consumed by the pipeline and then dropped;
/// only its effect on timeframe state is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub kind: SignalKind,
    /// `None` only for [`SignalKind::SqueezeFire`].
    pub direction: Option<Direction>,
    pub price: Option<Decimal>,
    pub observed_at: DateTime<Utc>,
}

//! Token-grammar parser for charting-platform alert text.
//!
//! Messages look like
//! `ALERT ON SPY 5MIN TF MACD crossover negative to positive MARK = 450.25`.
//! Only fixed anchors are recognised: `ALERT ON <SYMBOL>`, `MARK = <price>`,
//! a timeframe token and a direction phrase. Everything else is ignored.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::model::signal::{Direction, Signal, SignalKind};
use crate::model::timeframe::Timeframe;

static SYMBOL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bALERT\s+ON\s+\$?([A-Z0-9][A-Z0-9._/-]*)").expect("static regex")
});

static MARK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bMARK\s*=\s*\$?([0-9][0-9,]*(?:\.[0-9]+)?)").expect("static regex")
});

// Longest unit spellings first: alternation is leftmost-first.
static TIMEFRAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d+)\s*(MINUTES|MINUTE|MINS|MIN|HOURS|HOUR|HRS|HR|DAYS|DAY|H|D|M)(\s*TF)?\b",
    )
    .expect("static regex")
});

const EMA_KEYWORDS: [&str; 6] = [
    "movingavgcrossover",
    "crossover",
    "ema cross",
    "moving average",
    "length1",
    "exponential",
];

const PRICE_LEVEL_PHRASES: [&str; 4] = [
    "at or above",
    "at or below",
    "crossed above",
    "crossed below",
];

/// Coarse category of an inbound message, decided from keywords alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    MacdCross,
    EmaCross,
    SqueezeFire,
    PriceLevel,
    Unrecognized,
}

impl EventClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MacdCross => "MACD_CROSS",
            Self::EmaCross => "EMA_CROSS",
            Self::SqueezeFire => "SQUEEZE_FIRE",
            Self::PriceLevel => "PRICE_LEVEL",
            Self::Unrecognized => "UNRECOGNIZED",
        }
    }
}

/// A plain price alert. Never classified; relayed as its raw text.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceLevelEvent {
    pub symbol: String,
    pub price: Option<Decimal>,
    pub raw: String,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    Signal(Signal),
    PriceLevel(PriceLevelEvent),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("message does not match any known alert format")]
    Unrecognized,

    #[error("no 'ALERT ON <symbol>' anchor")]
    MissingSymbol,

    #[error("no timeframe token")]
    MissingTimeframe,

    #[error("unknown timeframe '{0}'")]
    UnknownTimeframe(String),

    #[error("{0} without a direction phrase")]
    MissingDirection(SignalKind),
}

impl ParseError {
    /// Stable code for log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unrecognized => "parse.unrecognized",
            Self::MissingSymbol => "parse.missing_symbol",
            Self::MissingTimeframe => "parse.missing_timeframe",
            Self::UnknownTimeframe(_) => "parse.unknown_timeframe",
            Self::MissingDirection(_) => "parse.missing_direction",
        }
    }
}

pub fn classify_message(raw: &str) -> EventClass {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("macd") {
        EventClass::MacdCross
    } else if lower.contains("squeeze") {
        EventClass::SqueezeFire
    } else if EMA_KEYWORDS.iter().any(|k| lower.contains(k)) {
        EventClass::EmaCross
    } else if lower.contains("mark") && PRICE_LEVEL_PHRASES.iter().any(|p| lower.contains(p)) {
        EventClass::PriceLevel
    } else {
        EventClass::Unrecognized
    }
}

/// Parse one raw message. Pure: no I/O, no shared state.
pub fn parse(raw: &str, arrived_at: DateTime<Utc>) -> Result<ParsedEvent, ParseError> {
    let kind = match classify_message(raw) {
        EventClass::MacdCross => SignalKind::MacdCross,
        EventClass::EmaCross => SignalKind::EmaCross,
        EventClass::SqueezeFire => SignalKind::SqueezeFire,
        EventClass::PriceLevel => {
            let symbol = extract_symbol(raw).ok_or(ParseError::MissingSymbol)?;
            return Ok(ParsedEvent::PriceLevel(PriceLevelEvent {
                symbol,
                price: extract_mark_price(raw),
                raw: raw.trim().to_string(),
                observed_at: arrived_at,
            }));
        }
        EventClass::Unrecognized => return Err(ParseError::Unrecognized),
    };

    let symbol = extract_symbol(raw).ok_or(ParseError::MissingSymbol)?;
    let timeframe = extract_timeframe(raw)?;
    let direction = extract_direction(raw);
    if direction.is_none() && kind != SignalKind::SqueezeFire {
        return Err(ParseError::MissingDirection(kind));
    }

    Ok(ParsedEvent::Signal(Signal {
        symbol,
        timeframe,
        kind,
        direction: if kind == SignalKind::SqueezeFire {
            None
        } else {
            direction
        },
        price: extract_mark_price(raw),
        observed_at: arrived_at,
    }))
}

pub fn extract_symbol(raw: &str) -> Option<String> {
    let caps = SYMBOL_RE.captures(raw)?;
    let symbol = caps
        .get(1)?
        .as_str()
        .trim_end_matches(['.', '/', '-', '_'])
        .to_ascii_uppercase();
    if symbol.is_empty() {
        None
    } else {
        Some(symbol)
    }
}

pub fn extract_mark_price(raw: &str) -> Option<Decimal> {
    let caps = MARK_RE.captures(raw)?;
    // Thousands separators: `1,234.50`.
    let digits: String = caps.get(1)?.as_str().chars().filter(|c| *c != ',').collect();
    Decimal::from_str(&digits).ok()
}

/// Find the timeframe token. A token followed by `TF` wins over bare ones;
/// otherwise the first token is used. The token must land exactly on one of
/// the fixed intervals.
pub fn extract_timeframe(raw: &str) -> Result<Timeframe, ParseError> {
    let mut first = None;
    let mut tagged = None;
    for caps in TIMEFRAME_RE.captures_iter(raw) {
        let is_tagged = caps.get(3).is_some();
        if is_tagged && tagged.is_none() {
            tagged = Some(caps);
        } else if first.is_none() {
            first = Some(caps);
        }
        if tagged.is_some() {
            break;
        }
    }

    let caps = tagged.or(first).ok_or(ParseError::MissingTimeframe)?;
    let token = caps
        .get(0)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    let quantity: u32 = caps
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| ParseError::UnknownTimeframe(token.clone()))?;
    let unit = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

    Timeframe::from_parts(quantity, unit).ok_or(ParseError::UnknownTimeframe(token))
}

pub fn extract_direction(raw: &str) -> Option<Direction> {
    let normalized = raw
        .to_ascii_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if normalized.contains("negative to positive") {
        Some(Direction::Bullish)
    } else if normalized.contains("positive to negative") {
        Some(Direction::Bearish)
    } else {
        None
    }
}

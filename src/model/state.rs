use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::signal::{CrossoverType, Direction, IndicatorStatus};
use super::timeframe::Timeframe;

/// Directional memory for one (symbol, timeframe) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeframeState {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub ema_status: IndicatorStatus,
    pub macd_status: IndicatorStatus,
    pub last_ema_update: Option<DateTime<Utc>>,
    pub last_macd_update: Option<DateTime<Utc>>,
    pub last_ema_price: Option<Decimal>,
    pub last_macd_price: Option<Decimal>,
}

impl TimeframeState {
    pub fn new(symbol: &str, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.to_ascii_uppercase(),
            timeframe,
            ema_status: IndicatorStatus::Unknown,
            macd_status: IndicatorStatus::Unknown,
            last_ema_update: None,
            last_macd_update: None,
            last_ema_price: None,
            last_macd_price: None,
        }
    }

    pub fn status(&self, crossover_type: CrossoverType) -> IndicatorStatus {
        match crossover_type {
            CrossoverType::Ema => self.ema_status,
            CrossoverType::Macd => self.macd_status,
        }
    }

    /// Overwrite one indicator's status, timestamp and price. The other
    /// indicator is left untouched.
    pub fn set(
        &mut self,
        crossover_type: CrossoverType,
        status: IndicatorStatus,
        price: Option<Decimal>,
        at: DateTime<Utc>,
    ) {
        match crossover_type {
            CrossoverType::Ema => {
                self.ema_status = status;
                self.last_ema_update = Some(at);
                self.last_ema_price = price;
            }
            CrossoverType::Macd => {
                self.macd_status = status;
                self.last_macd_update = Some(at);
                self.last_macd_price = price;
            }
        }
    }
}

/// One accepted status transition. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateHistoryEntry {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub crossover_type: CrossoverType,
    pub old_status: IndicatorStatus,
    pub new_status: IndicatorStatus,
    pub price: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// Result of [`crate::state_store::TimeframeStateStore::apply_crossover`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossoverOutcome {
    pub changed: bool,
    pub old_status: IndicatorStatus,
    pub new_direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeframeStatusPair {
    pub timeframe: Timeframe,
    pub ema_status: IndicatorStatus,
    pub macd_status: IndicatorStatus,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StateSummary {
    pub symbol: String,
    pub total_timeframes: usize,
    pub ema_bullish_count: usize,
    pub ema_bearish_count: usize,
    pub macd_bullish_count: usize,
    pub macd_bearish_count: usize,
    pub timeframes: Vec<TimeframeStatusPair>,
}

impl StateSummary {
    /// Fold a symbol's rows into counts. `states` is expected in timeframe order.
    pub fn from_states(symbol: &str, states: &[TimeframeState]) -> Self {
        let mut summary = StateSummary {
            symbol: symbol.to_ascii_uppercase(),
            total_timeframes: states.len(),
            ..Default::default()
        };
        for state in states {
            match state.ema_status {
                IndicatorStatus::Bullish => summary.ema_bullish_count += 1,
                IndicatorStatus::Bearish => summary.ema_bearish_count += 1,
                IndicatorStatus::Unknown => {}
            }
            match state.macd_status {
                IndicatorStatus::Bullish => summary.macd_bullish_count += 1,
                IndicatorStatus::Bearish => summary.macd_bearish_count += 1,
                IndicatorStatus::Unknown => {}
            }
            summary.timeframes.push(TimeframeStatusPair {
                timeframe: state.timeframe,
                ema_status: state.ema_status,
                macd_status: state.macd_status,
            });
        }
        summary
    }
}

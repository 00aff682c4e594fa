use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::config::FilterConfig;
use crate::model::alert::ClassifiedAlert;

/// Read side of the per-(symbol, tag) enable switches.
pub trait ToggleSource: Send + Sync {
    /// Absence of a row means enabled.
    fn is_enabled(&self, symbol: &str, tag: &str) -> bool;
}

/// Stable taxonomy for filter rejections, emitted in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TimeWindow,
    Weekend,
    ToggleDisabled,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TimeWindow => "TIME_WINDOW",
            Self::Weekend => "WEEKEND",
            Self::ToggleDisabled => "TOGGLE_DISABLED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Dispatch,
    Reject(RejectReason),
}

impl FilterDecision {
    pub fn is_dispatch(self) -> bool {
        matches!(self, FilterDecision::Dispatch)
    }

    pub fn reason(self) -> Option<RejectReason> {
        match self {
            FilterDecision::Dispatch => None,
            FilterDecision::Reject(reason) => Some(reason),
        }
    }
}

/// Gates 1 and 2: active-hours window then non-trading days, evaluated in
/// the configured reference zone. Both are skipped in dev/test mode.
pub fn market_hours_gate(now: DateTime<Utc>, config: &FilterConfig) -> Option<RejectReason> {
    if config.bypass_market_hours() {
        return None;
    }
    let local = now.with_timezone(&config.timezone);

    if !config.ignore_time_filter {
        let hour = local.hour();
        if hour < config.active_start_hour || hour >= config.active_end_hour {
            return Some(RejectReason::TimeWindow);
        }
    }

    if !config.ignore_weekend_filter && config.non_trading_days.contains(&local.weekday()) {
        return Some(RejectReason::Weekend);
    }

    None
}

/// Run the gates in order, cheapest first, stopping at the first rejection.
/// A rejection is a normal outcome, never an error.
pub fn should_dispatch(
    alert: &ClassifiedAlert,
    now: DateTime<Utc>,
    config: &FilterConfig,
    toggles: &dyn ToggleSource,
) -> FilterDecision {
    if let Some(reason) = market_hours_gate(now, config) {
        return FilterDecision::Reject(reason);
    }
    if !toggles.is_enabled(&alert.symbol, &alert.tag) {
        return FilterDecision::Reject(RejectReason::ToggleDisabled);
    }
    FilterDecision::Dispatch
}

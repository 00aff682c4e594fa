//! Secondary channel carrying only short-timeframe EMA crossovers.
//!
//! 1MIN crosses pass only when the 5MIN EMA already points the same way;
//! 5MIN crosses always pass; everything else stays on the main channel.

use chrono::{DateTime, Utc};

use crate::classifier::ema_tag;
use crate::config::FilterConfig;
use crate::filter::market_hours_gate;
use crate::model::alert::ClassifiedAlert;
use crate::model::signal::{IndicatorStatus, SignalKind};
use crate::model::timeframe::Timeframe;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AltChannelDecision {
    Send { tag: String },
    Skip(&'static str),
}

pub fn evaluate(
    alert: &ClassifiedAlert,
    five_min_ema: IndicatorStatus,
    now: DateTime<Utc>,
    config: &FilterConfig,
) -> AltChannelDecision {
    if alert.kind != SignalKind::EmaCross {
        return AltChannelDecision::Skip("not an EMA cross");
    }
    let Some(direction) = alert.direction else {
        return AltChannelDecision::Skip("no direction");
    };
    if let Some(reason) = market_hours_gate(now, config) {
        return AltChannelDecision::Skip(reason.as_str());
    }

    match alert.timeframe {
        Timeframe::Min1 if five_min_ema.is(direction) => AltChannelDecision::Send {
            tag: ema_tag(direction, false, Timeframe::Min1),
        },
        Timeframe::Min1 => AltChannelDecision::Skip("no 5MIN confluence"),
        Timeframe::Min5 => AltChannelDecision::Send {
            tag: ema_tag(direction, false, Timeframe::Min5),
        },
        _ => AltChannelDecision::Skip("timeframe not carried"),
    }
}

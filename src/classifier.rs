//! Multi-timeframe confluence rules.
//!
//! Tag namespaces are case-sensitive and drive the toggle table:
//! EMA tags are uppercase (`C5`, `CALL5`, `P1H`, `PUT1H`), MACD tags are
//! mixed case (`Call5`, `Put1H`), squeeze tags are uppercase (`SQZ5`).

use crate::model::alert::{Classification, ClassifiedAlert};
use crate::model::signal::{Direction, IndicatorStatus, Signal, SignalKind};
use crate::model::timeframe::Timeframe;

pub fn ema_tag(direction: Direction, aligned: bool, timeframe: Timeframe) -> String {
    let base = match (direction, aligned) {
        (Direction::Bullish, true) => "CALL",
        (Direction::Bullish, false) => "C",
        (Direction::Bearish, true) => "PUT",
        (Direction::Bearish, false) => "P",
    };
    format!("{}{}", base, timeframe.suffix())
}

pub fn macd_tag(direction: Direction, timeframe: Timeframe) -> String {
    let base = match direction {
        Direction::Bullish => "Call",
        Direction::Bearish => "Put",
    };
    format!("{}{}", base, timeframe.suffix())
}

pub fn squeeze_tag(timeframe: Timeframe) -> String {
    format!("SQZ{}", timeframe.suffix())
}

/// MACD gate: a genuine sign flip (prior status is the opposite direction,
/// not UNKNOWN and not a repeat) confirmed by the same timeframe's EMA.
pub fn macd_allowed(
    direction: Direction,
    prior_macd_status: IndicatorStatus,
    current_ema_status: IndicatorStatus,
) -> bool {
    prior_macd_status.is(direction.opposite()) && current_ema_status.is(direction)
}

/// Classify one signal against the state read around it.
///
/// `prior_macd_status` is the MACD status *before* this event was applied;
/// `higher_tf_ema_status` is `None` when the timeframe has no higher
/// neighbour, which counts as not aligned.
pub fn classify(
    signal: &Signal,
    prior_macd_status: IndicatorStatus,
    current_ema_status: IndicatorStatus,
    higher_tf_ema_status: Option<IndicatorStatus>,
) -> Classification {
    let (tag, allow) = match (signal.kind, signal.direction) {
        (SignalKind::SqueezeFire, _) => (squeeze_tag(signal.timeframe), true),
        (SignalKind::EmaCross, Some(direction)) => {
            let aligned = higher_tf_ema_status
                .map(|status| status.is(direction))
                .unwrap_or(false);
            (ema_tag(direction, aligned, signal.timeframe), true)
        }
        (SignalKind::MacdCross, Some(direction)) => (
            macd_tag(direction, signal.timeframe),
            macd_allowed(direction, prior_macd_status, current_ema_status),
        ),
        // Crossovers always carry a direction out of the parser; treat a
        // hand-built one without it as non-actionable.
        (SignalKind::EmaCross, None) => (format!("EMA{}", signal.timeframe.suffix()), false),
        (SignalKind::MacdCross, None) => (format!("MACD{}", signal.timeframe.suffix()), false),
    };

    Classification {
        alert: ClassifiedAlert {
            symbol: signal.symbol.clone(),
            timeframe: signal.timeframe,
            kind: signal.kind,
            tag,
            direction: signal.direction,
            price: signal.price,
            observed_at: signal.observed_at,
        },
        allow,
    }
}

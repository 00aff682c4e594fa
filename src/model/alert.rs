use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::signal::{Direction, SignalKind};
use super::timeframe::Timeframe;

/// Output of the confluence classifier, consumed by the filter pipeline and
/// the dispatch router.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedAlert {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub kind: SignalKind,
    /// Case-sensitive: `CALL5` (EMA) and `Call5` (MACD) are distinct tags.
    pub tag: String,
    pub direction: Option<Direction>,
    pub price: Option<Decimal>,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub alert: ClassifiedAlert,
    pub allow: bool,
}

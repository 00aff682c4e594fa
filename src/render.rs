use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::model::alert::ClassifiedAlert;
use crate::model::signal::{Direction, SignalKind};
use crate::model::timeframe::Timeframe;

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub timezone: Tz,
    /// Trailing line such as `@everyone`; empty to omit.
    pub mention: String,
}

/// Longer timeframes get more markers so they stand out in the channel.
pub fn marker_count(timeframe: Timeframe) -> usize {
    match timeframe {
        Timeframe::Min1 | Timeframe::Min5 => 1,
        Timeframe::Min15 | Timeframe::Min30 => 2,
        Timeframe::Hour1 | Timeframe::Hour2 => 3,
        Timeframe::Hour4 | Timeframe::Day1 => 4,
    }
}

fn marker(alert: &ClassifiedAlert) -> &'static str {
    match alert.direction {
        Some(Direction::Bullish) => "🟢",
        Some(Direction::Bearish) => "🔴",
        None => "🟡",
    }
}

fn title(alert: &ClassifiedAlert) -> String {
    let label = match alert.kind {
        SignalKind::EmaCross => "EMA Cross",
        SignalKind::MacdCross => "MACD Cross",
        SignalKind::SqueezeFire => "Squeeze Fire",
    };
    format!("{} {} - {}", alert.timeframe, label, alert.tag)
}

pub fn render_alert(alert: &ClassifiedAlert, now: DateTime<Utc>, options: &RenderOptions) -> String {
    let local = now.with_timezone(&options.timezone);
    let mark = alert
        .price
        .map(|p| format!("${}", p))
        .unwrap_or_else(|| "N/A".to_string());

    let mut lines = vec![
        marker(alert).repeat(marker_count(alert.timeframe)),
        title(alert),
        format!("TICKER: {}", alert.symbol),
        format!("MARK: {}", mark),
        format!("TIME: {}", local.format("%I:%M %p %Z")),
    ];
    if !options.mention.trim().is_empty() {
        lines.push(options.mention.trim().to_string());
    }
    lines.join("\n")
}

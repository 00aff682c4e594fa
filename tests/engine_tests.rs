mod common;

use std::collections::BTreeMap;

use confluence_alerts::config::FilterConfig;
use confluence_alerts::engine::ProcessOutcome;
use confluence_alerts::filter::RejectReason;
use confluence_alerts::model::signal::IndicatorStatus;
use confluence_alerts::model::timeframe::Timeframe;
use confluence_alerts::parser::ParseError;

use common::{
    after_close, assert_no_delivery, destination, harness, harness_with, market_open,
    next_delivery,
};

const EMA_5_BULL: &str = "ALERT ON SPY 5MIN TF MovingAvgCrossover negative to positive MARK = 450.00";
const EMA_5_BEAR: &str = "ALERT ON SPY 5MIN TF MovingAvgCrossover positive to negative MARK = 449.00";
const MACD_5_BEAR: &str = "ALERT ON SPY 5MIN TF MACD crossover positive to negative MARK = 449.50";
const MACD_5_BULL: &str = "ALERT ON SPY 5MIN TF MACD crossover negative to positive MARK = 450.25";

fn queued(tag: &str, destination: &str) -> ProcessOutcome {
    ProcessOutcome::Queued {
        tag: tag.to_string(),
        destination: destination.to_string(),
    }
}

#[tokio::test]
/// Verifies the SPY scenario: with a bullish 5MIN EMA, a MACD flip from
/// bearish to bullish is dispatched as `Call5`.
async fn spy_macd_flip_confirmed_by_ema_dispatches() {
    let mut h = harness();
    let now = market_open();

    assert_eq!(h.engine.process(EMA_5_BULL, now, now), queued("C5", "default"));
    let (_, ema_msg) = next_delivery(&mut h.rx).await;
    assert_eq!(ema_msg.tag.as_deref(), Some("C5"));

    assert_eq!(
        h.engine.process(MACD_5_BEAR, now, now),
        ProcessOutcome::Denied {
            tag: "Put5".to_string()
        }
    );
    assert_eq!(h.engine.process(MACD_5_BULL, now, now), queued("Call5", "default"));

    let (to, msg) = next_delivery(&mut h.rx).await;
    assert_eq!(to.url, "https://hooks.example/main");
    assert_eq!(msg.tag.as_deref(), Some("Call5"));
    assert!(msg.content.contains("5MIN MACD Cross - Call5"));
    assert!(msg.content.contains("TICKER: SPY"));
    assert!(msg.content.contains("MARK: $450.25"));
    assert_no_delivery(&mut h.rx).await;
}

#[tokio::test]
/// Verifies the same MACD flip is denied when the 5MIN EMA is bearish.
async fn spy_macd_flip_against_ema_is_denied() {
    let mut h = harness();
    let now = market_open();

    h.engine.process(EMA_5_BEAR, now, now);
    next_delivery(&mut h.rx).await;
    h.engine.process(MACD_5_BEAR, now, now);

    assert_eq!(
        h.engine.process(MACD_5_BULL, now, now),
        ProcessOutcome::Denied {
            tag: "Call5".to_string()
        }
    );
    assert_no_delivery(&mut h.rx).await;

    // Denial never rolls back the state transition.
    let state = h.states.get_state("SPY", Timeframe::Min5).expect("state");
    assert_eq!(state.macd_status, IndicatorStatus::Bullish);
}

#[tokio::test]
/// Verifies a repeated MACD direction is not a flip and is denied.
async fn repeated_macd_direction_is_denied() {
    let h = harness();
    let now = market_open();
    h.engine.process(EMA_5_BULL, now, now);
    h.engine.process(MACD_5_BEAR, now, now);
    assert_eq!(h.engine.process(MACD_5_BULL, now, now).tag(), Some("Call5"));
    assert_eq!(
        h.engine.process(MACD_5_BULL, now, now),
        ProcessOutcome::Denied {
            tag: "Call5".to_string()
        }
    );
}

#[tokio::test]
/// Verifies squeezes dispatch as `SQZ30` and never touch state.
async fn squeeze_dispatches_without_state_change() {
    let mut h = harness();
    let now = market_open();

    assert_eq!(
        h.engine
            .process("ALERT ON SPY 30MIN TF Squeeze fired MARK = 451", now, now),
        queued("SQZ30", "default")
    );
    let (_, msg) = next_delivery(&mut h.rx).await;
    assert!(msg.content.starts_with("🟡🟡\n30MIN Squeeze Fire - SQZ30"));

    let state = h.states.get_state("SPY", Timeframe::Min30).expect("state");
    assert_eq!(state.ema_status, IndicatorStatus::Unknown);
    assert_eq!(state.macd_status, IndicatorStatus::Unknown);
}

#[tokio::test]
/// Verifies EMA confluence: a 15MIN cross matching the 30MIN EMA is `CALL15`.
async fn ema_confluence_with_higher_timeframe() {
    let h = harness();
    let now = market_open();

    assert_eq!(
        h.engine.process(
            "ALERT ON SPY 15MIN TF MovingAvgCrossover negative to positive",
            now,
            now
        ),
        queued("C15", "default")
    );
    h.engine.process(
        "ALERT ON SPY 30MIN TF MovingAvgCrossover negative to positive",
        now,
        now,
    );
    h.engine.process(
        "ALERT ON SPY 15MIN TF MovingAvgCrossover positive to negative",
        now,
        now,
    );
    assert_eq!(
        h.engine.process(
            "ALERT ON SPY 15MIN TF MovingAvgCrossover negative to positive",
            now,
            now
        ),
        queued("CALL15", "default")
    );
}

#[tokio::test]
/// Verifies filter rejections are reported with their reason and still
/// leave the state updated.
async fn filter_rejections_keep_state() {
    let mut h = harness();

    assert_eq!(
        h.engine.process(EMA_5_BULL, after_close(), after_close()),
        ProcessOutcome::Filtered {
            tag: "C5".to_string(),
            reason: RejectReason::TimeWindow,
        }
    );
    let state = h.states.get_state("SPY", Timeframe::Min5).expect("state");
    assert_eq!(state.ema_status, IndicatorStatus::Bullish);

    let mut off = BTreeMap::new();
    off.insert("SQZ5".to_string(), false);
    h.toggles.set_many("SPY", &off).expect("toggle");
    let now = market_open();
    assert_eq!(
        h.engine
            .process("ALERT ON SPY 5MIN TF squeeze fired", now, now),
        ProcessOutcome::Filtered {
            tag: "SQZ5".to_string(),
            reason: RejectReason::ToggleDisabled,
        }
    );
    assert_no_delivery(&mut h.rx).await;
}

#[tokio::test]
/// Verifies an alert with no symbol entry and no default is dropped.
async fn unroutable_alert_is_dropped() {
    let mut h = harness_with(
        &[("QQQ", "https://hooks.example/qqq")],
        FilterConfig::default(),
        None,
    );
    let now = market_open();
    assert_eq!(
        h.engine.process(EMA_5_BULL, now, now),
        ProcessOutcome::Unroutable {
            tag: Some("C5".to_string())
        }
    );
    assert_no_delivery(&mut h.rx).await;
}

#[tokio::test]
/// Verifies symbol destinations take precedence over `default`.
async fn symbol_destination_wins() {
    let mut h = harness();
    h.book
        .set("SPY", "https://hooks.example/spy")
        .expect("set destination");
    let now = market_open();
    assert_eq!(h.engine.process(EMA_5_BULL, now, now), queued("C5", "SPY"));
    let (to, _) = next_delivery(&mut h.rx).await;
    assert_eq!(to.url, "https://hooks.example/spy");
}

#[tokio::test]
/// Verifies price alerts are relayed verbatim without gating.
async fn price_level_forwarded_verbatim() {
    let mut h = harness();
    let raw = "ALERT ON TSLA MARK = 250.5 crossed above 250";
    assert_eq!(
        h.engine.process(raw, after_close(), after_close()),
        ProcessOutcome::Forwarded {
            destination: "default".to_string()
        }
    );
    let (_, msg) = next_delivery(&mut h.rx).await;
    assert_eq!(msg.content, raw);
    assert_eq!(msg.tag, None);
}

#[tokio::test]
/// Verifies unparseable text is dropped with its parse error.
async fn unparseable_event_is_dropped() {
    let mut h = harness();
    let now = market_open();
    assert_eq!(
        h.engine.process("lunch at noon?", now, now),
        ProcessOutcome::Dropped(ParseError::Unrecognized)
    );
    assert_eq!(
        h.engine
            .process("ALERT ON SPY 5MIN TF MACD crossover", now, now),
        ProcessOutcome::Dropped(ParseError::MissingDirection(
            confluence_alerts::model::signal::SignalKind::MacdCross
        ))
    );
    assert_no_delivery(&mut h.rx).await;
    assert!(h.states.all_states().expect("states").is_empty());
}

#[tokio::test]
/// Verifies the alternative channel gets 5MIN EMA crosses, and 1MIN crosses
/// only with 5MIN EMA agreement.
async fn alt_channel_rules() {
    let mut h = harness_with(
        &[("default", "https://hooks.example/main")],
        FilterConfig::default(),
        Some(destination("alt", "https://hooks.example/alt")),
    );
    let now = market_open();

    h.engine.process(
        "ALERT ON SPY 1MIN TF MovingAvgCrossover negative to positive",
        now,
        now,
    );
    let (to, _) = next_delivery(&mut h.rx).await;
    assert_eq!(to.key, "default");
    assert_no_delivery(&mut h.rx).await;

    h.engine.process(EMA_5_BULL, now, now);
    let mut got = vec![next_delivery(&mut h.rx).await, next_delivery(&mut h.rx).await];
    got.sort_by(|a, b| a.0.key.cmp(&b.0.key));
    assert_eq!(got[0].0.key, "alt");
    assert_eq!(got[0].1.tag.as_deref(), Some("C5"));
    assert_eq!(got[1].0.key, "default");

    h.engine.process(
        "ALERT ON SPY 1MIN TF MovingAvgCrossover positive to negative",
        now,
        now,
    );
    h.engine.process(
        "ALERT ON SPY 1MIN TF MovingAvgCrossover negative to positive",
        now,
        now,
    );
    let mut keys = Vec::new();
    for _ in 0..3 {
        let (to, msg) = next_delivery(&mut h.rx).await;
        keys.push((to.key, msg.tag.unwrap_or_default()));
    }
    keys.sort();
    assert_eq!(
        keys,
        vec![
            ("alt".to_string(), "C1".to_string()),
            ("default".to_string(), "CALL1".to_string()),
            ("default".to_string(), "P1".to_string()),
        ]
    );
}

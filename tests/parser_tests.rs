use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;

use confluence_alerts::model::signal::{Direction, SignalKind};
use confluence_alerts::model::timeframe::Timeframe;
use confluence_alerts::parser::{
    classify_message, extract_direction, extract_mark_price, extract_timeframe, parse,
    EventClass, ParseError, ParsedEvent,
};

fn arrived() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 17, 0, 0).unwrap()
}

fn parse_signal(raw: &str) -> confluence_alerts::model::signal::Signal {
    match parse(raw, arrived()).expect("message should parse") {
        ParsedEvent::Signal(signal) => signal,
        other => panic!("expected a signal, got {:?}", other),
    }
}

#[test]
/// Verifies the canonical MACD message yields symbol, timeframe, direction
/// and mark price, stamped with the arrival time.
fn parses_macd_crossover_with_mark() {
    let signal = parse_signal(
        "ALERT ON SPY 5MIN TF MACD crossover negative to positive MARK = 450.25",
    );
    assert_eq!(signal.symbol, "SPY");
    assert_eq!(signal.timeframe, Timeframe::Min5);
    assert_eq!(signal.kind, SignalKind::MacdCross);
    assert_eq!(signal.direction, Some(Direction::Bullish));
    assert_eq!(signal.price, Some(dec!(450.25)));
    assert_eq!(signal.observed_at, arrived());
}

#[test]
/// Verifies EMA keywords map to EMA_CROSS and a bearish phrase is honored.
fn parses_ema_crossover_bearish() {
    let signal = parse_signal(
        "ALERT ON QQQ 15 min TF MovingAvgCrossover positive to negative MARK = 380.10",
    );
    assert_eq!(signal.symbol, "QQQ");
    assert_eq!(signal.timeframe, Timeframe::Min15);
    assert_eq!(signal.kind, SignalKind::EmaCross);
    assert_eq!(signal.direction, Some(Direction::Bearish));
    assert_eq!(signal.price, Some(dec!(380.10)));
}

#[test]
/// Verifies squeeze messages carry no direction even without a direction phrase.
fn parses_squeeze_without_direction() {
    let signal = parse_signal("ALERT ON AAPL 30MIN TF Squeeze fired MARK = 190");
    assert_eq!(signal.kind, SignalKind::SqueezeFire);
    assert_eq!(signal.timeframe, Timeframe::Min30);
    assert_eq!(signal.direction, None);
    assert_eq!(signal.price, Some(dec!(190)));
}

#[test]
fn squeeze_ignores_direction_phrase() {
    let signal =
        parse_signal("ALERT ON AAPL 1H TF squeeze negative to positive MARK = 190.5");
    assert_eq!(signal.kind, SignalKind::SqueezeFire);
    assert_eq!(signal.timeframe, Timeframe::Hour1);
    assert_eq!(signal.direction, None);
}

#[test]
/// Verifies symbols are uppercased and a leading `$` is stripped.
fn symbol_is_normalized() {
    let signal = parse_signal("alert on $spy 5min tf macd crossover negative to positive");
    assert_eq!(signal.symbol, "SPY");
    assert_eq!(signal.price, None);
}

#[test]
/// Verifies a price alert is recognised as PRICE_LEVEL and keeps its raw text.
fn parses_price_level_event() {
    let raw = "ALERT ON TSLA MARK = 250.5 crossed above 250";
    assert_eq!(classify_message(raw), EventClass::PriceLevel);
    match parse(raw, arrived()).expect("price level should parse") {
        ParsedEvent::PriceLevel(event) => {
            assert_eq!(event.symbol, "TSLA");
            assert_eq!(event.price, Some(dec!(250.5)));
            assert_eq!(event.raw, raw);
        }
        other => panic!("expected price level, got {:?}", other),
    }
}

#[test]
/// Verifies keyword precedence: MACD wins over the generic crossover keyword.
fn classification_precedence() {
    assert_eq!(
        classify_message("MACD crossover negative to positive"),
        EventClass::MacdCross
    );
    assert_eq!(
        classify_message("Squeeze crossover"),
        EventClass::SqueezeFire
    );
    assert_eq!(
        classify_message("Exponential moving average"),
        EventClass::EmaCross
    );
    assert_eq!(classify_message("good morning"), EventClass::Unrecognized);
}

#[test]
/// Verifies every rejection path returns its own error, never a partial signal.
fn rejections_are_typed() {
    assert_eq!(parse("hello there", arrived()), Err(ParseError::Unrecognized));
    assert_eq!(
        parse("5MIN TF MACD crossover negative to positive", arrived()),
        Err(ParseError::MissingSymbol)
    );
    assert_eq!(
        parse("ALERT ON SPY MACD crossover negative to positive", arrived()),
        Err(ParseError::MissingTimeframe)
    );
    assert!(matches!(
        parse("ALERT ON SPY 3MIN TF MACD crossover negative to positive", arrived()),
        Err(ParseError::UnknownTimeframe(_))
    ));
    assert_eq!(
        parse("ALERT ON SPY 5MIN TF MACD crossover", arrived()),
        Err(ParseError::MissingDirection(SignalKind::MacdCross))
    );
    assert_eq!(
        parse("ALERT ON SPY 5MIN TF MovingAvgCrossover", arrived()),
        Err(ParseError::MissingDirection(SignalKind::EmaCross))
    );
}

#[test]
/// Verifies a `TF`-tagged token wins over an earlier bare token.
fn tagged_timeframe_wins() {
    assert_eq!(
        extract_timeframe("ALERT ON SPY 1 hour chart, 5MIN TF MACD"),
        Ok(Timeframe::Min5)
    );
    assert_eq!(extract_timeframe("ALERT ON SPY 1H MACD"), Ok(Timeframe::Hour1));
    assert_eq!(extract_timeframe("ALERT ON SPY 4 hours"), Ok(Timeframe::Hour4));
    assert_eq!(extract_timeframe("ALERT ON SPY 240min"), Ok(Timeframe::Hour4));
    assert_eq!(extract_timeframe("ALERT ON SPY 1D TF"), Ok(Timeframe::Day1));
}

#[test]
fn direction_phrase_tolerates_whitespace() {
    assert_eq!(
        extract_direction("MACD NEGATIVE\n to   positive"),
        Some(Direction::Bullish)
    );
    assert_eq!(
        extract_direction("crossed positive to negative"),
        Some(Direction::Bearish)
    );
    assert_eq!(extract_direction("went sideways"), None);
}

#[test]
/// Verifies error codes are stable for log fields.
fn parse_error_codes() {
    assert_eq!(ParseError::Unrecognized.code(), "parse.unrecognized");
    assert_eq!(
        ParseError::MissingDirection(SignalKind::MacdCross).code(),
        "parse.missing_direction"
    );
}

#[test]
/// Verifies a mark price with thousands separators is read in full.
fn mark_price_accepts_thousands_separator() {
    let signal = parse_signal(
        "ALERT ON NVDA 1HR TF MovingAvgCrossover negative to positive MARK = $1,234.50",
    );
    assert_eq!(signal.price, Some(dec!(1234.50)));
    assert_eq!(
        extract_mark_price("ALERT ON SPX 1D TF squeeze MARK = 5,102, fired"),
        Some(dec!(5102))
    );
}

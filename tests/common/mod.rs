#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;

use confluence_alerts::config::FilterConfig;
use confluence_alerts::dispatch::{
    Destination, DestinationBook, DispatchRouter, Dispatcher, Notifier, OutboundMessage,
};
use confluence_alerts::engine::AlertEngine;
use confluence_alerts::error::AppError;
use confluence_alerts::render::RenderOptions;
use confluence_alerts::state_store::TimeframeStateStore;
use confluence_alerts::storage::SqliteStore;
use confluence_alerts::toggle_store::AlertToggleStore;

pub type Delivery = (Destination, OutboundMessage);

/// Records every delivery. URLs containing `slow` stall for `stall`; content
/// equal to `fail` is rejected.
pub struct RecordingNotifier {
    tx: mpsc::UnboundedSender<Delivery>,
    stall: Duration,
}

impl RecordingNotifier {
    pub fn new(stall: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx, stall }), rx)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        destination: &Destination,
        message: &OutboundMessage,
    ) -> Result<(), AppError> {
        if destination.url.contains("slow") {
            tokio::time::sleep(self.stall).await;
        }
        if message.content == "fail" {
            return Err(AppError::DispatchStatus {
                status: 500,
                body: "boom".to_string(),
            });
        }
        let _ = self.tx.send((destination.clone(), message.clone()));
        Ok(())
    }
}

pub async fn next_delivery(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Delivery {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("delivery within 2s")
        .expect("notifier channel open")
}

pub async fn assert_no_delivery(rx: &mut mpsc::UnboundedReceiver<Delivery>) {
    let got = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(got.is_err(), "unexpected delivery: {:?}", got);
}

pub fn destination(key: &str, url: &str) -> Destination {
    Destination {
        key: key.to_string(),
        url: url.to_string(),
    }
}

/// Tuesday 2024-03-05 09:00 in Los Angeles: inside the active window.
pub fn market_open() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 17, 0, 0).unwrap()
}

/// Same Tuesday at 15:00 Los Angeles: outside the active window.
pub fn after_close() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 23, 0, 0).unwrap()
}

pub struct Harness {
    pub engine: AlertEngine,
    pub toggles: AlertToggleStore,
    pub book: Arc<DestinationBook>,
    pub states: Arc<TimeframeStateStore>,
    pub rx: mpsc::UnboundedReceiver<Delivery>,
}

pub fn harness_with(
    destinations: &[(&str, &str)],
    filter: FilterConfig,
    alt: Option<Destination>,
) -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().expect("in-memory sqlite"));
    let states = Arc::new(TimeframeStateStore::new(store.clone()));
    let toggles = AlertToggleStore::new(store);
    let book = Arc::new(DestinationBook::in_memory(
        destinations
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
    ));
    let (notifier, rx) = RecordingNotifier::new(Duration::from_millis(0));
    let dispatcher = Arc::new(Dispatcher::new(notifier, Duration::from_secs(1), 16));
    let engine = AlertEngine::new(
        Arc::clone(&states),
        Arc::new(toggles.clone()),
        DispatchRouter::new(Arc::clone(&book)),
        dispatcher,
        filter,
        RenderOptions {
            timezone: chrono_tz::America::Los_Angeles,
            mention: "@everyone".to_string(),
        },
    )
    .with_alt_destination(alt);
    Harness {
        engine,
        toggles,
        book,
        states,
        rx,
    }
}

pub fn harness() -> Harness {
    harness_with(
        &[("default", "https://hooks.example/main")],
        FilterConfig::default(),
        None,
    )
}

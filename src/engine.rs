use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::alt_channel::{self, AltChannelDecision};
use crate::classifier;
use crate::config::FilterConfig;
use crate::dispatch::{Destination, DispatchRouter, Dispatcher, OutboundMessage};
use crate::error::AppError;
use crate::filter::{should_dispatch, FilterDecision, RejectReason, ToggleSource};
use crate::model::alert::ClassifiedAlert;
use crate::model::signal::{IndicatorStatus, Signal, SignalKind};
use crate::model::timeframe::Timeframe;
use crate::parser::{self, ParseError, ParsedEvent, PriceLevelEvent};
use crate::render::{render_alert, RenderOptions};
use crate::state_store::TimeframeStateStore;

/// Terminal result of processing one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Dropped(ParseError),
    /// Price-level text relayed verbatim.
    Forwarded { destination: String },
    Denied { tag: String },
    Filtered { tag: String, reason: RejectReason },
    Unroutable { tag: Option<String> },
    Queued { tag: String, destination: String },
    /// State could not be read or written; nothing was dispatched.
    StateError,
}

impl ProcessOutcome {
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Denied { tag }
            | Self::Filtered { tag, .. }
            | Self::Queued { tag, .. } => Some(tag),
            Self::Unroutable { tag } => tag.as_deref(),
            Self::Dropped(_) | Self::Forwarded { .. } | Self::StateError => None,
        }
    }
}

/// Parser → state store → classifier → filter → router → dispatcher.
///
/// `process` is synchronous up to the enqueue: the state transition is
/// durable before any delivery is queued, and delivery never feeds back
/// into state.
pub struct AlertEngine {
    states: Arc<TimeframeStateStore>,
    toggles: Arc<dyn ToggleSource>,
    router: DispatchRouter,
    dispatcher: Arc<Dispatcher>,
    filter: FilterConfig,
    render: RenderOptions,
    alt_destination: Option<Destination>,
}

impl AlertEngine {
    pub fn new(
        states: Arc<TimeframeStateStore>,
        toggles: Arc<dyn ToggleSource>,
        router: DispatchRouter,
        dispatcher: Arc<Dispatcher>,
        filter: FilterConfig,
        render: RenderOptions,
    ) -> Self {
        Self {
            states,
            toggles,
            router,
            dispatcher,
            filter,
            render,
            alt_destination: None,
        }
    }

    pub fn with_alt_destination(mut self, destination: Option<Destination>) -> Self {
        self.alt_destination = destination;
        self
    }

    pub fn states(&self) -> &Arc<TimeframeStateStore> {
        &self.states
    }

    /// Process one raw event. `observed_at` stamps the state transition;
    /// `now` drives the market-hours gates and the rendered time.
    pub fn process(
        &self,
        raw: &str,
        observed_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ProcessOutcome {
        match parser::parse(raw, observed_at) {
            Ok(ParsedEvent::Signal(signal)) => self.process_signal(signal, now),
            Ok(ParsedEvent::PriceLevel(event)) => self.forward_price_level(event),
            Err(err) => {
                tracing::warn!(code = err.code(), error = %err, "Event dropped");
                ProcessOutcome::Dropped(err)
            }
        }
    }

    fn process_signal(&self, signal: Signal, now: DateTime<Utc>) -> ProcessOutcome {
        let (prior_macd, current_ema, higher_ema) = match self.apply_and_read(&signal) {
            Ok(statuses) => statuses,
            Err(e) => {
                tracing::error!(
                    symbol = %signal.symbol,
                    timeframe = %signal.timeframe,
                    kind = signal.kind.as_str(),
                    error = %e,
                    "State update failed, event dropped"
                );
                return ProcessOutcome::StateError;
            }
        };

        let classification = classifier::classify(&signal, prior_macd, current_ema, higher_ema);
        let alert = classification.alert;
        if !classification.allow {
            tracing::info!(
                symbol = %alert.symbol,
                timeframe = %alert.timeframe,
                tag = %alert.tag,
                prior_macd = %prior_macd,
                ema = %current_ema,
                "Classification denied"
            );
            return ProcessOutcome::Denied { tag: alert.tag };
        }

        self.maybe_send_alt(&alert, now);

        if let FilterDecision::Reject(reason) =
            should_dispatch(&alert, now, &self.filter, self.toggles.as_ref())
        {
            tracing::info!(
                symbol = %alert.symbol,
                tag = %alert.tag,
                reason = reason.as_str(),
                "Alert filtered"
            );
            return ProcessOutcome::Filtered {
                tag: alert.tag,
                reason,
            };
        }

        let Some(destination) = self.router.route(&alert) else {
            tracing::warn!(symbol = %alert.symbol, tag = %alert.tag, "No destination, alert dropped");
            return ProcessOutcome::Unroutable {
                tag: Some(alert.tag),
            };
        };

        let content = render_alert(&alert, now, &self.render);
        let message = OutboundMessage {
            tag: Some(alert.tag.clone()),
            content,
        };
        let key = destination.key.clone();
        self.dispatcher.enqueue(destination, message);
        ProcessOutcome::Queued {
            tag: alert.tag,
            destination: key,
        }
    }

    /// Apply the crossover (if any) and read the statuses the classifier
    /// needs: prior MACD, current-timeframe EMA, next-higher EMA.
    fn apply_and_read(
        &self,
        signal: &Signal,
    ) -> Result<(IndicatorStatus, IndicatorStatus, Option<IndicatorStatus>), AppError> {
        let mut prior_macd = IndicatorStatus::Unknown;
        if let (Some(crossover_type), Some(direction)) =
            (signal.kind.crossover_type(), signal.direction)
        {
            let outcome = self.states.apply_crossover(
                &signal.symbol,
                signal.timeframe,
                crossover_type,
                direction,
                signal.price,
                signal.observed_at,
            )?;
            if signal.kind == SignalKind::MacdCross {
                prior_macd = outcome.old_status;
            }
        }

        let current_ema = self.states.get_state(&signal.symbol, signal.timeframe)?.ema_status;
        let higher_ema = match TimeframeStateStore::next_higher_timeframe(signal.timeframe) {
            Some(higher) => Some(self.states.get_state(&signal.symbol, higher)?.ema_status),
            None => None,
        };
        Ok((prior_macd, current_ema, higher_ema))
    }

    fn maybe_send_alt(&self, alert: &ClassifiedAlert, now: DateTime<Utc>) {
        let Some(destination) = &self.alt_destination else {
            return;
        };
        let five_min_ema = if alert.timeframe == Timeframe::Min1 {
            match self.states.get_state(&alert.symbol, Timeframe::Min5) {
                Ok(state) => state.ema_status,
                Err(e) => {
                    tracing::warn!(symbol = %alert.symbol, error = %e, "Alt channel state read failed");
                    return;
                }
            }
        } else {
            IndicatorStatus::Unknown
        };

        match alt_channel::evaluate(alert, five_min_ema, now, &self.filter) {
            AltChannelDecision::Send { tag } => {
                let alt_alert = ClassifiedAlert {
                    tag: tag.clone(),
                    ..alert.clone()
                };
                let message = OutboundMessage {
                    tag: Some(tag),
                    content: render_alert(&alt_alert, now, &self.render),
                };
                self.dispatcher.enqueue(destination.clone(), message);
            }
            AltChannelDecision::Skip(reason) => {
                tracing::debug!(symbol = %alert.symbol, tag = %alert.tag, reason, "Alt channel skipped");
            }
        }
    }

    fn forward_price_level(&self, event: PriceLevelEvent) -> ProcessOutcome {
        let Some(destination) = self.router.route_symbol(&event.symbol) else {
            tracing::warn!(symbol = %event.symbol, "No destination for price alert, dropped");
            return ProcessOutcome::Unroutable { tag: None };
        };
        let key = destination.key.clone();
        self.dispatcher.enqueue(
            destination,
            OutboundMessage {
                tag: None,
                content: event.raw,
            },
        );
        ProcessOutcome::Forwarded { destination: key }
    }
}

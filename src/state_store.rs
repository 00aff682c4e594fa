use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::AppError;
use crate::model::signal::{CrossoverType, Direction};
use crate::model::state::{CrossoverOutcome, StateHistoryEntry, StateSummary, TimeframeState};
use crate::model::timeframe::Timeframe;
use crate::storage::StateRepository;

type StateKey = (String, Timeframe);
type StateSlot = Arc<Mutex<TimeframeState>>;

/// Per-(symbol, timeframe) directional memory.
///
/// Each key owns one exclusive slot, created on first reference and never
/// removed. Mutations of the same key serialize on that slot; different keys
/// never contend beyond the brief arena lookup. The repository is written
/// before the cached slot is updated, so the cache never runs ahead of disk.
pub struct TimeframeStateStore {
    repo: Arc<dyn StateRepository>,
    slots: Mutex<HashMap<StateKey, StateSlot>>,
}

impl TimeframeStateStore {
    pub fn new(repo: Arc<dyn StateRepository>) -> Self {
        Self {
            repo,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, symbol: &str, timeframe: Timeframe) -> Result<StateSlot, AppError> {
        let key = (symbol.to_ascii_uppercase(), timeframe);
        {
            let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(slot) = slots.get(&key) {
                return Ok(Arc::clone(slot));
            }
        }

        // Load outside the arena lock; a concurrent loader for the same key
        // may win the insert below, in which case its slot is used.
        let state = match self.repo.load_state(&key.0, timeframe)? {
            Some(state) => state,
            None => {
                let state = TimeframeState::new(&key.0, timeframe);
                self.repo.insert_default(&state)?;
                state
            }
        };

        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = slots
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(state)));
        Ok(Arc::clone(slot))
    }

    /// Current state, creating the default UNKNOWN row on first reference.
    pub fn get_state(&self, symbol: &str, timeframe: Timeframe) -> Result<TimeframeState, AppError> {
        let slot = self.slot(symbol, timeframe)?;
        let state = slot.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.clone())
    }

    /// The only mutation entry point. A repeat of the stored direction is a
    /// no-op: no write, no history row, no timestamp change.
    pub fn apply_crossover(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        crossover_type: CrossoverType,
        new_direction: Direction,
        price: Option<Decimal>,
        observed_at: DateTime<Utc>,
    ) -> Result<CrossoverOutcome, AppError> {
        let slot = self.slot(symbol, timeframe)?;
        let mut state = slot.lock().unwrap_or_else(|e| e.into_inner());

        let old_status = state.status(crossover_type);
        if old_status.is(new_direction) {
            tracing::debug!(
                symbol = %state.symbol,
                timeframe = %timeframe,
                crossover = %crossover_type,
                status = %old_status,
                "Repeat signal, state unchanged"
            );
            return Ok(CrossoverOutcome {
                changed: false,
                old_status,
                new_direction,
            });
        }

        let mut next = state.clone();
        next.set(crossover_type, new_direction.into(), price, observed_at);
        let entry = StateHistoryEntry {
            symbol: next.symbol.clone(),
            timeframe,
            crossover_type,
            old_status,
            new_status: new_direction.into(),
            price,
            timestamp: observed_at,
        };

        self.persist_transition(&next, &entry)?;
        *state = next;

        tracing::info!(
            symbol = %entry.symbol,
            timeframe = %timeframe,
            crossover = %crossover_type,
            old = %old_status,
            new = %new_direction,
            price = ?price,
            "State updated"
        );

        Ok(CrossoverOutcome {
            changed: true,
            old_status,
            new_direction,
        })
    }

    fn persist_transition(
        &self,
        state: &TimeframeState,
        entry: &StateHistoryEntry,
    ) -> Result<(), AppError> {
        match self.repo.record_transition(state, entry) {
            Ok(()) => Ok(()),
            Err(e) if e.is_conflict() => {
                tracing::warn!(
                    symbol = %entry.symbol,
                    timeframe = %entry.timeframe,
                    error = %e,
                    "State write conflict, retrying once"
                );
                self.repo.record_transition(state, entry)
            }
            Err(e) => Err(e),
        }
    }

    /// Rebuild state from the history log: for every (symbol, timeframe,
    /// crossover type) the last appended entry wins, matching the order in
    /// which `apply_crossover` moved the live state. Event timestamps may be
    /// client-supplied and are not used for ordering. Returns the number of
    /// (symbol, timeframe) rows rehydrated.
    pub fn bootstrap(&self) -> Result<usize, AppError> {
        // `load_history` yields entries in append order.
        let history = self.repo.load_history()?;

        let mut latest: HashMap<(String, Timeframe, CrossoverType), StateHistoryEntry> =
            HashMap::new();
        for entry in history {
            let key = (entry.symbol.clone(), entry.timeframe, entry.crossover_type);
            latest.insert(key, entry);
        }

        let mut rebuilt: HashMap<StateKey, TimeframeState> = HashMap::new();
        for ((symbol, timeframe, crossover_type), entry) in latest {
            let state = rebuilt
                .entry((symbol.clone(), timeframe))
                .or_insert_with(|| TimeframeState::new(&symbol, timeframe));
            state.set(crossover_type, entry.new_status, entry.price, entry.timestamp);
        }

        let count = rebuilt.len();
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        for (key, state) in rebuilt {
            self.repo.upsert_state(&state)?;
            match slots.get(&key) {
                Some(slot) => *slot.lock().unwrap_or_else(|e| e.into_inner()) = state,
                None => {
                    slots.insert(key, Arc::new(Mutex::new(state)));
                }
            }
        }

        tracing::info!(rows = count, "State rehydrated from history");
        Ok(count)
    }

    pub fn next_higher_timeframe(timeframe: Timeframe) -> Option<Timeframe> {
        timeframe.next_higher()
    }

    /// Diagnostic dump of every stored row.
    pub fn all_states(&self) -> Result<Vec<TimeframeState>, AppError> {
        self.repo.load_all_states()
    }

    pub fn summary(&self, symbol: &str) -> Result<StateSummary, AppError> {
        let symbol = symbol.to_ascii_uppercase();
        let states: Vec<TimeframeState> = self
            .all_states()?
            .into_iter()
            .filter(|s| s.symbol == symbol)
            .collect();
        Ok(StateSummary::from_states(&symbol, &states))
    }
}

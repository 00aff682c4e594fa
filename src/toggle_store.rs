use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::classifier::ema_tag;
use crate::error::AppError;
use crate::filter::ToggleSource;
use crate::model::signal::Direction;
use crate::model::timeframe::Timeframe;
use crate::storage::{fmt_ts, write_transaction, SqliteStore};

/// Per-(symbol, tag) enable switches. Symbols are uppercased; tags are kept
/// exactly as given so `CALL5` and `Call5` stay independent.
#[derive(Clone)]
pub struct AlertToggleStore {
    store: Arc<SqliteStore>,
}

/// `C`, `CALL`, `P`, `PUT` for every timeframe.
pub fn default_tags() -> Vec<String> {
    let mut tags = Vec::new();
    for (direction, aligned) in [
        (Direction::Bullish, false),
        (Direction::Bullish, true),
        (Direction::Bearish, false),
        (Direction::Bearish, true),
    ] {
        for tf in Timeframe::ALL {
            tags.push(ema_tag(direction, aligned, tf));
        }
    }
    tags
}

impl AlertToggleStore {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, symbol: &str) -> Result<BTreeMap<String, bool>, AppError> {
        let symbol = symbol.trim().to_ascii_uppercase();
        self.store.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT tag, enabled FROM alert_toggles WHERE symbol = ?1")?;
            let rows = stmt.query_map([&symbol], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?))
            })?;
            let mut out = BTreeMap::new();
            for row in rows {
                let (tag, enabled) = row?;
                out.insert(tag, enabled);
            }
            Ok(out)
        })
    }

    /// Apply a bulk update in one transaction and return the resulting map.
    pub fn set_many(
        &self,
        symbol: &str,
        updates: &BTreeMap<String, bool>,
    ) -> Result<BTreeMap<String, bool>, AppError> {
        let symbol = symbol.trim().to_ascii_uppercase();
        let now = fmt_ts(Utc::now());
        self.store.with_conn(|conn| {
            let tx = write_transaction(conn)?;
            for (tag, enabled) in updates {
                let tag = tag.trim();
                if tag.is_empty() {
                    continue;
                }
                tx.execute(
                    r#"
                    INSERT INTO alert_toggles (symbol, tag, enabled, updated_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(symbol, tag) DO UPDATE SET
                        enabled = excluded.enabled,
                        updated_at = excluded.updated_at
                    "#,
                    params![symbol, tag, enabled, now],
                )?;
            }
            tx.commit()?;
            Ok(())
        })?;
        tracing::info!(symbol = %symbol, updates = updates.len(), "Alert toggles updated");
        self.get(&symbol)
    }

    /// Seed the default tag set as enabled if the symbol has no rows yet.
    /// Returns `true` when rows were written.
    pub fn ensure_defaults(&self, symbol: &str) -> Result<bool, AppError> {
        if !self.get(symbol)?.is_empty() {
            return Ok(false);
        }
        let defaults: BTreeMap<String, bool> =
            default_tags().into_iter().map(|tag| (tag, true)).collect();
        self.set_many(symbol, &defaults)?;
        Ok(true)
    }

    pub fn lookup(&self, symbol: &str, tag: &str) -> Result<Option<bool>, AppError> {
        let symbol = symbol.trim().to_ascii_uppercase();
        self.store.with_conn(|conn| {
            let enabled = conn
                .query_row(
                    "SELECT enabled FROM alert_toggles WHERE symbol = ?1 AND tag = ?2",
                    params![symbol, tag],
                    |row| row.get::<_, bool>(0),
                )
                .optional()?;
            Ok(enabled)
        })
    }
}

impl ToggleSource for AlertToggleStore {
    fn is_enabled(&self, symbol: &str, tag: &str) -> bool {
        match self.lookup(symbol, tag) {
            Ok(enabled) => enabled.unwrap_or(true),
            Err(e) => {
                tracing::warn!(symbol, tag, error = %e, "Toggle lookup failed, treating as enabled");
                true
            }
        }
    }
}

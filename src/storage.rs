use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use rust_decimal::Decimal;

use crate::error::AppError;
use crate::model::signal::{CrossoverType, IndicatorStatus};
use crate::model::state::{StateHistoryEntry, TimeframeState};
use crate::model::timeframe::Timeframe;

/// Durable backing for timeframe state. Every method is a single atomic
/// unit; `record_transition` in particular must write the state row and the
/// history row together or not at all.
pub trait StateRepository: Send + Sync {
    fn load_state(&self, symbol: &str, timeframe: Timeframe)
        -> Result<Option<TimeframeState>, AppError>;

    /// Insert a default row if none exists. Never overwrites.
    fn insert_default(&self, state: &TimeframeState) -> Result<(), AppError>;

    fn record_transition(
        &self,
        state: &TimeframeState,
        entry: &StateHistoryEntry,
    ) -> Result<(), AppError>;

    /// Overwrite a state row without touching history (restart recovery).
    fn upsert_state(&self, state: &TimeframeState) -> Result<(), AppError>;

    /// All rows, ordered by symbol then timeframe.
    fn load_all_states(&self) -> Result<Vec<TimeframeState>, AppError>;

    /// History in append order.
    fn load_history(&self) -> Result<Vec<StateHistoryEntry>, AppError>;
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS timeframe_states (
    symbol TEXT NOT NULL,
    timeframe TEXT NOT NULL,
    tf_rank INTEGER NOT NULL,
    ema_status TEXT NOT NULL DEFAULT 'UNKNOWN',
    macd_status TEXT NOT NULL DEFAULT 'UNKNOWN',
    last_ema_update TEXT,
    last_macd_update TEXT,
    last_ema_price TEXT,
    last_macd_price TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY(symbol, timeframe)
);

CREATE TABLE IF NOT EXISTS state_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    timeframe TEXT NOT NULL,
    crossover_type TEXT NOT NULL,
    old_status TEXT NOT NULL,
    new_status TEXT NOT NULL,
    price TEXT,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_state_history_key
    ON state_history(symbol, timeframe, crossover_type, id);

CREATE TABLE IF NOT EXISTS alert_toggles (
    symbol TEXT NOT NULL,
    tag TEXT NOT NULL,
    enabled INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY(symbol, tag)
);
"#;

/// Connections opened for a file-backed store.
pub const FILE_POOL_SIZE: usize = 4;

const BUSY_TIMEOUT: Duration = Duration::from_millis(500);

/// SQLite store shared by the state and toggle layers.
///
/// A file-backed store holds a small pool of WAL connections. The only
/// cross-key serialization is SQLite's single writer lock, held for one
/// short transaction; contention past the busy timeout surfaces as
/// SQLITE_BUSY. An in-memory database is private to its connection, so that
/// store has exactly one.
pub struct SqliteStore {
    conns: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut conns = Vec::with_capacity(FILE_POOL_SIZE);
        for i in 0..FILE_POOL_SIZE {
            let conn = Connection::open(path)?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            if i == 0 {
                let mode: String =
                    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
                tracing::debug!(journal_mode = %mode, "SQLite journal mode set");
                conn.execute_batch(SCHEMA)?;
            }
            conns.push(Mutex::new(conn));
        }
        tracing::debug!(
            path = %path.display(),
            connections = conns.len(),
            "SQLite store opened"
        );
        Ok(Self {
            conns,
            next: AtomicUsize::new(0),
        })
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conns: vec![Mutex::new(conn)],
            next: AtomicUsize::new(0),
        })
    }

    pub fn connection_count(&self) -> usize {
        self.conns.len()
    }

    /// Run `f` on an idle connection if one is free, otherwise wait on the
    /// next one in rotation.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        for slot in &self.conns {
            if let Ok(mut conn) = slot.try_lock() {
                return f(&mut conn);
            }
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.conns.len();
        let mut conn = self.conns[idx].lock().unwrap_or_else(|e| e.into_inner());
        f(&mut conn)
    }
}

/// Writers take the database write lock up front so a busy database waits
/// in the busy handler instead of failing a lock upgrade mid-transaction.
pub(crate) fn write_transaction(
    conn: &mut Connection,
) -> Result<rusqlite::Transaction<'_>, AppError> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, AppError> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| AppError::CorruptRow(format!("timestamp '{}': {}", s, e)))
    })
    .transpose()
}

fn parse_price(raw: Option<String>) -> Result<Option<Decimal>, AppError> {
    raw.map(|s| {
        Decimal::from_str(&s).map_err(|e| AppError::CorruptRow(format!("price '{}': {}", s, e)))
    })
    .transpose()
}

fn parse_enum<T: FromStr<Err = String>>(raw: &str) -> Result<T, AppError> {
    raw.parse().map_err(AppError::CorruptRow)
}

fn tf_rank(timeframe: Timeframe) -> i64 {
    Timeframe::ALL
        .iter()
        .position(|tf| *tf == timeframe)
        .unwrap_or_default() as i64
}

struct RawState {
    symbol: String,
    timeframe: String,
    ema_status: String,
    macd_status: String,
    last_ema_update: Option<String>,
    last_macd_update: Option<String>,
    last_ema_price: Option<String>,
    last_macd_price: Option<String>,
}

const STATE_COLUMNS: &str = "symbol, timeframe, ema_status, macd_status, last_ema_update, \
     last_macd_update, last_ema_price, last_macd_price";

fn read_raw_state(row: &Row<'_>) -> rusqlite::Result<RawState> {
    Ok(RawState {
        symbol: row.get(0)?,
        timeframe: row.get(1)?,
        ema_status: row.get(2)?,
        macd_status: row.get(3)?,
        last_ema_update: row.get(4)?,
        last_macd_update: row.get(5)?,
        last_ema_price: row.get(6)?,
        last_macd_price: row.get(7)?,
    })
}

impl TryFrom<RawState> for TimeframeState {
    type Error = AppError;

    fn try_from(raw: RawState) -> Result<Self, Self::Error> {
        Ok(TimeframeState {
            symbol: raw.symbol,
            timeframe: parse_enum(&raw.timeframe)?,
            ema_status: parse_enum(&raw.ema_status)?,
            macd_status: parse_enum(&raw.macd_status)?,
            last_ema_update: parse_ts(raw.last_ema_update)?,
            last_macd_update: parse_ts(raw.last_macd_update)?,
            last_ema_price: parse_price(raw.last_ema_price)?,
            last_macd_price: parse_price(raw.last_macd_price)?,
        })
    }
}

fn upsert_state_row(conn: &Connection, state: &TimeframeState) -> Result<(), AppError> {
    conn.execute(
        r#"
        INSERT INTO timeframe_states (
            symbol, timeframe, tf_rank, ema_status, macd_status,
            last_ema_update, last_macd_update, last_ema_price, last_macd_price, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(symbol, timeframe) DO UPDATE SET
            ema_status = excluded.ema_status,
            macd_status = excluded.macd_status,
            last_ema_update = excluded.last_ema_update,
            last_macd_update = excluded.last_macd_update,
            last_ema_price = excluded.last_ema_price,
            last_macd_price = excluded.last_macd_price,
            updated_at = excluded.updated_at
        "#,
        params![
            state.symbol,
            state.timeframe.as_str(),
            tf_rank(state.timeframe),
            state.ema_status.as_str(),
            state.macd_status.as_str(),
            state.last_ema_update.map(fmt_ts),
            state.last_macd_update.map(fmt_ts),
            state.last_ema_price.map(|p| p.to_string()),
            state.last_macd_price.map(|p| p.to_string()),
            fmt_ts(Utc::now()),
        ],
    )?;
    Ok(())
}

impl StateRepository for SqliteStore {
    fn load_state(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<TimeframeState>, AppError> {
        self.with_conn(|conn| {
            let raw = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM timeframe_states WHERE symbol = ?1 AND timeframe = ?2",
                        STATE_COLUMNS
                    ),
                    params![symbol, timeframe.as_str()],
                    read_raw_state,
                )
                .optional()?;
            raw.map(TimeframeState::try_from).transpose()
        })
    }

    fn insert_default(&self, state: &TimeframeState) -> Result<(), AppError> {
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT OR IGNORE INTO timeframe_states (symbol, timeframe, tf_rank, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    state.symbol,
                    state.timeframe.as_str(),
                    tf_rank(state.timeframe),
                    fmt_ts(Utc::now()),
                ],
            )?;
            Ok(())
        })
    }

    fn record_transition(
        &self,
        state: &TimeframeState,
        entry: &StateHistoryEntry,
    ) -> Result<(), AppError> {
        self.with_conn(|conn| {
            let tx = write_transaction(conn)?;
            upsert_state_row(&tx, state)?;
            tx.execute(
                r#"
                INSERT INTO state_history (
                    symbol, timeframe, crossover_type, old_status, new_status, price, timestamp
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    entry.symbol,
                    entry.timeframe.as_str(),
                    entry.crossover_type.as_str(),
                    entry.old_status.as_str(),
                    entry.new_status.as_str(),
                    entry.price.map(|p| p.to_string()),
                    fmt_ts(entry.timestamp),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    fn upsert_state(&self, state: &TimeframeState) -> Result<(), AppError> {
        self.with_conn(|conn| upsert_state_row(conn, state))
    }

    fn load_all_states(&self) -> Result<Vec<TimeframeState>, AppError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM timeframe_states ORDER BY symbol ASC, tf_rank ASC",
                STATE_COLUMNS
            ))?;
            let rows = stmt.query_map([], read_raw_state)?;
            let mut states = Vec::new();
            for row in rows {
                states.push(TimeframeState::try_from(row?)?);
            }
            Ok(states)
        })
    }

    fn load_history(&self) -> Result<Vec<StateHistoryEntry>, AppError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT symbol, timeframe, crossover_type, old_status, new_status, price, timestamp
                FROM state_history
                ORDER BY id ASC
                "#,
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?;

            let mut entries = Vec::new();
            for row in rows {
                let (symbol, timeframe, crossover_type, old_status, new_status, price, ts) = row?;
                let timestamp = parse_ts(Some(ts))?
                    .ok_or_else(|| AppError::CorruptRow("missing history timestamp".to_string()))?;
                entries.push(StateHistoryEntry {
                    symbol,
                    timeframe: parse_enum(&timeframe)?,
                    crossover_type: parse_enum::<CrossoverType>(&crossover_type)?,
                    old_status: parse_enum::<IndicatorStatus>(&old_status)?,
                    new_status: parse_enum::<IndicatorStatus>(&new_status)?,
                    price: parse_price(price)?,
                    timestamp,
                });
            }
            Ok(entries)
        })
    }
}

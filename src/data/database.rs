//! State Store - SQLite persistence for orders, fills, positions, the
//! equity curve, agent weights and log lines
//!
//! Decimals are stored as TEXT so amounts read back exactly. Timestamps are
//! RFC 3339. Every write is visible to the next read on the same store.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::core::types::{AgentWeight, EquityPoint, Fill, LogEntry, Order, Position};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS orders (
        order_id TEXT PRIMARY KEY,
        symbol TEXT NOT NULL,
        side TEXT NOT NULL,
        qty TEXT NOT NULL,
        order_type TEXT NOT NULL,
        limit_price TEXT,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS fills (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        order_id TEXT NOT NULL,
        symbol TEXT NOT NULL,
        side TEXT NOT NULL,
        qty TEXT NOT NULL,
        price TEXT NOT NULL,
        filled_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS positions (
        symbol TEXT PRIMARY KEY,
        qty TEXT NOT NULL,
        avg_price TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS equity_curve (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        equity TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS agent_weights (
        agent TEXT PRIMARY KEY,
        weight REAL NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        level TEXT NOT NULL,
        message TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_fills_symbol ON fills(symbol);
";

/// What a fill did to the position for its symbol
#[derive(Debug, Clone, PartialEq)]
pub enum PositionChange {
    Upsert(Position),
    /// Quantity netted to zero
    Remove(String),
}

/// Everything one executed order writes, committed together
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub order: Order,
    pub fill: Fill,
    pub position: PositionChange,
    pub equity: EquityPoint,
}

pub struct StateStore {
    conn: Mutex<Connection>,
}

impl StateStore {
    /// Open (or create) the database at `path`. `:memory:` is accepted.
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        info!("[STORE] Opened state store: {}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("state store lock poisoned"))
    }

    // =========================================================================
    // ORDERS AND FILLS
    // =========================================================================

    pub fn add_order(&self, order: &Order) -> Result<()> {
        insert_order(&*self.lock()?, order)
    }

    pub fn get_orders(&self) -> Result<Vec<Order>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT order_id, symbol, side, qty, order_type, limit_price, created_at
             FROM orders ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            let limit_price: Option<String> = row.get(5)?;
            Ok(Order {
                order_id: row.get(0)?,
                symbol: row.get(1)?,
                side: parse_col(row, 2)?,
                qty: parse_col(row, 3)?,
                order_type: parse_col(row, 4)?,
                limit_price: limit_price
                    .map(|p| p.parse::<Decimal>().map_err(|e| conversion_error(5, e)))
                    .transpose()?,
                created_at: parse_col(row, 6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn add_fill(&self, fill: &Fill) -> Result<()> {
        insert_fill(&*self.lock()?, fill)
    }

    /// All fills in insertion order
    pub fn get_fills(&self) -> Result<Vec<Fill>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT order_id, symbol, side, qty, price, filled_at FROM fills ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Fill {
                order_id: row.get(0)?,
                symbol: row.get(1)?,
                side: parse_col(row, 2)?,
                qty: parse_col(row, 3)?,
                price: parse_col(row, 4)?,
                filled_at: parse_col(row, 5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // =========================================================================
    // POSITIONS
    // =========================================================================

    pub fn upsert_position(&self, position: &Position) -> Result<()> {
        upsert_position(&*self.lock()?, position)
    }

    pub fn remove_position(&self, symbol: &str) -> Result<()> {
        delete_position(&*self.lock()?, symbol)
    }

    pub fn get_positions(&self) -> Result<Vec<Position>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT symbol, qty, avg_price FROM positions ORDER BY symbol")?;
        let rows = stmt.query_map([], |row| {
            Ok(Position {
                symbol: row.get(0)?,
                qty: parse_col(row, 1)?,
                avg_price: parse_col(row, 2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_position(&self, symbol: &str) -> Result<Option<Position>> {
        let conn = self.lock()?;
        let position = conn
            .query_row(
                "SELECT symbol, qty, avg_price FROM positions WHERE symbol = ?1",
                params![symbol],
                |row| {
                    Ok(Position {
                        symbol: row.get(0)?,
                        qty: parse_col(row, 1)?,
                        avg_price: parse_col(row, 2)?,
                    })
                },
            )
            .optional()?;
        Ok(position)
    }

    // =========================================================================
    // EQUITY CURVE
    // =========================================================================

    pub fn add_equity_point(&self, point: &EquityPoint) -> Result<()> {
        insert_equity_point(&*self.lock()?, point)
    }

    /// Equity points in the order they were appended
    pub fn get_equity_curve(&self) -> Result<Vec<EquityPoint>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT timestamp, equity FROM equity_curve ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(EquityPoint {
                timestamp: parse_col(row, 0)?,
                equity: parse_col(row, 1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Order, fill, position change and equity point in one transaction
    pub fn record_execution(&self, record: &ExecutionRecord) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        insert_order(&tx, &record.order)?;
        insert_fill(&tx, &record.fill)?;
        match &record.position {
            PositionChange::Upsert(position) => upsert_position(&tx, position)?,
            PositionChange::Remove(symbol) => delete_position(&tx, symbol)?,
        }
        insert_equity_point(&tx, &record.equity)?;
        tx.commit()?;
        Ok(())
    }

    // =========================================================================
    // AGENT WEIGHTS
    // =========================================================================

    /// Insert or overwrite the weight for one agent
    pub fn set_agent_weight(&self, weight: &AgentWeight) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO agent_weights (agent, weight, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(agent) DO UPDATE SET
                weight = excluded.weight,
                updated_at = excluded.updated_at",
            params![weight.agent.as_str(), weight.weight, weight.updated_at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_agent_weights(&self) -> Result<Vec<AgentWeight>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT agent, weight, updated_at FROM agent_weights ORDER BY agent")?;
        let rows = stmt.query_map([], |row| {
            Ok(AgentWeight {
                agent: parse_col(row, 0)?,
                weight: row.get(1)?,
                updated_at: parse_col(row, 2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // =========================================================================
    // LOGS
    // =========================================================================

    pub fn add_log(&self, level: &str, message: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO logs (level, message, created_at) VALUES (?1, ?2, ?3)",
            params![level, message, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_logs(&self) -> Result<Vec<LogEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT level, message, created_at FROM logs ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(LogEntry {
                level: row.get(0)?,
                message: row.get(1)?,
                created_at: parse_col::<DateTime<Utc>>(row, 2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn insert_order(conn: &Connection, order: &Order) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO orders
         (order_id, symbol, side, qty, order_type, limit_price, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            order.order_id,
            order.symbol,
            order.side.as_str(),
            order.qty.to_string(),
            order.order_type.as_str(),
            order.limit_price.map(|p| p.to_string()),
            order.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn insert_fill(conn: &Connection, fill: &Fill) -> Result<()> {
    conn.execute(
        "INSERT INTO fills (order_id, symbol, side, qty, price, filled_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            fill.order_id,
            fill.symbol,
            fill.side.as_str(),
            fill.qty.to_string(),
            fill.price.to_string(),
            fill.filled_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn upsert_position(conn: &Connection, position: &Position) -> Result<()> {
    conn.execute(
        "INSERT INTO positions (symbol, qty, avg_price)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(symbol) DO UPDATE SET
            qty = excluded.qty,
            avg_price = excluded.avg_price",
        params![position.symbol, position.qty.to_string(), position.avg_price.to_string()],
    )?;
    Ok(())
}

fn delete_position(conn: &Connection, symbol: &str) -> Result<()> {
    conn.execute("DELETE FROM positions WHERE symbol = ?1", params![symbol])?;
    Ok(())
}

fn insert_equity_point(conn: &Connection, point: &EquityPoint) -> Result<()> {
    conn.execute(
        "INSERT INTO equity_curve (timestamp, equity) VALUES (?1, ?2)",
        params![point.timestamp.to_rfc3339(), point.equity.to_string()],
    )?;
    Ok(())
}

/// Read a TEXT column and parse it
fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

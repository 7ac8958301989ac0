use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse_core::common::Direction;
use pulse_core::signal::entity::{CloseReason, Signal, SignalStatus};
use pulse_core::signal::port::SignalStore;
use pulse_core::store::error::StoreError;
use sqlx::{
    FromRow, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::path::Path;
use tracing::{debug, info};

const SIGNAL_COLUMNS: &str = "id, symbol, strategy_id, strategy_name, strategy_category, direction, entry_price, \
     stop_loss, take_profit, timeframe, status, reason, created_at, activated_at, closed_at, \
     close_reason, pnl_percent";

#[derive(FromRow)]
struct SignalRow {
    id: String,
    symbol: String,
    strategy_id: String,
    strategy_name: String,
    strategy_category: Option<String>,
    direction: String,
    entry_price: f64,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
    timeframe: String,
    status: String,
    reason: String,
    created_at: DateTime<Utc>,
    activated_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    close_reason: Option<String>,
    pnl_percent: Option<f64>,
}

impl TryFrom<SignalRow> for Signal {
    type Error = StoreError;

    fn try_from(row: SignalRow) -> Result<Self, Self::Error> {
        Ok(Signal {
            direction: row.direction.parse().map_err(StoreError::Corrupted)?,
            timeframe: row.timeframe.parse().map_err(StoreError::Corrupted)?,
            status: row.status.parse().map_err(StoreError::Corrupted)?,
            close_reason: row
                .close_reason
                .map(|r| r.parse::<CloseReason>())
                .transpose()
                .map_err(StoreError::Corrupted)?,
            id: row.id,
            symbol: row.symbol,
            strategy_id: row.strategy_id,
            strategy_name: row.strategy_name,
            strategy_category: row.strategy_category,
            entry_price: row.entry_price,
            stop_loss: row.stop_loss,
            take_profit: row.take_profit,
            reason: row.reason,
            created_at: row.created_at,
            activated_at: row.activated_at,
            closed_at: row.closed_at,
            pnl_percent: row.pnl_percent,
        })
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// # Summary
/// `SignalStore` 的 SQLite 实现，全部信号保存在单个 `signals.db` 中。
///
/// # Invariants
/// * 信号只追加、只更新状态，从不删除。
/// * 对已 Closed 的记录再次更新不会生效 (`WHERE status != 'Closed'`)。
pub struct SqliteSignalStore {
    pool: SqlitePool,
}

impl SqliteSignalStore {
    /// # Summary
    /// 在数据根目录下打开 (或创建) `signals.db`。
    pub async fn new() -> Result<Self, StoreError> {
        let root = crate::config::get_root_dir();
        if !root.exists() {
            std::fs::create_dir_all(&root).map_err(|e| StoreError::InitError(e.to_string()))?;
        }
        Self::open(&root.join("signals.db")).await
    }

    /// # Summary
    /// 打开指定路径的数据库文件并建表。
    ///
    /// # Arguments
    /// * `db_path` - 数据库文件路径，不存在时自动创建。
    ///
    /// # Returns
    /// * `Result<Self, StoreError>` - 连接或建表失败返回 `InitError`。
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| StoreError::InitError(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                strategy_id TEXT NOT NULL,
                strategy_name TEXT NOT NULL,
                strategy_category TEXT,
                direction TEXT NOT NULL,
                entry_price REAL NOT NULL,
                stop_loss REAL,
                take_profit REAL,
                timeframe TEXT NOT NULL,
                status TEXT NOT NULL,
                reason TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                activated_at DATETIME,
                closed_at DATETIME,
                close_reason TEXT,
                pnl_percent REAL
            );
            CREATE INDEX IF NOT EXISTS idx_signals_status ON signals (status);
            CREATE INDEX IF NOT EXISTS idx_signals_dedup
                ON signals (strategy_id, symbol, direction, created_at);
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::InitError(e.to_string()))?;

        info!("Store: signal database ready at {}", db_path.display());
        Ok(Self { pool })
    }
}

#[async_trait]
impl SignalStore for SqliteSignalStore {
    async fn insert(&self, signal: &Signal) -> Result<String, StoreError> {
        sqlx::query(&format!(
            "INSERT INTO signals ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            SIGNAL_COLUMNS
        ))
        .bind(&signal.id)
        .bind(&signal.symbol)
        .bind(&signal.strategy_id)
        .bind(&signal.strategy_name)
        .bind(&signal.strategy_category)
        .bind(signal.direction.to_string())
        .bind(signal.entry_price)
        .bind(signal.stop_loss)
        .bind(signal.take_profit)
        .bind(signal.timeframe.to_string())
        .bind(signal.status.to_string())
        .bind(&signal.reason)
        .bind(signal.created_at)
        .bind(signal.activated_at)
        .bind(signal.closed_at)
        .bind(signal.close_reason.map(|r| r.to_string()))
        .bind(signal.pnl_percent)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!("Store: inserted signal {} ({} {})", signal.id, signal.symbol, signal.direction);
        Ok(signal.id.clone())
    }

    /// # Summary
    /// 条件更新信号状态。
    ///
    /// # Logic
    /// 1. `WHERE status != 'Closed'` 保证关闭只生效一次。
    /// 2. 迁移到 Closed 时写入平仓时间；平仓原因与收益仅在给出时覆盖。
    /// 3. 以受影响行数判断是否真正更新。
    async fn update_status(
        &self,
        id: &str,
        status: SignalStatus,
        close_reason: Option<CloseReason>,
        pnl_percent: Option<f64>,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        let closed_at = (status == SignalStatus::Closed).then_some(now);
        let activated_at = (status == SignalStatus::Active).then_some(now);

        let result = sqlx::query(
            r#"
            UPDATE signals SET
                status = ?,
                close_reason = COALESCE(?, close_reason),
                pnl_percent = COALESCE(?, pnl_percent),
                closed_at = COALESCE(?, closed_at),
                activated_at = COALESCE(activated_at, ?)
            WHERE id = ? AND status != 'Closed'
            "#,
        )
        .bind(status.to_string())
        .bind(close_reason.map(|r| r.to_string()))
        .bind(pnl_percent)
        .bind(closed_at)
        .bind(activated_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let applied = result.rows_affected() > 0;
        if !applied {
            debug!("Store: status update for {} ignored (missing or closed)", id);
        }
        Ok(applied)
    }

    async fn find_by_status(&self, status: SignalStatus) -> Result<Vec<Signal>, StoreError> {
        let rows = sqlx::query_as::<_, SignalRow>(&format!(
            "SELECT {} FROM signals WHERE status = ? ORDER BY created_at ASC",
            SIGNAL_COLUMNS
        ))
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(Signal::try_from).collect()
    }

    async fn exists_recent(
        &self,
        strategy_id: &str,
        symbol: &str,
        direction: Direction,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let (found,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM signals
                WHERE strategy_id = ? AND symbol = ? AND direction = ? AND created_at >= ?
            )
            "#,
        )
        .bind(strategy_id)
        .bind(symbol)
        .bind(direction.to_string())
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(found)
    }
}

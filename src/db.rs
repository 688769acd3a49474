use parking_lot::Mutex;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::economy::{CreditBook, Economy, LedgerError, LedgerRecord, MemoryLedger, PendingCredits};

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        // Run migrations
        Self::migrate(&pool).await?;

        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ledger (
                player TEXT PRIMARY KEY,
                balance REAL NOT NULL DEFAULT 0,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_credits (
                player TEXT PRIMARY KEY,
                amount REAL NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    pub async fn load_balances(&self) -> Result<Vec<LedgerRecord>, sqlx::Error> {
        let rows = sqlx::query("SELECT player, balance FROM ledger")
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let player: String = row.get("player");
            match Uuid::parse_str(&player) {
                Ok(id) => records.push(LedgerRecord {
                    player: id,
                    balance: row.get("balance"),
                }),
                Err(e) => tracing::warn!("Skipping ledger row with bad player id '{}': {}", player, e),
            }
        }
        Ok(records)
    }

    pub async fn save_balance(&self, record: &LedgerRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO ledger (player, balance, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(player) DO UPDATE SET
                balance = excluded.balance,
                updated_at = CURRENT_TIMESTAMP"#,
        )
        .bind(record.player.to_string())
        .bind(record.balance)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Save every record in one transaction
    pub async fn save_all(&self, records: &[LedgerRecord]) -> Result<usize, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"INSERT INTO ledger (player, balance, updated_at)
                VALUES (?, ?, CURRENT_TIMESTAMP)
                ON CONFLICT(player) DO UPDATE SET
                    balance = excluded.balance,
                    updated_at = CURRENT_TIMESTAMP"#,
            )
            .bind(record.player.to_string())
            .bind(record.balance)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    /// Shop revenue still owed to owners, by owner
    pub async fn load_pending(&self) -> Result<Vec<(Uuid, f64)>, sqlx::Error> {
        let rows = sqlx::query("SELECT player, amount FROM pending_credits")
            .fetch_all(&self.pool)
            .await?;

        let mut owed = Vec::with_capacity(rows.len());
        for row in rows {
            let player: String = row.get("player");
            match Uuid::parse_str(&player) {
                Ok(id) => owed.push((id, row.get("amount"))),
                Err(e) => tracing::warn!("Skipping pending credit with bad player id '{}': {}", player, e),
            }
        }
        Ok(owed)
    }

    pub async fn save_pending(&self, player: Uuid, amount: f64) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO pending_credits (player, amount, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(player) DO UPDATE SET
                amount = excluded.amount,
                updated_at = CURRENT_TIMESTAMP"#,
        )
        .bind(player.to_string())
        .bind(amount)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_pending(&self, player: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM pending_credits WHERE player = ?")
            .bind(player.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// ============================================================================
// SQLite-backed Ledger
// ============================================================================

/// In-memory balances, written through to SQLite on `persist` and on the
/// periodic auto-save
pub struct SqliteLedger {
    memory: MemoryLedger,
    db: Arc<Database>,
}

impl SqliteLedger {
    pub async fn open(db: Arc<Database>, starting_balance: f64) -> Result<Self, sqlx::Error> {
        let memory = MemoryLedger::new(starting_balance);
        let records = db.load_balances().await?;
        for record in &records {
            memory.set_balance(record.player, record.balance);
        }
        tracing::info!("Loaded {} ledger records", records.len());
        Ok(Self { memory, db })
    }

    /// Write every balance touched so far
    pub async fn save_all(&self) -> Result<usize, sqlx::Error> {
        self.db.save_all(&self.memory.snapshot()).await
    }

    pub fn set_balance(&self, player: Uuid, balance: f64) {
        self.memory.set_balance(player, balance);
    }
}

impl Economy for SqliteLedger {
    fn record(&self, player: Uuid) -> LedgerRecord {
        self.memory.record(player)
    }

    fn debit(&self, player: Uuid, amount: f64) -> Result<(), LedgerError> {
        self.memory.debit(player, amount)
    }

    fn credit(&self, player: Uuid, amount: f64) -> Result<(), LedgerError> {
        self.memory.credit(player, amount)
    }

    /// Queue the write on the runtime; the caller does not wait for it
    fn persist(&self, player: Uuid) -> Result<(), LedgerError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| LedgerError::Persist(e.to_string()))?;
        let record = self.memory.record(player);
        let db = self.db.clone();
        handle.spawn(async move {
            if let Err(e) = db.save_balance(&record).await {
                tracing::error!("Failed to save ledger record for {}: {}", record.player, e);
            }
        });
        Ok(())
    }
}

// ============================================================================
// SQLite-backed Pending Credits
// ============================================================================

enum CreditWrite {
    Owed(Uuid, f64),
    Settled(Uuid),
    Flush(oneshot::Sender<()>),
}

/// Pending credits kept in memory and written through to SQLite in the order
/// they changed, so revenue owed to offline owners survives a restart
pub struct SqlitePendingCredits {
    memory: PendingCredits,
    writes: mpsc::UnboundedSender<CreditWrite>,
    /// Keeps memory updates and queued writes in the same order
    order: Mutex<()>,
}

impl SqlitePendingCredits {
    pub async fn open(db: Arc<Database>) -> Result<Self, sqlx::Error> {
        let memory = PendingCredits::new();
        let owed = db.load_pending().await?;
        for (player, amount) in &owed {
            memory.defer(*player, *amount);
        }
        tracing::info!("Loaded {} pending shop credit(s)", owed.len());

        let (writes, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_credit_writer(db, rx));
        Ok(Self {
            memory,
            writes,
            order: Mutex::new(()),
        })
    }

    /// Resolves once every change made so far is written
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.writes.send(CreditWrite::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    fn queue(&self, write: CreditWrite) {
        if self.writes.send(write).is_err() {
            tracing::error!("Pending credit writer stopped, change kept in memory only");
        }
    }
}

impl CreditBook for SqlitePendingCredits {
    fn defer(&self, owner: Uuid, amount: f64) {
        let _order = self.order.lock();
        self.memory.defer(owner, amount);
        self.queue(CreditWrite::Owed(owner, self.memory.owed(owner)));
    }

    fn owed(&self, owner: Uuid) -> f64 {
        self.memory.owed(owner)
    }

    fn take(&self, owner: Uuid) -> Option<f64> {
        let _order = self.order.lock();
        let amount = self.memory.take(owner)?;
        self.queue(CreditWrite::Settled(owner));
        Some(amount)
    }
}

async fn run_credit_writer(db: Arc<Database>, mut rx: mpsc::UnboundedReceiver<CreditWrite>) {
    while let Some(write) = rx.recv().await {
        match write {
            CreditWrite::Owed(player, amount) => {
                if let Err(e) = db.save_pending(player, amount).await {
                    tracing::error!("Failed to save pending credit for {}: {}", player, e);
                }
            }
            CreditWrite::Settled(player) => {
                if let Err(e) = db.delete_pending(player).await {
                    tracing::error!("Failed to clear pending credit for {}: {}", player, e);
                }
            }
            CreditWrite::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

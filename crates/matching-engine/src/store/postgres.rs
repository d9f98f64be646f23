//! PostgreSQL store backend
//!
//! The authoritative backend. Row-level `FOR UPDATE` locks are the
//! exclusion every durability unit and every cancel competes for; a trade
//! unit either commits completely or leaves the database untouched.

use std::str::FromStr;

use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use common::{OrderId, OrderStatus, OrderType, Side, Symbol, TradeId};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use crate::domain::{min_decimal, Order, Trade};
use crate::error::CancelError;
use crate::store::traits::{
    Accepted, OrderStore, StoreError, TradeUnit, TradeUnitError, UnitSkew,
};

/// PostgreSQL-backed order store.
#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Wrap an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool and wrap it.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(db_err)?;
        Ok(Self::new(pool))
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema. Idempotent; runs at every boot.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        let migration_sql = include_str!("../../../../migrations/001_create_orders_trades.sql");
        sqlx::raw_sql(migration_sql)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        info!("Database migrations completed");
        Ok(())
    }
}

fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

fn corrupt(err: impl std::fmt::Display) -> StoreError {
    StoreError::CorruptRow(err.to_string())
}

fn row_to_order(row: &PgRow) -> Result<Order, StoreError> {
    let side: String = row.get("side");
    let order_type: String = row.get("order_type");
    let status: String = row.get("status");

    Ok(Order {
        id: OrderId::from(row.get::<Uuid, _>("id")),
        client_id: row.get("client_id"),
        instrument: Symbol(row.get("instrument")),
        side: Side::from_str(&side).map_err(corrupt)?,
        order_type: OrderType::from_str(&order_type).map_err(corrupt)?,
        price: row.get::<Option<BigDecimal>, _>("price"),
        quantity: row.get("quantity"),
        remaining: row.get("remaining"),
        status: OrderStatus::from_str(&status).map_err(corrupt)?,
        idempotency_key: row.get("idempotency_key"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

fn row_to_trade(row: &PgRow) -> Result<Trade, StoreError> {
    Ok(Trade {
        id: TradeId(row.get::<Uuid, _>("id")),
        buy_order_id: OrderId::from(row.get::<Uuid, _>("buy_order_id")),
        sell_order_id: OrderId::from(row.get::<Uuid, _>("sell_order_id")),
        instrument: Symbol(row.get("instrument")),
        price: row.get("price"),
        quantity: row.get("quantity"),
        traded_at: row.get::<DateTime<Utc>, _>("traded_at"),
    })
}

/// Pull one leg's locked state out of the two-row `FOR UPDATE` result.
fn leg_state(rows: &[PgRow], id: OrderId) -> Result<(BigDecimal, OrderStatus), StoreError> {
    for row in rows {
        if row.get::<Uuid, _>("id") == id.as_uuid() {
            let status: String = row.get("status");
            return Ok((
                row.get::<BigDecimal, _>("remaining"),
                OrderStatus::from_str(&status).map_err(corrupt)?,
            ));
        }
    }
    Err(StoreError::OrderNotFound(id))
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn accept(&self, order: Order) -> Result<Accepted, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (
                id, client_id, instrument, side, order_type, price,
                quantity, remaining, status, idempotency_key, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.client_id)
        .bind(order.instrument.as_str())
        .bind(order.side.to_string())
        .bind(order.order_type.to_string())
        .bind(order.price.clone())
        .bind(&order.quantity)
        .bind(&order.remaining)
        .bind(order.status.to_string())
        .bind(order.idempotency_key.clone())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 1 {
            return Ok(Accepted::New(order));
        }

        // The unique index arbitrated a duplicate key; read the winner's row.
        let key = order.idempotency_key.as_deref().ok_or_else(|| {
            StoreError::Database("insert affected no rows without an idempotency key".to_string())
        })?;
        let row = sqlx::query("SELECT * FROM orders WHERE idempotency_key = $1")
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(Accepted::Replayed(row_to_order(&row)?))
    }

    async fn execute_trade_unit(&self, unit: TradeUnit<'_>) -> Result<(), TradeUnitError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let rows =
            sqlx::query("SELECT id, remaining, status FROM orders WHERE id IN ($1, $2) FOR UPDATE")
                .bind(unit.incoming_id.as_uuid())
                .bind(unit.resting_id.as_uuid())
                .fetch_all(&mut *tx)
                .await
                .map_err(db_err)?;

        let (incoming_remaining, incoming_status) = leg_state(&rows, unit.incoming_id)?;
        let (resting_remaining, resting_status) = leg_state(&rows, unit.resting_id)?;

        let quantity = &unit.trade.quantity;
        let skewed = !incoming_status.is_active()
            || !resting_status.is_active()
            || quantity > &incoming_remaining
            || quantity > &resting_remaining
            || &incoming_remaining - quantity != *unit.new_incoming_remaining
            || &resting_remaining - quantity != *unit.new_resting_remaining;

        if skewed {
            let _ = tx.rollback().await;
            return Err(TradeUnitError::Skew(UnitSkew {
                incoming_remaining,
                incoming_active: incoming_status.is_active(),
                resting_remaining,
                resting_active: resting_status.is_active(),
            }));
        }

        sqlx::query(
            r#"
            INSERT INTO trades (id, buy_order_id, sell_order_id, instrument, price, quantity, traded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(unit.trade.id.as_uuid())
        .bind(unit.trade.buy_order_id.as_uuid())
        .bind(unit.trade.sell_order_id.as_uuid())
        .bind(unit.trade.instrument.as_str())
        .bind(&unit.trade.price)
        .bind(quantity)
        .bind(unit.trade.traded_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let now = Utc::now();
        for (id, new_remaining) in [
            (unit.incoming_id, unit.new_incoming_remaining),
            (unit.resting_id, unit.new_resting_remaining),
        ] {
            let status = if new_remaining.is_zero() {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            sqlx::query("UPDATE orders SET remaining = $1, status = $2, updated_at = $3 WHERE id = $4")
                .bind(new_remaining)
                .bind(status.to_string())
                .bind(now)
                .bind(id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn cancel(&self, order_id: OrderId) -> Result<Order, CancelError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = sqlx::query("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        let Some(row) = row else {
            return Err(CancelError::NotFound(order_id));
        };
        let mut order = row_to_order(&row)?;

        match order.status {
            OrderStatus::Filled => Err(CancelError::AlreadyFilled(order_id)),
            OrderStatus::Cancelled => Err(CancelError::AlreadyCancelled(order_id)),
            OrderStatus::Open | OrderStatus::PartiallyFilled => {
                let now = Utc::now();
                sqlx::query("UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3")
                    .bind(OrderStatus::Cancelled.to_string())
                    .bind(now)
                    .bind(order_id.as_uuid())
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                tx.commit().await.map_err(db_err)?;

                order.status = OrderStatus::Cancelled;
                order.updated_at = now;
                Ok(order)
            }
        }
    }

    async fn finalize_incoming(
        &self,
        order_id: OrderId,
        computed_remaining: &BigDecimal,
    ) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = sqlx::query("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        let mut order = row_to_order(&row.ok_or(StoreError::OrderNotFound(order_id))?)?;

        let reconciled = min_decimal(&order.remaining, computed_remaining);
        let status = if order.status == OrderStatus::Cancelled {
            OrderStatus::Cancelled
        } else if reconciled.is_zero() {
            OrderStatus::Filled
        } else if reconciled < order.quantity {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Open
        };

        let now = Utc::now();
        sqlx::query("UPDATE orders SET remaining = $1, status = $2, updated_at = $3 WHERE id = $4")
            .bind(&reconciled)
            .bind(status.to_string())
            .bind(now)
            .bind(order_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        order.remaining = reconciled;
        order.status = status;
        order.updated_at = now;
        Ok(order)
    }

    async fn load_open(&self) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM orders
            WHERE order_type = 'limit'
              AND status IN ('open', 'partially_filled')
              AND price IS NOT NULL
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_order).collect()
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_order).transpose()
    }

    async fn trades_for_order(&self, order_id: OrderId) -> Result<Vec<Trade>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM trades WHERE buy_order_id = $1 OR sell_order_id = $1 ORDER BY traded_at ASC",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_trade).collect()
    }

    async fn trades_for_instrument(
        &self,
        instrument: &Symbol,
        limit: u32,
    ) -> Result<Vec<Trade>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM trades WHERE instrument = $1 ORDER BY traded_at DESC LIMIT $2",
        )
        .bind(instrument.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_trade).collect()
    }
}

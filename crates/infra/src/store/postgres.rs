//! Postgres-backed persistence gateway.
//!
//! The event log is append-only with the externally assigned event id as
//! primary key; `ON CONFLICT (id) DO NOTHING` makes every record operation
//! idempotent under redelivery. Claims take `SELECT ... FOR UPDATE` row
//! locks so a competing transaction blocks until commit/rollback, then sees
//! the rows already `requested` and fails its count check.
//!
//! SQLx errors are mapped to [`StoreError`]: Postgres code `23505` (unique
//! violation) becomes `Conflict`; everything else becomes `Query` tagged
//! with the failing operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;

use itemvault_core::{EventId, ItemId, OwnerId};
use itemvault_ledger::{FeedEvent, Item, ItemState, NewItem};

use super::r#trait::{Applied, LedgerStore, StoreError};

/// Postgres persistence gateway.
///
/// Uses the SQLx connection pool, so it is `Send + Sync` and cheap to share
/// across tasks. Every mutating operation runs in a single transaction.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn max_event_id(&self) -> Result<EventId, StoreError> {
        let row = sqlx::query("SELECT COALESCE(MAX(id), 0) AS max_id FROM events")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("max_event_id", e))?;

        let max_id: i64 = row
            .try_get("max_id")
            .map_err(|e| map_sqlx_error("max_event_id", e))?;

        Ok(EventId::new(max_id))
    }

    async fn record_event(
        &self,
        event: &FeedEvent,
        received_at: DateTime<Utc>,
    ) -> Result<Applied, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let applied = insert_event(&mut tx, event, received_at).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;

        Ok(applied)
    }

    async fn record_deposit(
        &self,
        event: &FeedEvent,
        owner: OwnerId,
        items: &[NewItem],
        received_at: DateTime<Utc>,
    ) -> Result<Applied, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        // The event insert is the idempotency guard: when the row already
        // exists this deposit was processed before, so the item inserts are
        // skipped and the transaction commits as a no-op.
        if insert_event(&mut tx, event, received_at).await? == Applied::AlreadyRecorded {
            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("commit", e))?;
            return Ok(Applied::AlreadyRecorded);
        }

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO items (
                    id, state, owner_id, name, quality, icon,
                    inspect_link, priced_value, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
                "#,
            )
            .bind(item.id.as_i64())
            .bind(ItemState::Owned.as_str())
            .bind(owner.as_u64() as i64)
            .bind(&item.name)
            .bind(&item.quality)
            .bind(&item.icon)
            .bind(item.inspect_link.as_deref())
            .bind(item.priced_value)
            .bind(received_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_item", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;

        Ok(Applied::Committed)
    }

    async fn claim_items(&self, owner: OwnerId, item_ids: &[ItemId]) -> Result<(), StoreError> {
        let ids: Vec<i64> = item_ids.iter().map(|id| id.as_i64()).collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        // Pessimistic lock on exactly the rows this owner may claim. A
        // competing claim blocks here until we commit or roll back.
        let locked = sqlx::query(
            r#"
            SELECT id FROM items
            WHERE id = ANY($1) AND owner_id = $2 AND state = $3
            FOR UPDATE
            "#,
        )
        .bind(&ids)
        .bind(owner.as_u64() as i64)
        .bind(ItemState::Owned.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_items", e))?;

        if locked.len() != item_ids.len() {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::InsufficientItems {
                requested: item_ids.len(),
                lockable: locked.len(),
            });
        }

        sqlx::query(
            r#"
            UPDATE items SET state = $1, updated_at = NOW()
            WHERE id = ANY($2)
            "#,
        )
        .bind(ItemState::Requested.as_str())
        .bind(&ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("transition_items", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;

        Ok(())
    }

    async fn items_for_owner(
        &self,
        owner: OwnerId,
        state: ItemState,
    ) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, state, owner_id, name, quality, icon,
                   inspect_link, priced_value, created_at, updated_at
            FROM items
            WHERE owner_id = $1 AND state = $2
            ORDER BY priced_value DESC, id ASC
            "#,
        )
        .bind(owner.as_u64() as i64)
        .bind(state.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("items_for_owner", e))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(item_from_row(&row)?);
        }
        Ok(items)
    }
}

/// Insert the event row; `AlreadyRecorded` when the id was present.
async fn insert_event(
    tx: &mut Transaction<'_, Postgres>,
    event: &FeedEvent,
    received_at: DateTime<Utc>,
) -> Result<Applied, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO events (id, kind, action, data, received_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(event.id.as_i64())
    .bind(event.kind.as_str())
    .bind(&event.action)
    .bind(&event.data)
    .bind(received_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_event", e))?;

    if result.rows_affected() == 1 {
        Ok(Applied::Committed)
    } else {
        Ok(Applied::AlreadyRecorded)
    }
}

fn item_from_row(row: &sqlx::postgres::PgRow) -> Result<Item, StoreError> {
    let read = |e: sqlx::Error| map_sqlx_error("decode_item_row", e);

    let state_raw: String = row.try_get("state").map_err(read)?;
    let state: ItemState = state_raw
        .parse()
        .map_err(|e| StoreError::Serialization(format!("items.state: {e}")))?;

    let id: i64 = row.try_get("id").map_err(read)?;
    let owner_id: i64 = row.try_get("owner_id").map_err(read)?;
    let priced_value: Decimal = row.try_get("priced_value").map_err(read)?;

    Ok(Item {
        id: ItemId::new(id),
        state,
        owner: OwnerId::new(owner_id as u64),
        name: row.try_get("name").map_err(read)?,
        quality: row.try_get("quality").map_err(read)?,
        icon: row.try_get("icon").map_err(read)?,
        inspect_link: row.try_get("inspect_link").map_err(read)?,
        priced_value,
        created_at: row.try_get("created_at").map_err(read)?,
        updated_at: row.try_get("updated_at").map_err(read)?,
    })
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            // 23505: unique violation.
            if db_err.code().as_deref() == Some("23505") {
                StoreError::Conflict(format!("{operation}: {message}"))
            } else {
                StoreError::Query { operation, message }
            }
        }
        other => StoreError::Query {
            operation,
            message: other.to_string(),
        },
    }
}

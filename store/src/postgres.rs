//! Postgres-backed raw storage for the Direct strategy.
//!
//! Records live in a single `stitch_records` table keyed by
//! (collection, id) with the document in a JSONB column. Transactions are
//! real database transactions held in a session table keyed by
//! [`TransactionId`], mirroring how the surrounding store hands its
//! transaction down through a request.
//!
//! ```no_run
//! use sqlx::postgres::PgPoolOptions;
//! use std::sync::Arc;
//! use stitch_engine::RelationConfig;
//! use stitch_store::{DirectStrategy, PgStorage};
//!
//! # async fn wire() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PgPoolOptions::new().connect("postgres://localhost/app").await?;
//! let storage = Arc::new(PgStorage::new(pool));
//! storage.ensure_schema().await?;
//!
//! let relation = Arc::new(
//!     RelationConfig::new("sales", "saleItems")
//!         .link_field("items")
//!         .reverse_field("sale")
//!         .build()?,
//! );
//! let _strategy = DirectStrategy::new(storage, relation, true);
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, StoreError};
use crate::storage::{DirectStorage, TransactionId};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Session = Arc<tokio::sync::Mutex<Transaction<'static, Postgres>>>;

/// Raw storage over a Postgres pool.
pub struct PgStorage {
    pool: PgPool,
    sessions: Mutex<HashMap<TransactionId, Session>>,
    next_txn: AtomicU64,
}

impl PgStorage {
    /// Wrap an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            sessions: Mutex::new(HashMap::new()),
            next_txn: AtomicU64::new(0),
        }
    }

    /// Create the backing table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stitch_records (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<TransactionId, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn session(&self, txn: TransactionId) -> Result<Session> {
        self.lock_sessions()
            .get(&txn)
            .cloned()
            .ok_or(StoreError::UnknownTransaction(txn))
    }
}

fn with_id(data: Value, id: &str) -> Result<Value> {
    match data {
        Value::Object(mut map) => {
            map.insert("id".to_string(), Value::String(id.to_string()));
            Ok(Value::Object(map))
        }
        _ => Err(StoreError::Backend("record data must be an object".into())),
    }
}

#[async_trait]
impl DirectStorage for PgStorage {
    fn supports_transactions(&self) -> bool {
        true
    }

    async fn begin(&self) -> Result<TransactionId> {
        let tx = self.pool.begin().await?;
        let id = self.next_txn.fetch_add(1, Ordering::SeqCst) + 1;
        self.lock_sessions()
            .insert(id, Arc::new(tokio::sync::Mutex::new(tx)));
        Ok(id)
    }

    async fn commit(&self, txn: TransactionId) -> Result<()> {
        let session = self
            .lock_sessions()
            .remove(&txn)
            .ok_or(StoreError::UnknownTransaction(txn))?;
        let tx = Arc::try_unwrap(session)
            .map_err(|_| StoreError::TransactionBusy)?
            .into_inner();
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, txn: TransactionId) -> Result<()> {
        let session = self
            .lock_sessions()
            .remove(&txn)
            .ok_or(StoreError::UnknownTransaction(txn))?;
        let tx = Arc::try_unwrap(session)
            .map_err(|_| StoreError::TransactionBusy)?
            .into_inner();
        tx.rollback().await?;
        Ok(())
    }

    async fn create_raw(
        &self,
        collection: &str,
        data: Value,
        txn: Option<TransactionId>,
    ) -> Result<Value> {
        let id = uuid::Uuid::new_v4().to_string();
        let doc = with_id(data, &id)?;

        const SQL: &str = r#"
            INSERT INTO stitch_records (collection, id, data)
            VALUES ($1, $2, $3)
        "#;
        match txn {
            Some(txn_id) => {
                let session = self.session(txn_id)?;
                let mut tx = session.lock().await;
                sqlx::query(SQL)
                    .bind(collection)
                    .bind(&id)
                    .bind(&doc)
                    .execute(&mut **tx)
                    .await?;
            }
            None => {
                sqlx::query(SQL)
                    .bind(collection)
                    .bind(&id)
                    .bind(&doc)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(doc)
    }

    async fn update_raw(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        txn: Option<TransactionId>,
    ) -> Result<Value> {
        if !data.is_object() {
            return Err(StoreError::Backend("record data must be an object".into()));
        }

        const SQL: &str = r#"
            UPDATE stitch_records
            SET data = data || $3::jsonb, updated_at = now()
            WHERE collection = $1 AND id = $2
            RETURNING data
        "#;
        let updated: Option<Value> = match txn {
            Some(txn_id) => {
                let session = self.session(txn_id)?;
                let mut tx = session.lock().await;
                sqlx::query_scalar(SQL)
                    .bind(collection)
                    .bind(id)
                    .bind(&data)
                    .fetch_optional(&mut **tx)
                    .await?
            }
            None => {
                sqlx::query_scalar(SQL)
                    .bind(collection)
                    .bind(id)
                    .bind(&data)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        updated.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn delete_raw(
        &self,
        collection: &str,
        id: &str,
        txn: Option<TransactionId>,
    ) -> Result<()> {
        const SQL: &str = r#"
            DELETE FROM stitch_records
            WHERE collection = $1 AND id = $2
        "#;
        let result = match txn {
            Some(txn_id) => {
                let session = self.session(txn_id)?;
                let mut tx = session.lock().await;
                sqlx::query(SQL)
                    .bind(collection)
                    .bind(id)
                    .execute(&mut **tx)
                    .await?
            }
            None => {
                sqlx::query(SQL)
                    .bind(collection)
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

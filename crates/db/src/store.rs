use async_trait::async_trait;
use sqlx::Postgres;
use thiserror::Error;

use freightdesk_core::procedure::{BoundParam, BoundValue, TargetStore};

use crate::connection::StorePools;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Rejected(String),
}

/// A connection holding one open transaction against one target store. The
/// transaction is released by exactly one of `commit` or `rollback`;
/// implementations must also release on drop so an abandoned handle never
/// leaks a connection.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn execute(&mut self, statement: &str, params: &[BoundParam]) -> Result<(), StoreError>;
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Hands out transaction-scoped connections. Acquisition begins an explicit
/// transaction; nothing runs under auto-commit.
#[async_trait]
pub trait ProcedureStore: Send + Sync {
    async fn begin(&self, target: TargetStore) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

pub struct PgProcedureStore {
    pools: StorePools,
}

impl PgProcedureStore {
    pub fn new(pools: StorePools) -> Self {
        Self { pools }
    }
}

#[async_trait]
impl ProcedureStore for PgProcedureStore {
    async fn begin(&self, target: TargetStore) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pools.pool_for(target).begin().await?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }
}

// sqlx rolls the transaction back when it is dropped uncommitted, which is
// the release-on-every-path guarantee the gateway relies on.
struct PgStoreTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn execute(&mut self, statement: &str, params: &[BoundParam]) -> Result<(), StoreError> {
        let mut query = sqlx::query(statement);
        for param in params {
            query = match &param.value {
                BoundValue::Integer(value) => query.bind(*value),
                BoundValue::Text(value) => query.bind(value.clone()),
                BoundValue::Date(value) => query.bind(*value),
                BoundValue::Json(value) => query.bind(value.clone()),
            };
        }
        query.execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

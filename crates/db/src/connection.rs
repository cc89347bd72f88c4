use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

use freightdesk_core::procedure::TargetStore;

pub type DbPool = sqlx::PgPool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    pool_options(max_connections, timeout_secs).connect(database_url).await
}

/// Builds a pool without dialing the server; connections are established on
/// first use. Startup therefore does not require a reachable database, and
/// connectivity problems surface through the health check or the first call.
pub fn connect_lazy_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    pool_options(max_connections, timeout_secs).connect_lazy(database_url)
}

fn pool_options(max_connections: u32, timeout_secs: u64) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
}

/// The two independent pools the gateway selects between. They share nothing:
/// no connections, no transactions.
#[derive(Clone)]
pub struct StorePools {
    pub crm: DbPool,
    pub shipment: DbPool,
}

impl StorePools {
    pub fn new(crm: DbPool, shipment: DbPool) -> Self {
        Self { crm, shipment }
    }

    pub fn pool_for(&self, target: TargetStore) -> &DbPool {
        match target {
            TargetStore::Crm => &self.crm,
            TargetStore::Shipment => &self.shipment,
        }
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::postgres::PgRow;
use sqlx::Row;
use thiserror::Error;
use tokio::sync::RwLock;

use freightdesk_core::procedure::TargetStore;
use freightdesk_core::schema::{render_snapshot, SchemaColumn};

use crate::connection::DbPool;

/// Every column in the public namespace, joined to the constraints it
/// participates in and, for foreign keys, to the table and column it
/// references. Ordered so the snapshot reads table by table.
const SCHEMA_QUERY: &str = "\
SELECT
    cols.table_schema,
    cols.table_name,
    cols.column_name,
    cols.data_type,
    cols.is_nullable,
    cons.constraint_type,
    cons.constraint_name,
    fk.references_table AS referenced_table,
    fk.references_column AS referenced_column
FROM information_schema.columns cols
LEFT JOIN information_schema.key_column_usage kcu
    ON cols.table_schema = kcu.table_schema
    AND cols.table_name = kcu.table_name
    AND cols.column_name = kcu.column_name
LEFT JOIN information_schema.table_constraints cons
    ON kcu.table_schema = cons.table_schema
    AND kcu.table_name = cons.table_name
    AND kcu.constraint_name = cons.constraint_name
LEFT JOIN (
    SELECT
        rc.constraint_name,
        kcu.table_name AS references_table,
        kcu.column_name AS references_column
    FROM information_schema.referential_constraints rc
    JOIN information_schema.key_column_usage kcu
        ON rc.unique_constraint_name = kcu.constraint_name
) fk
    ON cons.constraint_name = fk.constraint_name
WHERE cols.table_schema = 'public'
ORDER BY cols.table_schema, cols.table_name, cols.ordinal_position";

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("could not render schema snapshot: {0}")]
    Render(#[from] serde_json::Error),
}

/// Reads the catalog metadata of one store and renders it as JSON. Read-only,
/// no transaction; failures propagate to the caller as-is.
pub async fn fetch_schema_snapshot(pool: &DbPool) -> Result<String, SchemaError> {
    let rows = sqlx::query(SCHEMA_QUERY).fetch_all(pool).await?;
    let columns =
        rows.into_iter().map(column_from_row).collect::<Result<Vec<SchemaColumn>, _>>()?;
    Ok(render_snapshot(&columns)?)
}

fn column_from_row(row: PgRow) -> Result<SchemaColumn, SchemaError> {
    Ok(SchemaColumn {
        table_schema: row.try_get("table_schema")?,
        table_name: row.try_get("table_name")?,
        column_name: row.try_get("column_name")?,
        data_type: row.try_get("data_type")?,
        is_nullable: row.try_get("is_nullable")?,
        constraint_type: row.try_get("constraint_type")?,
        constraint_name: row.try_get("constraint_name")?,
        referenced_table: row.try_get("referenced_table")?,
        referenced_column: row.try_get("referenced_column")?,
    })
}

/// Session-lifetime cache of rendered schema snapshots, one slot per target
/// store. Populated on first request, returned by shared reference afterward,
/// and emptied only by an explicit [`reset`](Self::reset).
#[derive(Default)]
pub struct SchemaCache {
    slots: RwLock<HashMap<TargetStore, Arc<str>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(
        &self,
        target: TargetStore,
        pool: &DbPool,
    ) -> Result<Arc<str>, SchemaError> {
        if let Some(found) = self.slots.read().await.get(&target) {
            return Ok(Arc::clone(found));
        }

        let rendered = fetch_schema_snapshot(pool).await?;
        let mut slots = self.slots.write().await;
        // A concurrent request may have filled the slot while we scanned.
        let entry = slots.entry(target).or_insert_with(|| Arc::from(rendered));
        Ok(Arc::clone(entry))
    }

    /// Seeds a slot without touching the database.
    pub async fn prime(&self, target: TargetStore, snapshot: String) {
        self.slots.write().await.insert(target, Arc::from(snapshot));
    }

    pub async fn reset(&self) {
        self.slots.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use freightdesk_core::procedure::TargetStore;

    use super::SchemaCache;
    use crate::connection::connect_lazy_with_settings;

    #[tokio::test]
    async fn primed_snapshot_is_served_without_touching_the_store() {
        // A lazy pool never dials out, so any catalog scan would fail loudly.
        let pool = connect_lazy_with_settings("postgres://localhost/unreachable", 1, 1)
            .expect("lazy pool");
        let cache = SchemaCache::new();
        cache.prime(TargetStore::Shipment, "[{\"table_name\":\"shipments\"}]".to_string()).await;

        let snapshot =
            cache.snapshot(TargetStore::Shipment, &pool).await.expect("primed slot is served");
        assert!(snapshot.contains("shipments"));
    }

    #[tokio::test]
    async fn reset_empties_every_slot() {
        let cache = SchemaCache::new();
        cache.prime(TargetStore::Crm, "[]".to_string()).await;
        cache.prime(TargetStore::Shipment, "[]".to_string()).await;

        cache.reset().await;

        let pool = connect_lazy_with_settings("postgres://localhost/unreachable", 1, 1)
            .expect("lazy pool");
        // With the slots cleared the next snapshot must hit the (unreachable)
        // store again and fail.
        assert!(cache.snapshot(TargetStore::Crm, &pool).await.is_err());
    }
}

use serde::{Deserialize, Serialize};

/// One row of the catalog snapshot: a column together with any constraint it
/// participates in and, for foreign keys, the table and column it references.
/// `is_nullable` keeps the catalog's own `YES`/`NO` spelling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub table_schema: String,
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: String,
    pub constraint_type: Option<String>,
    pub constraint_name: Option<String>,
    pub referenced_table: Option<String>,
    pub referenced_column: Option<String>,
}

/// Renders the snapshot as pretty-printed JSON, the structured-text form the
/// agents pass around and cache for the session.
pub fn render_snapshot(columns: &[SchemaColumn]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(columns)
}

#[cfg(test)]
mod tests {
    use super::{render_snapshot, SchemaColumn};

    #[test]
    fn snapshot_renders_foreign_key_references() {
        let columns = vec![SchemaColumn {
            table_schema: "public".to_string(),
            table_name: "shipments".to_string(),
            column_name: "customer_id".to_string(),
            data_type: "integer".to_string(),
            is_nullable: "NO".to_string(),
            constraint_type: Some("FOREIGN KEY".to_string()),
            constraint_name: Some("shipments_customer_id_fkey".to_string()),
            referenced_table: Some("customers".to_string()),
            referenced_column: Some("id".to_string()),
        }];

        let snapshot = render_snapshot(&columns).expect("snapshot renders");
        assert!(snapshot.contains("\"referenced_table\": \"customers\""));

        let decoded: Vec<SchemaColumn> = serde_json::from_str(&snapshot).expect("round trip");
        assert_eq!(decoded, columns);
    }
}

//! The concrete functions the agents may call: raw SELECT passthrough per
//! store, the cached schema snapshot, and the two stored-procedure wrappers.
//! Gateway failures are tool *output* (a `{success, message}` record the
//! agent relays), while query and schema faults propagate as errors.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::Row;

use freightdesk_core::procedure::{AddCustomerParams, SendShipmentParams, TargetStore};
use freightdesk_db::{DbPool, ProcedureGateway, SchemaCache, StorePools};

use crate::tools::Tool;

/// Runs a caller-supplied SELECT against one store. No contract beyond "run
/// this string": mutations must go through the stored-procedure tools.
pub struct QueryTool {
    target: TargetStore,
    pools: StorePools,
}

impl QueryTool {
    pub fn crm(pools: StorePools) -> Self {
        Self { target: TargetStore::Crm, pools }
    }

    pub fn shipment(pools: StorePools) -> Self {
        Self { target: TargetStore::Shipment, pools }
    }
}

#[derive(Deserialize)]
struct QueryArgs {
    query: String,
}

#[async_trait]
impl Tool for QueryTool {
    fn name(&self) -> &'static str {
        match self.target {
            TargetStore::Crm => "query_crm",
            TargetStore::Shipment => "query_shipment",
        }
    }

    fn description(&self) -> &'static str {
        match self.target {
            TargetStore::Crm => "Queries the CRM database based on the provided query",
            TargetStore::Shipment => "Queries the shipment database based on the provided query",
        }
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The SQL SELECT query to execute",
                }
            },
            "required": ["query"],
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: QueryArgs = serde_json::from_value(input)
            .with_context(|| format!("invalid arguments for {}", self.name()))?;
        run_select(self.pools.pool_for(self.target), &args.query).await
    }
}

// The database renders the rows itself, so the passthrough needs no dynamic
// column decoding on this side.
async fn run_select(pool: &DbPool, query: &str) -> Result<Value> {
    let wrapped = format!(
        "SELECT coalesce(json_agg(row_to_json(q)), '[]'::json)::text AS rows FROM ({query}) AS q"
    );
    let row = sqlx::query(&wrapped).fetch_one(pool).await.context("query execution failed")?;
    let rendered: String = row.try_get("rows").context("query produced no row payload")?;
    serde_json::from_str(&rendered).context("query payload was not valid JSON")
}

/// Serves the schema snapshot of a store through the session cache.
pub struct GetSchemaInfoTool {
    cache: Arc<SchemaCache>,
    pools: StorePools,
}

impl GetSchemaInfoTool {
    pub fn new(cache: Arc<SchemaCache>, pools: StorePools) -> Self {
        Self { cache, pools }
    }
}

#[derive(Deserialize)]
struct SchemaArgs {
    #[serde(default)]
    target: Option<TargetStore>,
}

#[async_trait]
impl Tool for GetSchemaInfoTool {
    fn name(&self) -> &'static str {
        "get_schema_info"
    }

    fn description(&self) -> &'static str {
        "Retrieves the database schema and referential integrity information. \
         The snapshot is cached for the session."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "target": {
                    "type": "string",
                    "enum": ["crm", "shipment"],
                    "description": "Which database to describe (defaults to shipment)",
                }
            },
            "required": [],
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: SchemaArgs =
            serde_json::from_value(input).context("invalid arguments for get_schema_info")?;
        let target = args.target.unwrap_or(TargetStore::Shipment);
        let snapshot = self.cache.snapshot(target, self.pools.pool_for(target)).await?;
        Ok(Value::String(snapshot.to_string()))
    }
}

/// Adds a customer to the CRM database through its stored procedure.
pub struct AddCustomerTool {
    gateway: Arc<ProcedureGateway>,
}

impl AddCustomerTool {
    pub fn new(gateway: Arc<ProcedureGateway>) -> Self {
        Self { gateway }
    }
}

#[derive(Deserialize)]
struct AddCustomerArgs {
    #[serde(default)]
    procedure_name: Option<String>,
    parameters: AddCustomerParams,
}

#[async_trait]
impl Tool for AddCustomerTool {
    fn name(&self) -> &'static str {
        "add_customer"
    }

    fn description(&self) -> &'static str {
        "Adds a customer to the CRM database by executing the 'add_customer' \
         stored procedure with the provided parameters."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "procedure_name": {
                    "type": "string",
                    "description": "The stored procedure to execute (defaults to 'add_customer')",
                },
                "parameters": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "email": { "type": "string" },
                        "phone": { "type": "string" },
                        "address": { "type": "string" },
                    },
                    "required": ["name", "email", "phone", "address"],
                },
            },
            "required": ["parameters"],
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: AddCustomerArgs =
            serde_json::from_value(input).context("invalid arguments for add_customer")?;
        let call = match args.procedure_name {
            Some(procedure) => args.parameters.into_call_named(procedure)?,
            None => args.parameters.into_call()?,
        };
        let result = self.gateway.invoke(call).await;
        Ok(serde_json::to_value(result)?)
    }
}

/// Creates a shipment in the shipment database through its stored procedure.
pub struct SendShipmentTool {
    gateway: Arc<ProcedureGateway>,
}

impl SendShipmentTool {
    pub fn new(gateway: Arc<ProcedureGateway>) -> Self {
        Self { gateway }
    }
}

#[derive(Deserialize)]
struct SendShipmentArgs {
    #[serde(default)]
    procedure_name: Option<String>,
    parameters: SendShipmentParams,
}

#[async_trait]
impl Tool for SendShipmentTool {
    fn name(&self) -> &'static str {
        "send_shipment"
    }

    fn description(&self) -> &'static str {
        "Sends a shipment by executing the 'send_shipment' stored procedure \
         with the provided parameters."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "procedure_name": {
                    "type": "string",
                    "description": "The stored procedure to execute (defaults to 'send_shipment')",
                },
                "parameters": {
                    "type": "object",
                    "properties": {
                        "customer_id": { "type": "integer" },
                        "origin_id": { "type": "integer" },
                        "destination_id": { "type": "integer" },
                        "shipment_date": { "type": "string", "format": "date" },
                        "items": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "product_id": { "type": "integer" },
                                    "quantity": { "type": "integer" },
                                },
                                "required": ["product_id", "quantity"],
                            },
                        },
                        "status": { "type": "string" },
                        "tracking_status": { "type": "string" },
                        "location_id": { "type": "integer" },
                    },
                    "required": [
                        "customer_id",
                        "origin_id",
                        "destination_id",
                        "shipment_date",
                        "items",
                        "status",
                        "tracking_status",
                        "location_id",
                    ],
                },
            },
            "required": ["parameters"],
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: SendShipmentArgs =
            serde_json::from_value(input).context("invalid arguments for send_shipment")?;
        let call = match args.procedure_name {
            Some(procedure) => args.parameters.into_call_named(procedure)?,
            None => args.parameters.into_call()?,
        };
        let result = self.gateway.invoke(call).await;
        Ok(serde_json::to_value(result)?)
    }
}

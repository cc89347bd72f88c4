use std::sync::Arc;

use thiserror::Error;

use freightdesk_core::procedure::{BoundValue, ProcedureCall, TargetStore};
use freightdesk_core::result::ExecutionResult;

use crate::store::{ProcedureStore, StoreError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// No transaction-scoped connection could be acquired. Nothing was
    /// executed, so there is nothing to roll back.
    Acquire,
    /// The store rejected the invocation (constraint violation, missing
    /// procedure, type mismatch, lost connection). The transaction was rolled
    /// back.
    Execute,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub target: TargetStore,
    pub message: String,
}

impl GatewayError {
    fn acquire(target: TargetStore, source: StoreError) -> Self {
        Self { kind: GatewayErrorKind::Acquire, target, message: source.to_string() }
    }

    fn execute(target: TargetStore, source: StoreError) -> Self {
        Self { kind: GatewayErrorKind::Execute, target, message: source.to_string() }
    }

    /// Flattens the structured error into the sentence the agent layer relays
    /// to the end user. This is the only place the failure prefix is applied.
    pub fn user_message(&self) -> String {
        match self.kind {
            GatewayErrorKind::Execute => format!(
                "An error occurred while executing the stored procedure: {}",
                self.message
            ),
            GatewayErrorKind::Acquire => format!(
                "An error occurred while connecting to the {} database: {}",
                self.target, self.message
            ),
        }
    }
}

/// Executes named stored procedures under transactional guarantees: one
/// invocation, one connection, one transaction, one commit or one rollback.
/// Failures come back as result values because the callers relay them
/// conversationally; nothing here retries, queues, or deduplicates.
pub struct ProcedureGateway {
    store: Arc<dyn ProcedureStore>,
}

impl ProcedureGateway {
    pub fn new(store: Arc<dyn ProcedureStore>) -> Self {
        Self { store }
    }

    pub async fn invoke(&self, call: ProcedureCall) -> ExecutionResult {
        let kind = call.kind();
        match self.try_invoke(&call).await {
            Ok(()) => {
                tracing::info!(
                    event_name = "db.gateway.committed",
                    target_store = %call.target(),
                    procedure = call.procedure(),
                    "stored procedure committed"
                );
                ExecutionResult::succeeded(kind.success_message())
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "db.gateway.failed",
                    target_store = %error.target,
                    procedure = call.procedure(),
                    error = %error,
                    "stored procedure invocation failed"
                );
                ExecutionResult::failed(error.user_message())
            }
        }
    }

    async fn try_invoke(&self, call: &ProcedureCall) -> Result<(), GatewayError> {
        let target = call.target();
        let mut tx = self
            .store
            .begin(target)
            .await
            .map_err(|source| GatewayError::acquire(target, source))?;

        let statement = call_statement(call);
        match tx.execute(&statement, call.params()).await {
            Ok(()) => tx.commit().await.map_err(|source| GatewayError::execute(target, source)),
            Err(source) => {
                if let Err(rollback_error) = tx.rollback().await {
                    tracing::warn!(
                        event_name = "db.gateway.rollback_failed",
                        target_store = %target,
                        procedure = call.procedure(),
                        error = %rollback_error,
                        "rollback after failed invocation also failed"
                    );
                }
                Err(GatewayError::execute(target, source))
            }
        }
    }
}

/// `CALL procedure(name => $1, name => $2, ...)` — one placeholder per bound
/// parameter, in insertion order, using named notation so the statement keys
/// each argument to the procedure's formal parameter. JSON-encoded values are
/// cast because the driver binds them as text.
fn call_statement(call: &ProcedureCall) -> String {
    let args = call
        .params()
        .iter()
        .enumerate()
        .map(|(index, param)| {
            let placeholder = index + 1;
            match param.value {
                BoundValue::Json(_) => format!("{} => ${placeholder}::jsonb", param.name),
                _ => format!("{} => ${placeholder}", param.name),
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("CALL {}({args})", call.procedure())
}

#[cfg(test)]
mod tests {
    use freightdesk_core::procedure::{
        AddCustomerParams, SendShipmentParams, ShipmentItem,
    };
    use freightdesk_core::chrono::NaiveDate;

    use super::call_statement;

    #[test]
    fn add_customer_statement_uses_named_notation() {
        let call = AddCustomerParams {
            name: "Marc".to_string(),
            email: "marcre@contoso.com".to_string(),
            phone: "+1 123 456 7890".to_string(),
            address: "1 Main Street, Redmond".to_string(),
        }
        .into_call()
        .expect("valid params");

        assert_eq!(
            call_statement(&call),
            "CALL add_customer(name => $1, email => $2, phone => $3, address => $4)"
        );
    }

    #[test]
    fn send_shipment_statement_casts_items_to_jsonb() {
        let call = SendShipmentParams {
            customer_id: 1,
            origin_id: 3,
            destination_id: 2,
            shipment_date: NaiveDate::from_ymd_opt(2023, 10, 1).expect("valid date"),
            items: vec![ShipmentItem { product_id: 1, quantity: 5 }],
            status: "In Transit".to_string(),
            tracking_status: "Departed Origin".to_string(),
            location_id: 3,
        }
        .into_call()
        .expect("valid params");

        assert_eq!(
            call_statement(&call),
            "CALL send_shipment(customer_id => $1, origin_id => $2, destination_id => $3, \
             shipment_date => $4, items => $5::jsonb, status => $6, tracking_status => $7, \
             location_id => $8)"
        );
    }
}

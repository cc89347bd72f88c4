use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the two independent databases addressed by the gateway. They share
/// no connections or transactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStore {
    Crm,
    Shipment,
}

impl TargetStore {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crm => "crm",
            Self::Shipment => "shipment",
        }
    }
}

impl std::fmt::Display for TargetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TargetStore {
    type Err = CallError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "crm" => Ok(Self::Crm),
            "shipment" => Ok(Self::Shipment),
            other => Err(CallError::UnknownTargetStore(other.to_string())),
        }
    }
}

/// A shipment line item. Lists of these are the only composite parameter the
/// stores accept, and they travel as a JSON array through a `jsonb` parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShipmentItem {
    pub product_id: i64,
    pub quantity: i64,
}

/// A parameter value as supplied by the caller.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Integer(i64),
    Text(String),
    Date(NaiveDate),
    Items(Vec<ShipmentItem>),
}

/// A parameter value after encoding, in the shape the driver binds. Scalars
/// pass through; lists of records become their canonical JSON text.
#[derive(Clone, Debug, PartialEq)]
pub enum BoundValue {
    Integer(i64),
    Text(String),
    Date(NaiveDate),
    Json(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundParam {
    pub name: String,
    pub value: BoundValue,
}

impl ParamValue {
    fn encode(&self) -> Result<BoundValue, CallError> {
        match self {
            Self::Integer(value) => Ok(BoundValue::Integer(*value)),
            Self::Text(value) => Ok(BoundValue::Text(value.clone())),
            Self::Date(value) => Ok(BoundValue::Date(*value)),
            Self::Items(items) => {
                let json = serde_json::to_string(items).map_err(CallError::ItemEncoding)?;
                Ok(BoundValue::Json(json))
            }
        }
    }
}

/// The mutating operations the gateway knows how to report on. The kind fixes
/// the default target store, the default procedure name, and the confirmation
/// message returned on commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcedureKind {
    AddCustomer,
    SendShipment,
}

impl ProcedureKind {
    pub fn target(&self) -> TargetStore {
        match self {
            Self::AddCustomer => TargetStore::Crm,
            Self::SendShipment => TargetStore::Shipment,
        }
    }

    pub fn procedure_name(&self) -> &'static str {
        match self {
            Self::AddCustomer => "add_customer",
            Self::SendShipment => "send_shipment",
        }
    }

    pub fn success_message(&self) -> &'static str {
        match self {
            Self::AddCustomer => "Customer added successfully.",
            Self::SendShipment => "Shipment sent successfully.",
        }
    }
}

#[derive(Debug, Error)]
pub enum CallError {
    #[error("unknown target store `{0}` (expected crm|shipment)")]
    UnknownTargetStore(String),
    #[error("procedure name must not be empty")]
    EmptyProcedureName,
    #[error("procedure name `{0}` is not a valid identifier")]
    InvalidProcedureName(String),
    #[error("a procedure call requires at least one named parameter")]
    NoParameters,
    #[error("parameter name `{0}` is not a valid identifier")]
    InvalidParameterName(String),
    #[error("parameter name `{0}` collides with another parameter after normalization")]
    DuplicateParameterName(String),
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("a shipment requires at least one line item")]
    NoItems,
    #[error("line item for product {product_id} has non-positive quantity {quantity}")]
    InvalidQuantity { product_id: i64, quantity: i64 },
    #[error("could not encode line items as JSON: {0}")]
    ItemEncoding(#[source] serde_json::Error),
}

/// A single stored-procedure invocation: target store, procedure name, and the
/// parameters in binding order. Validated and encoded at construction,
/// consumed exactly once by the gateway, and discarded.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcedureCall {
    kind: ProcedureKind,
    target: TargetStore,
    procedure: String,
    params: Vec<BoundParam>,
}

impl ProcedureCall {
    /// Builds a call after checking the invariants the stores cannot: the
    /// procedure name is an identifier, the parameter set is non-empty, every
    /// key is an identifier, and no two keys collide once normalized.
    /// Whether the procedure exists and the keys match its signature is the
    /// store's own check.
    pub fn new(
        kind: ProcedureKind,
        target: TargetStore,
        procedure: impl Into<String>,
        params: Vec<(String, ParamValue)>,
    ) -> Result<Self, CallError> {
        let procedure = procedure.into();
        let trimmed = procedure.trim();
        if trimmed.is_empty() {
            return Err(CallError::EmptyProcedureName);
        }
        if !is_procedure_name(trimmed) {
            return Err(CallError::InvalidProcedureName(procedure));
        }
        if params.is_empty() {
            return Err(CallError::NoParameters);
        }

        let mut seen = Vec::with_capacity(params.len());
        let mut bound = Vec::with_capacity(params.len());
        for (name, value) in &params {
            if !is_identifier(name) {
                return Err(CallError::InvalidParameterName(name.clone()));
            }
            let trimmed_name = name.trim();
            let normalized = trimmed_name.to_ascii_lowercase();
            if seen.contains(&normalized) {
                return Err(CallError::DuplicateParameterName(name.clone()));
            }
            seen.push(normalized);
            bound.push(BoundParam { name: trimmed_name.to_string(), value: value.encode()? });
        }

        Ok(Self { kind, target, procedure: trimmed.to_string(), params: bound })
    }

    pub fn kind(&self) -> ProcedureKind {
        self.kind
    }

    pub fn target(&self) -> TargetStore {
        self.target
    }

    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    pub fn params(&self) -> &[BoundParam] {
        &self.params
    }
}

/// Parameters of the `add_customer` stored procedure, checked as a closed
/// record so missing or extra fields fail at this boundary instead of inside
/// the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddCustomerParams {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
}

impl AddCustomerParams {
    pub fn validate(&self) -> Result<(), CallError> {
        for (label, value) in [
            ("customer name", &self.name),
            ("customer email", &self.email),
            ("customer phone", &self.phone),
            ("customer address", &self.address),
        ] {
            if value.trim().is_empty() {
                return Err(CallError::EmptyField(label));
            }
        }
        Ok(())
    }

    pub fn into_call(self) -> Result<ProcedureCall, CallError> {
        let procedure = ProcedureKind::AddCustomer.procedure_name().to_string();
        self.into_call_named(procedure)
    }

    /// Same as [`into_call`](Self::into_call) but with a caller-supplied
    /// procedure name, e.g. a schema-qualified one.
    pub fn into_call_named(self, procedure: impl Into<String>) -> Result<ProcedureCall, CallError> {
        self.validate()?;
        ProcedureCall::new(
            ProcedureKind::AddCustomer,
            TargetStore::Crm,
            procedure,
            vec![
                ("name".to_string(), ParamValue::Text(self.name)),
                ("email".to_string(), ParamValue::Text(self.email)),
                ("phone".to_string(), ParamValue::Text(self.phone)),
                ("address".to_string(), ParamValue::Text(self.address)),
            ],
        )
    }
}

/// Parameters of the `send_shipment` stored procedure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendShipmentParams {
    pub customer_id: i64,
    pub origin_id: i64,
    pub destination_id: i64,
    pub shipment_date: NaiveDate,
    pub items: Vec<ShipmentItem>,
    pub status: String,
    pub tracking_status: String,
    pub location_id: i64,
}

impl SendShipmentParams {
    pub fn validate(&self) -> Result<(), CallError> {
        if self.status.trim().is_empty() {
            return Err(CallError::EmptyField("shipment status"));
        }
        if self.tracking_status.trim().is_empty() {
            return Err(CallError::EmptyField("tracking status"));
        }
        if self.items.is_empty() {
            return Err(CallError::NoItems);
        }
        for item in &self.items {
            if item.quantity < 1 {
                return Err(CallError::InvalidQuantity {
                    product_id: item.product_id,
                    quantity: item.quantity,
                });
            }
        }
        Ok(())
    }

    pub fn into_call(self) -> Result<ProcedureCall, CallError> {
        let procedure = ProcedureKind::SendShipment.procedure_name().to_string();
        self.into_call_named(procedure)
    }

    pub fn into_call_named(self, procedure: impl Into<String>) -> Result<ProcedureCall, CallError> {
        self.validate()?;
        ProcedureCall::new(
            ProcedureKind::SendShipment,
            TargetStore::Shipment,
            procedure,
            vec![
                ("customer_id".to_string(), ParamValue::Integer(self.customer_id)),
                ("origin_id".to_string(), ParamValue::Integer(self.origin_id)),
                ("destination_id".to_string(), ParamValue::Integer(self.destination_id)),
                ("shipment_date".to_string(), ParamValue::Date(self.shipment_date)),
                ("items".to_string(), ParamValue::Items(self.items)),
                ("status".to_string(), ParamValue::Text(self.status)),
                ("tracking_status".to_string(), ParamValue::Text(self.tracking_status)),
                ("location_id".to_string(), ParamValue::Integer(self.location_id)),
            ],
        )
    }
}

fn is_identifier(value: &str) -> bool {
    let value = value.trim();
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

// Procedure names may be schema-qualified.
fn is_procedure_name(value: &str) -> bool {
    value.split('.').all(|segment| is_identifier(segment))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{
        AddCustomerParams, BoundValue, CallError, ParamValue, ProcedureCall, ProcedureKind,
        SendShipmentParams, ShipmentItem, TargetStore,
    };

    fn shipment_params() -> SendShipmentParams {
        SendShipmentParams {
            customer_id: 1,
            origin_id: 3,
            destination_id: 2,
            shipment_date: NaiveDate::from_ymd_opt(2023, 10, 1).expect("valid date"),
            items: vec![
                ShipmentItem { product_id: 1, quantity: 5 },
                ShipmentItem { product_id: 2, quantity: 3 },
            ],
            status: "In Transit".to_string(),
            tracking_status: "Departed Origin".to_string(),
            location_id: 3,
        }
    }

    #[test]
    fn add_customer_call_binds_fields_in_declaration_order() {
        let call = AddCustomerParams {
            name: "Marc".to_string(),
            email: "marcre@contoso.com".to_string(),
            phone: "+1 123 456 7890".to_string(),
            address: "1 Main Street, Redmond".to_string(),
        }
        .into_call()
        .expect("valid params");

        assert_eq!(call.kind(), ProcedureKind::AddCustomer);
        assert_eq!(call.target(), TargetStore::Crm);
        assert_eq!(call.procedure(), "add_customer");
        let names: Vec<&str> = call.params().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["name", "email", "phone", "address"]);
    }

    #[test]
    fn shipment_items_encode_to_json_that_round_trips() {
        let call = shipment_params().into_call().expect("valid params");

        let items_param = call
            .params()
            .iter()
            .find(|p| p.name == "items")
            .expect("items parameter present");
        let json = match &items_param.value {
            BoundValue::Json(json) => json,
            other => panic!("items should bind as JSON text, got {other:?}"),
        };

        let decoded: Vec<ShipmentItem> = serde_json::from_str(json).expect("valid JSON");
        assert_eq!(
            decoded,
            vec![
                ShipmentItem { product_id: 1, quantity: 5 },
                ShipmentItem { product_id: 2, quantity: 3 },
            ]
        );
    }

    #[test]
    fn shipment_date_binds_as_a_date_not_text() {
        let call = shipment_params().into_call().expect("valid params");
        let date_param = call
            .params()
            .iter()
            .find(|p| p.name == "shipment_date")
            .expect("shipment_date parameter present");
        assert_eq!(
            date_param.value,
            BoundValue::Date(NaiveDate::from_ymd_opt(2023, 10, 1).expect("valid date"))
        );
    }

    #[test]
    fn empty_procedure_name_is_rejected() {
        let result = ProcedureCall::new(
            ProcedureKind::AddCustomer,
            TargetStore::Crm,
            "  ",
            vec![("name".to_string(), ParamValue::Text("x".to_string()))],
        );
        assert!(matches!(result, Err(CallError::EmptyProcedureName)));
    }

    #[test]
    fn procedure_name_with_injection_is_rejected() {
        let result = ProcedureCall::new(
            ProcedureKind::AddCustomer,
            TargetStore::Crm,
            "add_customer(); DROP TABLE customers",
            vec![("name".to_string(), ParamValue::Text("x".to_string()))],
        );
        assert!(matches!(result, Err(CallError::InvalidProcedureName(_))));
    }

    #[test]
    fn schema_qualified_procedure_name_is_accepted() {
        let call = ProcedureCall::new(
            ProcedureKind::AddCustomer,
            TargetStore::Crm,
            "public.add_customer",
            vec![("name".to_string(), ParamValue::Text("x".to_string()))],
        )
        .expect("qualified name is valid");
        assert_eq!(call.procedure(), "public.add_customer");
    }

    #[test]
    fn parameter_names_colliding_after_normalization_are_rejected() {
        let result = ProcedureCall::new(
            ProcedureKind::AddCustomer,
            TargetStore::Crm,
            "add_customer",
            vec![
                ("name".to_string(), ParamValue::Text("a".to_string())),
                ("Name".to_string(), ParamValue::Text("b".to_string())),
            ],
        );
        assert!(matches!(result, Err(CallError::DuplicateParameterName(name)) if name == "Name"));
    }

    #[test]
    fn empty_parameter_set_is_rejected() {
        let result =
            ProcedureCall::new(ProcedureKind::AddCustomer, TargetStore::Crm, "add_customer", vec![]);
        assert!(matches!(result, Err(CallError::NoParameters)));
    }

    #[test]
    fn blank_customer_fields_fail_validation() {
        let result = AddCustomerParams {
            name: "  ".to_string(),
            email: "a@b.c".to_string(),
            phone: "1".to_string(),
            address: "somewhere".to_string(),
        }
        .into_call();
        assert!(matches!(result, Err(CallError::EmptyField("customer name"))));
    }

    #[test]
    fn shipment_without_items_fails_validation() {
        let mut params = shipment_params();
        params.items.clear();
        assert!(matches!(params.into_call(), Err(CallError::NoItems)));
    }

    #[test]
    fn shipment_with_zero_quantity_fails_validation() {
        let mut params = shipment_params();
        params.items[0].quantity = 0;
        assert!(matches!(
            params.into_call(),
            Err(CallError::InvalidQuantity { product_id: 1, quantity: 0 })
        ));
    }

    #[test]
    fn typed_params_reject_unknown_fields() {
        let result: Result<AddCustomerParams, _> = serde_json::from_value(serde_json::json!({
            "name": "Marc",
            "email": "marcre@contoso.com",
            "phone": "+1 123 456 7890",
            "address": "1 Main Street, Redmond",
            "company": "Contoso",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn shipment_params_parse_from_model_arguments() {
        let params: SendShipmentParams = serde_json::from_value(serde_json::json!({
            "customer_id": 1,
            "origin_id": 3,
            "destination_id": 2,
            "shipment_date": "2023-10-01",
            "items": [
                { "product_id": 1, "quantity": 5 },
                { "product_id": 2, "quantity": 3 },
            ],
            "status": "In Transit",
            "tracking_status": "Departed Origin",
            "location_id": 3,
        }))
        .expect("arguments parse");
        assert_eq!(params, shipment_params());
    }

    #[test]
    fn success_messages_are_fixed_per_kind() {
        assert_eq!(ProcedureKind::AddCustomer.success_message(), "Customer added successfully.");
        assert_eq!(ProcedureKind::SendShipment.success_message(), "Shipment sent successfully.");
    }
}

pub mod config;
pub mod procedure;
pub mod result;
pub mod schema;

pub use chrono;

pub use procedure::{
    AddCustomerParams, BoundParam, BoundValue, CallError, ParamValue, ProcedureCall,
    ProcedureKind, SendShipmentParams, ShipmentItem, TargetStore,
};
pub use result::ExecutionResult;
pub use schema::SchemaColumn;

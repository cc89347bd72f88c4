pub mod connection;
pub mod gateway;
pub mod introspect;
pub mod recording;
pub mod store;

pub use connection::{
    connect, connect_lazy_with_settings, connect_with_settings, DbPool, StorePools,
};
pub use gateway::{GatewayError, GatewayErrorKind, ProcedureGateway};
pub use introspect::{fetch_schema_snapshot, SchemaCache, SchemaError};
pub use recording::{RecordedCall, RecordingStore, StoreCounts};
pub use store::{PgProcedureStore, ProcedureStore, StoreError, StoreTransaction};

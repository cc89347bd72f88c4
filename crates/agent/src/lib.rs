pub mod data_tools;
pub mod llm;
pub mod profiles;
pub mod runtime;
pub mod tools;

pub use data_tools::{AddCustomerTool, GetSchemaInfoTool, QueryTool, SendShipmentTool};
pub use llm::{AssistantTurn, ChatMessage, FunctionCall, HttpLlmClient, LlmClient, Role};
pub use profiles::{all_profiles, crm_agent, schema_agent, shipment_agent, AgentProfile};
pub use runtime::{AgentRuntime, ChatTurn};
pub use tools::{Tool, ToolRegistry};

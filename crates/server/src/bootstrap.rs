use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use freightdesk_agent::{
    all_profiles, AddCustomerTool, AgentRuntime, GetSchemaInfoTool, HttpLlmClient, QueryTool,
    SendShipmentTool, ToolRegistry,
};
use freightdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use freightdesk_db::{
    connect_lazy_with_settings, PgProcedureStore, ProcedureGateway, SchemaCache, StorePools,
};

pub struct Application {
    pub config: AppConfig,
    pub pools: StorePools,
    pub schema_cache: Arc<SchemaCache>,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database pool setup failed: {0}")]
    DatabaseSetup(#[source] sqlx::Error),
    #[error("llm client setup failed: {0}")]
    LlmSetup(anyhow::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    // Pools are lazy: connections are dialed on first use, so a database that
    // is down at startup surfaces through /health rather than a crash loop.
    let crm = connect_lazy_with_settings(
        &config.crm_database.url,
        config.crm_database.max_connections,
        config.crm_database.timeout_secs,
    )
    .map_err(BootstrapError::DatabaseSetup)?;
    let shipment = connect_lazy_with_settings(
        &config.shipment_database.url,
        config.shipment_database.max_connections,
        config.shipment_database.timeout_secs,
    )
    .map_err(BootstrapError::DatabaseSetup)?;
    let pools = StorePools::new(crm, shipment);
    info!(
        event_name = "system.bootstrap.pools_prepared",
        correlation_id = "bootstrap",
        "database pools prepared"
    );

    let gateway = Arc::new(ProcedureGateway::new(Arc::new(PgProcedureStore::new(pools.clone()))));
    let schema_cache = Arc::new(SchemaCache::new());

    let mut registry = ToolRegistry::default();
    registry.register(QueryTool::crm(pools.clone()));
    registry.register(QueryTool::shipment(pools.clone()));
    registry.register(GetSchemaInfoTool::new(Arc::clone(&schema_cache), pools.clone()));
    registry.register(AddCustomerTool::new(Arc::clone(&gateway)));
    registry.register(SendShipmentTool::new(gateway));

    let llm =
        Arc::new(HttpLlmClient::from_config(&config.llm).map_err(BootstrapError::LlmSetup)?);
    let runtime =
        Arc::new(AgentRuntime::new(llm, registry, all_profiles(), config.agent.max_rounds));
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        max_rounds = config.agent.max_rounds,
        "agent runtime assembled"
    );

    Ok(Application { config, pools, schema_cache, runtime })
}

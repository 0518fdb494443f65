use anyhow::Result;
use std::sync::Arc;

use interview_core::backoff::BackoffPolicy;
use interview_core::config::AppConfig;
use interview_core::gateway::openai::OpenAIModelGateway;
use interview_core::interview::checkpoint::postgres::PostgresCheckpointer;
use interview_core::interview::orchestrator::InterviewOrchestrator;
use interview_core::logging;
use interview_core::records::postgres::PostgresRecordStore;
use interview_core::session::postgres::PostgresSessionRegistry;
use interview_core::store::postgres::PostgresVectorStore;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    logging::init_logging(&config);
    tracing::info!("interview-core starting");

    let vectors = PostgresVectorStore::new(&config.database_url, true).await?;
    let pool = vectors.pool().clone();
    let vectors = Arc::new(vectors);

    let _records = Arc::new(PostgresRecordStore::new(pool.clone()));
    let checkpoints = Arc::new(PostgresCheckpointer::new(pool.clone()));
    let sessions = Arc::new(PostgresSessionRegistry::new(pool));

    let gateway = Arc::new(OpenAIModelGateway::new(
        config.model.openai_api_key.clone(),
        config.model.embedding_dim,
        config.model.model_call_timeout_ms,
        config.model.model_max_retries,
        BackoffPolicy::new(config.model.backoff_base_ms, config.model.backoff_max_ms),
    )?);

    let _orchestrator = InterviewOrchestrator::new(gateway, vectors, checkpoints, sessions, config.interview.clone());

    tracing::info!(
        database_url = %config.database_url,
        embedding_dim = config.model.embedding_dim,
        "gateway and stores constructed"
    );

    Ok(())
}

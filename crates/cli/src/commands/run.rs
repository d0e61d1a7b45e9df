use std::sync::Arc;

use anyhow::Context;
use serde_json::json;

use carelane_agent::{redact_api_keys, AgentRuntime, GeminiPlanner};
use carelane_core::audit::JsonlAuditSink;
use carelane_core::config::{AppConfig, LoadOptions};
use carelane_core::domain::response::{AgentResponse, ResponseStatus};
use carelane_db::{connect_with_settings, migrations, SqlRecordStore};

use crate::commands::CommandResult;

/// Executes one natural-language request end to end and prints the
/// agent response as pretty JSON.
///
/// Exit codes: 0 for `ok` and `refused` outcomes (both are successful
/// runs of the pipeline), 2 if the response itself carries status
/// `error`, and 1 when the run aborted before producing a response.
pub fn run(request: &str, dry_run: bool) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return error_result(&format!("configuration issue: {error}")),
    };

    init_logging(&config);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return error_result(&format!("failed to initialize async runtime: {error}"))
        }
    };

    match runtime.block_on(execute(&config, request, dry_run)) {
        Ok(response) => {
            let exit_code = if response.status == ResponseStatus::Error { 2 } else { 0 };
            match serde_json::to_string_pretty(&response) {
                Ok(output) => CommandResult { exit_code, output },
                Err(error) => error_result(&format!("response serialization failed: {error}")),
            }
        }
        Err(error) => error_result(&format!("{error:#}")),
    }
}

async fn execute(
    config: &AppConfig,
    request: &str,
    dry_run: bool,
) -> anyhow::Result<AgentResponse> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .context("failed to connect to the record store")?;
    migrations::run_pending(&pool).await.context("failed to apply pending migrations")?;

    let planner = GeminiPlanner::from_config(&config.llm)?;
    let store = SqlRecordStore::new(pool.clone());
    let audit = JsonlAuditSink::new(config.audit.log_path.clone());
    let agent = AgentRuntime::new(Arc::new(store), Arc::new(planner), Arc::new(audit));

    let response = agent.run(request, dry_run).await;
    pool.close().await;
    response
}

fn init_logging(config: &AppConfig) {
    use carelane_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    // try_init so repeated invocations in one process (tests) do not
    // panic on the second subscriber.
    let _ = match config.logging.format {
        Compact => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .compact()
            .try_init(),
        Pretty => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .pretty()
            .try_init(),
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().try_init()
        }
    };
}

/// Failure payload for the `run` subcommand. Unlike the operator
/// commands this mirrors the agent's wire contract, so callers can
/// parse `status` regardless of outcome. API keys are scrubbed from
/// the surfaced message.
fn error_result(message: &str) -> CommandResult {
    let payload = json!({ "status": "error", "error": redact_api_keys(message) });
    let output = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
    CommandResult { exit_code: 1, output }
}

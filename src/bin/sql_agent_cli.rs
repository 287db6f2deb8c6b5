//! Thin CLI front end: reads a question and a starting SQL draft from
//! arguments, runs them through the full pipeline, and prints the
//! resulting [`sql_pipeline_agent::PipelineResult`] as JSON.

use anyhow::{bail, Context, Result};
use sql_pipeline_agent::config::PipelineConfig;
use sql_pipeline_agent::orchestrator::Orchestrator;
use sql_pipeline_agent::schema::InMemorySchemaRegistry;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let mut args = std::env::args().skip(1);
    let question = args.next().context("usage: sql_agent_cli <question> <sql_query> [config.toml]")?;
    let sql_query = args.next().context("usage: sql_agent_cli <question> <sql_query> [config.toml]")?;
    let config_path = args.next();

    let config = match config_path {
        Some(path) => PipelineConfig::from_file(&path).with_context(|| format!("loading config from {path}"))?,
        None => PipelineConfig::default(),
    };

    let providers = config.build_providers();
    let provider = providers.into_iter().next();
    if provider.is_none() {
        eprintln!("warning: no connected LLM provider configured; regeneration will use fallback substitutions only");
    }

    let orchestrator = Orchestrator::with_row_limit(provider, config.row_limit_default);
    let registry = InMemorySchemaRegistry::default_catalog();

    let result = orchestrator
        .process_query(&question, &sql_query, &registry, config.dialect.into())
        .await;

    if !result.success {
        eprintln!("{}", Orchestrator::explain_processing(&result));
    }

    let json = serde_json::to_string_pretty(&result)?;
    println!("{json}");

    if !result.success {
        bail!("pipeline did not fully succeed");
    }
    Ok(())
}

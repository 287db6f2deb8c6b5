//! Natural-language-to-SQL translation pipeline for an IBM-style sales
//! pipeline data warehouse: a fixed chain of agents (syntax validation,
//! predicate enhancement, optimization, column validation, and LLM-backed
//! regeneration) coordinated by an [`orchestrator::Orchestrator`], plus a
//! [`parallel::ParallelGenerator`] for fanning a question out to several
//! LLM providers at once.

pub mod agents;
pub mod config;
pub mod context;
pub mod dialect;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod parallel;
pub mod schema;
pub mod synonyms;

pub use context::{AgentResponse, Dialect, LlmAnswer, PipelineResult, QueryContext};
pub use error::{PipelineError, ProviderError, Result};
pub use orchestrator::Orchestrator;
pub use schema::{InMemorySchemaRegistry, SchemaRegistry};

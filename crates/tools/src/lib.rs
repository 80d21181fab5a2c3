//! Capability implementations for Sleuth.
//!
//! The agent has one capability: web search. It is backed either by the
//! Serper Google search API or by a deterministic offline result set.

pub mod web_search;

use sleuth_config::AppConfig;
use sleuth_core::tool::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub use web_search::{OfflineBackend, SearchBackend, SearchRecord, SerperBackend, WebSearchTool};

/// Create the capability registry described by the configuration.
pub fn default_registry(config: &AppConfig) -> ToolRegistry {
    let backend: Arc<dyn SearchBackend> = match config.search.backend.as_str() {
        "offline" => Arc::new(OfflineBackend),
        _ => {
            if config.search.api_key.is_none() {
                warn!("No Serper API key configured; every web search will fail");
            }
            Arc::new(SerperBackend::new(
                &config.search.api_url,
                config.search.api_key.clone().unwrap_or_default(),
            ))
        }
    };

    let mut registry = ToolRegistry::new()
        .with_timeout(Duration::from_secs(config.agent.tool_timeout_secs));
    registry.register(Box::new(WebSearchTool::new(
        backend,
        config.search.num_results,
    )));
    registry
}

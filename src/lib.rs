pub mod browser;
pub mod cli;
pub mod config;
pub mod core;
pub mod detection;
pub mod error;
pub mod exceptions;
pub mod execution;
pub mod jobs;
pub mod locator;
pub mod logging;
pub mod progress;
pub mod settings;
pub mod steps;
pub mod store;

use async_trait::async_trait;
use crate::core::{BinaryCandidate, BuildConfig, BuildDescriptor, BuildJob};
use crate::detection::Classification;
use crate::error::BuildError;
use crate::execution::{ExecutionEngine, ExecutionOptions};
use crate::progress::{LoggingHandler, ProgressHandler};
use std::path::Path;
use std::sync::Arc;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[async_trait]
pub trait BuildRunner {
    async fn detect(&self, path: &Path) -> Classification;
    async fn build(
        &self,
        descriptor: &BuildDescriptor,
        config: &BuildConfig,
        repo_id: &str,
    ) -> Result<BuildJob, BuildError>;
    async fn locate(&self, search_root: &Path, target_name: &str) -> Vec<BinaryCandidate>;
}

/// Classifier, execution engine and binary locator wired together.
pub struct SourceBuildRunner {
    engine: ExecutionEngine,
    handler: Arc<dyn ProgressHandler>,
}

impl Default for SourceBuildRunner {
    fn default() -> Self {
        Self::new(ExecutionOptions::default())
    }
}

impl SourceBuildRunner {
    pub fn new(options: ExecutionOptions) -> Self {
        Self {
            engine: ExecutionEngine::new(options),
            handler: Arc::new(LoggingHandler),
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }
}

#[async_trait]
impl BuildRunner for SourceBuildRunner {
    async fn detect(&self, path: &Path) -> Classification {
        detection::detect_build_systems(path).await
    }

    async fn build(
        &self,
        descriptor: &BuildDescriptor,
        config: &BuildConfig,
        repo_id: &str,
    ) -> Result<BuildJob, BuildError> {
        self.engine
            .execute(descriptor, config, repo_id, self.handler.as_ref())
            .await
    }

    async fn locate(&self, search_root: &Path, target_name: &str) -> Vec<BinaryCandidate> {
        let root = self.engine.relocate_path(search_root);
        let name = target_name.to_string();
        let search_root = root.clone();
        let result = tokio::task::spawn_blocking(move || locator::locate(&root, &name)).await;
        candidates_or_log(result, &search_root)
    }
}

fn candidates_or_log(
    result: Result<Vec<BinaryCandidate>, tokio::task::JoinError>,
    search_root: &Path,
) -> Vec<BinaryCandidate> {
    result.unwrap_or_else(|err| {
        tracing::error!(error = %err, path = %search_root.display(), "Locator task failed");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn panicked_locator_task_yields_no_candidates() {
        let result = tokio::task::spawn_blocking(|| -> Vec<BinaryCandidate> { panic!("walk failed") }).await;
        assert!(result.as_ref().is_err_and(|err| err.is_panic()));
        assert!(candidates_or_log(result, Path::new("/src")).is_empty());
    }
}

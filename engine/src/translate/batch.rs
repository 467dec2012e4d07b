//! Concurrent translation of many documents.
//!
//! Every document runs on its own blocking task. Documents share nothing
//! except, optionally, one id registry behind a mutex. One failure never
//! aborts its siblings, and outcomes come back in input order.

use futures::future::join_all;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use super::context::TranslationContext;
use super::orchestrator::{Stage, TranslationFailure, TranslationResult, Translator};
use crate::error::TranslateError;
use crate::formats::Dialect;
use crate::registry::IdRegistry;

/// One input document.
#[derive(Debug, Clone)]
pub struct BatchItem {
    /// Label used in logs and outcomes, usually the file path.
    pub name: String,
    pub input: Vec<u8>,
}

impl BatchItem {
    pub fn new(name: impl Into<String>, input: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub target: Option<Dialect>,
    /// Keep ids stable across the whole batch.
    pub shared_registry: Option<Arc<Mutex<IdRegistry>>>,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub name: String,
    pub result: Result<TranslationResult, TranslationFailure>,
}

impl BatchOutcome {
    pub fn exit_code(&self) -> i32 {
        match &self.result {
            Ok(result) => result.exit_code(),
            Err(failure) => failure.exit_code(),
        }
    }
}

/// Highest exit code of the batch, 0 when empty.
pub fn worst_exit_code(outcomes: &[BatchOutcome]) -> i32 {
    outcomes.iter().map(BatchOutcome::exit_code).max().unwrap_or(0)
}

/// Translate every item concurrently.
pub async fn translate_batch(
    translator: Arc<Translator>,
    items: Vec<BatchItem>,
    options: BatchOptions,
) -> Vec<BatchOutcome> {
    info!(
        documents = items.len(),
        shared_registry = options.shared_registry.is_some(),
        "starting batch"
    );

    let tasks = items.into_iter().map(|item| {
        let translator = Arc::clone(&translator);
        let shared = options.shared_registry.clone();
        let target = options.target;
        let name = item.name.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let config = translator.config_arc();
            let mut ctx = match shared {
                Some(registry) => TranslationContext::shared(registry, config),
                None => TranslationContext::new(config),
            };
            translator.translate(&item.input, target, &mut ctx)
        });

        async move {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(document = %name, error = %e, "translation task did not complete");
                    Err(TranslationFailure {
                        error: TranslateError::Task(e.to_string()),
                        stage: Stage::Failed,
                        stages: vec![Stage::Failed],
                        source_format: None,
                        diagnostics: Vec::new(),
                    })
                }
            };
            BatchOutcome { name, result }
        }
    });

    let outcomes = join_all(tasks).await;
    info!(
        documents = outcomes.len(),
        failed = outcomes.iter().filter(|o| o.result.is_err()).count(),
        worst_exit_code = worst_exit_code(&outcomes),
        "batch finished"
    );
    outcomes
}

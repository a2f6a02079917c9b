//! Shared application state.
//!
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the version store and, when an LLM is configured, the optimizer.
//! Both are trait objects so tests can swap in the memory store and stubs.

use std::sync::Arc;

use crate::services::optimize::Optimizer;
use crate::services::store::VersionStore;

/// Shared application state, injected into Axum handlers via State extractor.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn VersionStore>,
    /// `None` if LLM env vars are not configured.
    pub optimizer: Option<Arc<dyn Optimizer>>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn VersionStore>, optimizer: Option<Arc<dyn Optimizer>>) -> Self {
        Self { store, optimizer }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::llm::types::LlmError;
    use crate::services::optimize::{OptimizationError, OptimizationResult};
    use crate::services::store::MemoryVersionStore;

    pub const SAMPLE_MARKUP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<bpmn:definitions xmlns:bpmn="http://www.omg.org/spec/BPMN/20100524/MODEL" id="Definitions_1">
  <bpmn:process id="Process_1" isExecutable="false">
    <bpmn:startEvent id="StartEvent_1" />
  </bpmn:process>
</bpmn:definitions>"#;

    pub const OPTIMIZED_MARKUP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<bpmn:definitions xmlns:bpmn="http://www.omg.org/spec/BPMN/20100524/MODEL" id="Definitions_2">
  <bpmn:process id="Process_1" isExecutable="false" />
</bpmn:definitions>"#;

    /// What a [`StubOptimizer`] answers with.
    pub enum StubOutcome {
        Success,
        NoSuggestions,
        Unavailable(u16),
    }

    /// Canned [`Optimizer`] that counts its calls.
    pub struct StubOptimizer {
        outcome: StubOutcome,
        calls: AtomicUsize,
    }

    impl StubOptimizer {
        #[must_use]
        pub fn new(outcome: StubOutcome) -> Self {
            Self { outcome, calls: AtomicUsize::new(0) }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Optimizer for StubOptimizer {
        async fn optimize(&self, _markup: &str) -> Result<OptimizationResult, OptimizationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                StubOutcome::Success => Ok(OptimizationResult {
                    suggestions: vec!["Parallelize the review tasks".into()],
                    optimized_markup: OPTIMIZED_MARKUP.into(),
                }),
                StubOutcome::NoSuggestions => Err(OptimizationError::NoSuggestions),
                StubOutcome::Unavailable(status) => {
                    Err(OptimizationError::Unavailable(LlmError::ApiResponse { status, body: "stub".into() }))
                }
            }
        }
    }

    /// `AppState` over a fresh memory store, without an optimizer.
    #[must_use]
    pub fn test_app_state() -> AppState {
        AppState::new(Arc::new(MemoryVersionStore::new()), None)
    }

    /// `AppState` over a fresh memory store with the given optimizer.
    #[must_use]
    pub fn test_app_state_with_optimizer(optimizer: Arc<dyn Optimizer>) -> AppState {
        AppState::new(Arc::new(MemoryVersionStore::new()), Some(optimizer))
    }
}

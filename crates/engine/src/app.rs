//! Application state and composition.

use std::sync::Arc;

use guildcraft_domain::LayoutConfig;

use crate::infrastructure::ports::{JobQueue, WorldStore};
use crate::use_cases;

/// Main application state.
///
/// Holds the request-facing use cases.
/// Passed to HTTP handlers via Axum state.
pub struct App {
    pub use_cases: UseCases,
}

/// Container for the use cases the HTTP layer calls.
pub struct UseCases {
    pub events: use_cases::EventConsumer,
    pub sync: use_cases::SyncUseCase,
    pub queries: use_cases::WorldQueries,
}

impl App {
    pub fn new(store: Arc<dyn WorldStore>, queue: Arc<dyn JobQueue>, layout: LayoutConfig) -> Self {
        let use_cases = UseCases {
            events: use_cases::EventConsumer::new(store.clone(), queue.clone()),
            sync: use_cases::SyncUseCase::new(store.clone(), queue),
            queries: use_cases::WorldQueries::new(store, layout),
        };
        Self { use_cases }
    }
}

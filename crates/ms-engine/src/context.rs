//! Shared engine context passed to background tasks and job handlers.

use std::sync::Arc;

use ms_av::{FrameExtractor, Prober};
use ms_core::config::Config;
use ms_core::events::EventBus;
use ms_db::pool::DbPool;

use crate::jobs::runner::{self, RunnerHandle, RunnerTrigger};

/// Everything a task needs to touch the catalog, the tools and the event
/// stream. Cheap to clone.
#[derive(Clone)]
pub struct EngineContext {
    pub db: DbPool,
    pub config: Arc<Config>,
    pub event_bus: Arc<EventBus>,
    pub prober: Arc<dyn Prober>,
    pub frames: Arc<dyn FrameExtractor>,
    /// Wakes the job runner after new work is enqueued.
    pub runner: RunnerHandle,
}

impl EngineContext {
    /// Build a context and the trigger receiver its runner listens on.
    pub fn new(
        db: DbPool,
        config: Arc<Config>,
        event_bus: Arc<EventBus>,
        prober: Arc<dyn Prober>,
        frames: Arc<dyn FrameExtractor>,
    ) -> (Self, RunnerTrigger) {
        let (runner, trigger) = runner::channel();
        let ctx = Self {
            db,
            config,
            event_bus,
            prober,
            frames,
            runner,
        };
        (ctx, trigger)
    }
}

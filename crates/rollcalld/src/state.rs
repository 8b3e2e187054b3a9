use std::sync::Arc;
use std::time::Instant;

use rollcall_core::EuclideanMatcher;
use rollcall_ledger::Ledger;

use crate::engine::EngineHandle;
use crate::processor::FrameProcessor;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) started_at: Instant,
    pub(crate) engine: EngineHandle,
    pub(crate) ledger: Ledger,
    pub(crate) processor: Arc<FrameProcessor<EuclideanMatcher>>,
}

impl AppState {
    pub(crate) fn new(
        engine: EngineHandle,
        ledger: Ledger,
        processor: FrameProcessor<EuclideanMatcher>,
    ) -> Self {
        Self {
            started_at: Instant::now(),
            engine,
            ledger,
            processor: Arc::new(processor),
        }
    }
}

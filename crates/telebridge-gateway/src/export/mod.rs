//! Export cadence: push, timer or collector callback.

pub mod scheduler;

use std::sync::Arc;

use telebridge_core::error::Result;

pub use scheduler::{ExportScheduler, Phase, SchedulerHandle, TickOutcome};

use crate::app_state::AppState;
use crate::config::ExportMode;

/// Start exporting according to `export.mode`.
///
/// Only the timer mode owns a task; push records from the update handlers and
/// callback mode is driven by the SDK's own collection.
pub fn start(state: &AppState) -> Result<Option<SchedulerHandle>> {
    let export = &state.cfg().export;
    match export.mode {
        ExportMode::Push => {
            tracing::info!(sink = state.sink().kind(), "push export: recording on every update");
            Ok(None)
        }
        ExportMode::Timer => {
            let scheduler = Arc::new(ExportScheduler::new(
                state.bridge().clone(),
                state.sink(),
                state.metrics(),
                export.interval(),
                export.timeout(),
            ));
            Ok(Some(scheduler.spawn()))
        }
        ExportMode::Callback => {
            state.sink().observe(state.bridge().clone())?;
            Ok(None)
        }
    }
}

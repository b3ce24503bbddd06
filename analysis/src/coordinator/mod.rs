//! The analysis coordinator: a single actor owning the engine channel.
//!
//! Callers talk to it through [`AnalysisHandle`] and observe it through
//! [`AnalysisEvent`]s. Position requests are debounced, a running search is
//! stopped before the next one starts, and the engine is re-initialized if it
//! dies mid-analysis.

mod actor;
pub mod commands;
pub mod events;
pub mod handle;
pub mod snapshot;
mod state;

use engine::EngineChannel;
use tokio::sync::{broadcast, mpsc};

use crate::config::CoordinatorConfig;
use actor::run_coordinator;
pub use commands::AnalysisError;
pub use events::{AnalysisEvent, UciDirection, UciLogEntry};
pub use handle::AnalysisHandle;
pub use snapshot::{AnalysisSnapshot, EnginePhase, SessionSnapshot};
use state::CoordinatorState;

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 256;

/// Spawn the coordinator actor on the current runtime. The engine is not
/// started until [`AnalysisHandle::initialize`] is called.
pub fn spawn_coordinator(
    channel: Box<dyn EngineChannel>,
    config: CoordinatorConfig,
) -> AnalysisHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let state = CoordinatorState::new(channel, config);
    tokio::spawn(run_coordinator(state, cmd_rx, event_tx));

    AnalysisHandle::new(cmd_tx)
}

use tokio::sync::{broadcast, oneshot};

use super::events::AnalysisEvent;
use super::snapshot::AnalysisSnapshot;
use crate::config::AnalysisConfig;
use crate::session::PositionRequest;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("Engine failed to initialize after {attempts} attempt(s): {reason}")]
    ChannelInitFailure { attempts: u32, reason: String },
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("Invalid position: {0}")]
    InvalidPosition(String),
    #[error("Analysis coordinator closed")]
    ActorClosed,
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Commands sent to the coordinator actor. Each embeds a oneshot for the reply.
pub enum CoordinatorCommand {
    /// Replies once the engine is ready or has failed for good.
    Initialize {
        reply: oneshot::Sender<Result<(), AnalysisError>>,
    },
    /// Replies as soon as the request is accepted, not when it is submitted.
    Analyze {
        request: PositionRequest,
        reply: oneshot::Sender<Result<(), AnalysisError>>,
    },
    Stop {
        reply: oneshot::Sender<Result<(), AnalysisError>>,
    },
    Configure {
        config: AnalysisConfig,
        reply: oneshot::Sender<Result<(), AnalysisError>>,
    },
    Dispose {
        reply: oneshot::Sender<()>,
    },
    GetSnapshot {
        reply: oneshot::Sender<AnalysisSnapshot>,
    },
    Subscribe {
        reply: oneshot::Sender<(AnalysisSnapshot, broadcast::Receiver<AnalysisEvent>)>,
    },
    Shutdown,
}

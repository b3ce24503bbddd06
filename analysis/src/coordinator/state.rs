use chess::Position;
use engine::{EngineChannel, OutputLines};
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::commands::AnalysisError;
use super::snapshot::{AnalysisSnapshot, EnginePhase, SessionSnapshot};
use crate::config::CoordinatorConfig;
use crate::session::{AnalysisSession, PositionRequest};

/// A validated request waiting to be sent to the engine.
#[derive(Debug, Clone)]
pub(crate) struct QueuedPosition {
    pub request: PositionRequest,
    pub position: Position,
}

impl QueuedPosition {
    pub fn from_session(session: &AnalysisSession) -> Self {
        Self {
            request: session.request().clone(),
            position: session.position().clone(),
        }
    }
}

/// The most recent request, submitted once its quiet period ends.
pub(crate) struct PendingRequest {
    pub queued: QueuedPosition,
    pub due: Instant,
}

/// `stop` was sent; waiting for its `bestmove`. `target` is submitted once it
/// arrives. Without a target the stop was explicit and the bestmove concludes
/// the current session.
pub(crate) struct StopWait {
    pub target: Option<QueuedPosition>,
    pub deadline: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandshakeStage {
    AwaitingUciOk,
    AwaitingReadyOk,
}

pub(crate) struct Handshake {
    pub stage: HandshakeStage,
    pub deadline: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    Handshake,
    Retry,
    Debounce,
    StopAck,
}

/// All mutable state owned by the coordinator actor.
pub(crate) struct CoordinatorState {
    pub config: CoordinatorConfig,
    pub channel: Box<dyn EngineChannel>,
    pub output: Option<OutputLines>,
    pub phase: EnginePhase,
    pub handshake: Option<Handshake>,
    pub retry_at: Option<Instant>,
    pub init_waiters: Vec<oneshot::Sender<Result<(), AnalysisError>>>,
    pub engine_name: Option<String>,
    /// MultiPV value the engine currently has, if any was sent.
    pub applied_multi_pv: Option<u8>,
    pub session: Option<AnalysisSession>,
    pub pending: Option<PendingRequest>,
    pub stopping: Option<StopWait>,
    /// `bestmove` replies still owed by searches abandoned after a stop
    /// timeout. Output is discarded until they have all arrived.
    pub stale_searches: usize,
    pub last_error: Option<String>,
}

impl CoordinatorState {
    pub fn new(channel: Box<dyn EngineChannel>, config: CoordinatorConfig) -> Self {
        Self {
            config,
            channel,
            output: None,
            phase: EnginePhase::Uninitialized,
            handshake: None,
            retry_at: None,
            init_waiters: Vec::new(),
            engine_name: None,
            applied_multi_pv: None,
            session: None,
            pending: None,
            stopping: None,
            stale_searches: 0,
            last_error: None,
        }
    }

    /// Next output line. Returns `None` once the engine closes its output.
    /// Never resolves while no engine is running.
    pub async fn next_line(&mut self) -> Option<String> {
        match self.output.as_mut() {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    /// The earliest armed timer.
    pub fn next_timer(&self) -> Option<(Instant, TimerKind)> {
        let debounce = match self.phase {
            EnginePhase::Ready | EnginePhase::Analyzing => self.pending.as_ref().map(|p| p.due),
            _ => None,
        };
        [
            (self.handshake.as_ref().map(|h| h.deadline), TimerKind::Handshake),
            (self.retry_at, TimerKind::Retry),
            (debounce, TimerKind::Debounce),
            (self.stopping.as_ref().map(|s| s.deadline), TimerKind::StopAck),
        ]
        .into_iter()
        .filter_map(|(deadline, kind)| deadline.map(|d| (d, kind)))
        .min_by_key(|(deadline, _)| *deadline)
    }

    pub fn attempt(&self) -> u32 {
        match self.phase {
            EnginePhase::Initializing { attempt } => attempt,
            _ => 0,
        }
    }

    pub fn resolve_init_waiters(&mut self, result: Result<(), AnalysisError>) {
        for waiter in self.init_waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }

    pub fn snapshot(&self) -> AnalysisSnapshot {
        AnalysisSnapshot {
            phase: self.phase.clone(),
            engine_name: self.engine_name.clone(),
            session: self.session.as_ref().map(session_snapshot),
            last_error: self.last_error.clone(),
        }
    }
}

fn session_snapshot(session: &AnalysisSession) -> SessionSnapshot {
    let published = session.published();
    let evaluation = published.map(|p| p.evaluation);
    SessionSnapshot {
        id: session.id(),
        fen: session.position().to_fen(),
        side_to_move: session.side_to_move(),
        evaluation,
        evaluation_depth: published.map(|p| p.depth),
        score: evaluation.map(|e| e.white_relative()),
        bar_position: evaluation.map(|e| e.bar_position()),
        lines: session.lines().to_vec(),
        best_move: session.best_move().cloned(),
        stats: session.stats().cloned(),
        concluded: session.is_concluded(),
    }
}

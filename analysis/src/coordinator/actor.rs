use cozy_chess::Move;
use engine::{
    classify_line, parse_uci_message, EngineCommand, EngineError, EngineInfo, LineKind, UciMessage,
};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant};
use tracing::Instrument;

use super::commands::*;
use super::events::*;
use super::snapshot::EnginePhase;
use super::state::{
    CoordinatorState, Handshake, HandshakeStage, PendingRequest, QueuedPosition, StopWait,
    TimerKind,
};
use crate::session::{AnalysisSession, PositionRequest};

/// The coordinator actor loop.
/// Owns the engine channel and all analysis state. Commands, engine output
/// and timers are processed one at a time.
pub(crate) async fn run_coordinator(
    state: CoordinatorState,
    cmd_rx: mpsc::Receiver<CoordinatorCommand>,
    event_tx: broadcast::Sender<AnalysisEvent>,
) {
    run_coordinator_inner(state, cmd_rx, event_tx)
        .instrument(tracing::info_span!("analysis"))
        .await;
}

async fn run_coordinator_inner(
    mut state: CoordinatorState,
    mut cmd_rx: mpsc::Receiver<CoordinatorCommand>,
    event_tx: broadcast::Sender<AnalysisEvent>,
) {
    tracing::info!("Analysis coordinator started");

    loop {
        let timer = state.next_timer();

        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(CoordinatorCommand::Shutdown) | None => {
                        tracing::info!("Analysis coordinator shutting down");
                        dispose(&mut state).await;
                        break;
                    }
                    Some(cmd) => handle_command(&mut state, cmd, &event_tx).await,
                }
            }

            line = state.next_line() => {
                match line {
                    Some(line) => handle_line(&mut state, line, &event_tx).await,
                    None => handle_output_closed(&mut state, &event_tx).await,
                }
            }

            _ = sleep_until(timer.map(|(deadline, _)| deadline)) => {
                if let Some((_, kind)) = timer {
                    handle_timer(&mut state, kind, &event_tx).await;
                }
            }
        }
    }

    tracing::info!("Analysis coordinator exited");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn publish(state: &CoordinatorState, event_tx: &broadcast::Sender<AnalysisEvent>) {
    let _ = event_tx.send(AnalysisEvent::StateChanged(state.snapshot()));
}

fn log_uci(event_tx: &broadcast::Sender<AnalysisEvent>, direction: UciDirection, message: String) {
    let _ = event_tx.send(AnalysisEvent::UciMessage(UciLogEntry { direction, message }));
}

async fn send_command(
    state: &mut CoordinatorState,
    command: EngineCommand,
    event_tx: &broadcast::Sender<AnalysisEvent>,
) -> Result<(), EngineError> {
    let line = command.to_uci();
    state.channel.send(command).await?;
    log_uci(event_tx, UciDirection::ToEngine, line);
    Ok(())
}

async fn handle_command(
    state: &mut CoordinatorState,
    cmd: CoordinatorCommand,
    event_tx: &broadcast::Sender<AnalysisEvent>,
) {
    match cmd {
        CoordinatorCommand::Initialize { reply } => match state.phase {
            EnginePhase::Ready | EnginePhase::Analyzing => {
                let _ = reply.send(Ok(()));
            }
            EnginePhase::Initializing { .. } => state.init_waiters.push(reply),
            EnginePhase::Uninitialized | EnginePhase::Failed { .. } => {
                state.init_waiters.push(reply);
                state.last_error = None;
                state.phase = EnginePhase::Initializing { attempt: 1 };
                begin_attempt(state, event_tx).await;
            }
        },
        CoordinatorCommand::Analyze { request, reply } => {
            let result = queue_request(state, request);
            let _ = reply.send(result);
        }
        CoordinatorCommand::Stop { reply } => {
            let result = stop_search(state, event_tx).await;
            let _ = reply.send(result);
        }
        CoordinatorCommand::Configure { config, reply } => {
            let config = config.clamped();
            tracing::info!(multi_pv = config.multi_pv, search = ?config.search, "Analysis configured");
            state.config.analysis = config;
            let _ = reply.send(Ok(()));
        }
        CoordinatorCommand::Dispose { reply } => {
            dispose(state).await;
            publish(state, event_tx);
            let _ = reply.send(());
        }
        CoordinatorCommand::GetSnapshot { reply } => {
            let _ = reply.send(state.snapshot());
        }
        CoordinatorCommand::Subscribe { reply } => {
            let snapshot = state.snapshot();
            let rx = event_tx.subscribe();
            let _ = reply.send((snapshot, rx));
        }
        // Handled by the actor loop.
        CoordinatorCommand::Shutdown => {}
    }
}

/// Validate a request and (re)arm the debounce timer for it.
fn queue_request(
    state: &mut CoordinatorState,
    request: PositionRequest,
) -> Result<(), AnalysisError> {
    let position = request
        .resolve()
        .map_err(|e| AnalysisError::InvalidPosition(e.to_string()))?;

    if !state.phase.is_available() {
        let reason = match &state.phase {
            EnginePhase::Failed { reason } => reason.clone(),
            _ => "engine is not initialized".to_string(),
        };
        return Err(AnalysisError::EngineUnavailable(reason));
    }

    tracing::debug!(fen = %request.fen, moves = request.moves.len(), "Position requested");
    state.pending = Some(PendingRequest {
        queued: QueuedPosition { request, position },
        due: Instant::now() + state.config.debounce,
    });
    Ok(())
}

async fn stop_search(
    state: &mut CoordinatorState,
    event_tx: &broadcast::Sender<AnalysisEvent>,
) -> Result<(), AnalysisError> {
    state.pending = None;

    // A stop is already in flight; its bestmove now just ends the search.
    if let Some(stop) = state.stopping.as_mut() {
        stop.target = None;
        return Ok(());
    }

    if state.phase == EnginePhase::Analyzing {
        stop_engine(state, event_tx)
            .await
            .map_err(|e| AnalysisError::EngineUnavailable(e.to_string()))?;
        state.stopping = Some(StopWait {
            target: None,
            deadline: Instant::now() + state.config.stop_timeout,
        });
    }
    Ok(())
}

/// Tear everything down and return to `Uninitialized`.
async fn dispose(state: &mut CoordinatorState) {
    if state.phase != EnginePhase::Uninitialized {
        tracing::info!("Disposing engine");
    }
    state.channel.dispose().await;
    state.output = None;
    state.handshake = None;
    state.retry_at = None;
    state.pending = None;
    state.stopping = None;
    state.stale_searches = 0;
    state.applied_multi_pv = None;
    state.session = None;
    state.engine_name = None;
    state.phase = EnginePhase::Uninitialized;
    state.resolve_init_waiters(Err(AnalysisError::EngineUnavailable(
        "engine disposed".to_string(),
    )));
}

// --- Initialization -------------------------------------------------------

async fn begin_attempt(state: &mut CoordinatorState, event_tx: &broadcast::Sender<AnalysisEvent>) {
    let attempt = state.attempt();
    tracing::info!(
        attempt,
        max_attempts = state.config.max_init_attempts,
        "Initializing engine"
    );
    publish(state, event_tx);

    match state.channel.initialize().await {
        Ok(output) => state.output = Some(output),
        Err(e) => {
            attempt_failed(state, e.to_string(), event_tx).await;
            return;
        }
    }

    state.handshake = Some(Handshake {
        stage: HandshakeStage::AwaitingUciOk,
        deadline: Instant::now() + state.config.handshake_timeout,
    });
    if let Err(e) = send_command(state, EngineCommand::Uci, event_tx).await {
        attempt_failed(state, e.to_string(), event_tx).await;
    }
}

/// Schedule a retry, or give up once the attempts are used up.
async fn attempt_failed(
    state: &mut CoordinatorState,
    reason: String,
    event_tx: &broadcast::Sender<AnalysisEvent>,
) {
    let attempt = state.attempt();
    tracing::warn!(attempt, "Engine initialization attempt failed: {}", reason);

    state.channel.dispose().await;
    state.output = None;
    state.handshake = None;

    if attempt >= state.config.max_init_attempts.max(1) {
        let error = AnalysisError::ChannelInitFailure {
            attempts: attempt,
            reason,
        };
        tracing::error!("{}", error);
        state.phase = EnginePhase::Failed {
            reason: error.to_string(),
        };
        state.last_error = Some(error.to_string());
        state.pending = None;
        state.resolve_init_waiters(Err(error.clone()));
        let _ = event_tx.send(AnalysisEvent::Error(error.to_string()));
    } else {
        let delay = state.config.backoff_after(attempt);
        tracing::info!(?delay, "Retrying engine initialization");
        state.retry_at = Some(Instant::now() + delay);
        state.last_error = Some(reason);
    }
    publish(state, event_tx);
}

async fn handle_handshake_line(
    state: &mut CoordinatorState,
    line: &str,
    event_tx: &broadcast::Sender<AnalysisEvent>,
) {
    let Some(stage) = state.handshake.as_ref().map(|h| h.stage) else {
        return;
    };

    match (stage, parse_uci_message(line)) {
        (_, Ok(UciMessage::Id { name, value })) if name == "name" => {
            tracing::info!("Engine identified as {}", value);
            state.engine_name = Some(value);
        }
        (HandshakeStage::AwaitingUciOk, Ok(UciMessage::UciOk)) => {
            if let Some(handshake) = state.handshake.as_mut() {
                handshake.stage = HandshakeStage::AwaitingReadyOk;
            }
            if let Err(e) = send_startup_options(state, event_tx).await {
                attempt_failed(state, e.to_string(), event_tx).await;
            }
        }
        (HandshakeStage::AwaitingReadyOk, Ok(UciMessage::ReadyOk)) => {
            state.handshake = None;
            state.phase = EnginePhase::Ready;
            tracing::info!(
                engine = state.engine_name.as_deref().unwrap_or("unknown"),
                "Engine ready"
            );
            state.resolve_init_waiters(Ok(()));
            publish(state, event_tx);
        }
        _ => tracing::trace!("Ignoring during handshake: {}", line),
    }
}

async fn send_startup_options(
    state: &mut CoordinatorState,
    event_tx: &broadcast::Sender<AnalysisEvent>,
) -> Result<(), EngineError> {
    let multi_pv = state.config.analysis.multi_pv;
    let mut options = state.channel.startup_options();
    options.push(("MultiPV".to_string(), multi_pv.to_string()));

    for (name, value) in options {
        let command = EngineCommand::SetOption {
            name,
            value: Some(value),
        };
        send_command(state, command, event_tx).await?;
    }
    state.applied_multi_pv = Some(multi_pv);
    send_command(state, EngineCommand::IsReady, event_tx).await
}

// --- Engine output ----------------------------------------------------------

async fn handle_line(
    state: &mut CoordinatorState,
    line: String,
    event_tx: &broadcast::Sender<AnalysisEvent>,
) {
    log_uci(event_tx, UciDirection::FromEngine, line.clone());

    if state.handshake.is_some() {
        handle_handshake_line(state, &line, event_tx).await;
        return;
    }

    if !matches!(classify_line(&line), LineKind::Info | LineKind::BestMove) {
        tracing::trace!("Ignoring engine output: {}", line);
        return;
    }

    match parse_uci_message(&line) {
        Ok(UciMessage::Info(info)) => handle_info(state, &info, event_tx),
        Ok(UciMessage::BestMove { mv, ponder }) => {
            handle_bestmove(state, mv, ponder, event_tx).await
        }
        Ok(UciMessage::InfoString(text)) => tracing::debug!("Engine says: {}", text),
        Ok(_) => {}
        Err(e) => tracing::warn!("Discarding malformed engine output: {}", e),
    }
}

fn handle_info(
    state: &mut CoordinatorState,
    info: &EngineInfo,
    event_tx: &broadcast::Sender<AnalysisEvent>,
) {
    let replacing = state.stopping.as_ref().is_some_and(|s| s.target.is_some());
    if state.stale_searches > 0 || replacing {
        tracing::trace!("Discarding info from an abandoned search");
        return;
    }
    if state.phase != EnginePhase::Analyzing {
        tracing::trace!("Discarding info with no search running");
        return;
    }
    let Some(session) = state.session.as_mut() else {
        return;
    };

    if session.apply_info(info).changed() {
        publish(state, event_tx);
    }
}

async fn handle_bestmove(
    state: &mut CoordinatorState,
    mv: Option<Move>,
    ponder: Option<Move>,
    event_tx: &broadcast::Sender<AnalysisEvent>,
) {
    if state.stale_searches > 0 {
        state.stale_searches -= 1;
        tracing::debug!("Discarding late bestmove from an abandoned search");
        return;
    }

    if let Some(stop) = state.stopping.take() {
        tracing::debug!("Stop acknowledged");
        if let Some(target) = stop.target {
            submit(state, target, event_tx).await;
            return;
        }
    }

    if state.phase != EnginePhase::Analyzing {
        tracing::trace!("Discarding bestmove with no search running");
        return;
    }
    conclude_session(state, mv, ponder, event_tx);
}

/// Finish the running session with whatever the engine reported so far.
fn conclude_session(
    state: &mut CoordinatorState,
    mv: Option<Move>,
    ponder: Option<Move>,
    event_tx: &broadcast::Sender<AnalysisEvent>,
) {
    let Some(session) = state.session.as_mut() else {
        return;
    };

    let truncated = session.conclude(mv, ponder);
    tracing::info!(
        session = %session.id(),
        best = session.best_move().map(|b| b.mv.as_str()).unwrap_or("(none)"),
        truncated,
        "Analysis concluded"
    );
    state.phase = EnginePhase::Ready;
    publish(state, event_tx);
}

async fn handle_output_closed(
    state: &mut CoordinatorState,
    event_tx: &broadcast::Sender<AnalysisEvent>,
) {
    state.output = None;

    if state.handshake.is_some() {
        attempt_failed(state, "engine exited during handshake".to_string(), event_tx).await;
        return;
    }
    if matches!(state.phase, EnginePhase::Ready | EnginePhase::Analyzing) {
        engine_lost(state, "engine output closed".to_string(), event_tx).await;
    }
}

/// The engine died while in service: re-initialize from scratch and put the
/// most recent position back in the queue.
async fn engine_lost(
    state: &mut CoordinatorState,
    reason: String,
    event_tx: &broadcast::Sender<AnalysisEvent>,
) {
    tracing::error!("Engine lost: {}", reason);
    let _ = event_tx.send(AnalysisEvent::Error(format!("Engine lost: {}", reason)));

    state.channel.dispose().await;
    state.output = None;
    state.applied_multi_pv = None;
    state.stale_searches = 0;
    state.last_error = Some(reason);

    // A stop with no target was explicit: the search is not resumed.
    let stopping = state.stopping.take();
    let resubmit = match (state.pending.take(), stopping) {
        (Some(pending), _) => Some(pending.queued),
        (None, Some(stop)) => stop.target,
        (None, None) => state
            .session
            .as_ref()
            .filter(|session| !session.is_concluded())
            .map(QueuedPosition::from_session),
    };
    if let Some(queued) = resubmit {
        state.pending = Some(PendingRequest {
            queued,
            due: Instant::now(),
        });
    }

    state.phase = EnginePhase::Initializing { attempt: 1 };
    begin_attempt(state, event_tx).await;
}

// --- Submission ---------------------------------------------------------------

async fn handle_timer(
    state: &mut CoordinatorState,
    kind: TimerKind,
    event_tx: &broadcast::Sender<AnalysisEvent>,
) {
    match kind {
        TimerKind::Handshake => {
            let reason = format!(
                "handshake timed out after {:?}",
                state.config.handshake_timeout
            );
            attempt_failed(state, reason, event_tx).await;
        }
        TimerKind::Retry => {
            state.retry_at = None;
            state.phase = EnginePhase::Initializing {
                attempt: state.attempt() + 1,
            };
            begin_attempt(state, event_tx).await;
        }
        TimerKind::Debounce => {
            let Some(pending) = state.pending.take() else {
                return;
            };
            match state.phase {
                EnginePhase::Ready => submit(state, pending.queued, event_tx).await,
                EnginePhase::Analyzing => replace_search(state, pending.queued, event_tx).await,
                _ => state.pending = Some(pending),
            }
        }
        TimerKind::StopAck => {
            let Some(stop) = state.stopping.take() else {
                return;
            };
            tracing::warn!(
                timeout = ?state.config.stop_timeout,
                "Engine did not acknowledge stop, discarding its late output"
            );
            state.stale_searches += 1;
            match stop.target {
                Some(target) => submit(state, target, event_tx).await,
                None => conclude_session(state, None, None, event_tx),
            }
        }
    }
}

/// Stop the running search; `queued` is submitted once the engine confirms.
async fn replace_search(
    state: &mut CoordinatorState,
    queued: QueuedPosition,
    event_tx: &broadcast::Sender<AnalysisEvent>,
) {
    if let Some(stop) = state.stopping.as_mut() {
        tracing::debug!("Replacing the position waiting on stop");
        stop.target = Some(queued);
        return;
    }

    if let Err(e) = stop_engine(state, event_tx).await {
        state.pending = Some(PendingRequest {
            queued,
            due: Instant::now(),
        });
        engine_lost(state, format!("failed to stop search: {}", e), event_tx).await;
        return;
    }
    state.stopping = Some(StopWait {
        target: Some(queued),
        deadline: Instant::now() + state.config.stop_timeout,
    });
}

/// Start a fresh session for `queued` and send it to the engine.
async fn submit(
    state: &mut CoordinatorState,
    queued: QueuedPosition,
    event_tx: &broadcast::Sender<AnalysisEvent>,
) {
    let QueuedPosition { request, position } = queued;
    let fen = request.fen.clone();
    let moves = request.moves.clone();

    let session = AnalysisSession::new(request, position, state.config.min_publish_depth);
    tracing::info!(session = %session.id(), fen = %session.position().to_fen(), "Submitting position");
    state.session = Some(session);
    state.phase = EnginePhase::Analyzing;

    if let Err(e) = send_search(state, fen, moves, event_tx).await {
        engine_lost(state, format!("failed to submit position: {}", e), event_tx).await;
        return;
    }
    publish(state, event_tx);
}

async fn send_search(
    state: &mut CoordinatorState,
    fen: String,
    moves: Vec<String>,
    event_tx: &broadcast::Sender<AnalysisEvent>,
) -> Result<(), EngineError> {
    let analysis = state.config.analysis;
    if state.applied_multi_pv != Some(analysis.multi_pv) {
        let command = EngineCommand::SetOption {
            name: "MultiPV".to_string(),
            value: Some(analysis.multi_pv.to_string()),
        };
        send_command(state, command, event_tx).await?;
        state.applied_multi_pv = Some(analysis.multi_pv);
    }

    state.channel.set_position(&fen, &moves).await?;
    log_uci(
        event_tx,
        UciDirection::ToEngine,
        EngineCommand::SetPosition { fen, moves }.to_uci(),
    );

    let params = analysis.search.go_params();
    let line = EngineCommand::Go(params.clone()).to_uci();
    state.channel.start_analysis(params).await?;
    log_uci(event_tx, UciDirection::ToEngine, line);
    Ok(())
}

async fn stop_engine(
    state: &mut CoordinatorState,
    event_tx: &broadcast::Sender<AnalysisEvent>,
) -> Result<(), EngineError> {
    state.channel.stop().await?;
    log_uci(event_tx, UciDirection::ToEngine, EngineCommand::Stop.to_uci());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalysisConfig, CoordinatorConfig, SearchLimit};
    use crate::coordinator::{spawn_coordinator, AnalysisHandle, AnalysisSnapshot};
    use crate::types::{AnalysisScore, EngineEvaluation};
    use chess::PlayerSide;
    use engine::{GoParams, MockEngine};
    use std::time::Duration;

    const START: &str = "startpos";

    fn spawn_with(mock: &MockEngine, config: CoordinatorConfig) -> AnalysisHandle {
        spawn_coordinator(Box::new(mock.clone()), config)
    }

    async fn ready(mock: &MockEngine) -> AnalysisHandle {
        let handle = spawn_with(mock, CoordinatorConfig::default());
        handle.initialize().await.unwrap();
        handle
    }

    fn moves(list: &[&str]) -> Vec<String> {
        list.iter().map(|m| m.to_string()).collect()
    }

    fn position(fen: &str, list: &[&str]) -> EngineCommand {
        EngineCommand::SetPosition {
            fen: fen.to_string(),
            moves: moves(list),
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if condition() {
                return;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not met in time");
    }

    async fn wait_for_snapshot(
        handle: &AnalysisHandle,
        mut condition: impl FnMut(&AnalysisSnapshot) -> bool,
    ) -> AnalysisSnapshot {
        for _ in 0..1000 {
            let snapshot = handle.snapshot().await.unwrap();
            if condition(&snapshot) {
                return snapshot;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
        panic!("snapshot condition not met in time");
    }

    fn has_lines(snapshot: &AnalysisSnapshot) -> bool {
        snapshot
            .session
            .as_ref()
            .is_some_and(|s| !s.lines.is_empty())
    }

    fn is_concluded(snapshot: &AnalysisSnapshot) -> bool {
        snapshot.session.as_ref().is_some_and(|s| s.concluded)
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_runs_full_handshake() {
        let mock = MockEngine::new();
        let handle = ready(&mock).await;

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, EnginePhase::Ready);
        assert_eq!(snapshot.engine_name.as_deref(), Some("MockFish 1.0"));
        assert_eq!(
            mock.sent_commands(),
            vec![
                EngineCommand::Uci,
                EngineCommand::SetOption {
                    name: "MultiPV".to_string(),
                    value: Some("3".to_string()),
                },
                EngineCommand::IsReady,
            ]
        );

        // Already ready: no second engine.
        handle.initialize().await.unwrap();
        assert_eq!(mock.initialize_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_retries_then_fails() {
        let mock = MockEngine::new().with_failing_initializations(3);
        let config = CoordinatorConfig {
            max_init_attempts: 2,
            ..Default::default()
        };
        let handle = spawn_with(&mock, config);

        let err = handle.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::ChannelInitFailure { attempts: 2, .. }
        ));
        assert_eq!(mock.initialize_calls(), 2);

        let snapshot = handle.snapshot().await.unwrap();
        assert!(matches!(snapshot.phase, EnginePhase::Failed { .. }));
        assert!(snapshot.last_error.is_some());

        // A failed engine can be initialized again; the counter starts over.
        handle.initialize().await.unwrap();
        assert_eq!(mock.initialize_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_recovers_after_one_failure() {
        let mock = MockEngine::new().with_failing_initializations(1);
        let handle = spawn_with(&mock, CoordinatorConfig::default());
        handle.initialize().await.unwrap();
        assert_eq!(mock.initialize_calls(), 2);
        assert_eq!(mock.dispose_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout_fails_attempt() {
        let mock = MockEngine::new().with_silent_handshake();
        let config = CoordinatorConfig {
            max_init_attempts: 1,
            ..Default::default()
        };
        let handle = spawn_with(&mock, config);

        match handle.initialize().await {
            Err(AnalysisError::ChannelInitFailure { attempts, reason }) => {
                assert_eq!(attempts, 1);
                assert!(reason.contains("timed out"));
            }
            other => panic!("expected init failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_analyze_rejects_bad_requests() {
        let mock = MockEngine::new();
        let handle = spawn_with(&mock, CoordinatorConfig::default());

        assert!(matches!(
            handle.analyze("not a fen", vec![]).await,
            Err(AnalysisError::InvalidPosition(_))
        ));
        assert!(matches!(
            handle.analyze(START, vec![]).await,
            Err(AnalysisError::EngineUnavailable(_))
        ));

        handle.initialize().await.unwrap();
        assert!(matches!(
            handle.analyze(START, moves(&["e2e5"])).await,
            Err(AnalysisError::InvalidPosition(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_requests_coalesce() {
        let mock = MockEngine::new();
        let handle = ready(&mock).await;

        handle.analyze(START, vec![]).await.unwrap();
        handle.analyze(START, moves(&["e2e4"])).await.unwrap();
        handle.analyze(START, moves(&["e2e4", "e7e5"])).await.unwrap();
        time::sleep(Duration::from_millis(400)).await;

        assert_eq!(
            mock.submitted_positions(),
            vec![position(START, &["e2e4", "e7e5"])]
        );
        assert_eq!(
            mock.sent_commands().last(),
            Some(&EngineCommand::Go(GoParams {
                infinite: true,
                ..Default::default()
            }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_multipv_search_concludes_with_notation() {
        let mock = MockEngine::new();
        let handle = ready(&mock).await;

        handle.analyze(START, vec![]).await.unwrap();
        wait_until(|| mock.submitted_positions().len() == 1).await;

        assert!(mock.emit("info depth 10 multipv 1 score cp 35 nodes 120000 nps 900000 pv e2e4 e7e5"));
        assert!(mock.emit("info depth 10 multipv 2 score cp 20 nodes 120000 nps 900000 pv d2d4 d7d5"));
        assert!(mock.emit("bestmove e2e4 ponder e7e5"));

        let snapshot = wait_for_snapshot(&handle, is_concluded).await;
        assert_eq!(snapshot.phase, EnginePhase::Ready);

        let session = snapshot.session.unwrap();
        assert_eq!(session.lines.len(), 2);
        assert_eq!(session.lines[0].notation, vec!["e4", "e5"]);
        assert_eq!(session.lines[1].notation, vec!["d4", "d5"]);
        assert_eq!(
            session.evaluation,
            Some(EngineEvaluation::Centipawns {
                value: 35,
                perspective: PlayerSide::White
            })
        );
        assert_eq!(session.evaluation_depth, Some(10));
        assert_eq!(session.score, Some(AnalysisScore::Centipawns(35)));

        let best = session.best_move.unwrap();
        assert_eq!(best.mv, "e2e4");
        assert_eq!(best.notation.as_deref(), Some("e4"));
        assert_eq!(best.ponder.as_deref(), Some("e7e5"));
        assert_eq!(session.stats.unwrap().nodes, 120_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shallow_lines_do_not_move_published_evaluation() {
        let mock = MockEngine::new();
        let handle = ready(&mock).await;

        handle.analyze(START, vec![]).await.unwrap();
        wait_until(|| mock.submitted_positions().len() == 1).await;

        assert!(mock.emit("info depth 3 score cp 10 pv e2e4"));
        let snapshot = wait_for_snapshot(&handle, has_lines).await;
        assert!(snapshot.session.unwrap().evaluation.is_none());

        assert!(mock.emit("info depth 12 score cp 40 pv e2e4"));
        assert!(mock.emit("info depth 8 score cp -200 pv d2d4"));
        let snapshot = wait_for_snapshot(&handle, |s| {
            s.session.as_ref().is_some_and(|s| s.lines[0].depth == 8)
        })
        .await;

        let session = snapshot.session.unwrap();
        assert_eq!(session.evaluation_depth, Some(12));
        assert_eq!(session.score, Some(AnalysisScore::Centipawns(40)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_position_stops_current_search_first() {
        let mock = MockEngine::new();
        let handle = ready(&mock).await;

        handle.analyze(START, vec![]).await.unwrap();
        wait_until(|| mock.submitted_positions().len() == 1).await;
        assert!(mock.emit("info depth 10 score cp 20 pv e2e4"));
        let first = wait_for_snapshot(&handle, has_lines).await;
        let first_id = first.session.unwrap().id;

        handle.analyze(START, moves(&["e2e4"])).await.unwrap();
        wait_until(|| mock.submitted_positions().len() == 2).await;

        let commands = mock.sent_commands();
        let stop_at = commands
            .iter()
            .position(|c| *c == EngineCommand::Stop)
            .unwrap();
        let second_at = commands
            .iter()
            .position(|c| *c == position(START, &["e2e4"]))
            .unwrap();
        assert!(stop_at < second_at);

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, EnginePhase::Analyzing);
        let session = snapshot.session.unwrap();
        assert_ne!(session.id, first_id);
        assert_eq!(session.side_to_move, PlayerSide::Black);
        assert!(session.lines.is_empty());
        assert!(session.best_move.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_timeout_discards_late_output() {
        let mock = MockEngine::new().with_ignored_stop();
        let handle = ready(&mock).await;

        handle.analyze(START, vec![]).await.unwrap();
        wait_until(|| mock.submitted_positions().len() == 1).await;

        handle.analyze(START, moves(&["e2e4"])).await.unwrap();
        time::sleep(Duration::from_millis(250)).await;
        // Stop sent, not yet acknowledged.
        assert_eq!(mock.submitted_positions().len(), 1);
        assert!(mock.sent_commands().contains(&EngineCommand::Stop));

        time::sleep(Duration::from_millis(600)).await;
        assert_eq!(mock.submitted_positions().len(), 2);

        // Output of the abandoned search, then the new one.
        assert!(mock.emit("info depth 30 score cp 900 pv a2a3"));
        assert!(mock.emit("bestmove a2a3"));
        assert!(mock.emit("info depth 12 score cp 25 pv e7e5"));

        let snapshot = wait_for_snapshot(&handle, has_lines).await;
        let session = snapshot.session.unwrap();
        assert_eq!(session.lines.len(), 1);
        assert_eq!(session.lines[0].moves, vec!["e7e5"]);
        assert!(!session.concluded);
        assert_eq!(snapshot.phase, EnginePhase::Analyzing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_stop_concludes_search() {
        let mock = MockEngine::new();
        let handle = ready(&mock).await;

        handle.analyze(START, vec![]).await.unwrap();
        wait_until(|| mock.submitted_positions().len() == 1).await;
        assert!(mock.emit("info depth 9 score cp 15 pv a2a3 e7e5"));
        wait_for_snapshot(&handle, has_lines).await;

        handle.stop().await.unwrap();
        let snapshot = wait_for_snapshot(&handle, is_concluded).await;
        assert_eq!(snapshot.phase, EnginePhase::Ready);
        let session = snapshot.session.unwrap();
        assert_eq!(session.best_move.unwrap().notation.as_deref(), Some("a3"));
        assert_eq!(session.lines[0].notation, vec!["a3", "e5"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_stop_during_position_change_still_times_out() {
        let mock = MockEngine::new().with_ignored_stop();
        let handle = ready(&mock).await;

        handle.analyze(START, vec![]).await.unwrap();
        wait_until(|| mock.submitted_positions().len() == 1).await;
        assert!(mock.emit("info depth 9 score cp 15 pv a2a3 e7e5"));
        wait_for_snapshot(&handle, has_lines).await;

        // The position change is waiting on a stop the engine never answers.
        handle.analyze(START, moves(&["e2e4"])).await.unwrap();
        time::sleep(Duration::from_millis(250)).await;
        assert!(mock.sent_commands().contains(&EngineCommand::Stop));

        handle.stop().await.unwrap();
        time::sleep(Duration::from_millis(600)).await;

        // Nothing new was submitted, and the first search ended locally.
        assert_eq!(mock.submitted_positions().len(), 1);
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, EnginePhase::Ready);
        let session = snapshot.session.unwrap();
        assert!(session.concluded);
        assert!(session.best_move.is_none());
        assert_eq!(session.lines[0].notation, vec!["a3", "e5"]);

        // The late acknowledgement is discarded.
        assert!(mock.emit("bestmove a2a3"));
        time::sleep(Duration::from_millis(20)).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.session.unwrap().best_move.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_configure_applies_to_next_search() {
        let mock = MockEngine::new();
        let handle = ready(&mock).await;

        handle
            .configure(AnalysisConfig::new(9, SearchLimit::Depth(12)))
            .await
            .unwrap();
        handle.analyze(START, vec![]).await.unwrap();
        wait_until(|| mock.submitted_positions().len() == 1).await;

        let commands = mock.sent_commands();
        let tail = &commands[commands.len() - 3..];
        assert_eq!(
            tail,
            &[
                EngineCommand::SetOption {
                    name: "MultiPV".to_string(),
                    value: Some("5".to_string()),
                },
                position(START, &[]),
                EngineCommand::Go(GoParams {
                    depth: Some(12),
                    ..Default::default()
                }),
            ]
        );

        // A depth-limited search ends on its own.
        assert!(mock.emit("bestmove e2e4"));
        let snapshot = wait_for_snapshot(&handle, is_concluded).await;
        assert_eq!(snapshot.phase, EnginePhase::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_and_noise_lines_are_ignored() {
        let mock = MockEngine::new();
        let handle = ready(&mock).await;

        handle.analyze(START, vec![]).await.unwrap();
        wait_until(|| mock.submitted_positions().len() == 1).await;

        assert!(mock.emit("info depth x score cp 1 pv e2e4"));
        assert!(mock.emit("something unexpected"));
        assert!(mock.emit("info string NNUE evaluation enabled"));
        assert!(mock.emit("info depth 10 score cp 12 pv g1f3"));

        let snapshot = wait_for_snapshot(&handle, has_lines).await;
        let session = snapshot.session.unwrap();
        assert_eq!(session.lines.len(), 1);
        assert_eq!(session.lines[0].moves, vec!["g1f3"]);
        assert_eq!(snapshot.phase, EnginePhase::Analyzing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_bestmove_keeps_search_running() {
        let mock = MockEngine::new();
        let handle = ready(&mock).await;

        handle.analyze(START, vec![]).await.unwrap();
        wait_until(|| mock.submitted_positions().len() == 1).await;

        assert!(mock.emit("info depth 10 score cp 12 pv g1f3"));
        assert!(mock.emit("bestmove e2e"));
        wait_for_snapshot(&handle, has_lines).await;
        time::sleep(Duration::from_millis(20)).await;

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, EnginePhase::Analyzing);
        let session = snapshot.session.unwrap();
        assert!(!session.concluded);
        assert!(session.best_move.is_none());

        assert!(mock.emit("bestmove g1f3"));
        let snapshot = wait_for_snapshot(&handle, is_concluded).await;
        assert_eq!(snapshot.phase, EnginePhase::Ready);
        let best = snapshot.session.unwrap().best_move.unwrap();
        assert_eq!(best.notation.as_deref(), Some("Nf3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_without_search_is_discarded() {
        let mock = MockEngine::new();
        let handle = ready(&mock).await;

        assert!(mock.emit("info depth 10 score cp 12 pv g1f3"));
        assert!(mock.emit("bestmove g1f3"));
        time::sleep(Duration::from_millis(20)).await;

        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.session.is_none());
        assert_eq!(snapshot.phase, EnginePhase::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_is_idempotent() {
        let mock = MockEngine::new();
        let handle = ready(&mock).await;

        handle.analyze(START, vec![]).await.unwrap();
        wait_until(|| mock.submitted_positions().len() == 1).await;

        handle.dispose().await.unwrap();
        handle.dispose().await.unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, EnginePhase::Uninitialized);
        assert!(snapshot.session.is_none());
        assert!(mock.dispose_calls() >= 2);
        assert!(!mock.emit("info depth 1"));
        assert!(matches!(
            handle.analyze(START, vec![]).await,
            Err(AnalysisError::EngineUnavailable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_loss_reinitializes_and_resubmits() {
        let mock = MockEngine::new();
        let handle = ready(&mock).await;

        handle.analyze(START, moves(&["d2d4"])).await.unwrap();
        wait_until(|| mock.submitted_positions().len() == 1).await;

        mock.close_output();
        wait_until(|| mock.submitted_positions().len() == 2).await;

        assert_eq!(mock.initialize_calls(), 2);
        assert_eq!(
            mock.submitted_positions(),
            vec![position(START, &["d2d4"]), position(START, &["d2d4"])]
        );
        let snapshot = wait_for_snapshot(&handle, |s| s.phase == EnginePhase::Analyzing).await;
        assert!(snapshot.last_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_receive_state_and_uci_log() {
        let mock = MockEngine::new();
        let handle = ready(&mock).await;
        let (initial, mut events) = handle.subscribe().await.unwrap();
        assert!(initial.session.is_none());

        handle.analyze(START, vec![]).await.unwrap();

        let mut saw_go = false;
        let mut saw_session = false;
        while !(saw_go && saw_session) {
            match events.recv().await.unwrap() {
                AnalysisEvent::UciMessage(entry) => {
                    if entry.direction == UciDirection::ToEngine && entry.message == "go infinite" {
                        saw_go = true;
                    }
                }
                AnalysisEvent::StateChanged(snapshot) => {
                    if snapshot.session.is_some() {
                        saw_session = true;
                    }
                }
                AnalysisEvent::Error(e) => panic!("unexpected error event: {}", e),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_disposes_engine() {
        let mock = MockEngine::new();
        let handle = ready(&mock).await;
        handle.shutdown().await;
        wait_until(|| mock.dispose_calls() >= 1).await;
        assert!(matches!(
            handle.snapshot().await,
            Err(AnalysisError::ActorClosed) | Err(AnalysisError::Internal(_))
        ));
    }
}

use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::*;
use super::events::AnalysisEvent;
use super::snapshot::AnalysisSnapshot;
use crate::config::AnalysisConfig;
use crate::session::PositionRequest;

/// Cheap, cloneable handle to the coordinator actor.
#[derive(Clone)]
pub struct AnalysisHandle {
    cmd_tx: mpsc::Sender<CoordinatorCommand>,
}

impl AnalysisHandle {
    pub(crate) fn new(cmd_tx: mpsc::Sender<CoordinatorCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Start the engine and complete the UCI handshake, retrying with
    /// backoff. Resolves once the engine is ready or has failed for good.
    pub async fn initialize(&self) -> Result<(), AnalysisError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorCommand::Initialize { reply: tx }).await?;
        rx.await
            .map_err(|_| AnalysisError::Internal("Reply dropped".into()))?
    }

    /// Ask for `fen` (or `startpos`) plus `moves` to be analyzed. Rapid
    /// successive calls coalesce; only the latest is searched.
    pub async fn analyze(
        &self,
        fen: impl Into<String>,
        moves: Vec<String>,
    ) -> Result<(), AnalysisError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorCommand::Analyze {
            request: PositionRequest::new(fen, moves),
            reply: tx,
        })
        .await?;
        rx.await
            .map_err(|_| AnalysisError::Internal("Reply dropped".into()))?
    }

    /// Halt the running search and drop any request not yet submitted.
    pub async fn stop(&self) -> Result<(), AnalysisError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorCommand::Stop { reply: tx }).await?;
        rx.await
            .map_err(|_| AnalysisError::Internal("Reply dropped".into()))?
    }

    /// Takes effect from the next submitted position.
    pub async fn configure(&self, config: AnalysisConfig) -> Result<(), AnalysisError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorCommand::Configure { config, reply: tx })
            .await?;
        rx.await
            .map_err(|_| AnalysisError::Internal("Reply dropped".into()))?
    }

    /// Tear the engine down. Safe to call in any state, any number of times.
    pub async fn dispose(&self) -> Result<(), AnalysisError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorCommand::Dispose { reply: tx }).await?;
        rx.await
            .map_err(|_| AnalysisError::Internal("Reply dropped".into()))
    }

    pub async fn snapshot(&self) -> Result<AnalysisSnapshot, AnalysisError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorCommand::GetSnapshot { reply: tx })
            .await?;
        rx.await
            .map_err(|_| AnalysisError::Internal("Reply dropped".into()))
    }

    pub async fn subscribe(
        &self,
    ) -> Result<(AnalysisSnapshot, broadcast::Receiver<AnalysisEvent>), AnalysisError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorCommand::Subscribe { reply: tx }).await?;
        rx.await
            .map_err(|_| AnalysisError::Internal("Reply dropped".into()))
    }

    /// Dispose the engine and end the actor.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(CoordinatorCommand::Shutdown).await;
    }

    async fn send(&self, cmd: CoordinatorCommand) -> Result<(), AnalysisError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| AnalysisError::ActorClosed)
    }
}
